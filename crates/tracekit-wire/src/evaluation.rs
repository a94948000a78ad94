//! Batched evaluation engine behind the native client's `evaluate` call
//!
//! Runs every dataset example `num_repetitions` times against a target,
//! with at most `max_concurrency` invocations in flight. The engine owns the
//! experiment session: it opens it before the first run and closes it after
//! the last one. Targets and scorers run on arbitrary worker tasks and must
//! not share mutable local state.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::api::PlatformApi;
use crate::error::TransportError;
use crate::schema::{
    ExampleRecord, FeedbackCreate, FeedbackScore, RunCreate, RunEnd, SessionCreate, SessionRecord,
};
use crate::TransportResult;

/// The system under evaluation.
#[async_trait]
pub trait EvalTarget: Send + Sync {
    /// Produce outputs for one example's inputs.
    async fn predict(&self, inputs: &Value) -> anyhow::Result<Value>;
}

/// One keyed score for a run.
#[derive(Debug, Clone, PartialEq)]
pub struct Score {
    pub key: String,
    pub score: FeedbackScore,
    pub comment: Option<String>,
}

/// A pure scoring function over a run's outputs and the example's reference.
pub trait RunScorer: Send + Sync {
    fn score(&self, outputs: &Value, reference_outputs: Option<&Value>) -> Score;
}

/// Arguments of a batched evaluation.
#[derive(Clone)]
pub struct EvaluateRequest {
    pub dataset_name: String,
    pub target: Arc<dyn EvalTarget>,
    pub scorers: Vec<Arc<dyn RunScorer>>,
    pub experiment_prefix: String,
    pub num_repetitions: usize,
    pub max_concurrency: usize,
}

/// Result of one (example, repetition) invocation.
#[derive(Debug, Clone)]
pub struct ExperimentRow {
    pub example_id: String,
    pub repetition: usize,
    pub run_id: Uuid,
    pub outputs: Option<Value>,
    pub error: Option<String>,
    pub scores: Vec<Score>,
    /// Scores the platform refused to store.
    pub feedback_failures: usize,
}

/// Everything a batched evaluation produced.
#[derive(Debug, Clone)]
pub struct ExperimentResults {
    pub session: SessionRecord,
    pub rows: Vec<ExperimentRow>,
}

impl ExperimentResults {
    pub fn failed_rows(&self) -> usize {
        self.rows.iter().filter(|r| r.error.is_some()).count()
    }

    pub fn feedback_failures(&self) -> usize {
        self.rows.iter().map(|r| r.feedback_failures).sum()
    }

    /// Mean of the numeric (or boolean as 0/1) scores logged under `key`.
    pub fn mean_score(&self, key: &str) -> Option<f64> {
        let values: Vec<f64> = self
            .rows
            .iter()
            .flat_map(|r| r.scores.iter())
            .filter(|s| s.key == key)
            .map(|s| match s.score {
                FeedbackScore::Number(n) => n,
                FeedbackScore::Bool(b) => f64::from(u8::from(b)),
            })
            .collect();
        if values.is_empty() {
            None
        } else {
            Some(values.iter().sum::<f64>() / values.len() as f64)
        }
    }
}

/// Platform-native batched evaluation entry point.
#[async_trait]
pub trait BatchEvaluator: Send + Sync {
    async fn evaluate(&self, request: EvaluateRequest) -> TransportResult<ExperimentResults>;
}

/// `<prefix>-<8 hex>`
pub fn experiment_name(prefix: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", prefix, &suffix[..8])
}

/// Run a batched evaluation against `api`.
#[instrument(skip(api, request), fields(dataset = %request.dataset_name, prefix = %request.experiment_prefix))]
pub async fn run_evaluation(
    api: PlatformApi,
    request: EvaluateRequest,
) -> TransportResult<ExperimentResults> {
    let dataset = api
        .find_dataset(&request.dataset_name)
        .await?
        .ok_or_else(|| TransportError::MissingResource {
            kind: "dataset".to_string(),
            name: request.dataset_name.clone(),
        })?;
    let examples = api.list_examples(&dataset.id).await?;

    let session = api
        .create_session(&SessionCreate {
            name: experiment_name(&request.experiment_prefix),
            reference_dataset_id: Some(dataset.id.clone()),
            start_time: Utc::now(),
            description: None,
        })
        .await?;
    info!(
        session = %session.name,
        examples = examples.len(),
        repetitions = request.num_repetitions,
        max_concurrency = request.max_concurrency,
        "Starting batched evaluation"
    );

    // Semaphore enforces max_concurrency
    let sem = Arc::new(Semaphore::new(request.max_concurrency.max(1)));
    let mut tasks = JoinSet::new();

    for repetition in 0..request.num_repetitions.max(1) {
        for example in &examples {
            let api = api.clone();
            let sem = Arc::clone(&sem);
            let target = Arc::clone(&request.target);
            let scorers = request.scorers.clone();
            let session_id = session.id.clone();
            let example = example.clone();

            tasks.spawn(async move {
                let _permit = sem.acquire_owned().await.ok();
                evaluate_example(&api, &session_id, example, repetition, target.as_ref(), &scorers)
                    .await
            });
        }
    }

    let mut rows = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(row) => rows.push(row),
            Err(e) => warn!(error = %e, "evaluation task aborted"),
        }
    }
    rows.sort_by(|a, b| {
        (a.repetition, a.example_id.as_str()).cmp(&(b.repetition, b.example_id.as_str()))
    });

    api.end_session(&session.id, Utc::now()).await?;
    info!(session = %session.name, runs = rows.len(), "Batched evaluation finished");

    Ok(ExperimentResults { session, rows })
}

async fn evaluate_example(
    api: &PlatformApi,
    session_id: &str,
    example: ExampleRecord,
    repetition: usize,
    target: &dyn EvalTarget,
    scorers: &[Arc<dyn RunScorer>],
) -> ExperimentRow {
    let run_id = Uuid::new_v4();
    let mut row = ExperimentRow {
        example_id: example.id.clone(),
        repetition,
        run_id,
        outputs: None,
        error: None,
        scores: Vec::new(),
        feedback_failures: 0,
    };

    let create = RunCreate {
        id: run_id,
        name: "target".to_string(),
        run_type: "chain".to_string(),
        inputs: example.inputs.clone(),
        session_id: session_id.to_string(),
        reference_example_id: Some(example.id.clone()),
        start_time: Utc::now(),
    };
    if let Err(e) = api.create_run(&create).await {
        warn!(example = %example.id, error = %e, "failed to create run");
        row.error = Some(e.to_string());
        return row;
    }

    let (outputs, error) = match target.predict(&example.inputs).await {
        Ok(outputs) => (outputs, None),
        Err(e) => (json!({}), Some(format!("{:#}", e))),
    };

    let end = RunEnd {
        outputs: outputs.clone(),
        end_time: Utc::now(),
        error: error.clone(),
    };
    if let Err(e) = api.end_run(&run_id, &end).await {
        warn!(run_id = %run_id, error = %e, "failed to end run");
        row.error = Some(e.to_string());
        return row;
    }
    if error.is_some() {
        row.error = error;
        return row;
    }

    for scorer in scorers {
        let score = scorer.score(&outputs, example.outputs.as_ref());
        let feedback = FeedbackCreate {
            run_id,
            key: score.key.clone(),
            score: score.score,
            comment: score.comment.clone(),
        };
        if let Err(e) = api.create_feedback(&feedback).await {
            warn!(run_id = %run_id, key = %score.key, error = %e, "failed to log feedback");
            row.feedback_failures += 1;
        }
        row.scores.push(score);
    }
    row.outputs = Some(outputs);
    row
}
