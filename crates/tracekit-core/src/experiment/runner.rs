//! Experiment runner.
//!
//! Lifecycle: `Pending -> SessionOpen -> (per example)* -> SessionClosed`.
//!
//! - Batched: hands the dataset, target and scorers to the platform's
//!   native evaluation entry point, which owns the session.
//! - Manual: opens the session, then for each example creates a run linked
//!   to it, invokes the agent, ends the run and logs the alignment score.
//!   Feedback failures are logged and skipped; run and session failures
//!   propagate, after the session has been closed.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracekit_wire::{
    experiment_name, BatchEvaluator, EvaluateRequest, ExampleRecord, FeedbackCreate,
    FeedbackScore, PlatformApi, PlatformTransport, RunCreate, RunEnd, SessionCreate,
    SessionRecord, TransportError,
};
use tracing::{debug, info, instrument, warn, Instrument};
use uuid::Uuid;

use super::agent::{AgentUnderTest, InvokeConfig};
use super::scoring::{AgentTarget, TrajectoryScorer};
use crate::domain::{ExperimentDefinition, ExperimentStrategy, Result};
use crate::obs;
use crate::trajectory::{Trajectory, UNMATCHED_STEPS_KEY};

/// Where an experiment is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExperimentState {
    Pending,
    SessionOpen,
    SessionClosed,
}

/// Summary of a finished experiment.
#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentReport {
    pub session: String,
    pub strategy: ExperimentStrategy,
    pub runs: usize,
    /// Runs whose agent invocation failed.
    pub failed_runs: usize,
    /// Feedback entries the platform rejected.
    pub feedback_failures: usize,
    pub mean_unmatched_steps: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExperimentOutcome {
    Completed(ExperimentReport),
    Skipped { reason: String },
}

pub struct ExperimentRunner {
    transport: Arc<dyn PlatformTransport>,
    evaluator: Arc<dyn BatchEvaluator>,
    agent: Arc<dyn AgentUnderTest>,
}

impl ExperimentRunner {
    pub fn new(
        transport: Arc<dyn PlatformTransport>,
        evaluator: Arc<dyn BatchEvaluator>,
        agent: Arc<dyn AgentUnderTest>,
    ) -> Self {
        Self {
            transport,
            evaluator,
            agent,
        }
    }

    pub async fn run(&self, definition: &ExperimentDefinition) -> Result<ExperimentOutcome> {
        match definition.strategy {
            ExperimentStrategy::Batched => self.run_batched(definition).await,
            ExperimentStrategy::Manual => self.run_manual(definition).await,
        }
    }

    #[instrument(skip(self, definition), fields(prefix = %definition.prefix))]
    async fn run_batched(&self, definition: &ExperimentDefinition) -> Result<ExperimentOutcome> {
        let request = EvaluateRequest {
            dataset_name: definition.dataset.clone(),
            target: Arc::new(AgentTarget::new(Arc::clone(&self.agent))),
            scorers: vec![Arc::new(TrajectoryScorer)],
            experiment_prefix: definition.prefix.clone(),
            num_repetitions: definition.num_repetitions,
            max_concurrency: definition.max_concurrency,
        };

        let results = match self.evaluator.evaluate(request).await {
            Ok(results) => results,
            Err(TransportError::MissingResource { kind, name }) => {
                return Ok(ExperimentOutcome::Skipped {
                    reason: format!("{} '{}' does not exist", kind, name),
                });
            }
            Err(e) => return Err(e.into()),
        };

        Ok(ExperimentOutcome::Completed(ExperimentReport {
            session: results.session.name.clone(),
            strategy: ExperimentStrategy::Batched,
            runs: results.rows.len(),
            failed_runs: results.failed_rows(),
            feedback_failures: results.feedback_failures(),
            mean_unmatched_steps: results.mean_score(UNMATCHED_STEPS_KEY),
        }))
    }

    #[instrument(skip(self, definition), fields(prefix = %definition.prefix))]
    async fn run_manual(&self, definition: &ExperimentDefinition) -> Result<ExperimentOutcome> {
        let api = self.transport.api();
        let mut state = ExperimentState::Pending;

        let Some(dataset) = api.find_dataset(&definition.dataset).await? else {
            return Ok(ExperimentOutcome::Skipped {
                reason: format!("dataset '{}' does not exist", definition.dataset),
            });
        };
        let examples = api.list_examples(&dataset.id).await?;

        let session = api
            .create_session(&SessionCreate {
                name: experiment_name(&definition.prefix),
                reference_dataset_id: Some(dataset.id.clone()),
                start_time: Utc::now(),
                description: definition.description.clone(),
            })
            .await?;
        state = advance(state, ExperimentState::SessionOpen);
        obs::emit_session_opened(&session.name, &dataset.name, examples.len());

        let mut tally = Tally::default();
        let outcome = self
            .run_examples(api, &session, &examples, definition.num_repetitions, &mut tally)
            .instrument(obs::experiment_span(&session.name))
            .await;

        // Closed exactly once, whatever happened per example.
        let closed = api.end_session(&session.id, Utc::now()).await;
        state = advance(state, ExperimentState::SessionClosed);
        debug!(state = ?state, "experiment finished");
        match &closed {
            Ok(()) => obs::emit_session_closed(&session.name, tally.runs),
            Err(e) => warn!(session = %session.name, error = %e, "failed to close session"),
        }

        outcome?;
        closed?;

        Ok(ExperimentOutcome::Completed(ExperimentReport {
            session: session.name,
            strategy: ExperimentStrategy::Manual,
            runs: tally.runs,
            failed_runs: tally.failed_runs,
            feedback_failures: tally.feedback_failures,
            mean_unmatched_steps: tally.mean(),
        }))
    }

    async fn run_examples(
        &self,
        api: &PlatformApi,
        session: &SessionRecord,
        examples: &[ExampleRecord],
        repetitions: usize,
        tally: &mut Tally,
    ) -> Result<()> {
        for _ in 0..repetitions.max(1) {
            for example in examples {
                self.run_example(api, session, example, tally).await?;
            }
        }
        Ok(())
    }

    async fn run_example(
        &self,
        api: &PlatformApi,
        session: &SessionRecord,
        example: &ExampleRecord,
        tally: &mut Tally,
    ) -> Result<()> {
        let run_id = Uuid::new_v4();
        api.create_run(&RunCreate {
            id: run_id,
            name: "agent".to_string(),
            run_type: "chain".to_string(),
            inputs: example.inputs.clone(),
            session_id: session.id.clone(),
            reference_example_id: Some(example.id.clone()),
            start_time: Utc::now(),
        })
        .await?;
        tally.runs += 1;

        let invoked = self
            .agent
            .invoke(&example.inputs, &InvokeConfig::fresh())
            .await;
        let (outputs, error) = match invoked {
            Ok(response) => (Trajectory::from_messages(&response.messages).to_outputs(), None),
            Err(e) => (json!({}), Some(format!("{:#}", e))),
        };

        api.end_run(
            &run_id,
            &RunEnd {
                outputs: outputs.clone(),
                end_time: Utc::now(),
                error: error.clone(),
            },
        )
        .await?;

        if let Some(error) = error {
            info!(run_id = %run_id, example = %example.id, error = %error, "agent failed, run not scored");
            tally.failed_runs += 1;
            return Ok(());
        }

        let unmatched = TrajectoryScorer::unmatched(&outputs, example.outputs.as_ref()) as f64;
        obs::emit_run_scored(&run_id.to_string(), UNMATCHED_STEPS_KEY, unmatched);
        tally.scores.push(unmatched);

        let feedback = FeedbackCreate {
            run_id,
            key: UNMATCHED_STEPS_KEY.to_string(),
            score: FeedbackScore::Number(unmatched),
            comment: None,
        };
        if let Err(e) = api.create_feedback(&feedback).await {
            obs::emit_feedback_failed(&run_id.to_string(), UNMATCHED_STEPS_KEY, &e);
            tally.feedback_failures += 1;
        }
        Ok(())
    }
}

fn advance(from: ExperimentState, to: ExperimentState) -> ExperimentState {
    debug!(from = ?from, to = ?to, "experiment state");
    to
}

#[derive(Debug, Default)]
struct Tally {
    runs: usize,
    failed_runs: usize,
    feedback_failures: usize,
    scores: Vec<f64>,
}

impl Tally {
    fn mean(&self) -> Option<f64> {
        if self.scores.is_empty() {
            None
        } else {
            Some(self.scores.iter().sum::<f64>() / self.scores.len() as f64)
        }
    }
}
