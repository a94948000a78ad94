//! Batched experiments through the native evaluation entry point.

mod support;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use support::{reference, seed_email_dataset, stack, ScriptedAgent};
use tracekit_core::{
    ExperimentDefinition, ExperimentOutcome, ExperimentReport, ExperimentRunner,
    ExperimentStrategy,
};
use tracekit_wire::{NativeClient, PlatformApi};

fn batched(dataset: &str, repetitions: usize, max_concurrency: usize) -> ExperimentDefinition {
    ExperimentDefinition {
        dataset: dataset.to_string(),
        prefix: "email-agent-batched".to_string(),
        strategy: ExperimentStrategy::Batched,
        num_repetitions: repetitions,
        max_concurrency,
        description: None,
    }
}

fn runner(api: &PlatformApi, agent: Arc<ScriptedAgent>) -> ExperimentRunner {
    let native = Arc::new(NativeClient::new(api.clone()));
    ExperimentRunner::new(native.clone(), native, agent)
}

fn completed(outcome: ExperimentOutcome) -> ExperimentReport {
    match outcome {
        ExperimentOutcome::Completed(report) => report,
        other => panic!("expected a completed experiment, got {:?}", other),
    }
}

#[tokio::test]
async fn scores_every_example_in_one_session() {
    let (platform, api) = stack();
    seed_email_dataset(&platform);
    let agent = Arc::new(ScriptedAgent::new(&["search_inbox", "write_email"]));

    let report = completed(runner(&api, agent).run(&batched("email-eval", 1, 4)).await.unwrap());

    assert_eq!(report.strategy, ExperimentStrategy::Batched);
    assert_eq!(report.runs, 3);
    assert_eq!(report.failed_runs, 0);
    assert_eq!(report.mean_unmatched_steps, Some(1.0));
    assert!(report.session.starts_with("email-agent-batched-"));

    let sessions = platform.sessions();
    assert_eq!(sessions.len(), 1);
    assert!(sessions[0].ended);
    assert_eq!(platform.runs().len(), 3);
    assert!(platform.runs().iter().all(|r| r.ended && r.session_id == sessions[0].record.id));
    assert_eq!(platform.feedback().len(), 3);
}

#[tokio::test]
async fn in_flight_invocations_stay_within_max_concurrency() {
    let (platform, api) = stack();
    let examples = (0..8)
        .map(|i| (json!({ "email": format!("email {}", i) }), Some(reference(&["write_email"]))))
        .collect();
    platform.seed_dataset("bulk", examples);
    let agent = Arc::new(
        ScriptedAgent::new(&["write_email"]).with_delay(Duration::from_millis(20)),
    );

    let report = completed(runner(&api, agent.clone()).run(&batched("bulk", 1, 2)).await.unwrap());

    assert_eq!(report.runs, 8);
    assert_eq!(agent.calls(), 8);
    assert!(agent.peak() <= 2, "peak concurrency was {}", agent.peak());
    assert!(agent.peak() >= 1);
    assert_eq!(report.mean_unmatched_steps, Some(0.0));
}

#[tokio::test]
async fn repetitions_run_each_example_again() {
    let (platform, api) = stack();
    seed_email_dataset(&platform);
    let agent = Arc::new(ScriptedAgent::new(&["write_email"]));

    let report = completed(runner(&api, agent.clone()).run(&batched("email-eval", 3, 2)).await.unwrap());

    assert_eq!(report.runs, 9);
    assert_eq!(agent.calls(), 9);
    assert_eq!(platform.sessions().len(), 1);
}

#[tokio::test]
async fn failed_predictions_are_counted_not_scored() {
    let (platform, api) = stack();
    seed_email_dataset(&platform);
    let agent = Arc::new(ScriptedAgent::new(&["write_email"]).failing_on("spam"));

    let report = completed(runner(&api, agent).run(&batched("email-eval", 1, 4)).await.unwrap());

    assert_eq!(report.runs, 3);
    assert_eq!(report.failed_runs, 1);
    assert_eq!(platform.feedback().len(), 2);
    assert!(platform.sessions()[0].ended);
}

#[tokio::test]
async fn rejected_feedback_surfaces_in_the_report() {
    let (platform, api) = stack();
    seed_email_dataset(&platform);
    platform.fail_next("POST", "/feedback", 503, 2);
    let agent = Arc::new(ScriptedAgent::new(&["write_email"]));

    let report = completed(runner(&api, agent).run(&batched("email-eval", 1, 1)).await.unwrap());

    assert_eq!(report.runs, 3);
    assert_eq!(report.feedback_failures, 2);
    assert_eq!(platform.feedback().len(), 1);
}

#[tokio::test]
async fn missing_dataset_is_skipped() {
    let (platform, api) = stack();
    let agent = Arc::new(ScriptedAgent::new(&["write_email"]));

    let outcome = runner(&api, agent.clone()).run(&batched("ghost", 1, 4)).await.unwrap();

    assert!(matches!(outcome, ExperimentOutcome::Skipped { ref reason } if reason.contains("ghost")));
    assert_eq!(agent.calls(), 0);
    assert!(platform.sessions().is_empty());
}
