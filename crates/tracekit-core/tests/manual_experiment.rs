//! Manual experiment lifecycle against the in-memory platform.
//!
//! One session per experiment, one run per example linked to it, feedback
//! logged per scored run, and the session closed exactly once even when
//! something in between fails.

mod support;

use std::sync::Arc;

use support::{seed_email_dataset, stack, ScriptedAgent};
use tracekit_core::{
    ExperimentDefinition, ExperimentOutcome, ExperimentReport, ExperimentRunner,
    ExperimentStrategy, TracekitError, UNMATCHED_STEPS_KEY,
};
use tracekit_wire::fakes::MemoryPlatform;
use tracekit_wire::{FeedbackScore, NativeClient, PlatformApi};

fn manual(dataset: &str, repetitions: usize) -> ExperimentDefinition {
    ExperimentDefinition {
        dataset: dataset.to_string(),
        prefix: "email-agent".to_string(),
        strategy: ExperimentStrategy::Manual,
        num_repetitions: repetitions,
        max_concurrency: 1,
        description: Some("manual trajectory run".to_string()),
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

fn assert_single_closed_session(platform: &MemoryPlatform) {
    let sessions = platform.sessions();
    assert_eq!(sessions.len(), 1);
    assert!(sessions[0].ended, "session must be closed");
    assert_eq!(platform.count_calls("PATCH", "/sessions/*"), 1);
}

#[tokio::test]
async fn every_example_gets_a_linked_run_and_feedback() {
    let (platform, api) = stack();
    let dataset_id = seed_email_dataset(&platform);
    let agent = Arc::new(ScriptedAgent::new(&["search_inbox", "write_email"]));

    let report = completed(runner(&api, agent.clone()).run(&manual("email-eval", 1)).await.unwrap());

    assert_eq!(report.strategy, ExperimentStrategy::Manual);
    assert_eq!(report.runs, 3);
    assert_eq!(report.failed_runs, 0);
    assert_eq!(report.feedback_failures, 0);
    assert_eq!(report.mean_unmatched_steps, Some(1.0));
    assert!(report.session.starts_with("email-agent-"));
    assert_eq!(agent.calls(), 3);

    assert_single_closed_session(&platform);
    let session = &platform.sessions()[0].record;
    assert_eq!(session.reference_dataset_id.as_deref(), Some(dataset_id.as_str()));

    let runs = platform.runs();
    assert_eq!(runs.len(), 3);
    for run in &runs {
        assert_eq!(run.session_id, session.id);
        assert!(run.reference_example_id.is_some());
        assert!(run.ended);
        assert!(run.error.is_none());
        assert_eq!(
            run.outputs.as_ref().unwrap()["trajectory"],
            serde_json::json!(["search_inbox", "write_email"])
        );
    }

    let mut scores: Vec<f64> = platform
        .feedback()
        .into_iter()
        .map(|f| {
            assert_eq!(f.key, UNMATCHED_STEPS_KEY);
            match f.score {
                FeedbackScore::Number(n) => n,
                other => panic!("unexpected score {:?}", other),
            }
        })
        .collect();
    scores.sort_by(|a, b| a.partial_cmp(b).unwrap());
    assert_eq!(scores, vec![0.0, 1.0, 2.0]);
}

#[tokio::test]
async fn rejected_feedback_is_counted_and_skipped() {
    let (platform, api) = stack();
    seed_email_dataset(&platform);
    platform.fail_next("POST", "/feedback", 500, 1);
    let agent = Arc::new(ScriptedAgent::new(&["search_inbox", "write_email"]));

    let report = completed(runner(&api, agent).run(&manual("email-eval", 1)).await.unwrap());

    assert_eq!(report.runs, 3);
    assert_eq!(report.feedback_failures, 1);
    assert_eq!(platform.count_calls("POST", "/feedback"), 3);
    assert_eq!(platform.feedback().len(), 2);
    assert_single_closed_session(&platform);
}

#[tokio::test]
async fn agent_failure_ends_the_run_with_an_error_and_skips_scoring() {
    let (platform, api) = stack();
    seed_email_dataset(&platform);
    let agent = Arc::new(ScriptedAgent::new(&["write_email"]).failing_on("newsletter"));

    let report = completed(runner(&api, agent).run(&manual("email-eval", 1)).await.unwrap());

    assert_eq!(report.runs, 3);
    assert_eq!(report.failed_runs, 1);
    // Every run is ended; only the two scored runs attempt feedback.
    assert_eq!(platform.count_calls("PATCH", "/runs/*"), 3);
    assert_eq!(platform.count_calls("POST", "/feedback"), 2);
    assert_eq!(platform.feedback().len(), 2);

    let failed: Vec<_> = platform.runs().into_iter().filter(|r| r.error.is_some()).collect();
    assert_eq!(failed.len(), 1);
    assert!(failed[0].ended);
    assert!(failed[0].error.as_deref().unwrap().contains("newsletter"));
    assert_single_closed_session(&platform);
}

#[tokio::test]
async fn run_creation_failure_propagates_after_closing_the_session() {
    let (platform, api) = stack();
    seed_email_dataset(&platform);
    platform.fail_next("POST", "/runs", 500, 1);
    let agent = Arc::new(ScriptedAgent::new(&["write_email"]));

    let err = runner(&api, agent.clone())
        .run(&manual("email-eval", 1))
        .await
        .unwrap_err();

    assert!(matches!(err, TracekitError::Transport(ref e) if e.status() == Some(500)), "{}", err);
    assert_eq!(agent.calls(), 0);
    assert_single_closed_session(&platform);
}

#[tokio::test]
async fn session_close_failure_propagates_after_a_single_attempt() {
    let (platform, api) = stack();
    seed_email_dataset(&platform);
    platform.fail_next("PATCH", "/sessions/*", 500, 1);
    let agent = Arc::new(ScriptedAgent::new(&["search_inbox", "write_email"]));

    let err = runner(&api, agent.clone())
        .run(&manual("email-eval", 1))
        .await
        .unwrap_err();

    assert!(matches!(err, TracekitError::Transport(ref e) if e.status() == Some(500)), "{}", err);
    assert_eq!(platform.count_calls("PATCH", "/sessions/*"), 1);
    // Every example was processed before the close was attempted.
    assert_eq!(agent.calls(), 3);
    assert_eq!(platform.feedback().len(), 3);
    assert!(!platform.sessions()[0].ended);
}

#[tokio::test]
async fn repetitions_multiply_runs_within_one_session() {
    let (platform, api) = stack();
    seed_email_dataset(&platform);
    let agent = Arc::new(ScriptedAgent::new(&["search_inbox", "write_email"]));

    let report = completed(runner(&api, agent).run(&manual("email-eval", 2)).await.unwrap());

    assert_eq!(report.runs, 6);
    assert_eq!(platform.runs().len(), 6);
    assert_eq!(platform.feedback().len(), 6);
    assert_single_closed_session(&platform);
}

#[tokio::test]
async fn missing_dataset_is_skipped_without_a_session() {
    let (platform, api) = stack();
    let agent = Arc::new(ScriptedAgent::new(&["write_email"]));

    let outcome = runner(&api, agent).run(&manual("no-such-dataset", 1)).await.unwrap();

    assert!(
        matches!(outcome, ExperimentOutcome::Skipped { ref reason } if reason.contains("no-such-dataset"))
    );
    assert!(platform.sessions().is_empty());
    assert_eq!(platform.count_calls("POST", "/sessions"), 0);
}

#[tokio::test]
async fn empty_dataset_still_opens_and_closes_a_session() {
    let (platform, api) = stack();
    platform.seed_dataset("empty", vec![]);
    let agent = Arc::new(ScriptedAgent::new(&["write_email"]));

    let report = completed(runner(&api, agent).run(&manual("empty", 1)).await.unwrap());

    assert_eq!(report.runs, 0);
    assert_eq!(report.mean_unmatched_steps, None);
    assert_single_closed_session(&platform);
}
