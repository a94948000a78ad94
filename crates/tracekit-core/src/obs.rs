//! Structured observability hooks for provisioning and experiments.
//!
//! This module provides:
//! - Experiment-scoped tracing spans via `experiment_span`
//! - Emission functions for resource reconciliation and experiment lifecycle
//!
//! Events are emitted at `info!` level, failures at `warn!`. Use `RUST_LOG`
//! to filter and `--json` on the CLI for JSON lines.

use tracekit_wire::ResourceKind;
use tracing::{info, warn};

/// Span tagging every event of one experiment session.
///
/// ```ignore
/// run_examples(..)
///     .instrument(experiment_span("email-agent-1a2b3c4d"))
///     .await;
/// ```
pub fn experiment_span(session: &str) -> tracing::Span {
    tracing::info_span!("tracekit.experiment", session = %session)
}

/// Emit event: a provisioning stage begins.
pub fn emit_stage_started(stage: &str, items: usize) {
    info!(event = "stage.started", stage = %stage, items = items);
}

/// Emit event: a resource was created. `detail` is an id or URL when known.
pub fn emit_resource_created(kind: ResourceKind, name: &str, detail: Option<&str>) {
    info!(
        event = "resource.created",
        kind = %kind,
        name = %name,
        detail = detail.unwrap_or("-"),
    );
}

/// Emit event: a resource was left alone (already present, unchanged, or
/// an unresolved parent).
pub fn emit_resource_skipped(kind: ResourceKind, name: &str, reason: &str) {
    info!(event = "resource.skipped", kind = %kind, name = %name, reason = %reason);
}

/// Emit event: provisioning one resource failed (warning level).
pub fn emit_resource_failed(kind: ResourceKind, name: &str, error: &dyn std::fmt::Display) {
    warn!(event = "resource.failed", kind = %kind, name = %name, error = %error);
}

pub fn emit_session_opened(session: &str, dataset: &str, examples: usize) {
    info!(
        event = "session.opened",
        session = %session,
        dataset = %dataset,
        examples = examples,
    );
}

pub fn emit_session_closed(session: &str, runs: usize) {
    info!(event = "session.closed", session = %session, runs = runs);
}

/// Emit event: one run was scored.
pub fn emit_run_scored(run_id: &str, key: &str, score: f64) {
    info!(event = "run.scored", run_id = %run_id, key = %key, score = score);
}

/// Emit event: feedback could not be logged (warning level).
pub fn emit_feedback_failed(run_id: &str, key: &str, error: &dyn std::fmt::Display) {
    warn!(event = "feedback.failed", run_id = %run_id, key = %key, error = %error);
}
