//! Tracekit Core Library
//!
//! Idempotent provisioning of platform resources (prompts, evaluator rules,
//! review queues, automations) and experiment runs scored by trajectory
//! alignment. All remote effects go through `tracekit_wire`.

pub mod domain;
pub mod experiment;
pub mod guard;
pub mod obs;
pub mod orchestration;
pub mod registry;
pub mod telemetry;
pub mod trajectory;

pub use domain::{
    AutomationDefinition, DefinitionError, EvaluatorDefinition, EvaluatorKind,
    ExperimentDefinition, ExperimentStrategy, PlatformConfig, PromptDefinition, PromptSource,
    ProvisionManifest, QueueDefinition, Result, ScoreType, TargetKind, TargetRef, TracekitError,
};
pub use experiment::{
    AgentResponse, AgentTarget, AgentUnderTest, ExperimentOutcome, ExperimentReport,
    ExperimentRunner, HttpAgent, InvokeConfig, TrajectoryScorer,
};
pub use guard::{parse_prompt_ref, IdempotencyGuard};
pub use orchestration::{
    ExperimentEntry, Orchestrator, ProvisionOptions, ProvisionReport, ResourceEntry,
    SecretsStatus,
};
pub use registry::{
    AutomationRegistry, EvaluatorRegistry, OwnerResolver, PromptRegistry, Provisioned,
    QueueRegistry, SecretProvisioner,
};
pub use telemetry::init_tracing;
pub use trajectory::{align, Trajectory, UNMATCHED_STEPS_KEY};

/// Tracekit version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
