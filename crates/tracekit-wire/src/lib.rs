//! tracekit-wire: transport layer for the tracing/evaluation platform
//!
//! Every remote effect of tracekit goes through this crate. It owns the
//! typed wire records, the HTTP seam, and the two interchangeable transports.
//!
//! ## Layer 0 - Transport
//!
//! Focus: status normalization, commit linking, and batched evaluation.
//!
//! ## Key Components
//!
//! - `PlatformApi`: one method per platform operation over an `ApiBackend`
//! - `NativeClient`: high-level client; unchanged prompts raise `Conflict`
//! - `DirectTransport`: explicit REST calls with optimistic parent linking
//! - `run_evaluation`: semaphore-bounded batched experiment engine
//! - `fakes::MemoryPlatform`: in-memory backend for tests

mod api;
mod direct;
mod error;
pub mod evaluation;
pub mod fakes;
pub mod http;
mod native;
mod schema;
mod transport;

pub use api::PlatformApi;
pub use direct::DirectTransport;
pub use error::TransportError;
pub use evaluation::{
    experiment_name, run_evaluation, BatchEvaluator, EvalTarget, EvaluateRequest,
    ExperimentResults, ExperimentRow, RunScorer, Score,
};
pub use http::{ApiBackend, ApiRequest, ApiResponse, ReqwestBackend};
pub use native::NativeClient;
pub use schema::{
    AutomationRuleRequest, CodeSpec, CommitInfo, CommitPost, DatasetRecord, EvaluatorBody,
    EvaluatorRuleRequest, ExampleRecord, FeedbackCreate, FeedbackScore, JudgePrompt, JudgeSpec,
    ProjectRecord, PromptCommit, PushOutcome, QueueRecord, QueueRequest, RepoCreation, RepoRecord,
    ResourceKind, RubricItem, RuleQuery, RuleRecord, RuleScope, RuleTarget, RunCreate, RunEnd,
    SessionCreate, SessionRecord, StructuredJudge, VariableMapping, WorkspaceSecret,
    WorkspaceSettings,
};
pub use transport::{PlatformTransport, TransportMode};

/// Result type for tracekit-wire operations
pub type TransportResult<T> = std::result::Result<T, TransportError>;
