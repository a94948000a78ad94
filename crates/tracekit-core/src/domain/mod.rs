//! Domain models for tracekit.
//!
//! - `PlatformConfig`: environment-sourced settings, passed explicitly
//! - `ProvisionManifest`: declarative resource definitions
//! - `TracekitError`: error taxonomy

pub mod config;
pub mod definitions;
pub mod error;

pub use config::{PlatformConfig, DEFAULT_API_URL, MODEL_SECRET_KEY};
pub use definitions::{
    AutomationDefinition, EvaluatorDefinition, EvaluatorKind, ExperimentDefinition,
    ExperimentStrategy, PromptDefinition, PromptSource, ProvisionManifest, QueueDefinition,
    ScoreType, TargetKind, TargetRef, CODE_ENTRY_POINT, DEFAULT_RULE_FILTER,
};
pub use error::{DefinitionError, Result, TracekitError};
