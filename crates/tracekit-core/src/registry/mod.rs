//! Resource registries.
//!
//! Each registry reconciles one resource kind in three steps:
//! 1. resolve referenced parents by exact name (a miss is `Skipped`)
//! 2. ask the `IdempotencyGuard`; an existing resource is left alone
//! 3. build the typed request and send it through the transport
//!
//! Registries never update or delete existing rules.

pub mod annotations;
pub mod evaluators;
pub mod owner;
pub mod prompts;
pub mod resolve;
pub mod secrets;

pub use annotations::{AutomationRegistry, QueueRegistry};
pub use evaluators::{default_judge_model, judge_schema, EvaluatorRegistry};
pub use owner::OwnerResolver;
pub use prompts::PromptRegistry;
pub use secrets::SecretProvisioner;

/// Outcome of reconciling one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provisioned {
    /// Newly created; carries the resource id or URL when known.
    Created(Option<String>),
    /// Already present, or pushed content was unchanged.
    Existing(Option<String>),
    /// A referenced parent could not be resolved; nothing was sent.
    Skipped { reason: String },
}

impl Provisioned {
    pub fn skipped(reason: impl Into<String>) -> Self {
        Provisioned::Skipped {
            reason: reason.into(),
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Provisioned::Created(_))
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Provisioned::Skipped { .. })
    }

    /// Id or URL carried by the outcome.
    pub fn detail(&self) -> Option<&str> {
        match self {
            Provisioned::Created(d) | Provisioned::Existing(d) => d.as_deref(),
            Provisioned::Skipped { .. } => None,
        }
    }
}

impl std::fmt::Display for Provisioned {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provisioned::Created(Some(d)) => write!(f, "created ({})", d),
            Provisioned::Created(None) => f.write_str("created"),
            Provisioned::Existing(_) => f.write_str("already exists"),
            Provisioned::Skipped { reason } => write!(f, "skipped: {}", reason),
        }
    }
}
