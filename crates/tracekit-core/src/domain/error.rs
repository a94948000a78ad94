//! Error taxonomy for tracekit-core.

use tracekit_wire::TransportError;

/// Problems found while validating a provisioning manifest.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DefinitionError {
    #[error("{kind} name must not be empty")]
    EmptyName { kind: &'static str },

    #[error("duplicate {kind} '{name}'")]
    Duplicate { kind: &'static str, name: String },

    #[error("{kind} '{name}': sampling rate {rate} is outside [0, 1]")]
    SamplingRate {
        kind: &'static str,
        name: String,
        rate: f64,
    },

    #[error("prompt '{name}' has no manifests")]
    NoManifests { name: String },

    #[error("code evaluator '{name}' must define perform_eval(run, example)")]
    MissingEntryPoint { name: String },

    #[error("judge evaluator '{name}' has an empty prompt")]
    EmptyJudgePrompt { name: String },

    #[error("experiment '{prefix}': {field} must be at least 1")]
    ZeroBound { prefix: String, field: &'static str },

    #[error("{kind} '{name}' references an empty {field}")]
    EmptyReference {
        kind: &'static str,
        name: String,
        field: &'static str,
    },
}

/// Tracekit domain errors.
#[derive(Debug, thiserror::Error)]
pub enum TracekitError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("invalid definition: {0}")]
    InvalidDefinition(#[from] DefinitionError),

    #[error("agent error: {0}")]
    Agent(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for tracekit-core operations.
pub type Result<T> = std::result::Result<T, TracekitError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_convert() {
        let err: TracekitError = TransportError::MissingApiKey.into();
        assert!(matches!(err, TracekitError::Transport(_)));
        assert!(err.to_string().contains("API key"));
    }

    #[test]
    fn definition_error_names_the_resource() {
        let err: TracekitError = DefinitionError::SamplingRate {
            kind: "evaluator",
            name: "correctness".to_string(),
            rate: 1.5,
        }
        .into();
        let msg = err.to_string();
        assert!(msg.contains("invalid definition"));
        assert!(msg.contains("correctness"));
        assert!(msg.contains("1.5"));
    }
}
