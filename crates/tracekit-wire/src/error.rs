//! Error types for tracekit-wire

use thiserror::Error;

/// Errors that can occur while talking to the platform
#[derive(Error, Debug)]
pub enum TransportError {
    /// The platform answered with a status outside the handled conventions
    #[error("{operation} failed: {status} {body}")]
    Status {
        operation: String,
        status: u16,
        body: String,
    },

    /// Request could not be sent or timed out
    #[error("HTTP error: {0}")]
    Http(String),

    /// Response body did not match the expected shape
    #[error("Failed to decode response for {operation}: {message}")]
    Decode { operation: String, message: String },

    /// No API key configured; every authenticated call fails with this
    #[error("API key is required for authenticated platform calls")]
    MissingApiKey,

    /// Pushed content is identical to the latest commit (native client signal)
    #[error("Prompt '{repo}' is unchanged since its latest commit")]
    Conflict { repo: String },

    /// A named resource required by a high-level call does not exist
    #[error("{kind} '{name}' not found")]
    MissingResource { kind: String, name: String },

    /// Request body could not be serialized
    #[error("Serialization failed: {0}")]
    Serialization(String),
}

impl TransportError {
    /// Status code carried by the error, if it came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, TransportError::Conflict { .. })
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        TransportError::Http(err.to_string())
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        TransportError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_carries_operation_and_body() {
        let err = TransportError::Status {
            operation: "create evaluator 'correctness'".to_string(),
            status: 422,
            body: "invalid sampling rate".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("correctness"));
        assert!(msg.contains("422"));
        assert!(msg.contains("invalid sampling rate"));
        assert_eq!(err.status(), Some(422));
    }

    #[test]
    fn conflict_is_distinguishable() {
        let err = TransportError::Conflict {
            repo: "triage".to_string(),
        };
        assert!(err.is_conflict());
        assert_eq!(err.status(), None);
    }
}
