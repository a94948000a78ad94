//! Transport trait shared by the native client and the direct API transport
//!
//! Both transports run the same logical operations through `PlatformApi`.
//! They differ in how a prompt commit is published:
//! - `NativeClient`: one high-level call that raises `TransportError::Conflict`
//!   on unchanged content; the trait adapter absorbs it.
//! - `DirectTransport`: explicit request/response handling with optimistic
//!   parent linking and a single retry after creating a missing repository.

use async_trait::async_trait;

use crate::api::PlatformApi;
use crate::schema::{PromptCommit, PushOutcome};
use crate::TransportResult;

/// Which transport is in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    /// High-level client library calls
    Native,
    /// Direct REST calls
    Direct,
}

impl std::fmt::Display for TransportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportMode::Native => f.write_str("native client"),
            TransportMode::Direct => f.write_str("direct API"),
        }
    }
}

/// A platform transport.
///
/// Guarantees:
/// - `push_prompt` never reports unchanged content as an error.
/// - Every other status >= 300 surfaces as `TransportError::Status`.
#[async_trait]
pub trait PlatformTransport: Send + Sync {
    fn mode(&self) -> TransportMode;

    /// Logical operations shared by both transports.
    fn api(&self) -> &PlatformApi;

    /// Publish a prompt commit. `commit.parent_commit` is filled in by the
    /// transport; any value set by the caller is replaced.
    async fn push_prompt(&self, commit: &PromptCommit) -> TransportResult<PushOutcome>;
}
