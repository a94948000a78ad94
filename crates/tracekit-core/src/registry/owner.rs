//! Owner handle for prompt repositories.

use tokio::sync::OnceCell;
use tracekit_wire::{PlatformApi, TransportError, TransportResult};
use tracing::debug;

/// Handle used when the workspace has no tenant handle (personal plans).
pub const ANONYMOUS_OWNER: &str = "-";

/// Resolves the owner once per provisioning pass: the configured owner,
/// else the workspace `tenant_handle`, else `-`.
pub struct OwnerResolver {
    api: PlatformApi,
    configured: Option<String>,
    resolved: OnceCell<String>,
}

impl OwnerResolver {
    pub fn new(api: PlatformApi, configured: Option<String>) -> Self {
        Self {
            api,
            configured,
            resolved: OnceCell::new(),
        }
    }

    pub async fn resolve(&self) -> TransportResult<String> {
        let owner = self
            .resolved
            .get_or_try_init(|| async {
                if let Some(owner) = &self.configured {
                    return Ok(owner.clone());
                }
                let settings = self.api.workspace_settings().await?;
                let owner = settings
                    .tenant_handle
                    .filter(|h| !h.is_empty())
                    .unwrap_or_else(|| ANONYMOUS_OWNER.to_string());
                debug!(owner = %owner, "resolved owner from workspace settings");
                Ok::<_, TransportError>(owner)
            })
            .await?;
        Ok(owner.clone())
    }
}
