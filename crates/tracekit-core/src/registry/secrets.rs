//! Workspace secret provisioning (privileged runs only).

use tracekit_wire::{PlatformApi, WorkspaceSecret};
use tracing::warn;

use crate::domain::{Result, MODEL_SECRET_KEY};

pub struct SecretProvisioner {
    api: PlatformApi,
    model_api_key: Option<String>,
}

impl SecretProvisioner {
    pub fn new(api: PlatformApi, model_api_key: Option<String>) -> Self {
        Self { api, model_api_key }
    }

    /// Upsert the upstream model credential. Returns `false` when no
    /// credential is configured.
    pub async fn provision(&self) -> Result<bool> {
        let Some(value) = &self.model_api_key else {
            warn!(
                "{} not set in environment; skipping workspace secret upsert",
                MODEL_SECRET_KEY
            );
            return Ok(false);
        };
        let secret = WorkspaceSecret {
            key: MODEL_SECRET_KEY.to_string(),
            value: value.clone(),
        };
        self.api.upsert_secrets(&[secret]).await?;
        Ok(true)
    }
}
