//! Platform configuration, read once at startup.

use std::sync::Arc;

use tracekit_wire::{PlatformApi, ReqwestBackend};

use super::error::Result;

pub const DEFAULT_API_URL: &str = "https://api.smith.langchain.com";

/// Workspace secret key under which the upstream model credential is stored.
/// The default judge model references the same key.
pub const MODEL_SECRET_KEY: &str = "OPENAI_API_KEY";

pub const ENV_API_URL: &str = "LANGSMITH_API_URL";
pub const ENV_API_KEY: &str = "LANGSMITH_API_KEY";
pub const ENV_PROJECT: &str = "LANGSMITH_PROJECT";
pub const ENV_OWNER: &str = "LANGSMITH_OWNER";
pub const ENV_AGENT_URL: &str = "TRACEKIT_AGENT_URL";

/// Explicit configuration passed into every component.
#[derive(Clone, PartialEq)]
pub struct PlatformConfig {
    pub api_url: String,
    /// Absent key is fatal on the first authenticated call.
    pub api_key: Option<String>,
    /// Default project for project-scoped evaluators and automations.
    pub project: Option<String>,
    /// Owner handle for prompt repositories; derived from workspace settings
    /// when unset.
    pub owner: Option<String>,
    /// Upstream model credential forwarded into workspace secrets.
    pub model_api_key: Option<String>,
    /// Endpoint of the agent under test.
    pub agent_url: Option<String>,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_key: None,
            project: None,
            owner: None,
            model_api_key: None,
            agent_url: None,
        }
    }
}

impl std::fmt::Debug for PlatformConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("PlatformConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &redact(&self.api_key))
            .field("project", &self.project)
            .field("owner", &self.owner)
            .field("model_api_key", &redact(&self.model_api_key))
            .field("agent_url", &self.agent_url)
            .finish()
    }
}

impl PlatformConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            api_url: get(ENV_API_URL).unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            api_key: get(ENV_API_KEY),
            project: get(ENV_PROJECT),
            owner: get(ENV_OWNER),
            model_api_key: get(MODEL_SECRET_KEY),
            agent_url: get(ENV_AGENT_URL),
        }
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn with_model_api_key(mut self, key: impl Into<String>) -> Self {
        self.model_api_key = Some(key.into());
        self
    }

    pub fn with_agent_url(mut self, url: impl Into<String>) -> Self {
        self.agent_url = Some(url.into());
        self
    }

    /// Platform operations over the production HTTP backend.
    pub fn connect(&self) -> Result<PlatformApi> {
        let backend = ReqwestBackend::new(&self.api_url, self.api_key.clone())?;
        Ok(PlatformApi::new(Arc::new(backend)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_apply_when_env_is_empty() {
        let config = PlatformConfig::from_lookup(|_| None);
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert!(config.api_key.is_none());
        assert!(config.project.is_none());
    }

    #[test]
    fn reads_every_key_and_ignores_blank_values() {
        let env: HashMap<&str, &str> = [
            (ENV_API_URL, "http://localhost:1984"),
            (ENV_API_KEY, "lsv2-key"),
            (ENV_PROJECT, "email-agent"),
            (ENV_OWNER, "  "),
            (MODEL_SECRET_KEY, "sk-model"),
        ]
        .into_iter()
        .collect();
        let config = PlatformConfig::from_lookup(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.api_url, "http://localhost:1984");
        assert_eq!(config.api_key.as_deref(), Some("lsv2-key"));
        assert_eq!(config.project.as_deref(), Some("email-agent"));
        assert!(config.owner.is_none());
        assert_eq!(config.model_api_key.as_deref(), Some("sk-model"));
        assert!(config.agent_url.is_none());
    }

    #[test]
    fn debug_redacts_credentials() {
        let config = PlatformConfig::default()
            .with_api_key("secret-key")
            .with_model_api_key("secret-model");
        let dbg = format!("{:?}", config);
        assert!(!dbg.contains("secret-key"));
        assert!(!dbg.contains("secret-model"));
        assert!(dbg.contains("<redacted>"));
    }
}
