//! The agent under test, consumed only through `invoke(inputs, config)`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::domain::{Result, TracekitError};

/// Per-invocation configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvokeConfig {
    /// Fresh correlation id for each invocation.
    pub thread_id: Uuid,
}

impl InvokeConfig {
    pub fn fresh() -> Self {
        Self {
            thread_id: Uuid::new_v4(),
        }
    }
}

/// What the agent returns: its full message history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    #[serde(default)]
    pub messages: Vec<Value>,
}

#[async_trait]
pub trait AgentUnderTest: Send + Sync {
    async fn invoke(&self, inputs: &Value, config: &InvokeConfig) -> anyhow::Result<AgentResponse>;
}

/// Agent reached over HTTP: POSTs `{inputs, config}` and expects
/// `{messages}` back.
pub struct HttpAgent {
    url: String,
    client: reqwest::Client,
}

impl HttpAgent {
    pub const TIMEOUT: Duration = Duration::from_secs(120);

    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Self::TIMEOUT)
            .build()
            .map_err(|e| TracekitError::Agent(e.to_string()))?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

#[async_trait]
impl AgentUnderTest for HttpAgent {
    async fn invoke(&self, inputs: &Value, config: &InvokeConfig) -> anyhow::Result<AgentResponse> {
        let body = json!({ "inputs": inputs, "config": config });
        let response = self.client.post(&self.url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("agent returned {}: {}", status, text);
        }
        Ok(response.json::<AgentResponse>().await?)
    }
}
