//! Shared fixtures: an in-memory platform stack and a scripted agent.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracekit_core::{AgentResponse, AgentUnderTest, InvokeConfig};
use tracekit_wire::fakes::MemoryPlatform;
use tracekit_wire::PlatformApi;

pub fn stack() -> (Arc<MemoryPlatform>, PlatformApi) {
    let platform = Arc::new(MemoryPlatform::new());
    let api = PlatformApi::new(platform.clone());
    (platform, api)
}

/// `{"trajectory": [...]}` for dataset reference outputs.
pub fn reference(steps: &[&str]) -> Value {
    json!({ "trajectory": steps })
}

/// Agent that answers every input with the same tool calls.
///
/// Inputs whose `email` equals `fail_on` produce an error. Peak concurrency
/// is tracked across overlapping invocations.
pub struct ScriptedAgent {
    tools: Vec<String>,
    fail_on: Option<String>,
    delay: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

impl ScriptedAgent {
    pub fn new(tools: &[&str]) -> Self {
        Self {
            tools: tools.iter().map(|t| t.to_string()).collect(),
            fail_on: None,
            delay: Duration::ZERO,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing_on(mut self, email: &str) -> Self {
        self.fail_on = Some(email.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AgentUnderTest for ScriptedAgent {
    async fn invoke(&self, inputs: &Value, _config: &InvokeConfig) -> anyhow::Result<AgentResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(fail_on) = &self.fail_on {
            if inputs["email"] == fail_on.as_str() {
                anyhow::bail!("agent crashed on '{}'", fail_on);
            }
        }

        let calls: Vec<Value> = self
            .tools
            .iter()
            .map(|name| json!({ "name": name, "args": {} }))
            .collect();
        Ok(AgentResponse {
            messages: vec![
                json!({ "role": "human", "content": inputs["email"] }),
                json!({ "role": "ai", "content": "", "tool_calls": calls }),
                json!({ "role": "ai", "content": "done" }),
            ],
        })
    }
}

/// Dataset of three emails with references aligned against
/// `["search_inbox", "write_email"]`: 0, 1 and 2 unmatched steps.
pub fn seed_email_dataset(platform: &MemoryPlatform) -> String {
    platform.seed_dataset(
        "email-eval",
        vec![
            (
                json!({ "email": "meeting request" }),
                Some(reference(&["search_inbox", "write_email"])),
            ),
            (json!({ "email": "newsletter" }), Some(reference(&["write_email"]))),
            (json!({ "email": "spam" }), None),
        ],
    )
}
