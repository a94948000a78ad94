//! Adapters between the agent and the batched evaluation engine.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracekit_wire::{EvalTarget, FeedbackScore, RunScorer, Score};

use super::agent::{AgentUnderTest, InvokeConfig};
use crate::trajectory::{align, Trajectory, UNMATCHED_STEPS_KEY};

/// Invokes the agent with a fresh thread id and reduces the answer to
/// `{"trajectory": [...]}`.
pub struct AgentTarget {
    agent: Arc<dyn AgentUnderTest>,
}

impl AgentTarget {
    pub fn new(agent: Arc<dyn AgentUnderTest>) -> Self {
        Self { agent }
    }
}

#[async_trait]
impl EvalTarget for AgentTarget {
    async fn predict(&self, inputs: &Value) -> anyhow::Result<Value> {
        let response = self.agent.invoke(inputs, &InvokeConfig::fresh()).await?;
        Ok(Trajectory::from_messages(&response.messages).to_outputs())
    }
}

/// Scores `unmatched_steps` between the observed and reference trajectory.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrajectoryScorer;

impl TrajectoryScorer {
    /// Unmatched step count. A missing trajectory on either side is empty.
    pub fn unmatched(outputs: &Value, reference_outputs: Option<&Value>) -> usize {
        let observed = Trajectory::from_outputs(outputs).unwrap_or_default();
        let reference = reference_outputs
            .and_then(Trajectory::from_outputs)
            .unwrap_or_default();
        align(observed.steps(), reference.steps())
    }
}

impl RunScorer for TrajectoryScorer {
    fn score(&self, outputs: &Value, reference_outputs: Option<&Value>) -> Score {
        Score {
            key: UNMATCHED_STEPS_KEY.to_string(),
            score: FeedbackScore::Number(Self::unmatched(outputs, reference_outputs) as f64),
            comment: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scorer_counts_extra_steps() {
        let outputs = json!({"trajectory": ["check_calendar_availability", "write_email", "done"]});
        let reference = json!({"trajectory": ["write_email", "done"]});
        let score = TrajectoryScorer.score(&outputs, Some(&reference));
        assert_eq!(score.key, UNMATCHED_STEPS_KEY);
        assert_eq!(score.score, FeedbackScore::Number(1.0));
    }

    #[test]
    fn missing_reference_counts_all_observed() {
        let outputs = json!({"trajectory": ["write_email", "done"]});
        assert_eq!(TrajectoryScorer::unmatched(&outputs, None), 2);
    }
}
