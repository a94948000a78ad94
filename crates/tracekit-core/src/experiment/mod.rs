//! Experiments: replay dataset examples through the agent under test and
//! score each trajectory.

pub mod agent;
pub mod runner;
pub mod scoring;

pub use agent::{AgentResponse, AgentUnderTest, HttpAgent, InvokeConfig};
pub use runner::{ExperimentOutcome, ExperimentReport, ExperimentRunner, ExperimentState};
pub use scoring::{AgentTarget, TrajectoryScorer};
