//! Declarative provisioning manifest.
//!
//! A manifest lists the resources one provisioning pass should reconcile.
//! It is validated as a whole before any network call is made.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracekit_wire::RubricItem;

use super::error::{DefinitionError, Result};

/// Name a code evaluator's source must define.
pub const CODE_ENTRY_POINT: &str = "perform_eval(";

/// Filter applied to evaluator rules when none is given.
pub const DEFAULT_RULE_FILTER: &str = "eq(is_root, true)";

fn default_sampling_rate() -> f64 {
    1.0
}

fn default_language() -> String {
    "python".to_string()
}

fn default_true() -> bool {
    true
}

fn default_one() -> u32 {
    1
}

fn default_repetitions() -> usize {
    1
}

fn default_concurrency() -> usize {
    4
}

/// Everything one provisioning pass reconciles.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProvisionManifest {
    #[serde(default)]
    pub prompts: Vec<PromptDefinition>,
    #[serde(default)]
    pub evaluators: Vec<EvaluatorDefinition>,
    #[serde(default)]
    pub queues: Vec<QueueDefinition>,
    #[serde(default)]
    pub automations: Vec<AutomationDefinition>,
    #[serde(default)]
    pub experiments: Vec<ExperimentDefinition>,
}

/// A prompt repository and the versions to push, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptDefinition {
    pub name: String,
    pub manifests: Vec<Value>,
    /// Delete the repository before pushing.
    #[serde(default)]
    pub recreate: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Dataset,
    Project,
}

/// Parent an evaluator attaches to, by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRef {
    pub kind: TargetKind,
    /// Required for datasets; projects fall back to the configured project.
    #[serde(default)]
    pub name: Option<String>,
}

impl TargetRef {
    pub fn dataset(name: impl Into<String>) -> Self {
        Self {
            kind: TargetKind::Dataset,
            name: Some(name.into()),
        }
    }

    pub fn project(name: Option<String>) -> Self {
        Self {
            kind: TargetKind::Project,
            name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreType {
    Boolean,
    Number,
    String,
}

impl ScoreType {
    pub fn as_str(self) -> &'static str {
        match self {
            ScoreType::Boolean => "boolean",
            ScoreType::Number => "number",
            ScoreType::String => "string",
        }
    }
}

/// Judge prompt: `[[role, content], ...]` or a `repo[:version]` reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PromptSource {
    Inline(Vec<(String, String)>),
    Reference(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EvaluatorKind {
    Judge {
        score_type: ScoreType,
        prompt: PromptSource,
        #[serde(default)]
        description: Option<String>,
    },
    Code {
        code: String,
        #[serde(default = "default_language")]
        language: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluatorDefinition {
    pub name: String,
    pub target: TargetRef,
    #[serde(default = "default_sampling_rate")]
    pub sampling_rate: f64,
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(flatten)]
    pub kind: EvaluatorKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueDefinition {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default = "default_true")]
    pub enable_reservations: bool,
    #[serde(default = "default_one")]
    pub num_reviewers_per_item: u32,
    #[serde(default = "default_one")]
    pub reservation_minutes: u32,
    #[serde(default)]
    pub rubric: Vec<RubricItem>,
}

/// Rule routing a project's runs into a review queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationDefinition {
    pub name: String,
    /// Queue name; the queue must exist before the rule is created.
    pub queue: String,
    /// Source project; falls back to the configured project.
    #[serde(default)]
    pub project: Option<String>,
    pub filter: String,
    #[serde(default = "default_sampling_rate")]
    pub sampling_rate: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentStrategy {
    /// Platform-native evaluation entry point.
    #[default]
    Batched,
    /// Explicit session/run/feedback lifecycle.
    Manual,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentDefinition {
    pub dataset: String,
    pub prefix: String,
    #[serde(default)]
    pub strategy: ExperimentStrategy,
    #[serde(default = "default_repetitions")]
    pub num_repetitions: usize,
    #[serde(default = "default_concurrency")]
    pub max_concurrency: usize,
    #[serde(default)]
    pub description: Option<String>,
}

impl ProvisionManifest {
    pub fn from_json(text: &str) -> Result<Self> {
        let manifest: ProvisionManifest = serde_json::from_str(text)?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
            && self.evaluators.is_empty()
            && self.queues.is_empty()
            && self.automations.is_empty()
            && self.experiments.is_empty()
    }

    /// Check every definition.
    ///
    /// Names must be non-empty and unique per kind (evaluators per target),
    /// sampling rates within [0, 1], code evaluators must define
    /// `perform_eval`, and experiment bounds must be positive.
    pub fn validate(&self) -> std::result::Result<(), DefinitionError> {
        let mut seen = HashSet::new();
        for prompt in &self.prompts {
            check_name("prompt", &prompt.name)?;
            check_unique(&mut seen, "prompt", &prompt.name)?;
            if prompt.manifests.is_empty() {
                return Err(DefinitionError::NoManifests {
                    name: prompt.name.clone(),
                });
            }
        }

        let mut seen = HashSet::new();
        for evaluator in &self.evaluators {
            check_name("evaluator", &evaluator.name)?;
            check_rate("evaluator", &evaluator.name, evaluator.sampling_rate)?;
            let scope_key = format!("{:?}/{:?}", evaluator.target.kind, evaluator.target.name);
            if !seen.insert((evaluator.name.clone(), scope_key)) {
                return Err(DefinitionError::Duplicate {
                    kind: "evaluator",
                    name: evaluator.name.clone(),
                });
            }
            if evaluator.target.kind == TargetKind::Dataset
                && evaluator.target.name.as_deref().map_or(true, str::is_empty)
            {
                return Err(DefinitionError::EmptyReference {
                    kind: "evaluator",
                    name: evaluator.name.clone(),
                    field: "dataset",
                });
            }
            match &evaluator.kind {
                EvaluatorKind::Code { code, .. } if !code.contains(CODE_ENTRY_POINT) => {
                    return Err(DefinitionError::MissingEntryPoint {
                        name: evaluator.name.clone(),
                    });
                }
                EvaluatorKind::Judge { prompt, .. } if prompt_is_empty(prompt) => {
                    return Err(DefinitionError::EmptyJudgePrompt {
                        name: evaluator.name.clone(),
                    });
                }
                _ => {}
            }
        }

        let mut seen = HashSet::new();
        for queue in &self.queues {
            check_name("queue", &queue.name)?;
            check_unique(&mut seen, "queue", &queue.name)?;
        }

        let mut seen = HashSet::new();
        for automation in &self.automations {
            check_name("automation", &automation.name)?;
            check_unique(&mut seen, "automation", &automation.name)?;
            check_rate("automation", &automation.name, automation.sampling_rate)?;
            if automation.queue.trim().is_empty() {
                return Err(DefinitionError::EmptyReference {
                    kind: "automation",
                    name: automation.name.clone(),
                    field: "queue",
                });
            }
        }

        for experiment in &self.experiments {
            check_name("experiment prefix", &experiment.prefix)?;
            if experiment.dataset.trim().is_empty() {
                return Err(DefinitionError::EmptyReference {
                    kind: "experiment",
                    name: experiment.prefix.clone(),
                    field: "dataset",
                });
            }
            if experiment.num_repetitions == 0 {
                return Err(DefinitionError::ZeroBound {
                    prefix: experiment.prefix.clone(),
                    field: "num_repetitions",
                });
            }
            if experiment.max_concurrency == 0 {
                return Err(DefinitionError::ZeroBound {
                    prefix: experiment.prefix.clone(),
                    field: "max_concurrency",
                });
            }
        }
        Ok(())
    }
}

fn check_name(kind: &'static str, name: &str) -> std::result::Result<(), DefinitionError> {
    if name.trim().is_empty() {
        Err(DefinitionError::EmptyName { kind })
    } else {
        Ok(())
    }
}

fn check_unique(
    seen: &mut HashSet<String>,
    kind: &'static str,
    name: &str,
) -> std::result::Result<(), DefinitionError> {
    if seen.insert(name.to_string()) {
        Ok(())
    } else {
        Err(DefinitionError::Duplicate {
            kind,
            name: name.to_string(),
        })
    }
}

fn check_rate(kind: &'static str, name: &str, rate: f64) -> std::result::Result<(), DefinitionError> {
    if (0.0..=1.0).contains(&rate) {
        Ok(())
    } else {
        Err(DefinitionError::SamplingRate {
            kind,
            name: name.to_string(),
            rate,
        })
    }
}

fn prompt_is_empty(prompt: &PromptSource) -> bool {
    match prompt {
        PromptSource::Inline(messages) => messages.is_empty(),
        PromptSource::Reference(reference) => reference.trim().is_empty(),
    }
}
