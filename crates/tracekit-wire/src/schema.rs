//! Wire records for the platform REST surface
//!
//! Requests are typed per resource kind and only become JSON at the
//! transport boundary. Responses are decoded leniently: unknown fields are
//! ignored and optional fields default to `None`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Resource identity
// ---------------------------------------------------------------------------

/// Kind of remote resource managed by the registries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Prompt,
    Evaluator,
    Automation,
    Queue,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ResourceKind::Prompt => "prompt",
            ResourceKind::Evaluator => "evaluator",
            ResourceKind::Automation => "automation",
            ResourceKind::Queue => "queue",
        };
        f.write_str(s)
    }
}

/// Scope a rule is attached to. Rule names are unique per scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RuleScope {
    Dataset(String),
    Project(String),
    Global,
}

impl RuleScope {
    pub fn label(&self) -> &'static str {
        match self {
            RuleScope::Dataset(_) => "dataset",
            RuleScope::Project(_) => "project",
            RuleScope::Global => "global",
        }
    }
}

// ---------------------------------------------------------------------------
// Workspace
// ---------------------------------------------------------------------------

/// Subset of `GET /settings` used to derive the owner handle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkspaceSettings {
    #[serde(default)]
    pub tenant_handle: Option<String>,
}

/// A single workspace secret.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceSecret {
    pub key: String,
    pub value: String,
}

// ---------------------------------------------------------------------------
// Prompts
// ---------------------------------------------------------------------------

/// One version of a prompt repository.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptCommit {
    pub repo: String,
    pub owner: String,
    /// Serialized executable template plus model spec.
    pub manifest: Value,
    pub parent_commit: Option<String>,
}

impl PromptCommit {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>, manifest: Value) -> Self {
        Self {
            repo: repo.into(),
            owner: owner.into(),
            manifest,
            parent_commit: None,
        }
    }

    /// Same commit linked to `parent`.
    pub fn with_parent(&self, parent: Option<String>) -> Self {
        Self {
            parent_commit: parent,
            ..self.clone()
        }
    }
}

/// Body of `POST /commits/{owner}/{repo}`.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct CommitBody<'a> {
    pub manifest: &'a Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_commit: Option<&'a str>,
}

/// A commit as returned by the commit endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub commit_hash: String,
    #[serde(default)]
    pub manifest: Option<Value>,
    #[serde(default)]
    pub parent_commit_hash: Option<String>,
}

/// Response of `GET /repos/{owner}/{repo}/commits`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommitListing {
    #[serde(default)]
    pub commits: Vec<CommitInfo>,
}

/// Response of `POST /commits/{owner}/{repo}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitCreated {
    pub commit: CommitInfo,
}

/// Body of `POST /repos`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoCreate {
    pub repo_handle: String,
    pub owner_handle: String,
    pub is_public: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoRecord {
    pub repo_handle: String,
    #[serde(default)]
    pub owner: Option<String>,
}

/// Normalized outcome of a single commit POST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitPost {
    Created { commit_hash: String },
    /// 409: content unchanged since the latest commit.
    Unchanged,
    /// 404: the repository does not exist yet.
    RepoMissing,
}

/// Result of publishing a prompt through a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    Created { url: String, commit_hash: String },
    Unchanged,
}

impl PushOutcome {
    pub fn url(&self) -> Option<&str> {
        match self {
            PushOutcome::Created { url, .. } => Some(url.as_str()),
            PushOutcome::Unchanged => None,
        }
    }
}

/// Outcome of `POST /repos`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoCreation {
    Created,
    AlreadyExists,
}

// ---------------------------------------------------------------------------
// Datasets, projects, examples
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetRecord {
    pub id: String,
    pub name: String,
}

/// A tracing project (the platform stores these as sessions).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub id: String,
    pub name: String,
}

/// One (inputs, reference outputs) pair of a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExampleRecord {
    pub id: String,
    #[serde(default)]
    pub inputs: Value,
    #[serde(default)]
    pub outputs: Option<Value>,
}

// ---------------------------------------------------------------------------
// Rules (evaluators and automations)
// ---------------------------------------------------------------------------

/// Where an evaluator rule is attached.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum RuleTarget {
    #[serde(rename = "dataset_id")]
    Dataset(String),
    #[serde(rename = "session_id")]
    Project(String),
}

impl RuleTarget {
    pub fn scope(&self) -> RuleScope {
        match self {
            RuleTarget::Dataset(id) => RuleScope::Dataset(id.clone()),
            RuleTarget::Project(id) => RuleScope::Project(id.clone()),
        }
    }
}

/// Variable mapping between the judge prompt and run data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableMapping {
    pub input: String,
    pub output: String,
    pub reference: String,
}

impl Default for VariableMapping {
    fn default() -> Self {
        Self {
            input: "input".to_string(),
            output: "output".to_string(),
            reference: "referenceOutput".to_string(),
        }
    }
}

/// Prompt used by an LLM judge: either an inline message list or a hub ref.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum JudgePrompt {
    /// `[[role, content], ...]`
    #[serde(rename = "prompt")]
    Inline(Vec<(String, String)>),
    #[serde(rename = "hub_ref")]
    HubRef(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructuredJudge {
    pub model: Value,
    pub schema: Value,
    pub variable_mapping: VariableMapping,
    #[serde(flatten)]
    pub prompt: JudgePrompt,
}

/// LLM-as-judge evaluator body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JudgeSpec {
    pub structured: StructuredJudge,
}

/// Code evaluator body; `code` is literal source text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeSpec {
    pub code: String,
    pub language: String,
}

/// Exactly one evaluator body per rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum EvaluatorBody {
    #[serde(rename = "evaluators")]
    Judge(Vec<JudgeSpec>),
    #[serde(rename = "code_evaluators")]
    Code(Vec<CodeSpec>),
}

/// Body of `POST /runs/rules` for an evaluator rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluatorRuleRequest {
    pub display_name: String,
    #[serde(flatten)]
    pub target: RuleTarget,
    pub sampling_rate: f64,
    pub is_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    #[serde(flatten)]
    pub body: EvaluatorBody,
}

/// Body of `POST /runs/rules` for a rule routing runs into a review queue.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AutomationRuleRequest {
    pub display_name: String,
    pub session_id: String,
    pub add_to_annotation_queue_id: String,
    pub filter: String,
    pub sampling_rate: f64,
    pub is_enabled: bool,
}

/// Query of `GET /runs/rules`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleQuery {
    pub name_contains: String,
    pub dataset_id: Option<String>,
    pub session_id: Option<String>,
}

impl RuleQuery {
    pub fn for_scope(name: &str, scope: &RuleScope) -> Self {
        let mut query = RuleQuery {
            name_contains: name.to_string(),
            ..Default::default()
        };
        match scope {
            RuleScope::Dataset(id) => query.dataset_id = Some(id.clone()),
            RuleScope::Project(id) => query.session_id = Some(id.clone()),
            RuleScope::Global => {}
        }
        query
    }

    pub(crate) fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![("name_contains".to_string(), self.name_contains.clone())];
        if let Some(id) = &self.dataset_id {
            pairs.push(("dataset_id".to_string(), id.clone()));
        }
        if let Some(id) = &self.session_id {
            pairs.push(("session_id".to_string(), id.clone()));
        }
        pairs
    }
}

/// A rule as returned by the listing endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleRecord {
    #[serde(default)]
    pub id: Option<String>,
    pub display_name: String,
    #[serde(default)]
    pub dataset_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub evaluators: Option<Vec<Value>>,
    #[serde(default)]
    pub code_evaluators: Option<Vec<Value>>,
    #[serde(default)]
    pub add_to_annotation_queue_id: Option<String>,
}

impl RuleRecord {
    /// True when the rule has something attached. Empty shells do not count.
    pub fn has_body(&self) -> bool {
        let non_empty = |v: &Option<Vec<Value>>| v.as_ref().is_some_and(|v| !v.is_empty());
        non_empty(&self.evaluators)
            || non_empty(&self.code_evaluators)
            || self.add_to_annotation_queue_id.is_some()
    }

    /// True when the rule's scope fields match `scope` exactly.
    pub fn in_scope(&self, scope: &RuleScope) -> bool {
        match scope {
            RuleScope::Dataset(id) => self.dataset_id.as_deref() == Some(id.as_str()),
            RuleScope::Project(id) => self.session_id.as_deref() == Some(id.as_str()),
            RuleScope::Global => self.dataset_id.is_none() && self.session_id.is_none(),
        }
    }
}

// ---------------------------------------------------------------------------
// Review queues
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RubricItem {
    pub feedback_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Body of `POST /annotation-queues`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueRequest {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    pub enable_reservations: bool,
    pub num_reviewers_per_item: u32,
    pub reservation_minutes: u32,
    pub rubric_items: Vec<RubricItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueRecord {
    pub id: String,
    pub name: String,
}

// ---------------------------------------------------------------------------
// Experiments: sessions, runs, feedback
// ---------------------------------------------------------------------------

/// Body of `POST /sessions`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionCreate {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_dataset_id: Option<String>,
    pub start_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub reference_dataset_id: Option<String>,
}

/// Body of `POST /runs`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunCreate {
    pub id: Uuid,
    pub name: String,
    pub run_type: String,
    pub inputs: Value,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_example_id: Option<String>,
    pub start_time: DateTime<Utc>,
}

/// Body of `PATCH /runs/{id}`; ending is the only mutation of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunEnd {
    pub outputs: Value,
    pub end_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Numeric or boolean feedback score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeedbackScore {
    Bool(bool),
    Number(f64),
}

/// Body of `POST /feedback`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedbackCreate {
    pub run_id: Uuid,
    pub key: String,
    pub score: FeedbackScore,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn evaluator_request_flattens_target_and_body() {
        let req = EvaluatorRuleRequest {
            display_name: "triage_match".to_string(),
            target: RuleTarget::Dataset("ds-1".to_string()),
            sampling_rate: 1.0,
            is_enabled: true,
            filter: Some("eq(is_root, true)".to_string()),
            body: EvaluatorBody::Code(vec![CodeSpec {
                code: "def perform_eval(run, example):\n    return {}".to_string(),
                language: "python".to_string(),
            }]),
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["dataset_id"], "ds-1");
        assert!(value.get("session_id").is_none());
        assert!(value.get("evaluators").is_none());
        assert_eq!(value["code_evaluators"][0]["language"], "python");
    }

    #[test]
    fn judge_prompt_serializes_inline_or_ref() {
        let judge = StructuredJudge {
            model: json!({}),
            schema: json!({}),
            variable_mapping: VariableMapping::default(),
            prompt: JudgePrompt::HubRef("eval-prompt:latest".to_string()),
        };
        let value = serde_json::to_value(&judge).unwrap();
        assert_eq!(value["hub_ref"], "eval-prompt:latest");
        assert_eq!(value["variable_mapping"]["reference"], "referenceOutput");

        let inline = StructuredJudge {
            prompt: JudgePrompt::Inline(vec![("system".to_string(), "grade".to_string())]),
            ..judge
        };
        let value = serde_json::to_value(&inline).unwrap();
        assert_eq!(value["prompt"], json!([["system", "grade"]]));
        assert!(value.get("hub_ref").is_none());
    }

    #[test]
    fn empty_rule_shell_has_no_body() {
        let shell: RuleRecord = serde_json::from_value(json!({
            "display_name": "correctness",
            "dataset_id": "ds-1",
            "evaluators": [],
            "code_evaluators": null
        }))
        .unwrap();
        assert!(!shell.has_body());
        assert!(shell.in_scope(&RuleScope::Dataset("ds-1".to_string())));
        assert!(!shell.in_scope(&RuleScope::Project("ds-1".to_string())));
        assert!(!shell.in_scope(&RuleScope::Global));
    }

    #[test]
    fn feedback_score_is_untagged() {
        assert_eq!(serde_json::to_value(FeedbackScore::Number(2.0)).unwrap(), json!(2.0));
        assert_eq!(serde_json::to_value(FeedbackScore::Bool(true)).unwrap(), json!(true));
    }
}
