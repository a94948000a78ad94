//! In-memory platform fake (testing only)
//!
//! `MemoryPlatform` implements `ApiBackend` by routing requests on method and
//! path segments against in-memory state. It follows the platform's status
//! conventions (404 for missing resources, 409 for an unchanged commit) so the
//! full transport stack can be exercised without a network. Every request is
//! recorded for call-count assertions, and `fail_next` injects error statuses.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::http::{ApiBackend, ApiRequest, ApiResponse, API_PREFIX};
use crate::schema::{
    CommitInfo, DatasetRecord, ExampleRecord, FeedbackScore, ProjectRecord, QueueRecord,
    RepoCreate, RuleRecord, SessionRecord, WorkspaceSecret,
};
use crate::TransportResult;

const BASE_URL: &str = "http://platform.test";

/// One request seen by the fake, path without the API prefix.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: String,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

/// A run as stored by the fake.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StoredRun {
    pub id: String,
    pub name: String,
    pub run_type: String,
    #[serde(default)]
    pub inputs: Value,
    pub session_id: String,
    #[serde(default)]
    pub reference_example_id: Option<String>,
    #[serde(skip)]
    pub outputs: Option<Value>,
    #[serde(skip)]
    pub error: Option<String>,
    #[serde(skip)]
    pub ended: bool,
}

/// A feedback entry as stored by the fake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredFeedback {
    pub run_id: String,
    pub key: String,
    pub score: FeedbackScore,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StoredSession {
    pub record: SessionRecord,
    pub ended: bool,
}

#[derive(Debug, Deserialize)]
struct CommitRequest {
    manifest: Value,
    #[serde(default)]
    parent_commit: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SessionRequest {
    name: String,
    #[serde(default)]
    reference_dataset_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RunEndRequest {
    #[serde(default)]
    outputs: Value,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug)]
struct FailureRule {
    method: String,
    pattern: String,
    status: u16,
    remaining: usize,
}

#[derive(Debug, Default)]
struct State {
    tenant_handle: Option<String>,
    secrets: BTreeMap<String, String>,
    /// (owner, repo) -> commits, oldest first
    repos: HashMap<(String, String), Vec<CommitInfo>>,
    datasets: Vec<DatasetRecord>,
    examples: HashMap<String, Vec<ExampleRecord>>,
    sessions: Vec<StoredSession>,
    rules: Vec<(RuleRecord, Value)>,
    queues: Vec<(QueueRecord, Value)>,
    runs: Vec<StoredRun>,
    feedback: Vec<StoredFeedback>,
    calls: Vec<RecordedCall>,
    failures: Vec<FailureRule>,
    next_id: u64,
}

impl State {
    fn next_id(&mut self, kind: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", kind, self.next_id)
    }

    fn take_failure(&mut self, method: &str, path: &str) -> Option<u16> {
        let rule = self
            .failures
            .iter_mut()
            .find(|f| f.remaining > 0 && f.method == method && path_matches(&f.pattern, path))?;
        rule.remaining -= 1;
        Some(rule.status)
    }
}

/// In-memory platform backend.
#[derive(Debug, Default)]
pub struct MemoryPlatform {
    state: Mutex<State>,
}

impl MemoryPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    // -- seeding ------------------------------------------------------------

    pub fn set_tenant_handle(&self, handle: &str) {
        self.state.lock().unwrap().tenant_handle = Some(handle.to_string());
    }

    /// Create a dataset with `(inputs, reference outputs)` examples. Returns its id.
    pub fn seed_dataset(&self, name: &str, examples: Vec<(Value, Option<Value>)>) -> String {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id("ds");
        let records = examples
            .into_iter()
            .map(|(inputs, outputs)| ExampleRecord {
                id: state.next_id("ex"),
                inputs,
                outputs,
            })
            .collect();
        state.datasets.push(DatasetRecord {
            id: id.clone(),
            name: name.to_string(),
        });
        state.examples.insert(id.clone(), records);
        id
    }

    /// Create a tracing project. Returns its id.
    pub fn seed_project(&self, name: &str) -> String {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id("proj");
        state.sessions.push(StoredSession {
            record: SessionRecord {
                id: id.clone(),
                name: name.to_string(),
                reference_dataset_id: None,
            },
            ended: false,
        });
        id
    }

    /// Store a rule as-is, e.g. an empty shell left by a failed creation.
    pub fn seed_rule(&self, mut record: RuleRecord) -> String {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id("rule");
        record.id = Some(id.clone());
        let payload = serde_json::to_value(&record).unwrap_or(Value::Null);
        state.rules.push((record, payload));
        id
    }

    pub fn seed_queue(&self, name: &str) -> String {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id("queue");
        let record = QueueRecord {
            id: id.clone(),
            name: name.to_string(),
        };
        state.queues.push((record, json!({ "name": name })));
        id
    }

    /// Create `owner/repo` holding a single commit of `manifest`.
    pub fn seed_commit(&self, owner: &str, repo: &str, manifest: Value) -> String {
        let mut state = self.state.lock().unwrap();
        let commits = state
            .repos
            .entry((owner.to_string(), repo.to_string()))
            .or_default();
        let parent = commits.last().map(|c| c.commit_hash.clone());
        let hash = commit_hash(parent.as_deref(), &manifest);
        commits.push(CommitInfo {
            commit_hash: hash.clone(),
            manifest: Some(manifest),
            parent_commit_hash: parent,
        });
        hash
    }

    /// Answer the next `times` requests matching `method` and `pattern` with
    /// `status`. Patterns use `*` for a single path segment, e.g. `/commits/*/*`.
    pub fn fail_next(&self, method: &str, pattern: &str, status: u16, times: usize) {
        self.state.lock().unwrap().failures.push(FailureRule {
            method: method.to_string(),
            pattern: pattern.to_string(),
            status,
            remaining: times,
        });
    }

    // -- inspection ---------------------------------------------------------

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Number of recorded calls matching `method` and `pattern`.
    pub fn count_calls(&self, method: &str, pattern: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| c.method == method && path_matches(pattern, &c.path))
            .count()
    }

    pub fn secrets(&self) -> BTreeMap<String, String> {
        self.state.lock().unwrap().secrets.clone()
    }

    pub fn has_repo(&self, owner: &str, repo: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .repos
            .contains_key(&(owner.to_string(), repo.to_string()))
    }

    /// Commits of `owner/repo`, oldest first.
    pub fn commits(&self, owner: &str, repo: &str) -> Vec<CommitInfo> {
        self.state
            .lock()
            .unwrap()
            .repos
            .get(&(owner.to_string(), repo.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    pub fn rules(&self) -> Vec<RuleRecord> {
        let state = self.state.lock().unwrap();
        state.rules.iter().map(|(r, _)| r.clone()).collect()
    }

    /// Raw request bodies of created rules.
    pub fn rule_payloads(&self) -> Vec<Value> {
        let state = self.state.lock().unwrap();
        state.rules.iter().map(|(_, v)| v.clone()).collect()
    }

    pub fn queues(&self) -> Vec<QueueRecord> {
        let state = self.state.lock().unwrap();
        state.queues.iter().map(|(q, _)| q.clone()).collect()
    }

    pub fn queue_payloads(&self) -> Vec<Value> {
        let state = self.state.lock().unwrap();
        state.queues.iter().map(|(_, v)| v.clone()).collect()
    }

    pub fn sessions(&self) -> Vec<StoredSession> {
        self.state.lock().unwrap().sessions.clone()
    }

    pub fn runs(&self) -> Vec<StoredRun> {
        self.state.lock().unwrap().runs.clone()
    }

    pub fn feedback(&self) -> Vec<StoredFeedback> {
        self.state.lock().unwrap().feedback.clone()
    }
}

#[async_trait]
impl ApiBackend for MemoryPlatform {
    fn base_url(&self) -> &str {
        BASE_URL
    }

    async fn execute(&self, request: ApiRequest) -> TransportResult<ApiResponse> {
        let path = request
            .path
            .strip_prefix(API_PREFIX)
            .unwrap_or(&request.path)
            .to_string();
        let method = request.method.as_str().to_string();

        let mut state = self.state.lock().unwrap();
        state.calls.push(RecordedCall {
            method: method.clone(),
            path: path.clone(),
            query: request.query.clone(),
            body: request.body.clone(),
        });

        if let Some(status) = state.take_failure(&method, &path) {
            return Ok(ApiResponse::new(status, "injected failure"));
        }

        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        Ok(route(
            &mut state,
            &method,
            &segments,
            &request.query,
            request.body.as_ref(),
        ))
    }
}

fn route(
    state: &mut State,
    method: &str,
    segments: &[&str],
    query: &[(String, String)],
    body: Option<&Value>,
) -> ApiResponse {
    let param = |key: &str| {
        query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    };

    match (method, segments) {
        ("GET", ["settings"]) => ok(&json!({ "tenant_handle": state.tenant_handle })),

        ("POST", ["workspaces", "current", "secrets"]) => {
            let Some(secrets) = decode::<Vec<WorkspaceSecret>>(body) else {
                return unprocessable();
            };
            for secret in secrets {
                state.secrets.insert(secret.key, secret.value);
            }
            ok(&json!({}))
        }

        ("GET", ["repos", owner, repo]) => {
            if state.repos.contains_key(&key(owner, repo)) {
                ok(&json!({ "repo_handle": repo, "owner": owner }))
            } else {
                not_found()
            }
        }

        ("DELETE", ["repos", owner, repo]) => match state.repos.remove(&key(owner, repo)) {
            Some(_) => ok(&json!({})),
            None => not_found(),
        },

        ("POST", ["repos"]) => {
            let Some(create) = decode::<RepoCreate>(body) else {
                return unprocessable();
            };
            let k = (create.owner_handle.clone(), create.repo_handle.clone());
            if state.repos.contains_key(&k) {
                return ApiResponse::new(409, "repository already exists");
            }
            state.repos.insert(k, Vec::new());
            ok(&json!({ "repo_handle": create.repo_handle, "owner": create.owner_handle }))
        }

        ("GET", ["repos", owner, repo, "commits"]) => match state.repos.get(&key(owner, repo)) {
            Some(commits) => {
                let newest_first: Vec<&CommitInfo> = commits.iter().rev().collect();
                ok(&json!({ "commits": newest_first }))
            }
            None => not_found(),
        },

        ("GET", ["commits", owner, repo, version]) => {
            let Some(commits) = state.repos.get(&key(owner, repo)) else {
                return not_found();
            };
            let found = if *version == "latest" {
                commits.last()
            } else {
                commits.iter().find(|c| c.commit_hash.starts_with(*version))
            };
            match found {
                Some(commit) => ok(commit),
                None => not_found(),
            }
        }

        ("POST", ["commits", owner, repo]) => {
            let Some(request) = decode::<CommitRequest>(body) else {
                return unprocessable();
            };
            let Some(commits) = state.repos.get_mut(&key(owner, repo)) else {
                return not_found();
            };
            if commits.last().and_then(|c| c.manifest.as_ref()) == Some(&request.manifest) {
                return ApiResponse::new(409, "Nothing to commit: prompt has not changed");
            }
            let parent = request
                .parent_commit
                .or_else(|| commits.last().map(|c| c.commit_hash.clone()));
            let commit = CommitInfo {
                commit_hash: commit_hash(parent.as_deref(), &request.manifest),
                manifest: Some(request.manifest),
                parent_commit_hash: parent,
            };
            commits.push(commit.clone());
            ok(&json!({ "commit": commit }))
        }

        ("GET", ["datasets"]) => {
            let name = param("name");
            let found: Vec<&DatasetRecord> = state
                .datasets
                .iter()
                .filter(|d| name.map_or(true, |n| d.name == n))
                .collect();
            ok(&found)
        }

        ("GET", ["examples"]) => match param("dataset").and_then(|id| state.examples.get(id)) {
            Some(examples) => ok(examples),
            None => ok(&json!([])),
        },

        ("GET", ["sessions"]) => {
            let name = param("name");
            let found: Vec<ProjectRecord> = state
                .sessions
                .iter()
                .filter(|s| name.map_or(true, |n| s.record.name == n))
                .map(|s| ProjectRecord {
                    id: s.record.id.clone(),
                    name: s.record.name.clone(),
                })
                .collect();
            ok(&found)
        }

        ("POST", ["sessions"]) => {
            let Some(request) = decode::<SessionRequest>(body) else {
                return unprocessable();
            };
            if state.sessions.iter().any(|s| s.record.name == request.name) {
                return ApiResponse::new(409, "session already exists");
            }
            let record = SessionRecord {
                id: state.next_id("session"),
                name: request.name,
                reference_dataset_id: request.reference_dataset_id,
            };
            state.sessions.push(StoredSession {
                record: record.clone(),
                ended: false,
            });
            ok(&record)
        }

        ("PATCH", ["sessions", id]) => {
            match state.sessions.iter_mut().find(|s| s.record.id == *id) {
                Some(session) => {
                    session.ended = true;
                    ok(&session.record)
                }
                None => not_found(),
            }
        }

        ("GET", ["runs", "rules"]) => {
            let needle = param("name_contains").unwrap_or_default();
            let dataset_id = param("dataset_id");
            let session_id = param("session_id");
            let found: Vec<&RuleRecord> = state
                .rules
                .iter()
                .map(|(r, _)| r)
                .filter(|r| r.display_name.contains(needle))
                .filter(|r| dataset_id.map_or(true, |id| r.dataset_id.as_deref() == Some(id)))
                .filter(|r| session_id.map_or(true, |id| r.session_id.as_deref() == Some(id)))
                .collect();
            ok(&found)
        }

        ("POST", ["runs", "rules"]) => {
            let Some(payload) = body.cloned() else {
                return unprocessable();
            };
            let Some(mut record) = decode::<RuleRecord>(Some(&payload)) else {
                return unprocessable();
            };
            if let Some(queue_id) = &record.add_to_annotation_queue_id {
                if !state.queues.iter().any(|(q, _)| &q.id == queue_id) {
                    return ApiResponse::new(400, format!("unknown annotation queue {}", queue_id));
                }
            }
            record.id = Some(state.next_id("rule"));
            state.rules.push((record.clone(), payload));
            ok(&record)
        }

        ("GET", ["annotation-queues"]) => {
            let queues: Vec<&QueueRecord> = state.queues.iter().map(|(q, _)| q).collect();
            ok(&queues)
        }

        ("POST", ["annotation-queues"]) => {
            let Some(payload) = body.cloned() else {
                return unprocessable();
            };
            let Some(name) = payload.get("name").and_then(Value::as_str) else {
                return unprocessable();
            };
            let record = QueueRecord {
                id: state.next_id("queue"),
                name: name.to_string(),
            };
            state.queues.push((record.clone(), payload));
            ok(&record)
        }

        ("POST", ["runs"]) => {
            let Some(run) = decode::<StoredRun>(body) else {
                return unprocessable();
            };
            if !state.sessions.iter().any(|s| s.record.id == run.session_id) {
                return ApiResponse::new(400, format!("unknown session {}", run.session_id));
            }
            state.runs.push(run);
            ok(&json!({}))
        }

        ("PATCH", ["runs", id]) => {
            let Some(end) = decode::<RunEndRequest>(body) else {
                return unprocessable();
            };
            match state.runs.iter_mut().find(|r| r.id == *id) {
                Some(run) => {
                    run.outputs = Some(end.outputs);
                    run.error = end.error;
                    run.ended = true;
                    ok(&json!({}))
                }
                None => not_found(),
            }
        }

        ("POST", ["feedback"]) => {
            let Some(feedback) = decode::<StoredFeedback>(body) else {
                return unprocessable();
            };
            if !state.runs.iter().any(|r| r.id == feedback.run_id) {
                return ApiResponse::new(400, format!("unknown run {}", feedback.run_id));
            }
            state.feedback.push(feedback);
            ok(&json!({}))
        }

        _ => not_found(),
    }
}

fn key(owner: &str, repo: &str) -> (String, String) {
    (owner.to_string(), repo.to_string())
}

fn decode<T: serde::de::DeserializeOwned>(body: Option<&Value>) -> Option<T> {
    body.and_then(|b| serde_json::from_value(b.clone()).ok())
}

fn ok<T: Serialize + ?Sized>(value: &T) -> ApiResponse {
    match serde_json::to_string(value) {
        Ok(body) => ApiResponse::new(200, body),
        Err(e) => ApiResponse::new(500, e.to_string()),
    }
}

fn not_found() -> ApiResponse {
    ApiResponse::new(404, r#"{"detail":"Not found"}"#)
}

fn unprocessable() -> ApiResponse {
    ApiResponse::new(422, r#"{"detail":"Unprocessable entity"}"#)
}

/// Content hash linking a manifest to its parent.
fn commit_hash(parent: Option<&str>, manifest: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(parent.unwrap_or_default().as_bytes());
    hasher.update(manifest.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

fn path_matches(pattern: &str, path: &str) -> bool {
    let pat: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
    let segs: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    pat.len() == segs.len() && pat.iter().zip(&segs).all(|(p, s)| *p == "*" || p == s)
}
