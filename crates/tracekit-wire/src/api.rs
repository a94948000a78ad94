//! Platform operations over an `ApiBackend`
//!
//! Each method issues one request and normalizes the outcome:
//! - 2xx: decoded record
//! - 404 on a lookup: `None` / `false`
//! - 409 where content may be unchanged: a dedicated variant
//! - anything else >= 300: `TransportError::Status`

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::http::{
    ApiBackend, ApiRequest, COMMIT_PROBE_TIMEOUT, PROMPT_CHECK_TIMEOUT, RUN_TIMEOUT,
};
use crate::schema::*;
use crate::TransportResult;

/// Shared platform operations. Cheap to clone.
#[derive(Clone)]
pub struct PlatformApi {
    backend: Arc<dyn ApiBackend>,
}

impl PlatformApi {
    pub fn new(backend: Arc<dyn ApiBackend>) -> Self {
        Self { backend }
    }

    pub fn base_url(&self) -> &str {
        self.backend.base_url()
    }

    /// User-facing link to a prompt repository.
    pub fn repo_url(&self, owner: &str, repo: &str) -> String {
        format!("{}/repos/{}/{}", self.base_url(), owner, repo)
    }

    // -----------------------------------------------------------------------
    // Workspace
    // -----------------------------------------------------------------------

    pub async fn workspace_settings(&self) -> TransportResult<WorkspaceSettings> {
        let op = "fetch settings";
        self.backend
            .execute(ApiRequest::get("/settings"))
            .await?
            .require_success(op)?
            .json(op)
    }

    pub async fn upsert_secrets(&self, secrets: &[WorkspaceSecret]) -> TransportResult<()> {
        let keys: Vec<&str> = secrets.iter().map(|s| s.key.as_str()).collect();
        let op = format!("upsert workspace secrets {}", keys.join(","));
        let request = ApiRequest::post("/workspaces/current/secrets").with_json(&secrets)?;
        self.backend.execute(request).await?.require_success(&op)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Prompt repositories and commits
    // -----------------------------------------------------------------------

    pub async fn get_repo(&self, owner: &str, repo: &str) -> TransportResult<Option<RepoRecord>> {
        let op = format!("fetch prompt repo '{}'", repo);
        let response = self
            .backend
            .execute(ApiRequest::get(format!("/repos/{}/{}", owner, repo)))
            .await?;
        if response.is_not_found() {
            return Ok(None);
        }
        response.require_success(&op)?.json(&op).map(Some)
    }

    /// Create a private repository. 409 means it already exists.
    pub async fn create_repo(&self, owner: &str, repo: &str) -> TransportResult<RepoCreation> {
        let op = format!("create prompt repo '{}'", repo);
        let body = RepoCreate {
            repo_handle: repo.to_string(),
            owner_handle: owner.to_string(),
            is_public: false,
        };
        let response = self
            .backend
            .execute(ApiRequest::post("/repos").with_json(&body)?)
            .await?;
        if response.is_conflict() {
            return Ok(RepoCreation::AlreadyExists);
        }
        response.require_success(&op)?;
        Ok(RepoCreation::Created)
    }

    /// Delete a repository. Returns `false` when it did not exist.
    pub async fn delete_repo(&self, owner: &str, repo: &str) -> TransportResult<bool> {
        let op = format!("delete prompt repo '{}'", repo);
        let response = self
            .backend
            .execute(ApiRequest::delete(format!("/repos/{}/{}", owner, repo)))
            .await?;
        if response.is_not_found() {
            return Ok(false);
        }
        response.require_success(&op)?;
        Ok(true)
    }

    /// Fetch one commit; `version` is `latest`, a commit hash or a tag.
    pub async fn get_commit(
        &self,
        owner: &str,
        repo: &str,
        version: &str,
    ) -> TransportResult<Option<CommitInfo>> {
        let op = format!("fetch commit {}:{}", repo, version);
        let timeout = if version == "latest" {
            COMMIT_PROBE_TIMEOUT
        } else {
            PROMPT_CHECK_TIMEOUT
        };
        let request =
            ApiRequest::get(format!("/commits/{}/{}/{}", owner, repo, version)).with_timeout(timeout);
        let response = self.backend.execute(request).await?;
        if response.is_not_found() {
            return Ok(None);
        }
        response.require_success(&op)?.json(&op).map(Some)
    }

    /// All commits of a repository, newest first. `None` if the repo is absent.
    pub async fn list_commits(
        &self,
        owner: &str,
        repo: &str,
    ) -> TransportResult<Option<Vec<CommitInfo>>> {
        let op = format!("list commits of '{}'", repo);
        let request = ApiRequest::get(format!("/repos/{}/{}/commits", owner, repo))
            .with_timeout(PROMPT_CHECK_TIMEOUT);
        let response = self.backend.execute(request).await?;
        if response.is_not_found() {
            return Ok(None);
        }
        let listing: CommitListing = response.require_success(&op)?.json(&op)?;
        Ok(Some(listing.commits))
    }

    /// Single commit POST with status normalization and no retry.
    pub async fn post_commit(&self, commit: &PromptCommit) -> TransportResult<CommitPost> {
        let op = format!("push prompt '{}'", commit.repo);
        let body = CommitBody {
            manifest: &commit.manifest,
            parent_commit: commit.parent_commit.as_deref(),
        };
        let request = ApiRequest::post(format!("/commits/{}/{}", commit.owner, commit.repo))
            .with_json(&body)?;
        let response = self.backend.execute(request).await?;
        if response.is_conflict() {
            return Ok(CommitPost::Unchanged);
        }
        if response.is_not_found() {
            return Ok(CommitPost::RepoMissing);
        }
        let created: CommitCreated = response.require_success(&op)?.json(&op)?;
        Ok(CommitPost::Created {
            commit_hash: created.commit.commit_hash,
        })
    }

    // -----------------------------------------------------------------------
    // Datasets, projects, examples
    // -----------------------------------------------------------------------

    /// Dataset with exactly `name`, if any.
    pub async fn find_dataset(&self, name: &str) -> TransportResult<Option<DatasetRecord>> {
        let op = format!("search dataset '{}'", name);
        let response = self
            .backend
            .execute(ApiRequest::get("/datasets").with_query("name", name))
            .await?;
        if response.is_not_found() {
            return Ok(None);
        }
        let datasets: Vec<DatasetRecord> = response.require_success(&op)?.json(&op)?;
        Ok(datasets.into_iter().find(|d| d.name == name))
    }

    /// Project with exactly `name`, if any.
    pub async fn find_project(&self, name: &str) -> TransportResult<Option<ProjectRecord>> {
        let op = format!("search project '{}'", name);
        let response = self
            .backend
            .execute(ApiRequest::get("/sessions").with_query("name", name))
            .await?;
        if response.is_not_found() {
            return Ok(None);
        }
        let projects: Vec<ProjectRecord> = response.require_success(&op)?.json(&op)?;
        Ok(projects.into_iter().find(|p| p.name == name))
    }

    pub async fn list_examples(&self, dataset_id: &str) -> TransportResult<Vec<ExampleRecord>> {
        let op = format!("list examples of dataset {}", dataset_id);
        self.backend
            .execute(ApiRequest::get("/examples").with_query("dataset", dataset_id))
            .await?
            .require_success(&op)?
            .json(&op)
    }

    // -----------------------------------------------------------------------
    // Rules
    // -----------------------------------------------------------------------

    /// Rules whose name contains `query.name_contains`, narrowed by scope ids.
    pub async fn list_rules(&self, query: &RuleQuery) -> TransportResult<Vec<RuleRecord>> {
        let op = format!("search rules named '{}'", query.name_contains);
        let mut request = ApiRequest::get("/runs/rules");
        request.query = query.to_pairs();
        self.backend
            .execute(request)
            .await?
            .require_success(&op)?
            .json(&op)
    }

    pub async fn create_evaluator(
        &self,
        rule: &EvaluatorRuleRequest,
    ) -> TransportResult<RuleRecord> {
        let op = format!("create evaluator '{}'", rule.display_name);
        self.backend
            .execute(ApiRequest::post("/runs/rules").with_json(rule)?)
            .await?
            .require_success(&op)?
            .json(&op)
    }

    pub async fn create_automation(
        &self,
        rule: &AutomationRuleRequest,
    ) -> TransportResult<RuleRecord> {
        let op = format!("create automation '{}'", rule.display_name);
        self.backend
            .execute(ApiRequest::post("/runs/rules").with_json(rule)?)
            .await?
            .require_success(&op)?
            .json(&op)
    }

    // -----------------------------------------------------------------------
    // Review queues
    // -----------------------------------------------------------------------

    pub async fn list_queues(&self) -> TransportResult<Vec<QueueRecord>> {
        let op = "list annotation queues";
        self.backend
            .execute(ApiRequest::get("/annotation-queues"))
            .await?
            .require_success(op)?
            .json(op)
    }

    pub async fn create_queue(&self, queue: &QueueRequest) -> TransportResult<QueueRecord> {
        let op = format!("create annotation queue '{}'", queue.name);
        self.backend
            .execute(ApiRequest::post("/annotation-queues").with_json(queue)?)
            .await?
            .require_success(&op)?
            .json(&op)
    }

    // -----------------------------------------------------------------------
    // Sessions, runs, feedback
    // -----------------------------------------------------------------------

    pub async fn create_session(&self, session: &SessionCreate) -> TransportResult<SessionRecord> {
        let op = format!("create session '{}'", session.name);
        self.backend
            .execute(ApiRequest::post("/sessions").with_json(session)?)
            .await?
            .require_success(&op)?
            .json(&op)
    }

    pub async fn end_session(&self, session_id: &str, end_time: DateTime<Utc>) -> TransportResult<()> {
        let op = format!("close session {}", session_id);
        let request = ApiRequest::patch(format!("/sessions/{}", session_id))
            .with_json(&json!({ "end_time": end_time }))?;
        self.backend.execute(request).await?.require_success(&op)?;
        Ok(())
    }

    pub async fn create_run(&self, run: &RunCreate) -> TransportResult<()> {
        let op = format!("create run {}", run.id);
        let request = ApiRequest::post("/runs")
            .with_json(run)?
            .with_timeout(RUN_TIMEOUT);
        self.backend.execute(request).await?.require_success(&op)?;
        Ok(())
    }

    pub async fn end_run(&self, run_id: &Uuid, end: &RunEnd) -> TransportResult<()> {
        let op = format!("end run {}", run_id);
        let request = ApiRequest::patch(format!("/runs/{}", run_id))
            .with_json(end)?
            .with_timeout(RUN_TIMEOUT);
        self.backend.execute(request).await?.require_success(&op)?;
        Ok(())
    }

    pub async fn create_feedback(&self, feedback: &FeedbackCreate) -> TransportResult<()> {
        let op = format!("log feedback '{}' on run {}", feedback.key, feedback.run_id);
        self.backend
            .execute(ApiRequest::post("/feedback").with_json(feedback)?)
            .await?
            .require_success(&op)?;
        Ok(())
    }
}
