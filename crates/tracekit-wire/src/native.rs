//! High-level platform client
//!
//! Mirrors what a client library offers: a prompt push is one call that
//! takes care of the repository and parent linking, and signals unchanged
//! content with the typed `TransportError::Conflict`. It also exposes the
//! platform's batched evaluation entry point.

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::api::PlatformApi;
use crate::error::TransportError;
use crate::evaluation::{run_evaluation, BatchEvaluator, EvaluateRequest, ExperimentResults};
use crate::schema::{CommitPost, PromptCommit, PushOutcome};
use crate::transport::{PlatformTransport, TransportMode};
use crate::TransportResult;

/// High-level client over `PlatformApi`.
#[derive(Clone)]
pub struct NativeClient {
    api: PlatformApi,
}

impl NativeClient {
    pub fn new(api: PlatformApi) -> Self {
        Self { api }
    }

    /// Publish `commit` in one call.
    ///
    /// Returns `Err(TransportError::Conflict)` when the manifest matches the
    /// latest commit.
    #[instrument(skip(self, commit), fields(repo = %commit.repo))]
    pub async fn push_prompt_strict(&self, commit: &PromptCommit) -> TransportResult<PushOutcome> {
        if self.api.get_repo(&commit.owner, &commit.repo).await?.is_none() {
            debug!("creating prompt repo '{}'", commit.repo);
            self.api.create_repo(&commit.owner, &commit.repo).await?;
        }

        let parent = self
            .api
            .get_commit(&commit.owner, &commit.repo, "latest")
            .await?
            .map(|c| c.commit_hash);

        match self.api.post_commit(&commit.with_parent(parent)).await? {
            CommitPost::Created { commit_hash } => Ok(PushOutcome::Created {
                url: self.api.repo_url(&commit.owner, &commit.repo),
                commit_hash,
            }),
            CommitPost::Unchanged => Err(TransportError::Conflict {
                repo: commit.repo.clone(),
            }),
            CommitPost::RepoMissing => Err(TransportError::Status {
                operation: format!("push prompt '{}'", commit.repo),
                status: 404,
                body: "repository not found".to_string(),
            }),
        }
    }
}

#[async_trait]
impl PlatformTransport for NativeClient {
    fn mode(&self) -> TransportMode {
        TransportMode::Native
    }

    fn api(&self) -> &PlatformApi {
        &self.api
    }

    async fn push_prompt(&self, commit: &PromptCommit) -> TransportResult<PushOutcome> {
        match self.push_prompt_strict(commit).await {
            // Prompt unchanged since last commit
            Err(e) if e.is_conflict() => Ok(PushOutcome::Unchanged),
            other => other,
        }
    }
}

#[async_trait]
impl BatchEvaluator for NativeClient {
    async fn evaluate(&self, request: EvaluateRequest) -> TransportResult<ExperimentResults> {
        run_evaluation(self.api.clone(), request).await
    }
}
