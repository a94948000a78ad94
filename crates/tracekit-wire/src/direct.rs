//! Direct REST transport with optimistic commit linking

use async_trait::async_trait;
use tracing::{debug, info, instrument};

use crate::api::PlatformApi;
use crate::error::TransportError;
use crate::schema::{CommitPost, PromptCommit, PushOutcome};
use crate::transport::{PlatformTransport, TransportMode};
use crate::TransportResult;

/// Transport issuing explicit REST calls.
#[derive(Clone)]
pub struct DirectTransport {
    api: PlatformApi,
}

impl DirectTransport {
    pub fn new(api: PlatformApi) -> Self {
        Self { api }
    }

    /// Hash of the latest commit, if discoverable. Discovery failures are
    /// logged and treated as "no parent".
    async fn latest_parent(&self, owner: &str, repo: &str) -> Option<String> {
        match self.api.get_commit(owner, repo, "latest").await {
            Ok(latest) => latest.map(|c| c.commit_hash),
            Err(e) => {
                debug!(repo = %repo, error = %e, "parent commit discovery failed");
                None
            }
        }
    }

    fn created(&self, commit: &PromptCommit, commit_hash: String) -> PushOutcome {
        PushOutcome::Created {
            url: self.api.repo_url(&commit.owner, &commit.repo),
            commit_hash,
        }
    }
}

#[async_trait]
impl PlatformTransport for DirectTransport {
    fn mode(&self) -> TransportMode {
        TransportMode::Direct
    }

    fn api(&self) -> &PlatformApi {
        &self.api
    }

    #[instrument(skip(self, commit), fields(repo = %commit.repo, owner = %commit.owner))]
    async fn push_prompt(&self, commit: &PromptCommit) -> TransportResult<PushOutcome> {
        let parent = self.latest_parent(&commit.owner, &commit.repo).await;
        let linked = commit.with_parent(parent);

        match self.api.post_commit(&linked).await? {
            CommitPost::Created { commit_hash } => Ok(self.created(commit, commit_hash)),
            CommitPost::Unchanged => Ok(PushOutcome::Unchanged),
            CommitPost::RepoMissing => {
                info!("Prompt repo '{}' missing, creating it", commit.repo);
                self.api.create_repo(&commit.owner, &commit.repo).await?;

                // Exactly one retry.
                match self.api.post_commit(&linked).await? {
                    CommitPost::Created { commit_hash } => Ok(self.created(commit, commit_hash)),
                    CommitPost::Unchanged => Ok(PushOutcome::Unchanged),
                    CommitPost::RepoMissing => Err(TransportError::Status {
                        operation: format!("push prompt '{}'", commit.repo),
                        status: 404,
                        body: "repository still missing after creation".to_string(),
                    }),
                }
            }
        }
    }
}
