//! Prompt registry: pushes prompt manifests as a linked commit chain.

use std::sync::Arc;

use tracekit_wire::{PlatformTransport, PromptCommit, PushOutcome};
use tracing::{debug, info, warn};

use super::owner::OwnerResolver;
use super::Provisioned;
use crate::domain::{PromptDefinition, Result};

pub struct PromptRegistry {
    transport: Arc<dyn PlatformTransport>,
    owner: Arc<OwnerResolver>,
}

impl PromptRegistry {
    pub fn new(transport: Arc<dyn PlatformTransport>, owner: Arc<OwnerResolver>) -> Self {
        Self { transport, owner }
    }

    /// Push the manifests of `definition` in order, starting after the one
    /// that matches the latest commit.
    ///
    /// `Created` carries the repository URL when at least one version was
    /// new; `Existing` means nothing needed pushing.
    pub async fn provision(&self, definition: &PromptDefinition) -> Result<Provisioned> {
        let owner = self.owner.resolve().await?;
        let start = if definition.recreate {
            self.delete_repo(&owner, &definition.name).await;
            0
        } else {
            self.resume_from(&owner, definition).await
        };

        let mut created = None;
        for (version, manifest) in definition.manifests.iter().enumerate().skip(start) {
            let commit = PromptCommit::new(owner.as_str(), definition.name.as_str(), manifest.clone());
            match self.transport.push_prompt(&commit).await? {
                PushOutcome::Created { url, commit_hash } => {
                    debug!(prompt = %definition.name, version, commit = %commit_hash, "pushed prompt version");
                    created = Some(url);
                }
                PushOutcome::Unchanged => {
                    debug!(prompt = %definition.name, version, "prompt version unchanged");
                }
            }
        }

        Ok(match created {
            Some(url) => Provisioned::Created(Some(url)),
            None => Provisioned::Existing(None),
        })
    }

    /// Index of the first manifest not yet published. The newest manifest
    /// equal to the latest commit marks the resume point; if none matches,
    /// or the lookup fails, everything is pushed.
    async fn resume_from(&self, owner: &str, definition: &PromptDefinition) -> usize {
        let latest = match self
            .transport
            .api()
            .get_commit(owner, &definition.name, "latest")
            .await
        {
            Ok(Some(commit)) => commit.manifest,
            Ok(None) => None,
            Err(e) => {
                debug!(prompt = %definition.name, error = %e, "latest commit lookup failed");
                None
            }
        };
        let Some(latest) = latest else {
            return 0;
        };
        definition
            .manifests
            .iter()
            .rposition(|m| *m == latest)
            .map_or(0, |i| i + 1)
    }

    /// Best-effort delete ahead of a recreate. A missing repository counts
    /// as deleted.
    async fn delete_repo(&self, owner: &str, repo: &str) {
        match self.transport.api().delete_repo(owner, repo).await {
            Ok(true) => info!("Deleted prompt repo '{}' for recreation", repo),
            Ok(false) => debug!("prompt repo '{}' absent, nothing to delete", repo),
            Err(e) => warn!(repo = %repo, error = %e, "could not delete prompt repo, pushing anyway"),
        }
    }
}
