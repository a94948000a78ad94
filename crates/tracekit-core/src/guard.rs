//! Idempotency guard: existence checks run before every mutating call.
//!
//! The platform is the source of truth; nothing is cached between calls.
//! Absence is a normal answer (`false` / `None`), only transport failures
//! are errors.

use tracekit_wire::{PlatformApi, RuleQuery, RuleScope, TransportResult};
use tracing::{debug, warn};

/// Split `repo[:version]`. A missing version means `latest`.
pub fn parse_prompt_ref(reference: &str) -> (&str, &str) {
    match reference.split_once(':') {
        Some((repo, version)) if !version.is_empty() => (repo, version),
        Some((repo, _)) => (repo, "latest"),
        None => (reference, "latest"),
    }
}

#[derive(Clone)]
pub struct IdempotencyGuard {
    api: PlatformApi,
}

impl IdempotencyGuard {
    pub fn new(api: PlatformApi) -> Self {
        Self { api }
    }

    /// True when a rule named exactly `name` is attached to `scope` and
    /// carries a body. Empty shells do not count.
    pub async fn exists(&self, name: &str, scope: &RuleScope) -> TransportResult<bool> {
        let rules = self
            .api
            .list_rules(&RuleQuery::for_scope(name, scope))
            .await?;
        let found = rules
            .iter()
            .any(|r| r.display_name == name && r.in_scope(scope) && r.has_body());
        debug!(name = %name, scope = scope.label(), candidates = rules.len(), found, "rule lookup");
        Ok(found)
    }

    /// Id of the queue named exactly `name`.
    pub async fn queue_id(&self, name: &str) -> TransportResult<Option<String>> {
        let queues = self.api.list_queues().await?;
        Ok(queues.into_iter().find(|q| q.name == name).map(|q| q.id))
    }

    /// True when `reference` (`repo[:version]`) resolves under `owner`.
    ///
    /// 404 means absent. Any other failure falls back to the repository's
    /// commit listing; a failing fallback counts as absent.
    pub async fn prompt_exists(&self, owner: &str, reference: &str) -> bool {
        let (repo, version) = parse_prompt_ref(reference);
        match self.api.get_commit(owner, repo, version).await {
            Ok(found) => found.is_some(),
            Err(e) => {
                debug!(reference = %reference, error = %e, "commit lookup failed, listing commits");
                match self.api.list_commits(owner, repo).await {
                    Ok(commits) => commits.is_some_and(|c| !c.is_empty()),
                    Err(e) => {
                        warn!(reference = %reference, error = %e, "could not verify prompt reference");
                        false
                    }
                }
            }
        }
    }
}
