//! Parent resolution by exact name.

use tracekit_wire::{PlatformApi, RuleTarget, TransportResult};

use crate::domain::{TargetKind, TargetRef};

/// Result of resolving a parent. `Missing` is a normal outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved<T> {
    Found(T),
    Missing(String),
}

pub async fn dataset_id(api: &PlatformApi, name: &str) -> TransportResult<Resolved<String>> {
    Ok(match api.find_dataset(name).await? {
        Some(dataset) => Resolved::Found(dataset.id),
        None => Resolved::Missing(format!("dataset '{}' does not exist", name)),
    })
}

/// Project `name`, or `default_project` when no name is given.
pub async fn project_id(
    api: &PlatformApi,
    name: Option<&str>,
    default_project: Option<&str>,
) -> TransportResult<Resolved<String>> {
    let Some(name) = name.or(default_project) else {
        return Ok(Resolved::Missing("no project named and none configured".to_string()));
    };
    Ok(match api.find_project(name).await? {
        Some(project) => Resolved::Found(project.id),
        None => Resolved::Missing(format!("project '{}' does not exist", name)),
    })
}

/// Rule target for an evaluator definition.
pub async fn rule_target(
    api: &PlatformApi,
    target: &TargetRef,
    default_project: Option<&str>,
) -> TransportResult<Resolved<RuleTarget>> {
    let resolved = match target.kind {
        TargetKind::Dataset => {
            let name = target.name.as_deref().unwrap_or_default();
            match dataset_id(api, name).await? {
                Resolved::Found(id) => Resolved::Found(RuleTarget::Dataset(id)),
                Resolved::Missing(reason) => Resolved::Missing(reason),
            }
        }
        TargetKind::Project => {
            match project_id(api, target.name.as_deref(), default_project).await? {
                Resolved::Found(id) => Resolved::Found(RuleTarget::Project(id)),
                Resolved::Missing(reason) => Resolved::Missing(reason),
            }
        }
    };
    Ok(resolved)
}
