//! Review queues and the automation rules that feed them.

use std::sync::Arc;

use tracekit_wire::{AutomationRuleRequest, PlatformTransport, QueueRequest, RuleScope};

use super::resolve::{project_id, Resolved};
use super::Provisioned;
use crate::domain::{AutomationDefinition, QueueDefinition, Result};
use crate::guard::IdempotencyGuard;

pub struct QueueRegistry {
    transport: Arc<dyn PlatformTransport>,
    guard: IdempotencyGuard,
}

impl QueueRegistry {
    pub fn new(transport: Arc<dyn PlatformTransport>) -> Self {
        let guard = IdempotencyGuard::new(transport.api().clone());
        Self { transport, guard }
    }

    /// Create the queue unless one with the same name exists. Both outcomes
    /// carry the queue id.
    pub async fn provision(&self, definition: &QueueDefinition) -> Result<Provisioned> {
        if let Some(id) = self.guard.queue_id(&definition.name).await? {
            return Ok(Provisioned::Existing(Some(id)));
        }

        let request = QueueRequest {
            name: definition.name.clone(),
            description: definition.description.clone(),
            instructions: definition.instructions.clone(),
            enable_reservations: definition.enable_reservations,
            num_reviewers_per_item: definition.num_reviewers_per_item,
            reservation_minutes: definition.reservation_minutes,
            rubric_items: definition.rubric.clone(),
        };
        let record = self.transport.api().create_queue(&request).await?;
        Ok(Provisioned::Created(Some(record.id)))
    }
}

pub struct AutomationRegistry {
    transport: Arc<dyn PlatformTransport>,
    guard: IdempotencyGuard,
    default_project: Option<String>,
}

impl AutomationRegistry {
    pub fn new(transport: Arc<dyn PlatformTransport>, default_project: Option<String>) -> Self {
        let guard = IdempotencyGuard::new(transport.api().clone());
        Self {
            transport,
            guard,
            default_project,
        }
    }

    /// Create the routing rule. The queue must already exist.
    pub async fn provision(&self, definition: &AutomationDefinition) -> Result<Provisioned> {
        let api = self.transport.api();
        let Some(queue_id) = self.guard.queue_id(&definition.queue).await? else {
            return Ok(Provisioned::skipped(format!(
                "queue '{}' does not exist",
                definition.queue
            )));
        };

        let project = match project_id(
            api,
            definition.project.as_deref(),
            self.default_project.as_deref(),
        )
        .await?
        {
            Resolved::Found(id) => id,
            Resolved::Missing(reason) => return Ok(Provisioned::skipped(reason)),
        };

        let scope = RuleScope::Project(project.clone());
        if self.guard.exists(&definition.name, &scope).await? {
            return Ok(Provisioned::Existing(None));
        }

        let request = AutomationRuleRequest {
            display_name: definition.name.clone(),
            session_id: project,
            add_to_annotation_queue_id: queue_id,
            filter: definition.filter.clone(),
            sampling_rate: definition.sampling_rate,
            is_enabled: true,
        };
        let record = api.create_automation(&request).await?;
        Ok(Provisioned::Created(record.id))
    }
}
