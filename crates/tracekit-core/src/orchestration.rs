//! Provisioning orchestrator.
//!
//! Runs the registries in dependency order:
//! secrets (admin only) -> prompts -> evaluators -> experiments -> queues
//! -> automations. Every item is its own containment boundary: a failure is
//! logged with the item's name and the pass moves on.

use std::sync::Arc;
use std::time::Duration;

use tracekit_wire::{
    BatchEvaluator, DirectTransport, NativeClient, PlatformApi, PlatformTransport, ResourceKind,
    TransportMode,
};
use tracing::info;

use crate::domain::{PlatformConfig, ProvisionManifest, Result};
use crate::experiment::{AgentUnderTest, ExperimentOutcome, ExperimentRunner};
use crate::obs;
use crate::registry::{
    AutomationRegistry, EvaluatorRegistry, OwnerResolver, PromptRegistry, Provisioned,
    QueueRegistry, SecretProvisioner,
};

/// Knobs of one provisioning pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvisionOptions {
    /// Also upsert workspace secrets.
    pub admin: bool,
    /// Pause between evaluators and experiments, and between experiments
    /// and the annotation stage.
    pub settle: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretsStatus {
    NotRequested,
    /// No credential configured.
    Skipped,
    Upserted,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceEntry {
    pub kind: ResourceKind,
    pub name: String,
    pub outcome: std::result::Result<Provisioned, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentEntry {
    pub prefix: String,
    pub outcome: std::result::Result<ExperimentOutcome, String>,
}

/// Everything one provisioning pass did.
#[derive(Debug, Clone, PartialEq)]
pub struct ProvisionReport {
    pub mode: TransportMode,
    pub secrets: SecretsStatus,
    pub resources: Vec<ResourceEntry>,
    pub experiments: Vec<ExperimentEntry>,
}

impl ProvisionReport {
    fn new(mode: TransportMode) -> Self {
        Self {
            mode,
            secrets: SecretsStatus::NotRequested,
            resources: Vec::new(),
            experiments: Vec::new(),
        }
    }

    pub fn entries(&self, kind: ResourceKind) -> impl Iterator<Item = &ResourceEntry> {
        self.resources.iter().filter(move |e| e.kind == kind)
    }

    pub fn created(&self) -> usize {
        self.resources
            .iter()
            .filter(|e| matches!(&e.outcome, Ok(p) if p.is_created()))
            .count()
    }

    pub fn failures(&self) -> usize {
        let resources = self.resources.iter().filter(|e| e.outcome.is_err()).count();
        let experiments = self.experiments.iter().filter(|e| e.outcome.is_err()).count();
        let secrets = usize::from(matches!(self.secrets, SecretsStatus::Failed(_)));
        resources + experiments + secrets
    }

    /// One human-readable line per item.
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        match &self.secrets {
            SecretsStatus::NotRequested => {}
            SecretsStatus::Skipped => lines.push("secrets: skipped (no credential)".to_string()),
            SecretsStatus::Upserted => lines.push("secrets: upserted".to_string()),
            SecretsStatus::Failed(e) => lines.push(format!("secrets: FAILED {}", e)),
        }
        for entry in &self.resources {
            let status = match &entry.outcome {
                Ok(p) => p.to_string(),
                Err(e) => format!("FAILED {}", e),
            };
            lines.push(format!("{} '{}': {}", entry.kind, entry.name, status));
        }
        for entry in &self.experiments {
            let status = match &entry.outcome {
                Ok(ExperimentOutcome::Completed(r)) => {
                    let mean = r
                        .mean_unmatched_steps
                        .map(|m| format!("{:.2}", m))
                        .unwrap_or_else(|| "n/a".to_string());
                    format!(
                        "session {} ({} runs, {} failed, mean unmatched_steps {})",
                        r.session, r.runs, r.failed_runs, mean
                    )
                }
                Ok(ExperimentOutcome::Skipped { reason }) => format!("skipped: {}", reason),
                Err(e) => format!("FAILED {}", e),
            };
            lines.push(format!("experiment '{}': {}", entry.prefix, status));
        }
        lines
    }

    fn record(&mut self, kind: ResourceKind, name: &str, result: Result<Provisioned>) {
        let outcome = match result {
            Ok(provisioned) => {
                match &provisioned {
                    Provisioned::Created(detail) => {
                        obs::emit_resource_created(kind, name, detail.as_deref())
                    }
                    Provisioned::Existing(_) => {
                        obs::emit_resource_skipped(kind, name, "already exists")
                    }
                    Provisioned::Skipped { reason } => obs::emit_resource_skipped(kind, name, reason),
                }
                Ok(provisioned)
            }
            Err(e) => {
                obs::emit_resource_failed(kind, name, &e);
                Err(e.to_string())
            }
        };
        self.resources.push(ResourceEntry {
            kind,
            name: name.to_string(),
            outcome,
        });
    }
}

pub struct Orchestrator {
    config: PlatformConfig,
    transport: Arc<dyn PlatformTransport>,
    evaluator: Arc<dyn BatchEvaluator>,
    agent: Option<Arc<dyn AgentUnderTest>>,
    options: ProvisionOptions,
}

impl Orchestrator {
    /// Wire the transport selected by `mode` over `api`. Batched experiments
    /// always go through the native client.
    pub fn new(
        api: PlatformApi,
        config: PlatformConfig,
        mode: TransportMode,
        options: ProvisionOptions,
    ) -> Self {
        let native = Arc::new(NativeClient::new(api.clone()));
        let transport: Arc<dyn PlatformTransport> = match mode {
            TransportMode::Native => native.clone(),
            TransportMode::Direct => Arc::new(DirectTransport::new(api)),
        };
        Self {
            config,
            transport,
            evaluator: native,
            agent: None,
            options,
        }
    }

    pub fn with_agent(mut self, agent: Arc<dyn AgentUnderTest>) -> Self {
        self.agent = Some(agent);
        self
    }

    pub async fn provision(&self, manifest: &ProvisionManifest) -> ProvisionReport {
        let mut report = ProvisionReport::new(self.transport.mode());
        info!(mode = %self.transport.mode(), admin = self.options.admin, "Starting provisioning pass");

        if self.options.admin {
            report.secrets = self.provision_secrets().await;
        }

        let api = self.transport.api().clone();
        let owner = Arc::new(OwnerResolver::new(api.clone(), self.config.owner.clone()));

        obs::emit_stage_started("prompts", manifest.prompts.len());
        let prompts = PromptRegistry::new(Arc::clone(&self.transport), Arc::clone(&owner));
        for prompt in &manifest.prompts {
            let result = prompts.provision(prompt).await;
            report.record(ResourceKind::Prompt, &prompt.name, result);
        }

        obs::emit_stage_started("evaluators", manifest.evaluators.len());
        let evaluators = EvaluatorRegistry::new(
            Arc::clone(&self.transport),
            Arc::clone(&owner),
            self.config.project.clone(),
        );
        for evaluator in &manifest.evaluators {
            let result = evaluators.provision(evaluator).await;
            report.record(ResourceKind::Evaluator, &evaluator.name, result);
        }

        if !manifest.experiments.is_empty() {
            self.settle().await;
            obs::emit_stage_started("experiments", manifest.experiments.len());
            self.run_experiments(manifest, &mut report).await;
        }

        if !manifest.queues.is_empty() || !manifest.automations.is_empty() {
            self.settle().await;
        }

        obs::emit_stage_started("queues", manifest.queues.len());
        let queues = QueueRegistry::new(Arc::clone(&self.transport));
        for queue in &manifest.queues {
            let result = queues.provision(queue).await;
            report.record(ResourceKind::Queue, &queue.name, result);
        }

        obs::emit_stage_started("automations", manifest.automations.len());
        let automations =
            AutomationRegistry::new(Arc::clone(&self.transport), self.config.project.clone());
        for automation in &manifest.automations {
            let result = automations.provision(automation).await;
            report.record(ResourceKind::Automation, &automation.name, result);
        }

        info!(
            created = report.created(),
            failures = report.failures(),
            "Provisioning pass finished"
        );
        report
    }

    async fn provision_secrets(&self) -> SecretsStatus {
        let provisioner = SecretProvisioner::new(
            self.transport.api().clone(),
            self.config.model_api_key.clone(),
        );
        match provisioner.provision().await {
            Ok(true) => SecretsStatus::Upserted,
            Ok(false) => SecretsStatus::Skipped,
            Err(e) => {
                tracing::warn!(error = %e, "secret provisioning failed");
                SecretsStatus::Failed(e.to_string())
            }
        }
    }

    async fn run_experiments(&self, manifest: &ProvisionManifest, report: &mut ProvisionReport) {
        let runner = self.agent.as_ref().map(|agent| {
            ExperimentRunner::new(
                Arc::clone(&self.transport),
                Arc::clone(&self.evaluator),
                Arc::clone(agent),
            )
        });

        for experiment in &manifest.experiments {
            let outcome = match &runner {
                Some(runner) => runner.run(experiment).await.map_err(|e| {
                    tracing::warn!(prefix = %experiment.prefix, error = %e, "experiment failed");
                    e.to_string()
                }),
                None => Ok(ExperimentOutcome::Skipped {
                    reason: "no agent under test configured".to_string(),
                }),
            };
            report.experiments.push(ExperimentEntry {
                prefix: experiment.prefix.clone(),
                outcome,
            });
        }
    }

    async fn settle(&self) {
        if !self.options.settle.is_zero() {
            tokio::time::sleep(self.options.settle).await;
        }
    }
}
