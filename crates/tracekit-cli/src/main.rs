//! Tracekit CLI
//!
//! The `tracekit` command reconciles a provisioning manifest against the
//! tracing platform and runs the experiments it declares.
//!
//! ## Commands
//!
//! - `provision`: Create missing prompts, evaluators, queues and automations,
//!   then run experiments
//! - `validate`: Check a manifest without touching the network
//! - `align`: Count unmatched steps between two trajectories

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use tracekit_core::domain::config::ENV_AGENT_URL;
use tracekit_core::{
    align, HttpAgent, Orchestrator, PlatformConfig, ProvisionManifest, ProvisionOptions,
    ProvisionReport, Trajectory,
};
use tracekit_wire::{PlatformApi, TransportMode};

#[derive(Parser)]
#[command(name = "tracekit")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Provisioning and experiment tooling for a tracing platform", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision every resource in a manifest, then run its experiments
    Provision {
        /// Path to the provisioning manifest (JSON)
        #[arg(short, long)]
        manifest: PathBuf,

        /// Use direct REST calls instead of the native client
        #[arg(long)]
        use_api: bool,

        /// Also upsert workspace secrets (requires admin rights)
        #[arg(long)]
        admin: bool,

        /// Seconds to wait between dependent stages
        #[arg(long, default_value = "3")]
        settle_secs: u64,

        /// Endpoint of the agent under test
        #[arg(long, env = ENV_AGENT_URL)]
        agent_url: Option<String>,
    },

    /// Validate a manifest without calling the platform
    Validate {
        /// Path to the provisioning manifest (JSON)
        manifest: PathBuf,
    },

    /// Count observed steps that are not part of the reference trajectory
    Align {
        /// Observed tool names, comma separated
        #[arg(long, value_delimiter = ',')]
        observed: Vec<String>,

        /// Reference tool names, comma separated
        #[arg(long, value_delimiter = ',')]
        reference: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    tracekit_core::init_tracing(cli.json, tracekit_core::telemetry::default_level(cli.verbose));

    match cli.command {
        Commands::Provision {
            manifest,
            use_api,
            admin,
            settle_secs,
            agent_url,
        } => {
            let mut config = PlatformConfig::from_env();
            if let Some(url) = agent_url {
                config = config.with_agent_url(url);
            }
            let api = config.connect().context("Failed to build platform client")?;
            let mode = if use_api {
                TransportMode::Direct
            } else {
                TransportMode::Native
            };
            let options = ProvisionOptions {
                admin,
                settle: Duration::from_secs(settle_secs),
            };
            let report = cmd_provision(api, config, &manifest, mode, options).await?;
            print_report(&report);
            if report.failures() > 0 {
                anyhow::bail!("{} item(s) failed to provision", report.failures());
            }
            Ok(())
        }
        Commands::Validate { manifest } => cmd_validate(&manifest),
        Commands::Align {
            observed,
            reference,
        } => {
            println!("{}", cmd_align(&observed, &reference));
            Ok(())
        }
    }
}

fn load_manifest(path: &Path) -> Result<ProvisionManifest> {
    ProvisionManifest::from_path(path)
        .with_context(|| format!("Failed to load manifest {}", path.display()))
}

async fn cmd_provision(
    api: PlatformApi,
    config: PlatformConfig,
    manifest_path: &Path,
    mode: TransportMode,
    options: ProvisionOptions,
) -> Result<ProvisionReport> {
    let manifest = load_manifest(manifest_path)?;
    if manifest.is_empty() {
        info!("Manifest {} declares nothing", manifest_path.display());
    }

    let mut orchestrator = Orchestrator::new(api, config.clone(), mode, options);
    if let Some(url) = &config.agent_url {
        let agent = HttpAgent::new(url.as_str()).context("Failed to build agent client")?;
        orchestrator = orchestrator.with_agent(Arc::new(agent));
    }

    Ok(orchestrator.provision(&manifest).await)
}

fn cmd_validate(path: &Path) -> Result<()> {
    let manifest = load_manifest(path)?;
    println!("Manifest OK: {}", path.display());
    println!("  prompts:     {}", manifest.prompts.len());
    println!("  evaluators:  {}", manifest.evaluators.len());
    println!("  queues:      {}", manifest.queues.len());
    println!("  automations: {}", manifest.automations.len());
    println!("  experiments: {}", manifest.experiments.len());
    Ok(())
}

fn cmd_align(observed: &[String], reference: &[String]) -> usize {
    let observed = steps(observed);
    let reference = steps(reference);
    align(observed.steps(), reference.steps())
}

/// Comma-split arguments to a trajectory. Blank segments are dropped.
fn steps(args: &[String]) -> Trajectory {
    Trajectory::new(args.iter().map(|s| s.trim()).filter(|s| !s.is_empty()))
}

fn print_report(report: &ProvisionReport) {
    println!("Provisioned via {}", report.mode);
    for line in report.summary_lines() {
        println!("  {}", line);
    }
    println!(
        "{} created, {} failed",
        report.created(),
        report.failures()
    );
}
