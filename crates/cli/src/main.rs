//! `dagrun` CLI entry-point.
//!
//! Available sub-commands:
//! - `validate` — validate a workflow definition JSON file.
//! - `run`      — drive a scripted scenario end-to-end in memory.

mod config;
mod logging;
mod scenario;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use crate::config::AppConfig;
use crate::scenario::Scenario;

#[derive(Parser)]
#[command(name = "dagrun", about = "Workflow orchestration engine", version)]
struct Cli {
    /// Optional TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a workflow definition JSON file.
    Validate {
        /// Path to the workflow JSON file.
        path: PathBuf,
    },
    /// Run a scenario: catalog, workflow, trigger payload and worker results.
    Run {
        /// Path to the scenario JSON file.
        scenario: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;
    logging::init(&config.log)?;

    match cli.command {
        Command::Validate { path } => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("cannot read file {}", path.display()))?;
            let definition: engine::WorkflowDefinition =
                serde_json::from_str(&content).context("invalid workflow JSON")?;
            let workflow = engine::Workflow::try_from(definition).context("validation failed")?;
            println!(
                "Workflow '{}' version {} is valid. Execution order: {:?}",
                workflow.workflow_ref(),
                workflow.version(),
                workflow.topological_order()
            );
        }
        Command::Run { scenario } => {
            let scenario = Scenario::from_file(&scenario)?;
            info!("running scenario for workflow '{}'", scenario.workflow.workflow_ref);
            let report = scenario::run(scenario, &config.engine).await?;
            print!("{report}");
        }
    }
    Ok(())
}
