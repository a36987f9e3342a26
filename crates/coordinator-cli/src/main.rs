//! `coordinator` - run team coordination against the built-in demo workers
//!
//! ```bash
//! coordinator run "clean this csv and plot the totals" --capability pandas
//! coordinator --config coordinator.toml run "debug my function" --json
//! coordinator types
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use coordinator_cli::{build_registry, render_summary, CliConfig};
use team_coordination::{CoordinationRequest, Coordinator, Lexicon, SynergyTable};
use tracing::info;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to coordinator.toml (built-in workers and defaults otherwise)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Coordinate one request and print the result
    Run {
        /// The request text
        query: String,

        /// Capability at least one team member must declare (repeatable)
        #[arg(long = "capability")]
        capabilities: Vec<String>,

        /// Worker type to put on the team first (repeatable)
        #[arg(long = "prefer")]
        preferred_types: Vec<String>,

        /// Upper bound on team size
        #[arg(long, default_value_t = 3)]
        max_agents: usize,

        /// Group deadline override in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Session to coordinate within
        #[arg(long)]
        session: Option<String>,

        /// Print the full result as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// List configured worker types and their capabilities
    Types,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => CliConfig::load(path)?,
        None => CliConfig::from_env()?,
    };

    match cli.command {
        Command::Types => {
            for spec in &config.workers {
                println!(
                    "{:<16} x{}  confidence {:.2}  [{}]",
                    spec.worker_type,
                    spec.instances,
                    spec.confidence,
                    spec.capabilities.join(", ")
                );
            }
        }
        Command::Run {
            query,
            capabilities,
            preferred_types,
            max_agents,
            timeout_ms,
            session,
            json,
        } => {
            let lexicon = Lexicon::default();
            let registry = build_registry(&config, Arc::new(lexicon.clone()))?;
            info!(workers = registry.len(), "Demo workers started");

            let coordinator = Coordinator::with_tables(
                registry,
                config.coordination.clone(),
                lexicon,
                SynergyTable::default(),
            );

            let mut request = CoordinationRequest::new(query).with_max_agents(max_agents);
            for capability in capabilities {
                request = request.with_capability(capability);
            }
            for worker_type in preferred_types {
                request = request.with_preferred_type(worker_type);
            }
            if let Some(timeout_ms) = timeout_ms {
                request = request.with_timeout_ms(timeout_ms);
            }
            if let Some(session) = session {
                request = request.with_session(session);
            }

            let outcome = coordinator.coordinate(request).await;
            coordinator.shutdown().await;
            let result = outcome.context("Coordination failed")?;

            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&result).context("Failed to encode result")?
                );
            } else {
                print!("{}", render_summary(&result));
            }
        }
    }

    Ok(())
}
