//! rewatch CLI entry point

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use rewatch::{
    commands::{
        cmd_clear, cmd_process, cmd_resume, cmd_stats, cmd_status, print_clear_stats,
        print_process_summary, print_stats, print_status,
    },
    config::Config,
    error::Result,
    persist::{JsonFileStore, SnapshotStore},
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "rewatch")]
#[command(version, about = "Enrich a viewing-history export and summarize it", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process a viewing-history CSV export
    Process {
        /// Path to the exported CSV file
        file: PathBuf,

        /// Discard any existing checkpoint and start over
        #[arg(long)]
        force: bool,
    },

    /// Resume an interrupted processing run
    Resume,

    /// Show statistics from the last completed run
    Stats,

    /// Show config paths and persisted state
    Status,

    /// Remove persisted results and checkpoints
    Clear {
        /// Only drop the checkpoint, keep completed results
        #[arg(long)]
        checkpoint_only: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    // Completions need neither config nor store
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        generate(*shell, &mut cmd, "rewatch", &mut std::io::stdout());
        return Ok(());
    }

    // Load configuration
    let config = match cli.config.as_deref() {
        Some(path) => Config::load(path)?,
        None => Config::load_from(None)?,
    };

    let snapshots: Arc<dyn SnapshotStore> =
        Arc::new(JsonFileStore::new(&config.paths.store_dir));

    match cli.command {
        Commands::Completions { .. } => unreachable!(),

        Commands::Process { file, force } => {
            let summary = cmd_process(&config, snapshots, &file, force).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_process_summary(&summary);
            }
        }

        Commands::Resume => {
            let summary = cmd_resume(&config, snapshots).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_process_summary(&summary);
            }
        }

        Commands::Stats => {
            let run = cmd_stats(snapshots.as_ref()).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&run.stats)?);
            } else {
                print_stats(&run);
            }
        }

        Commands::Status => {
            let status = cmd_status(&config, snapshots.as_ref()).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print_status(&status);
            }
        }

        Commands::Clear { checkpoint_only } => {
            let stats = cmd_clear(snapshots.as_ref(), checkpoint_only).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                print_clear_stats(&stats);
            }
        }
    }

    Ok(())
}
