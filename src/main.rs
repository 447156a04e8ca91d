//! Graph Maintenance - command line runner
//!
//! Runs one maintenance job against Neo4j and prints its outcome as JSON.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use graph_maintenance::neo4j::Scope;
use graph_maintenance::scheduler::TaskOutcome;
use graph_maintenance::{AppState, Config};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "graph-maintenance")]
#[command(about = "Maintenance jobs for course knowledge graphs")]
struct Cli {
    /// Path to the YAML config file (default: ./config.yaml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge duplicate concepts
    Merge(ScopeArgs),
    /// Score concept importance and write PageRank attributes
    Importance(ScopeArgs),
    /// Detect topic communities and write community attributes
    Communities(ScopeArgs),
}

#[derive(Args)]
struct ScopeArgs {
    /// Course scope
    #[arg(long, conflicts_with = "note", required_unless_present = "note")]
    course: Option<String>,

    /// Note scope
    #[arg(long)]
    note: Option<String>,

    /// Note that triggered the job (defaults to the note scope id)
    #[arg(long)]
    note_id: Option<String>,
}

impl ScopeArgs {
    fn resolve(self) -> Result<(Scope, String)> {
        match (self.course, self.note) {
            (Some(course), None) => {
                let note_id = self
                    .note_id
                    .context("--note-id is required with --course")?;
                Ok((Scope::course(course), note_id))
            }
            (None, Some(note)) => {
                let note_id = self.note_id.unwrap_or_else(|| note.clone());
                Ok((Scope::note(note), note_id))
            }
            _ => anyhow::bail!("exactly one of --course or --note is required"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,graph_maintenance=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = Config::from_yaml_and_env(cli.config.as_deref())?;

    let state = AppState::new(config).await?;
    tracing::info!("Connected to Neo4j");

    let outcome = match cli.command {
        Commands::Merge(args) => {
            let (scope, note_id) = args.resolve()?;
            state.maintenance.merge_entities(&scope, note_id).await
        }
        Commands::Importance(args) => {
            let (scope, note_id) = args.resolve()?;
            state.maintenance.compute_importance(&scope, note_id).await
        }
        Commands::Communities(args) => {
            let (scope, note_id) = args.resolve()?;
            state.maintenance.detect_communities(&scope, note_id).await
        }
    };
    state.shutdown().await;

    println!(
        "{}",
        serde_json::to_string_pretty(&outcome).context("Failed to serialize outcome")?
    );

    if let TaskOutcome::Failed(message) = outcome {
        anyhow::bail!("maintenance job failed: {message}");
    }
    Ok(())
}
