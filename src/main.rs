use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use migration::Migrator;
use sea_orm_migration::MigratorTrait;
use tracing::{error, info};

use revsync::config::ConfigLoader;
use revsync::db;
use revsync::logging;
use revsync::orchestrator::Orchestrator;
use revsync::source::{self, EntityKind};

/// Incremental warehouse-to-operational-store replication pipeline.
#[derive(Debug, Parser)]
#[command(name = "revsync", version, about)]
struct Cli {
    /// Directory holding the layered .env files (defaults to the working
    /// directory).
    #[arg(long)]
    env_dir: Option<PathBuf>,

    /// Restrict the run to a comma-separated subset of entity types
    /// (calls, transcripts, speakers, emails, opportunities).
    #[arg(long, value_delimiter = ',')]
    entities: Vec<EntityKind>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            error!(error = %err, "pipeline run aborted");
            eprintln!("revsync: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<bool> {
    let loader = match cli.env_dir {
        Some(dir) => ConfigLoader::with_base_dir(dir),
        None => ConfigLoader::new(),
    };
    let config = loader.load()?;
    logging::init_subscriber(&config);
    info!(config = %config.redacted_json()?, "configuration loaded");

    let dest = Arc::new(db::init_dest_pool(&config).await?);
    db::health_check(dest.as_ref()).await?;
    Migrator::up(dest.as_ref(), None).await?;
    let source_pool = Arc::new(db::init_source_pool(&config).await?);
    db::health_check(source_pool.as_ref()).await?;

    let mut readers = source::warehouse_readers(source_pool, &config.source_schema);
    if !cli.entities.is_empty() {
        readers.retain(|reader| cli.entities.contains(&reader.entity()));
    }

    let orchestrator = Orchestrator::new(dest, readers, config);
    let summary = orchestrator.run().await?;
    Ok(summary.is_full_success())
}
