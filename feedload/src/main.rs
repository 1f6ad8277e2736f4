mod app;
mod auth;
mod ingest;
mod mapper;
mod model;
mod pipeline;
mod store;

use clap::Parser;
use feedload_core::{telemetry, Config};
use std::path::PathBuf;
use std::process;
use tracing::{error, info};

#[derive(Parser)]
#[clap(name = "feedload")]
#[clap(about = "Daily Reddit listing loader: fetch, replace today's rows, load", version)]
struct Cli {
    /// Config file to layer over the defaults (feedload.toml is used if present)
    #[clap(long, env = "FEEDLOAD_CONFIG")]
    config: Option<PathBuf>,

    /// Fetch and map every source but leave the database alone
    #[clap(long)]
    dry_run: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    if let Err(e) = run().await {
        error!(error = %e, stage = fatal_stage(&e), "Fatal error");
        process::exit(1);
    }
}

/// Stage of a run error; anything that is not a pipeline error happened at startup.
fn fatal_stage(error: &anyhow::Error) -> &'static str {
    error
        .downcast_ref::<feedload_core::Error>()
        .map_or("startup", feedload_core::Error::stage)
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration; fall back to default logging so the failure is visible
    let mut config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            telemetry::init(&Config::default().telemetry)?;
            anyhow::bail!("Failed to load config: {}", e);
        }
    };

    if cli.dry_run {
        config.pipeline.dry_run = true;
    }

    // Initialize telemetry
    telemetry::init(&config.telemetry)?;

    info!(
        sources = config.sources.len(),
        atomic_load = config.pipeline.atomic_load,
        dry_run = config.pipeline.dry_run,
        "Starting daily load"
    );

    let app = app::App::new(&config).await?;
    let summary = app.run().await?;

    info!(
        date = %summary.run_date,
        tables = summary.tables_loaded,
        fetched = summary.rows_fetched,
        deleted = summary.rows_deleted,
        inserted = summary.rows_inserted,
        dry_run = summary.dry_run,
        "Run complete"
    );

    Ok(())
}
