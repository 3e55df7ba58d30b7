use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use hsync_adapters::{
    DestinationAdapter, DryRunDestination, FixtureSource, GarminSource, NotionDestination, SourceAdapter,
};
use hsync_sync::{build_scheduler, ConfigError, RunSummary, SyncConfig, SyncPipeline};
use serde_json::json;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "hsync")]
#[command(about = "Sync daily Garmin Connect health metrics into Notion databases")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Sync the lookback window ending yesterday (default).
    Sync(SyncArgs),
    /// Print a container's title and column catalog as JSON.
    Schema {
        /// steps, sleep, health, activities or records
        target: String,
    },
    /// Run sync on HSYNC_CRON until interrupted.
    Schedule,
}

#[derive(Debug, Default, Args)]
struct SyncArgs {
    /// Sync this single date (YYYY-MM-DD) instead of the lookback window.
    #[arg(long)]
    date: Option<NaiveDate>,
    /// Read and compare, but log writes instead of performing them.
    #[arg(long)]
    dry_run: bool,
    /// Read source payloads from <dir>/<family>/<date>.json instead of Garmin.
    #[arg(long, value_name = "DIR")]
    fixtures: Option<PathBuf>,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();

    let config = match SyncConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {err}");
            return ExitCode::from(2);
        }
    };

    let command = cli.command.unwrap_or_else(|| Commands::Sync(SyncArgs::default()));
    if let Err(err) = check_settings(&command, &config) {
        eprintln!("configuration error: {err}");
        return ExitCode::from(2);
    }
    match run(command, config).await {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            error!(error = %err, "hsync failed");
            eprintln!("error: {err:#}");
            ExitCode::from(1)
        }
    }
}

/// Settings each command needs beyond the Notion token.
fn check_settings(command: &Commands, config: &SyncConfig) -> Result<(), ConfigError> {
    match command {
        Commands::Sync(args) => config.require_sync_settings(args.fixtures.is_none()),
        Commands::Schema { target } => config.container_for(target).map(|_| ()),
        Commands::Schedule => config.require_sync_settings(true),
    }
}

async fn run(command: Commands, config: SyncConfig) -> Result<u8> {
    match command {
        Commands::Sync(args) => sync(args, config).await,
        Commands::Schema { target } => {
            inspect(&target, &config).await?;
            Ok(0)
        }
        Commands::Schedule => {
            schedule(config).await?;
            Ok(0)
        }
    }
}

async fn sync(args: SyncArgs, config: SyncConfig) -> Result<u8> {
    let source: Box<dyn SourceAdapter> = match &args.fixtures {
        Some(dir) => Box::new(FixtureSource::new(dir)),
        None => Box::new(GarminSource::new(config.garmin_config()?)?),
    };
    let notion = NotionDestination::new(config.notion_config())?;
    let destination: Box<dyn DestinationAdapter> = if args.dry_run {
        Box::new(DryRunDestination::new(notion))
    } else {
        Box::new(notion)
    };

    let pipeline = SyncPipeline::new(config, source, destination).with_dry_run(args.dry_run);
    let summary = match args.date {
        Some(date) => pipeline.run_dates(&[date]).await?,
        None => pipeline.run_once().await?,
    };
    print_summary(&summary);
    Ok(u8::try_from(summary.exit_code()).unwrap_or(1))
}

fn print_summary(summary: &RunSummary) {
    for container in &summary.containers {
        match &container.schema_error {
            Some(err) => println!("[{}] skipped: {err}", container.family),
            None => {
                for date in &container.dates {
                    println!("[{}] {}: {}", container.family, date.date, date.outcome);
                }
            }
        }
    }
    if let Some(dir) = &summary.report_dir {
        println!("report: {}", dir.display());
    }
}

async fn inspect(target: &str, config: &SyncConfig) -> Result<()> {
    let container_id = config.container_for(target)?;
    let destination = NotionDestination::new(config.notion_config())?;
    let catalog = destination.retrieve_schema(container_id).await?;

    let properties: serde_json::Map<String, serde_json::Value> = catalog
        .columns
        .iter()
        .map(|c| (c.name.clone(), json!({ "type": c.column_type.as_api_str(), "id": c.id })))
        .collect();
    let out = json!({
        "container": catalog.container_id,
        "title": catalog.title,
        "target": catalog.target,
        "properties": properties,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

async fn schedule(config: SyncConfig) -> Result<()> {
    let cron = config.cron.clone();
    let pipeline = Arc::new(SyncPipeline::from_config(config)?);
    let mut sched = build_scheduler(pipeline, &cron).await?;
    sched.start().await.context("starting scheduler")?;
    info!(%cron, "scheduler running; press Ctrl-C to stop");

    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
    info!("shutting down scheduler");
    sched.shutdown().await.context("stopping scheduler")?;
    Ok(())
}
