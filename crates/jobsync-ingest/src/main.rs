//! Jobsync Ingest - daily job-postings pipeline

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use jobsync_common::logging::{init_logging, LogConfig, LogLevel};
use jobsync_ingest::config::{env_lookup, AppConfig, PipelineConfig, StagingConfig, WarehouseConfig};
use jobsync_ingest::fetcher::AdzunaClient;
use jobsync_ingest::pipeline::{fetch_and_stage, Loader, Pipeline};
use jobsync_ingest::staging::CsvStage;
use jobsync_ingest::warehouse::{MemoryWarehouse, PostgresWarehouse, Warehouse};
use serde::Serialize;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "jobsync-ingest")]
#[command(author, version, about = "Fetch job postings and upsert them into the warehouse")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print the command's report as JSON on stdout
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch, stage, ensure schema, load and merge
    Run {
        #[arg(long, value_enum, default_value_t = Backend::Postgres, env = "JOBSYNC_BACKEND")]
        backend: Backend,

        /// Abort when any page fails after retry
        #[arg(long)]
        fail_on_partial: bool,
    },

    /// Fetch and normalize listings into the CSV stage only
    Fetch {
        #[arg(long)]
        fail_on_partial: bool,
    },

    /// Load an existing CSV stage into the warehouse and merge it
    Load {
        #[arg(long, value_enum, default_value_t = Backend::Postgres, env = "JOBSYNC_BACKEND")]
        backend: Backend,

        /// Staging file, defaults to STAGING_CSV_PATH
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Merge rows left in the warehouse stage by an interrupted run
        #[arg(long, conflicts_with = "csv")]
        resume: bool,
    },

    /// Create the warehouse schema and tables if missing
    EnsureSchema,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Backend {
    Postgres,
    /// In-process tables, discarded on exit
    Memory,
}

async fn open_warehouse(backend: Backend) -> Result<Box<dyn Warehouse>> {
    match backend {
        Backend::Postgres => {
            let config = WarehouseConfig::from_env()?;
            let warehouse = PostgresWarehouse::connect(&config)
                .await
                .context("Failed to connect to warehouse")?;
            Ok(Box::new(warehouse))
        },
        Backend::Memory => Ok(Box::new(MemoryWarehouse::new())),
    }
}

fn print_json<T: Serialize>(enabled: bool, report: &T) -> Result<()> {
    if enabled {
        println!("{}", serde_json::to_string_pretty(report)?);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // Environment variables take precedence over flags
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("jobsync-ingest")
        .build()
        .merge_env()?;

    let _log_guard = init_logging(&log_config)?;

    match cli.command {
        Command::Run {
            backend,
            fail_on_partial,
        } => {
            let config = AppConfig::from_env()?;
            let warehouse = open_warehouse(backend).await?;
            let report = Pipeline::new(&config, warehouse.as_ref())?
                .fail_on_partial(fail_on_partial)
                .run()
                .await?;
            print_json(cli.json, &report)?;
        },
        Command::Fetch { fail_on_partial } => {
            let config = AppConfig::from_env()?;
            let client = AdzunaClient::new(&config.api, config.fetch.retry_backoff())?;
            let stage = CsvStage::new(&config.staging.csv_path);
            let summary = fetch_and_stage(&client, &config.fetch, &stage, fail_on_partial).await?;
            info!(
                normalized = summary.normalized,
                failed_pages = summary.failed_pages.len(),
                path = %summary.staging_path.display(),
                "Fetch complete"
            );
            print_json(cli.json, &summary)?;
        },
        Command::Load { backend, csv, resume } => {
            let pipeline_config = PipelineConfig::from_lookup(&env_lookup)?;
            let listings = if resume {
                None
            } else {
                let path = csv.unwrap_or_else(|| StagingConfig::from_lookup(&env_lookup).csv_path);
                Some(CsvStage::new(path).read()?)
            };

            let warehouse = open_warehouse(backend).await?;
            let loader = Loader::new(warehouse.as_ref(), &pipeline_config);
            loader.ensure_schema().await?;
            let stats = match listings {
                Some(listings) => loader.load_and_merge(&listings, Utc::now()).await?,
                None => loader.merge_staged(Utc::now()).await?,
            };
            print_json(cli.json, &stats)?;
        },
        Command::EnsureSchema => {
            let pipeline_config = PipelineConfig::from_lookup(&env_lookup)?;
            let warehouse = open_warehouse(Backend::Postgres).await?;
            Loader::new(warehouse.as_ref(), &pipeline_config).ensure_schema().await?;
        },
    }

    info!("Done");
    Ok(())
}
