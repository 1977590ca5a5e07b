//! metro-ingest - load source extracts into the raw layer

use anyhow::Result;
use clap::{ArgGroup, Parser};
use metro_common::logging::{init_logging, LogConfig, LogLevel};
use metro_ingest::{db, IngestConfig, IngestOptions, IngestOrchestrator};
use std::process::ExitCode;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "metro-ingest")]
#[command(author, version, about = "Ingest CSV extracts into the MetroRetail raw layer")]
#[command(group(ArgGroup::new("target").required(true).args(["file", "all", "check"])))]
struct Cli {
    /// Single file to ingest (e.g. erp_products.csv)
    #[arg(long, value_name = "FILE_NAME")]
    file: Option<String>,

    /// Ingest every registered file
    #[arg(long)]
    all: bool,

    /// Only verify the warehouse connection
    #[arg(long)]
    check: bool,

    /// Truncate destination tables before insert
    #[arg(long, conflicts_with = "check")]
    truncate: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("metro-ingest")
        .build();

    // Environment variables take precedence over flags
    let _guard = match log_config.merge_env().and_then(|c| init_logging(&c)) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("metro-ingest: failed to initialise logging: {:#}", e);
            return ExitCode::FAILURE;
        },
    };

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!(error = %format!("{:#}", e), "Ingestion aborted");
            ExitCode::FAILURE
        },
    }
}

async fn run(cli: Cli) -> Result<bool> {
    let config = IngestConfig::from_env()?;

    if cli.check {
        let pool = db::create_pool(&config.database).await?;
        db::ping(&pool).await?;
        info!(url = %config.database.url, "Database connection test successful");
        return Ok(true);
    }

    let orchestrator = IngestOrchestrator::connect(&config).await?;
    let options = IngestOptions {
        truncate: cli.truncate,
    };

    if let Some(file_name) = cli.file {
        return Ok(match orchestrator.ingest_one(&file_name, options).await {
            Ok(report) => {
                info!(
                    file = %report.file_name,
                    table = %report.destination_table,
                    batch_id = %report.batch_id,
                    rows = report.rows_loaded,
                    "Ingestion complete"
                );
                true
            },
            Err(e) => {
                error!(file = %file_name, kind = ?e.kind(), error = %e, "Ingestion failed");
                false
            },
        });
    }

    let summary = orchestrator.ingest_all(options).await;
    Ok(summary.all_succeeded())
}
