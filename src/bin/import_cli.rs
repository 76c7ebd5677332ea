//! `shiftsync-cli`: the CLI surface for the import pipeline.
//!
//! A single `import` verb: ODS path, hospital id, acting-user id, and an
//! optional month window. Exits 0 on success — even when Phase 2 or Phase 3
//! degraded — and non-zero only on a Phase 1 failure or cancellation.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use chrono::{Months, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use shiftsync_import::config::ImportConfig;
use shiftsync_import::error::PipelineError;
use shiftsync_import::orchestrator::{run_import, ImportRequest};
use shiftsync_import::repository::SqliteRepository;

#[derive(Parser, Debug)]
#[command(name = "shiftsync-cli", version, about = "Radiology shift schedule import pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import a schedule: parse the ODS file, scrape Amion, compute coverage.
    Import(ImportArgs),
}

#[derive(clap::Args, Debug)]
struct ImportArgs {
    /// Path to the ODS spreadsheet to import.
    #[arg(long)]
    ods: PathBuf,
    /// Hospital the schedule belongs to.
    #[arg(long)]
    hospital_id: Uuid,
    /// The acting user recorded on every created/updated row's audit trail.
    #[arg(long)]
    acting_user: Uuid,
    /// Base URL of the Amion scheduling UI to scrape.
    #[arg(long)]
    amion_base_url: String,
    /// First month to scrape, as YYYY-MM. Defaults to the current month.
    #[arg(long)]
    start_month: Option<String>,
    /// Number of consecutive months to scrape.
    #[arg(long, default_value_t = 1)]
    months: usize,
    /// Path to the TOML config file.
    #[arg(long, default_value = "./shiftsync.toml")]
    config: PathBuf,
}

fn parse_start_month(raw: &str) -> anyhow::Result<(i32, u32)> {
    let date = NaiveDate::parse_from_str(&format!("{raw}-01"), "%Y-%m-%d")?;
    Ok((date.format("%Y").to_string().parse()?, date.format("%m").to_string().parse()?))
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("shiftsync_import=info")),
        )
        .init();

    let cli = Cli::parse();
    let Command::Import(args) = cli.command;

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(run(args))
}

async fn run(args: ImportArgs) -> ExitCode {
    let ods_bytes = match std::fs::read(&args.ods) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("failed to read ODS file {}: {e}", args.ods.display());
            return ExitCode::FAILURE;
        }
    };

    let config = match ImportConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("failed to load config {}: {e}", args.config.display());
            return ExitCode::FAILURE;
        }
    };

    let repo = match SqliteRepository::open(&config.database.path) {
        Ok(r) => Arc::new(r),
        Err(e) => {
            eprintln!("failed to open database {}: {e}", config.database.path);
            return ExitCode::FAILURE;
        }
    };

    let today = Utc::now();
    let start_month = match args.start_month.as_deref() {
        Some(raw) => match parse_start_month(raw) {
            Ok(ym) => ym,
            Err(e) => {
                eprintln!("invalid --start-month '{raw}': {e}");
                return ExitCode::FAILURE;
            }
        },
        None => (today.format("%Y").to_string().parse().unwrap(), today.format("%m").to_string().parse().unwrap()),
    };

    let effective_start = today;
    let effective_end = today + Months::new(args.months.max(1) as u32);

    let request = ImportRequest {
        hospital_id: args.hospital_id,
        ods_bytes,
        amion_base_url: args.amion_base_url,
        start_month,
        month_count: args.months.max(1),
        effective_start,
        effective_end,
        acting_user: args.acting_user,
    };

    let token = CancellationToken::new();
    match run_import(repo.as_ref(), &config, request, &token).await {
        Ok(result) => {
            if result.validation.is_valid() {
                println!("import succeeded: schedule_version={}", result.schedule_version.id);
            } else {
                println!(
                    "import completed with {} error(s), {} warning(s): schedule_version={}",
                    result.validation.errors.len(),
                    result.validation.warnings.len(),
                    result.schedule_version.id
                );
            }
            if let Some(batch) = &result.scrape_batch {
                println!("scrape_batch={} state={}", batch.id, batch.state.as_str());
            }
            if let Some(coverage) = &result.coverage {
                println!("coverage_calculation={} positions={}", coverage.id, coverage.coverage_by_position.len());
            }
            ExitCode::SUCCESS
        }
        Err(e) if e.is_fatal_input() => {
            eprintln!("phase 1 (ODS import) failed: {e}");
            ExitCode::FAILURE
        }
        Err(PipelineError::Cancelled) => {
            eprintln!("import cancelled");
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("import failed: {e}");
            ExitCode::FAILURE
        }
    }
}
