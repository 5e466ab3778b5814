mod report;

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use socialconnect_config::ConfigLoader;
use socialconnect_db::{MigrationRunner, MySqlBackend, PlanReport, socialconnect_plan};
use tracing::{debug, error, warn};
use tracing_subscriber::EnvFilter;

/// Create the SocialConnect database schema and apply pending schema patches.
///
/// Connection settings come from DB_HOST, DB_PORT, DB_USER, DB_PASSWORD,
/// DB_NAME and friends (a `.env` file is honoured), or from the file named by
/// SOCIALCONNECT_CONFIG. Safe to run repeatedly.
#[derive(Parser)]
#[command(name = "socialconnect-migrate", version, about, long_about = None)]
struct Cli {}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let _cli = Cli::parse();
    init_tracing();

    match run().await {
        Ok(report) if report.is_success() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            error!("{e:#}");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Filter used when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str = "info";

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> Result<PlanReport> {
    let config = ConfigLoader::new()
        .load()
        .context("failed to load configuration")?;
    debug!(database = ?config.database, runner = ?config.runner, "configuration loaded");

    let plan = socialconnect_plan().context("invalid migration plan")?;
    let db = &config.database;

    if config.runner.create_database {
        MySqlBackend::ensure_database(db)
            .await
            .with_context(|| format!("failed to create database '{}'", db.database))?;
        println!("Database '{}' is ready.", db.database);
    }

    let backend = MySqlBackend::connect(db)
        .await
        .with_context(|| format!("failed to connect to {}:{}", db.host, db.port))?;
    println!("Connected to {}:{}/{}.", db.host, db.port, db.database);

    let report = MigrationRunner::new(plan)
        .with_policy(config.runner.on_failure)
        .execute(backend)
        .await;

    match serde_json::to_string(&report) {
        Ok(json) => debug!(report = %json, "migration report"),
        Err(e) => warn!("failed to serialize migration report: {e}"),
    }
    report::print_report(&report);
    println!("Connection closed.");
    Ok(report)
}
