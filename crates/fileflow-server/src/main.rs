//! Fileflow Server - Main entry point

use anyhow::Result;
use fileflow_common::logging::{init_logging, LogConfig};
use std::sync::Arc;
use tokio::signal;
use tracing::info;

use fileflow_server::config::Config;
use fileflow_server::db::{self, PgStore};
use fileflow_server::ingest::{LoggingUploader, Pipeline, Scheduler};

#[tokio::main]
async fn main() -> Result<()> {
    // Console logging by default; FILEFLOW_LOG_* overrides from the
    // environment take precedence
    let log_config =
        LogConfig::for_service("fileflow-server", "fileflow_server=debug,sqlx=warn").from_env()?;
    init_logging(&log_config)?;

    info!("Starting Fileflow Server");

    // Load configuration
    let config = Config::load()?;
    info!(
        "Configuration loaded - processing root {}",
        config.processing.root.display()
    );

    // Initialize database connection pool
    let pool = db::create_pool(&config.database).await?;
    info!("Database connection pool established");

    // Apply schema migrations before the scheduler starts ticking
    db::run_migrations(&pool).await?;

    // Wire the engine: Postgres-backed store, stubbed data-lake uploader
    let store = Arc::new(PgStore::new(pool));
    let uploader = Arc::new(LoggingUploader);
    let pipeline = Arc::new(Pipeline::new(
        store.clone(),
        uploader,
        &config.processing,
    ));

    let scheduler = Arc::new(Scheduler::new(store, pipeline, &config.processing));
    let handle = scheduler.start();
    info!("Scheduler started (ingestion every minute, housekeeping daily)");

    // Run until interrupted
    signal::ctrl_c().await?;
    info!("Shutdown signal received, stopping");

    handle.ingestion.abort();
    handle.housekeeping.abort();

    Ok(())
}
