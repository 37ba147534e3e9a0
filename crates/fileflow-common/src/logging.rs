//! Logging setup
//!
//! One tracing subscriber for the whole service: console output for the
//! operator, plus an optional daily-rolled file stream for the host. The
//! surface is deliberately narrow — the service has exactly two sinks and
//! one per-module filter string, overridable through `FILEFLOW_LOG_*`
//! variables.
//!
//! The per-data-source run logs under `<data_source>/log/` are a separate,
//! domain-mandated artifact and are not written through tracing.
//!
//! Use the structured macros (`debug!`, `info!`, `warn!`, `error!`) with
//! fields rather than `println!`:
//!
//! ```rust,ignore
//! tracing::info!(data_source = %name, environment = %env, "pass completed");
//! ```

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default directory for the rolled service log files.
pub const DEFAULT_LOG_DIR: &str = "./logs";

/// Subscriber configuration for one fileflow binary.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Base severity for everything not named in `filter`.
    pub level: Level,
    /// Per-module directives layered over the base level, e.g. "sqlx=warn".
    pub filter: Option<String>,
    /// Mirror log lines into a daily-rolled file next to console output.
    pub log_to_file: bool,
    /// Directory receiving the rolled files.
    pub log_dir: PathBuf,
    /// Rolled file prefix ("fileflow-server" -> `fileflow-server.2026-08-01`).
    pub file_prefix: String,
}

impl LogConfig {
    /// Baseline for a service binary: info-level console logging with the
    /// given per-module directives, no file stream.
    pub fn for_service(file_prefix: &str, filter: &str) -> Self {
        Self {
            level: Level::INFO,
            filter: Some(filter.to_string()),
            log_to_file: false,
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            file_prefix: file_prefix.to_string(),
        }
    }

    /// Apply environment overrides on top of the baseline:
    ///
    /// - `FILEFLOW_LOG_LEVEL`: base severity (trace, debug, info, warn, error)
    /// - `FILEFLOW_LOG_FILTER`: replaces the per-module directives
    /// - `FILEFLOW_LOG_TO_FILE`: also write daily-rolled files (true/false)
    /// - `FILEFLOW_LOG_DIR`: directory for the rolled files
    pub fn from_env(mut self) -> Result<Self> {
        if let Ok(level) = std::env::var("FILEFLOW_LOG_LEVEL") {
            self.level = level
                .parse()
                .with_context(|| format!("Invalid FILEFLOW_LOG_LEVEL '{level}'"))?;
        }
        if let Ok(filter) = std::env::var("FILEFLOW_LOG_FILTER") {
            self.filter = Some(filter);
        }
        if let Ok(value) = std::env::var("FILEFLOW_LOG_TO_FILE") {
            self.log_to_file = value.parse().unwrap_or(false);
        }
        if let Ok(dir) = std::env::var("FILEFLOW_LOG_DIR") {
            self.log_dir = PathBuf::from(dir);
        }
        Ok(self)
    }

    fn env_filter(&self) -> Result<EnvFilter> {
        let mut filter = EnvFilter::from_default_env().add_directive(self.level.into());
        if let Some(ref directives) = self.filter {
            for directive in directives.split(',') {
                let directive = directive.trim();
                filter = filter.add_directive(
                    directive
                        .parse()
                        .with_context(|| format!("Invalid log directive '{directive}'"))?,
                );
            }
        }
        Ok(filter)
    }
}

/// Install the global subscriber. Call once at startup.
pub fn init_logging(config: &LogConfig) -> Result<()> {
    let filter = config.env_filter()?;
    let console = fmt::layer().with_writer(std::io::stdout).with_target(true);
    let registry = tracing_subscriber::registry().with(filter).with(console);

    if config.log_to_file {
        std::fs::create_dir_all(&config.log_dir).context("Failed to create log directory")?;
        let appender = tracing_appender::rolling::daily(&config.log_dir, &config.file_prefix);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        // The guard flushes on drop; keep it for the process lifetime.
        std::mem::forget(guard);

        registry
            .with(fmt::layer().with_writer(writer).with_ansi(false))
            .try_init()?;
    } else {
        registry.try_init()?;
    }

    Ok(())
}
