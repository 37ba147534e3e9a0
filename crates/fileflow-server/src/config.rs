//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::db::DbConfig;
use crate::ingest::scheduler::DEFAULT_WORKER_PERMITS;

// ============================================================================
// Processing Configuration Constants
// ============================================================================

/// Default root for the per-data-source trees.
pub const DEFAULT_PROCESSING_ROOT: &str = "./processing";

/// Default retention window for backup bundles, in years.
pub const DEFAULT_RETAIN_BACKUP_YEARS: u32 = 5;

/// Default retention window for run logs, in months.
pub const DEFAULT_RETAIN_LOG_MONTHS: u32 = 6;

/// Default pause after closing a bundle, letting the handle settle before
/// the file is tracked and moved.
pub const DEFAULT_BUNDLE_FLUSH_DELAY_MS: u64 = 1_000;

/// Service configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub processing: ProcessingConfig,
    pub database: DbConfig,
}

/// Engine-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Root directory holding one subtree per data source.
    pub root: PathBuf,
    /// Whether finished bundles are offered to the data-lake uploader.
    pub upload_to_datalake: bool,
    /// Backup bundles older than this many years are deleted daily.
    pub retain_backup_years: u32,
    /// Run logs older than this many months are deleted daily.
    pub retain_log_months: u32,
    /// Pause after closing a bundle before tracking and moving it.
    pub bundle_flush_delay_ms: u64,
    /// Width of the per-data-source worker pool.
    pub worker_permits: usize,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_PROCESSING_ROOT),
            upload_to_datalake: false,
            retain_backup_years: DEFAULT_RETAIN_BACKUP_YEARS,
            retain_log_months: DEFAULT_RETAIN_LOG_MONTHS,
            bundle_flush_delay_ms: DEFAULT_BUNDLE_FLUSH_DELAY_MS,
            worker_permits: DEFAULT_WORKER_PERMITS,
        }
    }
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config {
            processing: ProcessingConfig {
                root: std::env::var("FILEFLOW_PROCESSING_ROOT")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from(DEFAULT_PROCESSING_ROOT)),
                upload_to_datalake: std::env::var("FILEFLOW_UPLOAD_TO_DATALAKE")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(false),
                retain_backup_years: std::env::var("FILEFLOW_RETAIN_BACKUP_YEARS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_RETAIN_BACKUP_YEARS),
                retain_log_months: std::env::var("FILEFLOW_RETAIN_LOG_MONTHS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_RETAIN_LOG_MONTHS),
                bundle_flush_delay_ms: std::env::var("FILEFLOW_BUNDLE_FLUSH_DELAY_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_BUNDLE_FLUSH_DELAY_MS),
                worker_permits: std::env::var("FILEFLOW_WORKER_PERMITS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_WORKER_PERMITS),
            },
            database: DbConfig::from_env().unwrap_or_default(),
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.processing.root.as_os_str().is_empty() {
            anyhow::bail!("Processing root cannot be empty");
        }

        if self.processing.worker_permits == 0 {
            anyhow::bail!("Worker pool width must be greater than 0");
        }

        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be greater than 0");
        }

        if self.database.min_connections > self.database.max_connections {
            anyhow::bail!(
                "Database min_connections ({}) cannot be greater than max_connections ({})",
                self.database.min_connections,
                self.database.max_connections
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = Config {
            processing: ProcessingConfig::default(),
            database: DbConfig::default(),
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_workers_are_rejected() {
        let config = Config {
            processing: ProcessingConfig {
                worker_permits: 0,
                ..ProcessingConfig::default()
            },
            database: DbConfig::default(),
        };
        assert!(config.validate().is_err());
    }
}
