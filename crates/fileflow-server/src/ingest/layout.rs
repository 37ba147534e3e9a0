//! Per-data-source directory layout
//!
//! Every data source owns a tree under the processing root:
//!
//! ```text
//! <processing_root>/<data_source>/
//!     temp/<env>/          transient working files
//!     backup/<env>/        finished bundles, retained per policy
//!     log/                 date-stamped run logs
//!     error/files/<env>/   quarantined offenders
//!     error/log/           date-stamped error run logs
//! ```

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

const TEMP_DIR: &str = "temp";
const BACKUP_DIR: &str = "backup";
const LOG_DIR: &str = "log";
const ERROR_DIR: &str = "error";
const FILES_DIR: &str = "files";

/// Resolved directory tree for one data source.
#[derive(Debug, Clone)]
pub struct SourceLayout {
    data_source: String,
    base: PathBuf,
}

impl SourceLayout {
    pub fn new(processing_root: &Path, data_source: &str) -> Self {
        Self {
            data_source: data_source.to_string(),
            base: processing_root.join(data_source),
        }
    }

    pub fn data_source(&self) -> &str {
        &self.data_source
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn temp(&self) -> PathBuf {
        self.base.join(TEMP_DIR)
    }

    pub fn backup(&self) -> PathBuf {
        self.base.join(BACKUP_DIR)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.base.join(LOG_DIR)
    }

    pub fn error_files(&self) -> PathBuf {
        self.base.join(ERROR_DIR).join(FILES_DIR)
    }

    pub fn error_log_dir(&self) -> PathBuf {
        self.base.join(ERROR_DIR).join(LOG_DIR)
    }

    pub fn env_temp(&self, environment: &str) -> PathBuf {
        self.temp().join(environment)
    }

    pub fn env_backup(&self, environment: &str) -> PathBuf {
        self.backup().join(environment)
    }

    pub fn env_error_files(&self, environment: &str) -> PathBuf {
        self.error_files().join(environment)
    }

    /// Create the whole tree. Idempotent; called once per pipeline
    /// invocation before any work.
    pub fn ensure(&self) -> Result<()> {
        for dir in [
            self.base.clone(),
            self.temp(),
            self.backup(),
            self.log_dir(),
            self.error_files(),
            self.error_log_dir(),
        ] {
            fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create directory {}", dir.display()))?;
        }
        Ok(())
    }

    /// Create the per-environment working directories.
    pub fn ensure_env(&self, environment: &str) -> Result<()> {
        for dir in [self.env_temp(environment), self.env_backup(environment)] {
            fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create directory {}", dir.display()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn ensure_creates_full_tree_and_is_idempotent() {
        let root = tempdir().unwrap();
        let layout = SourceLayout::new(root.path(), "orders");

        layout.ensure().unwrap();
        layout.ensure().unwrap();

        assert!(root.path().join("orders/temp").is_dir());
        assert!(root.path().join("orders/backup").is_dir());
        assert!(root.path().join("orders/log").is_dir());
        assert!(root.path().join("orders/error/files").is_dir());
        assert!(root.path().join("orders/error/log").is_dir());
    }

    #[test]
    fn ensure_env_creates_partitioned_dirs() {
        let root = tempdir().unwrap();
        let layout = SourceLayout::new(root.path(), "orders");
        layout.ensure().unwrap();
        layout.ensure_env("stage").unwrap();

        assert!(root.path().join("orders/temp/stage").is_dir());
        assert!(root.path().join("orders/backup/stage").is_dir());
    }
}
