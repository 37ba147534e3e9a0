//! Per-data-source run log
//!
//! Date-stamped operator-facing log files, separate from the tracing
//! output. One file per day per data source, e.g.
//! `log/orders_2026-08-01.txt`, each line prefixed with a
//! `yyyy:MM:dd HH:mm:ss` timestamp.

use chrono::Local;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use tracing::warn;

const DATE_FORMAT: &str = "%Y-%m-%d";
const LINE_TIMESTAMP_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// Append-only writer for one data source's dated log stream.
#[derive(Debug, Clone)]
pub struct RunLog {
    dir: PathBuf,
    data_source: String,
}

impl RunLog {
    pub fn new(dir: impl Into<PathBuf>, data_source: &str) -> Self {
        Self {
            dir: dir.into(),
            data_source: data_source.to_string(),
        }
    }

    /// Append one line to today's file. Failures are logged, never raised:
    /// run-log writing must not interfere with processing.
    pub fn write(&self, message: &str) {
        if let Err(e) = self.try_write(message) {
            warn!(
                data_source = %self.data_source,
                error = %e,
                "Failed to write run log line"
            );
        }
    }

    fn try_write(&self, message: &str) -> std::io::Result<()> {
        fs::create_dir_all(&self.dir)?;

        let now = Local::now();
        let file_name = format!(
            "{}_{}.txt",
            self.data_source,
            now.format(DATE_FORMAT)
        );

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dir.join(file_name))?;
        writeln!(file, "{}: {}", now.format(LINE_TIMESTAMP_FORMAT), message)
    }
}
