//! Retention sweeps
//!
//! Backup bundles carry a `yyyyMMddTHHmmss` stamp and run logs a
//! `yyyy-MM-dd` date, both embedded between the last underscore and the
//! extension. The daily tick deletes whatever is older than the configured
//! retention window. Files whose names do not parse are left alone, and the
//! error tree is never touched.

use anyhow::Result;
use chrono::{DateTime, Local, Months, NaiveDate, NaiveDateTime};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

use super::fsops::file_name_lossy;
use super::layout::SourceLayout;

const BACKUP_STAMP_FORMAT: &str = "%Y%m%dT%H%M%S";
const LOG_STAMP_FORMAT: &str = "%Y-%m-%d";

/// Delete backup bundles older than `retain_years`, across all environment
/// subdirectories. Returns the number of files removed.
pub fn delete_old_backups(
    layout: &SourceLayout,
    retain_years: u32,
    now: DateTime<Local>,
) -> Result<usize> {
    let Some(cutoff) = now.checked_sub_months(Months::new(retain_years * 12)) else {
        return Ok(0);
    };
    let cutoff = cutoff.naive_local();

    let mut deleted = 0;
    for env_entry in fs::read_dir(layout.backup())? {
        let env_entry = env_entry?;
        if !env_entry.file_type()?.is_dir() {
            continue;
        }

        for entry in fs::read_dir(env_entry.path())? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }

            let name = file_name_lossy(&entry.path());
            let Some(stamp) = embedded_stamp(&name) else {
                debug!(file = %name, "No embedded timestamp; skipping");
                continue;
            };
            let Ok(timestamp) = NaiveDateTime::parse_from_str(stamp, BACKUP_STAMP_FORMAT) else {
                debug!(file = %name, "Unparseable timestamp; skipping");
                continue;
            };

            if timestamp < cutoff {
                match fs::remove_file(entry.path()) {
                    Ok(()) => deleted += 1,
                    Err(e) => warn!(
                        file = %entry.path().display(),
                        error = %e,
                        "Failed to delete old backup"
                    ),
                }
            }
        }
    }

    Ok(deleted)
}

/// Delete run logs older than `retain_months`. Returns the number of files
/// removed. Only the success log directory is swept; error logs are
/// operator-facing artifacts and stay.
pub fn delete_old_logs(
    layout: &SourceLayout,
    retain_months: u32,
    now: DateTime<Local>,
) -> Result<usize> {
    let Some(cutoff) = now.date_naive().checked_sub_months(Months::new(retain_months)) else {
        return Ok(0);
    };

    let mut deleted = 0;
    for entry in fs::read_dir(layout.log_dir())? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }

        let name = file_name_lossy(&entry.path());
        let Some(stamp) = embedded_stamp(&name) else {
            debug!(file = %name, "No embedded date; skipping");
            continue;
        };
        let Ok(date) = NaiveDate::parse_from_str(stamp, LOG_STAMP_FORMAT) else {
            debug!(file = %name, "Unparseable date; skipping");
            continue;
        };

        if date < cutoff {
            match fs::remove_file(entry.path()) {
                Ok(()) => deleted += 1,
                Err(e) => warn!(
                    file = %entry.path().display(),
                    error = %e,
                    "Failed to delete old run log"
                ),
            }
        }
    }

    Ok(deleted)
}

/// The segment between the last underscore and the last dot:
/// `orders_20260801T090000.zip` -> `20260801T090000`.
fn embedded_stamp(name: &str) -> Option<&str> {
    let start = name.rfind('_')? + 1;
    let end = name.rfind('.')?;
    if start < end {
        Some(&name[start..end])
    } else {
        None
    }
}
