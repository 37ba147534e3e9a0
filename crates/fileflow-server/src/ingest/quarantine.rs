//! Duplicate & error quarantine
//!
//! Offending files are moved under `error/files/<env>/` and get one
//! error-log row each. The lineage tracker drops the file first, so a
//! quarantined name can never surface in a bundle-tracking record.
//!
//! Everything here is best-effort by design: a failed store write or a
//! failed move is logged (and the row still inserted where possible), but
//! never aborts the environment pass.

use fileflow_common::types::ErrorKind;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use super::fsops::{file_name_lossy, move_file, unique_error_path};
use super::lineage::LineageTracker;
use super::runlog::RunLog;
use super::store::{IngestStore, NewErrorLog};

/// Quarantine sink for one (data source, environment) pass.
pub struct Quarantine<'a> {
    data_source: &'a str,
    environment: &'a str,
    error_dir: PathBuf,
    store: &'a dyn IngestStore,
    tracker: &'a LineageTracker,
    error_log: &'a RunLog,
}

impl<'a> Quarantine<'a> {
    pub fn new(
        data_source: &'a str,
        environment: &'a str,
        error_dir: PathBuf,
        store: &'a dyn IngestStore,
        tracker: &'a LineageTracker,
        error_log: &'a RunLog,
    ) -> Self {
        Self {
            data_source,
            environment,
            error_dir,
            store,
            tracker,
            error_log,
        }
    }

    /// Move `path` into the error tree and record one error-log row.
    ///
    /// Lineage is captured before the tracker entry is dropped, so the row
    /// still names the origin folder and root archive. `origin_folder`
    /// overrides the tracker lookup for offenders that never got tracked
    /// (drain-time duplicates). A missing file (extraction debris already
    /// deleted) skips the move but still gets its row.
    pub async fn isolate(&self, path: &Path, kind: ErrorKind, origin_folder: Option<&str>) {
        let name = file_name_lossy(path);

        let folder_path = origin_folder
            .map(str::to_string)
            .or_else(|| self.tracker.folder_of(&name));
        let original_archive = self.tracker.root_archive_of(&name);
        self.tracker.remove(&name);

        let quarantined_name = if path.exists() {
            match self.move_to_error_tree(path, &name) {
                Some(target) => file_name_lossy(&target),
                None => name.clone(),
            }
        } else {
            name.clone()
        };

        self.error_log.write(&format!(
            "{}: quarantined {} (from {})",
            kind, quarantined_name, name
        ));

        let row = NewErrorLog {
            data_source: self.data_source.to_string(),
            environment: self.environment.to_string(),
            error_kind: kind,
            file_name: quarantined_name.clone(),
            folder_path,
            original_archive_file_name: original_archive,
        };
        if let Err(e) = self.store.insert_error_log(row).await {
            warn!(
                data_source = %self.data_source,
                file = %quarantined_name,
                error = %e,
                "Failed to persist error-log row"
            );
        }
    }

    fn move_to_error_tree(&self, path: &Path, name: &str) -> Option<PathBuf> {
        if let Err(e) = fs::create_dir_all(&self.error_dir) {
            warn!(
                dir = %self.error_dir.display(),
                error = %e,
                "Failed to create error directory"
            );
            return None;
        }

        let target = unique_error_path(&self.error_dir, name);
        match move_file(path, &target) {
            Ok(()) => Some(target),
            Err(e) => {
                warn!(
                    file = %path.display(),
                    error = %e,
                    "Failed to move file into the error tree"
                );
                None
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::store::MemoryStore;
    use tempfile::tempdir;

    #[tokio::test]
    async fn isolating_a_tracked_file_records_lineage_and_clears_it() {
        let dir = tempdir().unwrap();
        let temp = dir.path().join("temp");
        let error_dir = dir.path().join("error/files/stage");
        std::fs::create_dir_all(&temp).unwrap();

        let offender = temp.join("readme.txt");
        std::fs::write(&offender, b"hello").unwrap();

        let store = MemoryStore::new();
        let tracker = LineageTracker::new();
        tracker.track_direct("arc.zip", "/srv/in", 0);
        tracker.track_extracted("readme.txt", "arc.zip", 5);

        let error_log = RunLog::new(dir.path().join("error/log"), "orders");
        let quarantine = Quarantine::new(
            "orders",
            "stage",
            error_dir.clone(),
            &store,
            &tracker,
            &error_log,
        );

        quarantine
            .isolate(&offender, ErrorKind::WrongFileType, None)
            .await;

        assert!(!offender.exists());
        assert!(error_dir.join("readme.txt").exists());
        assert!(tracker.info("readme.txt").is_none());

        let rows = store.error_rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].error_kind, "WRONG_FILE_TYPE");
        assert_eq!(rows[0].file_name, "readme.txt");
        assert_eq!(rows[0].folder_path.as_deref(), Some("/srv/in"));
        assert_eq!(
            rows[0].original_archive_file_name.as_deref(),
            Some("arc.zip")
        );
        assert!(!rows[0].solved);
    }

    #[tokio::test]
    async fn missing_offender_still_gets_a_row() {
        let dir = tempdir().unwrap();
        let store = MemoryStore::new();
        let tracker = LineageTracker::new();
        let error_log = RunLog::new(dir.path().join("error/log"), "orders");
        let quarantine = Quarantine::new(
            "orders",
            "stage",
            dir.path().join("error/files/stage"),
            &store,
            &tracker,
            &error_log,
        );

        quarantine
            .isolate(
                &dir.path().join("temp/gone.tar"),
                ErrorKind::ExtractionError,
                Some("/srv/in"),
            )
            .await;

        let rows = store.error_rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].error_kind, "EXTRACTION_ERROR");
        assert_eq!(rows[0].file_name, "gone.tar");
        assert_eq!(rows[0].folder_path.as_deref(), Some("/srv/in"));
        assert_eq!(rows[0].original_archive_file_name, None);
    }

    #[tokio::test]
    async fn repeat_offenders_get_their_own_error_sequence() {
        let dir = tempdir().unwrap();
        let temp = dir.path().join("temp");
        let error_dir = dir.path().join("error/files/stage");
        std::fs::create_dir_all(&temp).unwrap();
        std::fs::create_dir_all(&error_dir).unwrap();
        std::fs::write(error_dir.join("a(1).xml"), b"earlier").unwrap();

        let offender = temp.join("a(1).xml");
        std::fs::write(&offender, b"again").unwrap();

        let store = MemoryStore::new();
        let tracker = LineageTracker::new();
        let error_log = RunLog::new(dir.path().join("error/log"), "orders");
        let quarantine = Quarantine::new(
            "orders",
            "stage",
            error_dir.clone(),
            &store,
            &tracker,
            &error_log,
        );

        quarantine
            .isolate(&offender, ErrorKind::DuplicateFile, Some("/srv/in"))
            .await;

        assert!(error_dir.join("a(2).xml").exists());
        assert_eq!(store.error_rows()[0].file_name, "a(2).xml");
    }
}
