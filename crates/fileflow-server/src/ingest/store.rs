//! Persistence contract for the ingestion engine
//!
//! The pipeline never talks to PostgreSQL directly; everything goes through
//! [`IngestStore`]. The production implementation is
//! [`crate::db::PgStore`]; [`MemoryStore`] backs the test suites and dry
//! runs.
//!
//! Store failures on the write path are logged and swallowed by the
//! callers: lineage tracking must never abort ingestion.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fileflow_common::types::{ErrorKind, FileInfo};
use fileflow_common::FlowError;
use std::collections::BTreeSet;
use std::sync::Mutex;
use uuid::Uuid;

use crate::db::models::{BundleTrackingRow, DataSource, ErrorLogRow, FolderPath};

/// New error-log row, before the store assigns id and timestamp.
#[derive(Debug, Clone)]
pub struct NewErrorLog {
    pub data_source: String,
    pub environment: String,
    pub error_kind: ErrorKind,
    pub file_name: String,
    pub folder_path: Option<String>,
    pub original_archive_file_name: Option<String>,
}

/// New bundle-tracking row, before the store assigns id and timestamp.
#[derive(Debug, Clone)]
pub struct NewBundle {
    pub final_archive_name: String,
    pub data_source: String,
    pub environment: String,
    pub source_folder_paths: BTreeSet<String>,
    pub files_info: Vec<FileInfo>,
    pub bundle_size_bytes: i64,
    pub total_files_count: i32,
}

/// Read/write contract between the engine and persistence.
#[async_trait]
pub trait IngestStore: Send + Sync {
    // Catalog reads
    async fn active_data_sources(&self) -> Result<Vec<DataSource>, FlowError>;
    async fn active_folder_paths(&self, data_source_id: i64)
        -> Result<Vec<FolderPath>, FlowError>;
    async fn setting(&self, key: &str) -> Result<Option<String>, FlowError>;

    // Lineage writes
    async fn insert_error_log(&self, row: NewErrorLog) -> Result<(), FlowError>;
    async fn insert_bundle_tracking(&self, row: NewBundle) -> Result<(), FlowError>;

    /// Set the backup path on the bundle row with this archive name; when
    /// duplicates exist, the latest row wins.
    async fn update_backup_path(
        &self,
        final_archive_name: &str,
        backup_path: &str,
    ) -> Result<(), FlowError>;

    /// Flip the data-lake upload flag, latest row wins on duplicates.
    async fn update_upload_status(
        &self,
        final_archive_name: &str,
        uploaded: bool,
    ) -> Result<(), FlowError>;

    // Tracking reads
    async fn bundles_for_data_source(
        &self,
        data_source: &str,
    ) -> Result<Vec<BundleTrackingRow>, FlowError>;
    async fn bundles_for_environment(
        &self,
        data_source: &str,
        environment: &str,
    ) -> Result<Vec<BundleTrackingRow>, FlowError>;
    async fn bundles_created_after(
        &self,
        created_after: DateTime<Utc>,
    ) -> Result<Vec<BundleTrackingRow>, FlowError>;
}

// ============================================================================
// In-memory implementation
// ============================================================================

/// In-memory store for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    data_sources: Vec<DataSource>,
    folder_paths: Vec<FolderPath>,
    settings: Vec<(String, String)>,
    errors: Vec<ErrorLogRow>,
    bundles: Vec<BundleTrackingRow>,
    next_id: i64,
    error_seq: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_data_source(&self, name: &str) -> i64 {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.next_id += 1;
        let id = state.next_id;
        state.data_sources.push(DataSource {
            id,
            name: name.to_string(),
            active: true,
        });
        id
    }

    pub fn add_folder_path(&self, data_source_id: i64, environment: &str, folder_path: &str) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.next_id += 1;
        let id = state.next_id;
        state.folder_paths.push(FolderPath {
            id,
            data_source_id,
            environment: environment.to_string(),
            folder_path: folder_path.to_string(),
            active: true,
        });
    }

    pub fn set_setting(&self, key: &str, value: &str) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.settings.retain(|(k, _)| k != key);
        state.settings.push((key.to_string(), value.to_string()));
    }

    pub fn error_rows(&self) -> Vec<ErrorLogRow> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.errors.clone()
    }

    pub fn bundle_rows(&self) -> Vec<BundleTrackingRow> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.bundles.clone()
    }
}

#[async_trait]
impl IngestStore for MemoryStore {
    async fn active_data_sources(&self) -> Result<Vec<DataSource>, FlowError> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        Ok(state
            .data_sources
            .iter()
            .filter(|ds| ds.active)
            .cloned()
            .collect())
    }

    async fn active_folder_paths(
        &self,
        data_source_id: i64,
    ) -> Result<Vec<FolderPath>, FlowError> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        Ok(state
            .folder_paths
            .iter()
            .filter(|fp| fp.data_source_id == data_source_id && fp.active)
            .cloned()
            .collect())
    }

    async fn setting(&self, key: &str) -> Result<Option<String>, FlowError> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        Ok(state
            .settings
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone()))
    }

    async fn insert_error_log(&self, row: NewErrorLog) -> Result<(), FlowError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.error_seq += 1;
        let id = format!("FTEL{:08}", state.error_seq);
        state.errors.push(ErrorLogRow {
            id,
            data_source: row.data_source,
            environment: row.environment,
            error_kind: row.error_kind.as_str().to_string(),
            file_name: row.file_name,
            folder_path: row.folder_path,
            original_archive_file_name: row.original_archive_file_name,
            solved: false,
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn insert_bundle_tracking(&self, row: NewBundle) -> Result<(), FlowError> {
        let source_folder_paths = serde_json::to_value(&row.source_folder_paths)?;
        let files_info = serde_json::to_value(&row.files_info)?;

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.bundles.push(BundleTrackingRow {
            id: Uuid::new_v4(),
            final_archive_name: row.final_archive_name,
            data_source: row.data_source,
            environment: row.environment,
            source_folder_paths,
            files_info,
            bundle_size_bytes: row.bundle_size_bytes,
            total_files_count: row.total_files_count,
            created_at: Utc::now(),
            backup_path: None,
            uploaded_to_datalake: false,
        });
        Ok(())
    }

    async fn update_backup_path(
        &self,
        final_archive_name: &str,
        backup_path: &str,
    ) -> Result<(), FlowError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(row) = state
            .bundles
            .iter_mut()
            .rev()
            .find(|b| b.final_archive_name == final_archive_name)
        {
            row.backup_path = Some(backup_path.to_string());
        }
        Ok(())
    }

    async fn update_upload_status(
        &self,
        final_archive_name: &str,
        uploaded: bool,
    ) -> Result<(), FlowError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(row) = state
            .bundles
            .iter_mut()
            .rev()
            .find(|b| b.final_archive_name == final_archive_name)
        {
            row.uploaded_to_datalake = uploaded;
        }
        Ok(())
    }

    async fn bundles_for_data_source(
        &self,
        data_source: &str,
    ) -> Result<Vec<BundleTrackingRow>, FlowError> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        Ok(state
            .bundles
            .iter()
            .filter(|b| b.data_source == data_source)
            .cloned()
            .collect())
    }

    async fn bundles_for_environment(
        &self,
        data_source: &str,
        environment: &str,
    ) -> Result<Vec<BundleTrackingRow>, FlowError> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        Ok(state
            .bundles
            .iter()
            .filter(|b| b.data_source == data_source && b.environment == environment)
            .cloned()
            .collect())
    }

    async fn bundles_created_after(
        &self,
        created_after: DateTime<Utc>,
    ) -> Result<Vec<BundleTrackingRow>, FlowError> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        Ok(state
            .bundles
            .iter()
            .filter(|b| b.created_at > created_after)
            .cloned()
            .collect())
    }
}
