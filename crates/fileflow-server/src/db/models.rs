//! Database models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::FromRow;
use uuid::Uuid;

/// A logical ingest target. Read-only to the engine.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DataSource {
    pub id: i64,
    pub name: String,
    pub active: bool,
}

/// A physical directory drained on each tick, partitioned by environment.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FolderPath {
    pub id: i64,
    pub data_source_id: i64,
    pub environment: String,
    pub folder_path: String,
    pub active: bool,
}

/// Named scalar setting. The engine reads `MAX_ZIP_SIZE` (megabytes).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Setting {
    pub key: String,
    pub value: String,
}

/// One quarantined file.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ErrorLogRow {
    pub id: String,
    pub data_source: String,
    pub environment: String,
    pub error_kind: String,
    pub file_name: String,
    pub folder_path: Option<String>,
    /// Root archive per the lineage tracker, null for direct-from-folder
    /// offenders.
    pub original_archive_file_name: Option<String>,
    pub solved: bool,
    pub created_at: DateTime<Utc>,
}

/// One finished output bundle with its full lineage payload.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BundleTrackingRow {
    pub id: Uuid,
    pub final_archive_name: String,
    pub data_source: String,
    pub environment: String,
    /// JSON array of every source folder that contributed to the pass.
    pub source_folder_paths: JsonValue,
    /// JSON array of `FileInfo` entries for the bundled files.
    pub files_info: JsonValue,
    pub bundle_size_bytes: i64,
    pub total_files_count: i32,
    pub created_at: DateTime<Utc>,
    pub backup_path: Option<String>,
    pub uploaded_to_datalake: bool,
}
