//! PostgreSQL implementation of the engine's store contract
//!
//! Thin sqlx layer over the five core tables. Write-path failures surface
//! as [`FlowError::Database`]; the engine logs and swallows them so lineage
//! persistence can never abort ingestion.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fileflow_common::FlowError;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use crate::ingest::store::{IngestStore, NewBundle, NewErrorLog};

use super::models::{BundleTrackingRow, DataSource, FolderPath};

/// How many timestamp-derived error-log ids to try before falling back to a
/// random one.
const ERROR_ID_ATTEMPTS: usize = 5;

/// Production store backed by the service database.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Generate a unique error-log id.
    ///
    /// Ids are `FTEL<epoch-millis>`; on collision (bursts of offenders in
    /// the same millisecond) the generator re-reads the clock a few times,
    /// then falls back to a random suffix.
    async fn generate_error_id(&self) -> Result<String, FlowError> {
        for _ in 0..ERROR_ID_ATTEMPTS {
            let candidate = format!("FTEL{}", Utc::now().timestamp_millis());
            let exists: bool =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM error_log WHERE id = $1)")
                    .bind(&candidate)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(|e| FlowError::database("generate_error_id", e))?;

            if !exists {
                return Ok(candidate);
            }
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }

        Ok(format!("FTEL{}", Uuid::new_v4().simple()))
    }
}

#[async_trait]
impl IngestStore for PgStore {
    async fn active_data_sources(&self) -> Result<Vec<DataSource>, FlowError> {
        sqlx::query_as::<_, DataSource>(
            r#"
            SELECT id, name, active
            FROM data_source
            WHERE active = TRUE
            ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| FlowError::database("active_data_sources", e))
    }

    async fn active_folder_paths(
        &self,
        data_source_id: i64,
    ) -> Result<Vec<FolderPath>, FlowError> {
        sqlx::query_as::<_, FolderPath>(
            r#"
            SELECT id, data_source_id, environment, folder_path, active
            FROM folder_path
            WHERE data_source_id = $1 AND active = TRUE
            ORDER BY environment, folder_path
            "#,
        )
        .bind(data_source_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| FlowError::database("active_folder_paths", e))
    }

    async fn setting(&self, key: &str) -> Result<Option<String>, FlowError> {
        sqlx::query_scalar::<_, String>("SELECT value FROM setting WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| FlowError::database("setting", e))
    }

    async fn insert_error_log(&self, row: NewErrorLog) -> Result<(), FlowError> {
        let id = self.generate_error_id().await?;
        debug!(id = %id, file = %row.file_name, "Inserting error-log row");

        sqlx::query(
            r#"
            INSERT INTO error_log (
                id, data_source, environment, error_kind, file_name,
                folder_path, original_archive_file_name, solved, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, FALSE, NOW())
            "#,
        )
        .bind(&id)
        .bind(&row.data_source)
        .bind(&row.environment)
        .bind(row.error_kind.as_str())
        .bind(&row.file_name)
        .bind(&row.folder_path)
        .bind(&row.original_archive_file_name)
        .execute(&self.pool)
        .await
        .map_err(|e| FlowError::database("insert_error_log", e))?;

        Ok(())
    }

    async fn insert_bundle_tracking(&self, row: NewBundle) -> Result<(), FlowError> {
        let source_folder_paths = serde_json::to_value(&row.source_folder_paths)?;
        let files_info = serde_json::to_value(&row.files_info)?;

        sqlx::query(
            r#"
            INSERT INTO bundle_tracking (
                id, final_archive_name, data_source, environment,
                source_folder_paths, files_info, bundle_size_bytes,
                total_files_count, created_at, backup_path, uploaded_to_datalake
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW(), NULL, FALSE)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&row.final_archive_name)
        .bind(&row.data_source)
        .bind(&row.environment)
        .bind(source_folder_paths)
        .bind(files_info)
        .bind(row.bundle_size_bytes)
        .bind(row.total_files_count)
        .execute(&self.pool)
        .await
        .map_err(|e| FlowError::database("insert_bundle_tracking", e))?;

        Ok(())
    }

    async fn update_backup_path(
        &self,
        final_archive_name: &str,
        backup_path: &str,
    ) -> Result<(), FlowError> {
        // Archive names are timestamped and effectively unique; if
        // duplicates ever exist, the latest row wins.
        sqlx::query(
            r#"
            UPDATE bundle_tracking
            SET backup_path = $2
            WHERE id = (
                SELECT id FROM bundle_tracking
                WHERE final_archive_name = $1
                ORDER BY created_at DESC
                LIMIT 1
            )
            "#,
        )
        .bind(final_archive_name)
        .bind(backup_path)
        .execute(&self.pool)
        .await
        .map_err(|e| FlowError::database("update_backup_path", e))?;

        Ok(())
    }

    async fn update_upload_status(
        &self,
        final_archive_name: &str,
        uploaded: bool,
    ) -> Result<(), FlowError> {
        sqlx::query(
            r#"
            UPDATE bundle_tracking
            SET uploaded_to_datalake = $2
            WHERE id = (
                SELECT id FROM bundle_tracking
                WHERE final_archive_name = $1
                ORDER BY created_at DESC
                LIMIT 1
            )
            "#,
        )
        .bind(final_archive_name)
        .bind(uploaded)
        .execute(&self.pool)
        .await
        .map_err(|e| FlowError::database("update_upload_status", e))?;

        Ok(())
    }

    async fn bundles_for_data_source(
        &self,
        data_source: &str,
    ) -> Result<Vec<BundleTrackingRow>, FlowError> {
        sqlx::query_as::<_, BundleTrackingRow>(
            r#"
            SELECT id, final_archive_name, data_source, environment,
                   source_folder_paths, files_info, bundle_size_bytes,
                   total_files_count, created_at, backup_path, uploaded_to_datalake
            FROM bundle_tracking
            WHERE data_source = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(data_source)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| FlowError::database("bundles_for_data_source", e))
    }

    async fn bundles_for_environment(
        &self,
        data_source: &str,
        environment: &str,
    ) -> Result<Vec<BundleTrackingRow>, FlowError> {
        sqlx::query_as::<_, BundleTrackingRow>(
            r#"
            SELECT id, final_archive_name, data_source, environment,
                   source_folder_paths, files_info, bundle_size_bytes,
                   total_files_count, created_at, backup_path, uploaded_to_datalake
            FROM bundle_tracking
            WHERE data_source = $1 AND environment = $2
            ORDER BY created_at DESC
            "#,
        )
        .bind(data_source)
        .bind(environment)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| FlowError::database("bundles_for_environment", e))
    }

    async fn bundles_created_after(
        &self,
        created_after: DateTime<Utc>,
    ) -> Result<Vec<BundleTrackingRow>, FlowError> {
        sqlx::query_as::<_, BundleTrackingRow>(
            r#"
            SELECT id, final_archive_name, data_source, environment,
                   source_folder_paths, files_info, bundle_size_bytes,
                   total_files_count, created_at, backup_path, uploaded_to_datalake
            FROM bundle_tracking
            WHERE created_at > $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(created_after)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| FlowError::database("bundles_created_after", e))
    }
}
