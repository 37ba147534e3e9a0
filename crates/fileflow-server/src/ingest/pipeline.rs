//! Per-source ingestion pipeline
//!
//! Processes one data source per invocation: set up the directory tree,
//! then for each environment drain the configured source folders into
//! `temp/<env>/`, run the iterated extraction sweep, quarantine anything
//! that is not a clean `.xml`, bundle the survivors, and ship the bundles
//! to the data lake and the backup tree.
//!
//! Ordering within one (data source, environment) pass is total: drain,
//! sweep, classify, bundle, upload/backup. Environments of the same data
//! source run one after another on disjoint contexts; data sources run in
//! parallel under the scheduler's worker pool.

use anyhow::Result;
use fileflow_common::types::ErrorKind;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::ProcessingConfig;
use crate::db::models::{DataSource, FolderPath};

use super::bundle::{bundle_directory, resolve_max_bundle_bytes};
use super::datalake::DatalakeUploader;
use super::extract::{extract_archive, is_archive_name};
use super::fsops::{file_name_lossy, move_dir_into, move_file_into};
use super::layout::SourceLayout;
use super::lineage::LineageTracker;
use super::quarantine::Quarantine;
use super::runlog::RunLog;
use super::store::IngestStore;

/// Hard cap on extraction sweep iterations, guarding against pathological
/// nesting or self-referential archives.
pub const MAX_SWEEP_ITERATIONS: usize = 100;

/// Pipeline over one data source, shared by all scheduler workers.
pub struct Pipeline {
    store: Arc<dyn IngestStore>,
    uploader: Arc<dyn DatalakeUploader>,
    processing_root: PathBuf,
    upload_to_datalake: bool,
    bundle_flush_delay: Duration,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn IngestStore>,
        uploader: Arc<dyn DatalakeUploader>,
        processing: &ProcessingConfig,
    ) -> Self {
        Self {
            store,
            uploader,
            processing_root: processing.root.clone(),
            upload_to_datalake: processing.upload_to_datalake,
            bundle_flush_delay: Duration::from_millis(processing.bundle_flush_delay_ms),
        }
    }

    /// Process every environment of one data source.
    ///
    /// A failing environment aborts that environment only; the others still
    /// run. `temp/<env>/` is empty on return for every environment that
    /// completed.
    pub async fn run(&self, data_source: &DataSource, folder_paths: &[FolderPath]) -> Result<()> {
        info!(data_source = %data_source.name, "Pipeline pass started");

        let layout = SourceLayout::new(&self.processing_root, &data_source.name);
        layout.ensure()?;

        let run_log = RunLog::new(layout.log_dir(), &data_source.name);
        let error_log = RunLog::new(layout.error_log_dir(), &data_source.name);

        let mut by_environment: BTreeMap<&str, Vec<&FolderPath>> = BTreeMap::new();
        for folder in folder_paths
            .iter()
            .filter(|fp| fp.data_source_id == data_source.id && fp.active)
        {
            by_environment
                .entry(folder.environment.as_str())
                .or_default()
                .push(folder);
        }

        for (environment, folders) in &by_environment {
            if let Err(e) = self
                .run_environment(
                    &data_source.name,
                    environment,
                    folders,
                    &layout,
                    &run_log,
                    &error_log,
                )
                .await
            {
                error!(
                    data_source = %data_source.name,
                    environment = %environment,
                    error = %e,
                    "Environment pass failed"
                );
                error_log.write(&format!("environment {environment} failed: {e:#}"));
            }
        }

        run_log.write("------------------------------------------------------------");
        info!(data_source = %data_source.name, "Pipeline pass finished");
        Ok(())
    }

    async fn run_environment(
        &self,
        data_source: &str,
        environment: &str,
        folders: &[&FolderPath],
        layout: &SourceLayout,
        run_log: &RunLog,
        error_log: &RunLog,
    ) -> Result<()> {
        layout.ensure_env(environment)?;

        let temp = layout.env_temp(environment);
        let tracker = LineageTracker::new();
        let quarantine = Quarantine::new(
            data_source,
            environment,
            layout.env_error_files(environment),
            self.store.as_ref(),
            &tracker,
            error_log,
        );

        self.drain(folders, &temp, &tracker, &quarantine, run_log)
            .await?;
        self.sweep(&temp, &tracker, &quarantine, run_log, error_log)
            .await?;
        self.classify(&temp, &quarantine, error_log).await?;

        let max_bytes = resolve_max_bundle_bytes(self.store.as_ref()).await;
        let bundles = bundle_directory(
            &temp,
            data_source,
            environment,
            &tracker,
            self.store.as_ref(),
            max_bytes,
            self.bundle_flush_delay,
        )
        .await?;
        if !bundles.is_empty() {
            run_log.write(&format!("Total bundles: {}", bundles.len()));
        }

        self.upload_and_archive(
            data_source,
            environment,
            &temp,
            &layout.env_backup(environment),
            run_log,
            error_log,
        )
        .await?;

        Ok(())
    }

    /// Move every top-level entry of the configured folders into temp.
    /// Directories move wholesale; files are tracked as direct. Name
    /// collisions isolate the newcomer.
    async fn drain(
        &self,
        folders: &[&FolderPath],
        temp: &Path,
        tracker: &LineageTracker,
        quarantine: &Quarantine<'_>,
        run_log: &RunLog,
    ) -> Result<()> {
        run_log.write("Start moving files into temp folder");

        for folder in folders {
            let source = Path::new(&folder.folder_path);
            let entries = match fs::read_dir(source) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(
                        folder = %folder.folder_path,
                        error = %e,
                        "Source folder unavailable; skipping"
                    );
                    run_log.write(&format!("skipped unavailable folder {}", folder.folder_path));
                    continue;
                },
            };

            let mut moved_count = 0usize;
            for entry in entries {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        warn!(folder = %folder.folder_path, error = %e, "Unreadable entry");
                        continue;
                    },
                };
                let path = entry.path();

                if path.is_dir() {
                    match move_dir_into(&path, temp) {
                        Ok(_) => moved_count += 1,
                        Err(e) => warn!(
                            entry = %path.display(),
                            error = %e,
                            "Failed to move directory into temp"
                        ),
                    }
                    continue;
                }

                let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
                match move_file_into(&path, temp) {
                    Ok(moved) if moved.collided => {
                        quarantine
                            .isolate(
                                &moved.path,
                                ErrorKind::DuplicateFile,
                                Some(&folder.folder_path),
                            )
                            .await;
                        moved_count += 1;
                    },
                    Ok(moved) => {
                        tracker.track_direct(
                            &file_name_lossy(&moved.path),
                            &folder.folder_path,
                            size,
                        );
                        moved_count += 1;
                    },
                    Err(e) => warn!(
                        entry = %path.display(),
                        error = %e,
                        "Failed to move file into temp"
                    ),
                }
            }

            if moved_count > 0 {
                run_log.write(&format!(
                    "Moved {moved_count} entries from {}",
                    folder.folder_path
                ));
            }
        }

        run_log.write("End moving files into temp folder");
        Ok(())
    }

    /// Iterated extraction sweep: re-list temp each round, flatten
    /// directories and expand archives until only plain files remain, or
    /// the iteration cap trips.
    async fn sweep(
        &self,
        temp: &Path,
        tracker: &LineageTracker,
        quarantine: &Quarantine<'_>,
        run_log: &RunLog,
        error_log: &RunLog,
    ) -> Result<()> {
        for _ in 1..=MAX_SWEEP_ITERATIONS {
            let mut directories = Vec::new();
            let mut archives = Vec::new();
            for entry in fs::read_dir(temp)? {
                let entry = entry?;
                let path = entry.path();
                if entry.file_type()?.is_dir() {
                    directories.push(path);
                } else if is_archive_name(&file_name_lossy(&path)) {
                    archives.push(path);
                }
            }

            if directories.is_empty() && archives.is_empty() {
                return Ok(());
            }

            for dir in directories {
                self.flatten_directory(&dir, temp, tracker, quarantine, error_log)
                    .await?;
            }
            for archive in archives {
                if archive.exists() {
                    self.extract_with_quarantine(&archive, tracker, quarantine, error_log)
                        .await;
                }
            }
        }

        warn!(
            temp = %temp.display(),
            iterations = MAX_SWEEP_ITERATIONS,
            "Sweep iteration cap reached; leaving remaining entries for the next tick"
        );
        run_log.write("sweep iteration cap reached");
        Ok(())
    }

    /// Move the plain files of a drained directory up to the temp root,
    /// expand any archives where they sit, and drop directories that have
    /// emptied out. Deeper leftovers are picked up on the next sweep round.
    async fn flatten_directory(
        &self,
        dir: &Path,
        temp: &Path,
        tracker: &LineageTracker,
        quarantine: &Quarantine<'_>,
        error_log: &RunLog,
    ) -> Result<()> {
        let mut pending = vec![dir.to_path_buf()];
        let mut visited = Vec::new();
        let mut files = Vec::new();
        let mut archives = Vec::new();

        while let Some(current) = pending.pop() {
            visited.push(current.clone());
            for entry in fs::read_dir(&current)? {
                let entry = entry?;
                let path = entry.path();
                if entry.file_type()?.is_dir() {
                    pending.push(path);
                } else if is_archive_name(&file_name_lossy(&path)) {
                    archives.push(path);
                } else {
                    files.push(path);
                }
            }
        }

        for file in files {
            match move_file_into(&file, temp) {
                Ok(moved) if moved.collided => {
                    quarantine
                        .isolate(&moved.path, ErrorKind::DuplicateFile, None)
                        .await;
                },
                Ok(_) => {},
                Err(e) => warn!(
                    file = %file.display(),
                    error = %e,
                    "Failed to move file up from directory"
                ),
            }
        }

        for archive in archives {
            self.extract_with_quarantine(&archive, tracker, quarantine, error_log)
                .await;
        }

        // Deepest first; non-empty directories stay for the next round.
        for dir in visited.iter().rev() {
            let _ = fs::remove_dir(dir);
        }

        Ok(())
    }

    async fn extract_with_quarantine(
        &self,
        archive: &Path,
        tracker: &LineageTracker,
        quarantine: &Quarantine<'_>,
        error_log: &RunLog,
    ) {
        match extract_archive(archive, tracker) {
            Ok(outcome) => {
                for collision in outcome.collisions {
                    quarantine
                        .isolate(&collision, ErrorKind::DuplicateFile, None)
                        .await;
                }
                for failure in outcome.failures {
                    error_log.write(&format!(
                        "failed to extract {}: {}",
                        file_name_lossy(&failure.path),
                        failure.error
                    ));
                    quarantine
                        .isolate(&failure.path, ErrorKind::ExtractionError, None)
                        .await;
                }
            },
            Err(e) => {
                warn!(
                    archive = %archive.display(),
                    error = %e,
                    "Archive extraction failed"
                );
                error_log.write(&format!(
                    "failed to extract {}: {}",
                    file_name_lossy(archive),
                    e
                ));
                quarantine
                    .isolate(archive, ErrorKind::ExtractionError, None)
                    .await;
            },
        }
    }

    /// Quarantine every top-level survivor that is not an `.xml` file.
    async fn classify(
        &self,
        temp: &Path,
        quarantine: &Quarantine<'_>,
        error_log: &RunLog,
    ) -> Result<()> {
        let mut offenders = Vec::new();
        for entry in fs::read_dir(temp)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = file_name_lossy(&entry.path());
            if !name.to_lowercase().ends_with(".xml") {
                offenders.push(entry.path());
            }
        }

        for path in offenders {
            error_log.write(&format!(
                "unsupported file format: {}",
                file_name_lossy(&path)
            ));
            quarantine
                .isolate(&path, ErrorKind::WrongFileType, None)
                .await;
        }

        Ok(())
    }

    /// Hand each finished bundle to the data lake (when enabled), then move
    /// it into the backup tree and record where it went.
    async fn upload_and_archive(
        &self,
        data_source: &str,
        environment: &str,
        temp: &Path,
        backup: &Path,
        run_log: &RunLog,
        error_log: &RunLog,
    ) -> Result<()> {
        let mut outputs = Vec::new();
        for entry in fs::read_dir(temp)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                outputs.push(entry.path());
            }
        }

        for path in outputs {
            let name = file_name_lossy(&path);

            if self.upload_to_datalake {
                run_log.write(&format!("Starting datalake transfer: {name}"));
                match self.uploader.upload(environment, data_source, &path).await {
                    Ok(()) => {
                        if let Err(e) = self.store.update_upload_status(&name, true).await {
                            warn!(bundle = %name, error = %e, "Failed to record upload status");
                        }
                        run_log.write(&format!("Finished datalake transfer: {name}"));
                    },
                    Err(e) => {
                        error!(bundle = %name, error = %e, "Datalake upload failed");
                        error_log.write(&format!("datalake upload failed for {name}: {e}"));
                    },
                }
            }

            match move_file_into(&path, backup) {
                Ok(moved) => {
                    let backup_path = moved.path.to_string_lossy().into_owned();
                    if let Err(e) = self.store.update_backup_path(&name, &backup_path).await {
                        warn!(bundle = %name, error = %e, "Failed to record backup path");
                    }
                    run_log.write(&format!("Moved {name} to backup folder"));
                },
                Err(e) => {
                    error!(bundle = %name, error = %e, "Failed to move bundle to backup");
                    error_log.write(&format!("backup move failed for {name}: {e}"));
                },
            }
        }

        Ok(())
    }
}
