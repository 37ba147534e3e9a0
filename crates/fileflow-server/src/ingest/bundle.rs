//! Output bundling
//!
//! Packs the surviving working files into size-capped zip archives named
//! `<data_source>_<yyyyMMddTHHmmss>.zip`. One bundle-tracking row is
//! emitted per closed archive, carrying the full lineage payload from the
//! tracker.
//!
//! The byte cap comes from the `MAX_ZIP_SIZE` setting (megabytes). The cap
//! comparison is strictly greater-than: a file that exactly fills the cap
//! still joins the current bundle, and a single file larger than the cap is
//! bundled alone.

use fileflow_common::{FlowError, Result};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use super::fsops::{file_name_lossy, unique_path};
use super::lineage::LineageTracker;
use super::store::{IngestStore, NewBundle};

/// Fallback bundle cap when the setting is missing or unusable.
pub const DEFAULT_MAX_BUNDLE_MB: i64 = 1;

/// Settings key holding the cap in megabytes.
pub const MAX_BUNDLE_SIZE_KEY: &str = "MAX_ZIP_SIZE";

const BYTES_PER_MB: i64 = 1_048_576;

const BUNDLE_TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S";

/// Resolve the bundle byte cap from settings.
///
/// Missing row, unparseable value, zero and negative all fall back to the
/// 1 MB default; the configured value is interpreted as megabytes.
pub async fn resolve_max_bundle_bytes(store: &dyn IngestStore) -> u64 {
    let raw = match store.setting(MAX_BUNDLE_SIZE_KEY).await {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "Failed to read {MAX_BUNDLE_SIZE_KEY}; using default");
            None
        },
    };

    let megabytes = match raw.as_deref().map(str::parse::<i64>) {
        Some(Ok(mb)) if mb > 0 => mb,
        Some(_) => {
            warn!(
                value = raw.as_deref().unwrap_or(""),
                "Invalid {MAX_BUNDLE_SIZE_KEY} value; using default"
            );
            DEFAULT_MAX_BUNDLE_MB
        },
        None => DEFAULT_MAX_BUNDLE_MB,
    };

    (megabytes * BYTES_PER_MB) as u64
}

struct OpenBundle {
    writer: ZipWriter<File>,
    path: PathBuf,
    name: String,
    file_names: Vec<String>,
    bytes: u64,
}

/// Bundle every file in `temp_env` into capped zip archives.
///
/// Inputs are consumed in directory-listing order and deleted as they are
/// appended. Returns the names of the bundles created; an empty directory
/// produces no bundle and no tracking row.
pub async fn bundle_directory(
    temp_env: &Path,
    data_source: &str,
    environment: &str,
    tracker: &LineageTracker,
    store: &dyn IngestStore,
    max_bytes: u64,
    flush_delay: Duration,
) -> Result<Vec<String>> {
    let mut inputs = Vec::new();
    for entry in fs::read_dir(temp_env)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            inputs.push((entry.path(), entry.metadata()?.len()));
        }
    }

    if inputs.is_empty() {
        debug!(data_source, environment, "Nothing to bundle");
        return Ok(Vec::new());
    }

    let mut bundles = Vec::new();
    let mut current: Option<OpenBundle> = None;

    for (path, size) in inputs {
        let over_cap = current
            .as_ref()
            .map(|b| b.bytes + size > max_bytes)
            .unwrap_or(false);
        if over_cap {
            if let Some(bundle) = current.take() {
                let name =
                    finalize_bundle(bundle, data_source, environment, tracker, store, flush_delay)
                        .await?;
                bundles.push(name);
            }
        }

        if current.is_none() {
            current = Some(open_bundle(temp_env, data_source)?);
        }
        if let Some(bundle) = current.as_mut() {
            let name = file_name_lossy(&path);
            bundle
                .writer
                .start_file(name.as_str(), SimpleFileOptions::default())
                .map_err(|e| FlowError::archive(&bundle.name, e))?;
            let mut input = File::open(&path)?;
            io::copy(&mut input, &mut bundle.writer)
                .map_err(|e| FlowError::archive(&bundle.name, format!("append failed: {e}")))?;

            fs::remove_file(&path)?;
            bundle.file_names.push(name);
            bundle.bytes += size;
        }
    }

    if let Some(bundle) = current.take() {
        let name =
            finalize_bundle(bundle, data_source, environment, tracker, store, flush_delay).await?;
        bundles.push(name);
    }

    info!(
        data_source,
        environment,
        bundles = bundles.len(),
        "Bundling finished"
    );
    Ok(bundles)
}

fn open_bundle(temp_env: &Path, data_source: &str) -> Result<OpenBundle> {
    let preferred = format!(
        "{}_{}.zip",
        data_source,
        chrono::Local::now().format(BUNDLE_TIMESTAMP_FORMAT)
    );
    // Two bundles closed within the same second would collide on the
    // timestamp; the uniqueness rule keeps the newcomer distinct.
    let path = unique_path(temp_env, &preferred);
    let name = file_name_lossy(&path);

    debug!(bundle = %name, "Opening output bundle");
    let writer = ZipWriter::new(File::create(&path)?);
    Ok(OpenBundle {
        writer,
        path,
        name,
        file_names: Vec::new(),
        bytes: 0,
    })
}

/// Close the archive, wait for the handle to settle, and emit its
/// bundle-tracking row. A failed row insert is logged and swallowed:
/// lineage persistence never aborts ingestion.
async fn finalize_bundle(
    bundle: OpenBundle,
    data_source: &str,
    environment: &str,
    tracker: &LineageTracker,
    store: &dyn IngestStore,
    flush_delay: Duration,
) -> Result<String> {
    let OpenBundle {
        writer,
        path,
        name,
        file_names,
        ..
    } = bundle;

    writer
        .finish()
        .map_err(|e| FlowError::archive(&name, format!("close failed: {e}")))?;
    tokio::time::sleep(flush_delay).await;

    let bundle_size = fs::metadata(&path)?.len();
    let files_info: Vec<_> = file_names
        .iter()
        .filter_map(|file| tracker.info(file))
        .collect();

    let row = NewBundle {
        final_archive_name: name.clone(),
        data_source: data_source.to_string(),
        environment: environment.to_string(),
        source_folder_paths: tracker.source_folders(),
        files_info: files_info.clone(),
        bundle_size_bytes: bundle_size as i64,
        total_files_count: files_info.len() as i32,
    };

    if let Err(e) = store.insert_bundle_tracking(row).await {
        warn!(
            bundle = %name,
            error = %e,
            "Failed to persist bundle-tracking row"
        );
    } else {
        info!(
            bundle = %name,
            files = files_info.len(),
            bytes = bundle_size,
            "Bundle tracked"
        );
    }

    Ok(name)
}
