//! Recursive archive extraction
//!
//! Expands zip, tar, gzipped tar (`.tar.gz` / `.tz`) and 7z archives into
//! the archive's own directory, recursing into any nested archives the
//! entries turn out to be. Every written file is registered with the
//! lineage tracker under the name it actually landed with.
//!
//! Two outcomes are collected rather than raised, because the pass must
//! keep going:
//!
//! - entries whose preferred name was taken land under a `(n)` suffix and
//!   are reported as collisions for the quarantine step;
//! - nested archives that fail to expand are reported as failures and left
//!   on disk, so the sweep can quarantine them with their own identity.
//!
//! The archive file itself is deleted only after it extracted completely.
//! A failed archive stays where it is.
//!
//! Self-referential archives (an entry carrying the archive's own name)
//! terminate through the same collision rule: the re-entrant entry collides
//! with the still-open, not-yet-deleted archive file, lands under a `(n)`
//! suffix, and is queued for quarantine instead of being recursed into. The
//! sweep's iteration cap remains the outer safeguard.

use fileflow_common::{FlowError, Result};
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

use super::fsops::{file_name_lossy, move_file, unique_path};
use super::lineage::LineageTracker;

/// Suffixes recognized as compressed archives (matched case-insensitively).
pub const ARCHIVE_SUFFIXES: &[&str] = &[".zip", ".tar", ".tar.gz", ".tz", ".7z"];

/// Whether a file name denotes a compressed archive.
pub fn is_archive_name(name: &str) -> bool {
    let lower = name.to_lowercase();
    ARCHIVE_SUFFIXES.iter().any(|s| lower.ends_with(s))
}

/// A nested archive that could not be expanded.
#[derive(Debug)]
pub struct NestedFailure {
    pub path: PathBuf,
    pub error: FlowError,
}

/// What an extraction pass produced besides the files themselves.
#[derive(Debug, Default)]
pub struct ExtractOutcome {
    /// Newly written files whose preferred name was taken; slated for
    /// duplicate quarantine.
    pub collisions: Vec<PathBuf>,
    /// Nested archives left on disk after failing to expand.
    pub failures: Vec<NestedFailure>,
}

impl ExtractOutcome {
    fn merge(&mut self, other: ExtractOutcome) {
        self.collisions.extend(other.collisions);
        self.failures.extend(other.failures);
    }
}

/// Extract `archive` into its parent directory and delete it on success.
///
/// Returns an error when the archive itself cannot be read; whatever
/// entries already landed on disk stay there for the next sweep iteration.
pub fn extract_archive(archive: &Path, tracker: &LineageTracker) -> Result<ExtractOutcome> {
    let name = file_name_lossy(archive);
    let lower = name.to_lowercase();
    let dest = archive.parent().unwrap_or(Path::new(".")).to_path_buf();

    debug!(archive = %archive.display(), "Extracting archive");

    let mut outcome = ExtractOutcome::default();
    if lower.ends_with(".zip") {
        extract_zip(archive, &dest, &name, tracker, &mut outcome)?;
    } else if lower.ends_with(".tar.gz") || lower.ends_with(".tz") {
        extract_gzipped_tar(archive, &dest, &name, tracker, &mut outcome)?;
    } else if lower.ends_with(".tar") {
        let file = File::open(archive)?;
        extract_tar_stream(file, &dest, &name, tracker, &mut outcome)?;
    } else if lower.ends_with(".7z") {
        extract_sevenz(archive, &dest, &name, tracker, &mut outcome)?;
    } else {
        return Err(FlowError::archive(&name, "unsupported archive suffix"));
    }

    fs::remove_file(archive)?;
    Ok(outcome)
}

fn extract_zip(
    archive: &Path,
    dest: &Path,
    archive_name: &str,
    tracker: &LineageTracker,
    outcome: &mut ExtractOutcome,
) -> Result<()> {
    let file = File::open(archive)?;
    let mut zip =
        zip::ZipArchive::new(file).map_err(|e| FlowError::archive(archive_name, e))?;

    for index in 0..zip.len() {
        let mut entry = zip
            .by_index(index)
            .map_err(|e| FlowError::archive(archive_name, e))?;

        let Some(rel) = entry.enclosed_name() else {
            warn!(
                archive = %archive_name,
                entry = %entry.name(),
                "Skipping zip entry with unsafe path"
            );
            continue;
        };

        if entry.is_dir() {
            fs::create_dir_all(dest.join(&rel))?;
            continue;
        }

        let written = write_entry(&mut entry, dest, &rel, archive_name, tracker, outcome)?;
        drop(entry);
        if let Some(path) = written {
            recurse_if_archive(&path, tracker, outcome);
        }
    }

    Ok(())
}

fn extract_tar_stream<R: Read>(
    reader: R,
    dest: &Path,
    archive_name: &str,
    tracker: &LineageTracker,
    outcome: &mut ExtractOutcome,
) -> Result<()> {
    let mut tar = tar::Archive::new(reader);
    let entries = tar
        .entries()
        .map_err(|e| FlowError::archive(archive_name, e))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| FlowError::archive(archive_name, e))?;
        let raw_path = entry
            .path()
            .map_err(|e| FlowError::archive(archive_name, e))?
            .into_owned();
        let Some(rel) = sanitize_entry_path(&raw_path) else {
            warn!(
                archive = %archive_name,
                entry = %raw_path.display(),
                "Skipping tar entry with unsafe path"
            );
            continue;
        };

        let entry_type = entry.header().entry_type();
        if entry_type.is_dir() {
            fs::create_dir_all(dest.join(&rel))?;
            continue;
        }
        if entry_type != tar::EntryType::Regular {
            debug!(
                archive = %archive_name,
                entry = %rel.display(),
                "Skipping non-regular tar entry"
            );
            continue;
        }

        let written = write_entry(&mut entry, dest, &rel, archive_name, tracker, outcome)?;
        drop(entry);
        if let Some(path) = written {
            recurse_if_archive(&path, tracker, outcome);
        }
    }

    Ok(())
}

/// Gunzip into an intermediate `.tar` next to the archive, extract that,
/// then drop the intermediate.
fn extract_gzipped_tar(
    archive: &Path,
    dest: &Path,
    archive_name: &str,
    tracker: &LineageTracker,
    outcome: &mut ExtractOutcome,
) -> Result<()> {
    let lower = archive_name.to_lowercase();
    let tar_name = if lower.ends_with(".tar.gz") {
        archive_name[..archive_name.len() - 3].to_string()
    } else {
        format!("{}.tar", &archive_name[..archive_name.len() - 3])
    };

    let tar_path = unique_path(dest, &tar_name);
    {
        let mut decoder = GzDecoder::new(File::open(archive)?);
        let mut out = File::create(&tar_path)?;
        io::copy(&mut decoder, &mut out).map_err(|e| {
            FlowError::archive(archive_name, format!("gzip decode failed: {e}"))
        })?;
    }

    // The intermediate tar is transparent to lineage: its entries are
    // attributed to the outer archive directly.
    let result = File::open(&tar_path)
        .map_err(FlowError::from)
        .and_then(|file| extract_tar_stream(file, dest, archive_name, tracker, outcome));

    match result {
        Ok(()) => {
            fs::remove_file(&tar_path)?;
            Ok(())
        },
        Err(e) => Err(e),
    }
}

/// 7z has no streaming per-entry reader here, so expand into a staging
/// directory and promote the contents with the usual uniqueness rule.
fn extract_sevenz(
    archive: &Path,
    dest: &Path,
    archive_name: &str,
    tracker: &LineageTracker,
    outcome: &mut ExtractOutcome,
) -> Result<()> {
    let (stem, _) = super::fsops::split_name(archive_name);
    let staging = unique_path(dest, &format!("{stem}.extracting"));

    if let Err(e) = sevenz_rust::decompress_file(archive, &staging) {
        let _ = fs::remove_dir_all(&staging);
        return Err(FlowError::archive(archive_name, e));
    }

    let result = promote_staged(&staging, dest, archive_name, tracker, outcome);
    let _ = fs::remove_dir_all(&staging);
    result
}

fn promote_staged(
    src: &Path,
    dest: &Path,
    archive_name: &str,
    tracker: &LineageTracker,
    outcome: &mut ExtractOutcome,
) -> Result<()> {
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            let sub_dest = dest.join(entry.file_name());
            fs::create_dir_all(&sub_dest)?;
            promote_staged(&entry.path(), &sub_dest, archive_name, tracker, outcome)?;
            continue;
        }

        let name = file_name_lossy(&entry.path());
        let collided = dest.join(&name).exists();
        let target = unique_path(dest, &name);
        move_file(&entry.path(), &target)?;

        let size = fs::metadata(&target)?.len();
        tracker.track_extracted(&file_name_lossy(&target), archive_name, size);

        if collided {
            outcome.collisions.push(target);
        } else {
            recurse_if_archive(&target, tracker, outcome);
        }
    }
    Ok(())
}

/// Stream one archive entry to disk under the uniqueness rule and register
/// it with the tracker. Returns the written path when the entry landed
/// under its preferred name; collided newcomers are queued for quarantine
/// instead and never recursed into.
fn write_entry<R: Read>(
    reader: &mut R,
    dest: &Path,
    rel: &Path,
    archive_name: &str,
    tracker: &LineageTracker,
    outcome: &mut ExtractOutcome,
) -> Result<Option<PathBuf>> {
    let target_dir = match rel.parent() {
        Some(parent) if parent != Path::new("") => {
            let dir = dest.join(parent);
            fs::create_dir_all(&dir)?;
            dir
        },
        _ => dest.to_path_buf(),
    };

    let name = rel
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let collided = target_dir.join(&name).exists();
    let target = unique_path(&target_dir, &name);

    {
        let mut out = File::create(&target)?;
        io::copy(reader, &mut out)
            .map_err(|e| FlowError::archive(archive_name, format!("entry write failed: {e}")))?;
    }

    let size = fs::metadata(&target)?.len();
    tracker.track_extracted(&file_name_lossy(&target), archive_name, size);

    if collided {
        outcome.collisions.push(target);
        Ok(None)
    } else {
        Ok(Some(target))
    }
}

fn recurse_if_archive(path: &Path, tracker: &LineageTracker, outcome: &mut ExtractOutcome) {
    if !is_archive_name(&file_name_lossy(path)) {
        return;
    }
    match extract_archive(path, tracker) {
        Ok(sub) => outcome.merge(sub),
        Err(error) => {
            warn!(
                archive = %path.display(),
                error = %error,
                "Nested archive failed to extract; leaving it for the sweep"
            );
            outcome.failures.push(NestedFailure {
                path: path.to_path_buf(),
                error,
            });
        },
    }
}

/// Keep only plain relative components; anything absolute or dotted walks
/// out of the working directory and is rejected.
fn sanitize_entry_path(raw: &Path) -> Option<PathBuf> {
    let mut clean = PathBuf::new();
    for component in raw.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {},
            _ => return None,
        }
    }
    if clean.as_os_str().is_empty() {
        None
    } else {
        Some(clean)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        for (name, data) in entries {
            if name.ends_with('/') {
                zip.add_directory(name.trim_end_matches('/'), options).unwrap();
            } else {
                zip.start_file(*name, options).unwrap();
                zip.write_all(data).unwrap();
            }
        }
        zip.finish().unwrap();
    }

    fn write_tar(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut tar = tar::Builder::new(file);
        for (name, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            tar.append_data(&mut header, name, &data[..]).unwrap();
        }
        tar.into_inner().unwrap();
    }

    #[test]
    fn archive_names_are_recognized_case_insensitively() {
        assert!(is_archive_name("a.zip"));
        assert!(is_archive_name("A.TAR"));
        assert!(is_archive_name("a.tar.gz"));
        assert!(is_archive_name("a.tz"));
        assert!(is_archive_name("a.7z"));
        assert!(!is_archive_name("a.xml"));
        assert!(!is_archive_name("a.gz"));
    }

    #[test]
    fn zip_entries_land_next_to_the_archive_and_are_tracked() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("arc.zip");
        write_zip(&archive, &[("a.xml", b"<a/>"), ("sub/", b""), ("sub/b.xml", b"<b/>")]);

        let tracker = LineageTracker::new();
        tracker.track_direct("arc.zip", "/srv/in", 0);

        let outcome = extract_archive(&archive, &tracker).unwrap();
        assert!(outcome.collisions.is_empty());
        assert!(outcome.failures.is_empty());
        assert!(!archive.exists());
        assert!(dir.path().join("a.xml").exists());
        assert!(dir.path().join("sub/b.xml").exists());

        let info = tracker.info("b.xml").unwrap();
        assert_eq!(info.root_archive.as_deref(), Some("arc.zip"));
        assert_eq!(info.origin_folder.as_deref(), Some("/srv/in"));
    }

    #[test]
    fn nested_archives_resolve_to_the_outermost_one() {
        let dir = tempfile::tempdir().unwrap();

        let inner = dir.path().join("inner.zip");
        write_zip(&inner, &[("x.xml", b"<x/>")]);
        let inner_bytes = fs::read(&inner).unwrap();
        fs::remove_file(&inner).unwrap();

        let outer = dir.path().join("outer.tar");
        write_tar(&outer, &[("inner.zip", &inner_bytes)]);

        let tracker = LineageTracker::new();
        tracker.track_direct("outer.tar", "/srv/in", 0);

        let outcome = extract_archive(&outer, &tracker).unwrap();
        assert!(outcome.failures.is_empty());
        assert!(!outer.exists());
        assert!(!dir.path().join("inner.zip").exists());
        assert!(dir.path().join("x.xml").exists());

        assert_eq!(tracker.root_archive_of("x.xml").as_deref(), Some("outer.tar"));
    }

    #[test]
    fn tz_archives_gunzip_through_a_transient_tar() {
        let dir = tempfile::tempdir().unwrap();

        let plain_tar = dir.path().join("payload.tar");
        write_tar(&plain_tar, &[("d.xml", b"<d/>")]);
        let tar_bytes = fs::read(&plain_tar).unwrap();
        fs::remove_file(&plain_tar).unwrap();

        let tz = dir.path().join("payload.tz");
        let mut encoder =
            flate2::write::GzEncoder::new(File::create(&tz).unwrap(), flate2::Compression::default());
        encoder.write_all(&tar_bytes).unwrap();
        encoder.finish().unwrap();

        let tracker = LineageTracker::new();
        tracker.track_direct("payload.tz", "/srv/in", 0);

        extract_archive(&tz, &tracker).unwrap();
        assert!(dir.path().join("d.xml").exists());
        assert!(!dir.path().join("payload.tar").exists());
        assert!(!tz.exists());
        assert_eq!(
            tracker.root_archive_of("d.xml").as_deref(),
            Some("payload.tz")
        );
    }

    #[test]
    fn collisions_keep_the_incumbent_and_queue_the_newcomer() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.xml"), b"incumbent").unwrap();

        let archive = dir.path().join("arc.zip");
        write_zip(&archive, &[("a.xml", b"newcomer")]);

        let tracker = LineageTracker::new();
        let outcome = extract_archive(&archive, &tracker).unwrap();

        assert_eq!(outcome.collisions.len(), 1);
        assert_eq!(outcome.collisions[0].file_name().unwrap(), "a(1).xml");
        assert_eq!(fs::read(dir.path().join("a.xml")).unwrap(), b"incumbent");
        assert_eq!(fs::read(dir.path().join("a(1).xml")).unwrap(), b"newcomer");
        // The suffixed newcomer is tracked until quarantine removes it.
        assert!(tracker.info("a(1).xml").is_some());
    }

    #[test]
    fn self_referential_archive_terminates_without_reextraction() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("quine.zip");
        // An entry named after the archive itself. The entry bytes are
        // junk, so any attempt to re-open the copy as a zip would surface
        // in `failures`.
        write_zip(&archive, &[("quine.zip", b"not really zip bytes")]);

        let tracker = LineageTracker::new();
        let outcome = extract_archive(&archive, &tracker).unwrap();

        // The re-entrant entry collides with the still-open archive, lands
        // under a suffix, and is queued for quarantine, never recursed.
        assert_eq!(outcome.collisions.len(), 1);
        assert_eq!(outcome.collisions[0].file_name().unwrap(), "quine(1).zip");
        assert!(outcome.failures.is_empty());
        assert!(dir.path().join("quine(1).zip").exists());
        assert!(!archive.exists());
    }

    #[test]
    fn corrupt_archives_error_and_stay_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("bad.tar");
        fs::write(&archive, b"this is not a tar file").unwrap();

        let tracker = LineageTracker::new();
        let result = extract_archive(&archive, &tracker);

        assert!(result.is_err());
        assert!(archive.exists());
    }

    #[test]
    fn corrupt_nested_archive_is_reported_not_raised() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("outer.zip");
        write_zip(
            &archive,
            &[("fine.xml", b"<ok/>"), ("broken.zip", b"not a zip")],
        );

        let tracker = LineageTracker::new();
        let outcome = extract_archive(&archive, &tracker).unwrap();

        assert!(!archive.exists());
        assert!(dir.path().join("fine.xml").exists());
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(
            outcome.failures[0].path.file_name().unwrap(),
            "broken.zip"
        );
        assert!(dir.path().join("broken.zip").exists());
    }
}
