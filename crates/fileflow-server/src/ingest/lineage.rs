//! In-memory lineage tracker
//!
//! One tracker exists per (data source, environment) pass. It maps every
//! working-file name to where it came from: its source folder, its
//! immediate parent archive, and its first-level (root) archive.
//!
//! The root of an extracted file is resolved *before* insertion by looking
//! up the parent's root entry: if archive `A` produces `g` and `g` produces
//! `h`, then `root(h) = root(g) = A`, regardless of extraction order or
//! nesting depth. Intermediate archives never leak into lineage records.

use fileflow_common::types::{FileInfo, FileOrigin};
use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

/// Lineage state for one (data source, environment) pass.
///
/// Mutators take `&self`; the inner maps are mutex-guarded so a parallelized
/// extractor can share one tracker.
#[derive(Debug, Default)]
pub struct LineageTracker {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    file_info: HashMap<String, FileInfo>,
    file_to_folder: HashMap<String, String>,
    file_to_parent_archive: HashMap<String, String>,
    file_to_root_archive: HashMap<String, String>,
    source_folders: BTreeSet<String>,
}

impl LineageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a file moved straight from a configured source folder.
    pub fn track_direct(&self, name: &str, origin_folder: &str, size_bytes: u64) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        inner.source_folders.insert(origin_folder.to_string());
        inner
            .file_to_folder
            .insert(name.to_string(), origin_folder.to_string());
        inner.file_info.insert(
            name.to_string(),
            FileInfo {
                file_name: name.to_string(),
                source: FileOrigin::Direct,
                size_bytes,
                origin_folder: Some(origin_folder.to_string()),
                root_archive: None,
            },
        );
    }

    /// Record a file produced by extracting `parent_archive`.
    ///
    /// The root archive is the parent's root when the parent itself was
    /// extracted, otherwise the parent archive itself. The origin folder is
    /// inherited from the parent's entry when known.
    pub fn track_extracted(&self, name: &str, parent_archive: &str, size_bytes: u64) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        let root = inner
            .file_to_root_archive
            .get(parent_archive)
            .cloned()
            .unwrap_or_else(|| parent_archive.to_string());
        let origin_folder = inner.file_to_folder.get(parent_archive).cloned();

        inner
            .file_to_parent_archive
            .insert(name.to_string(), parent_archive.to_string());
        inner
            .file_to_root_archive
            .insert(name.to_string(), root.clone());
        if let Some(ref folder) = origin_folder {
            inner
                .file_to_folder
                .insert(name.to_string(), folder.clone());
        }
        inner.file_info.insert(
            name.to_string(),
            FileInfo {
                file_name: name.to_string(),
                source: FileOrigin::Extracted,
                size_bytes,
                origin_folder,
                root_archive: Some(root),
            },
        );
    }

    /// Drop a file from all maps, e.g. when it is quarantined.
    pub fn remove(&self, name: &str) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.file_info.remove(name);
        inner.file_to_folder.remove(name);
        inner.file_to_parent_archive.remove(name);
        inner.file_to_root_archive.remove(name);
    }

    pub fn info(&self, name: &str) -> Option<FileInfo> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.file_info.get(name).cloned()
    }

    pub fn folder_of(&self, name: &str) -> Option<String> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.file_to_folder.get(name).cloned()
    }

    pub fn root_archive_of(&self, name: &str) -> Option<String> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.file_to_root_archive.get(name).cloned()
    }

    /// All source folders that contributed files to this pass so far.
    pub fn source_folders(&self) -> BTreeSet<String> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.source_folders.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_files_carry_their_folder() {
        let tracker = LineageTracker::new();
        tracker.track_direct("a.xml", "/srv/in", 10);

        let info = tracker.info("a.xml").unwrap();
        assert_eq!(info.source, FileOrigin::Direct);
        assert_eq!(info.origin_folder.as_deref(), Some("/srv/in"));
        assert_eq!(info.root_archive, None);
        assert!(tracker.source_folders().contains("/srv/in"));
    }

    #[test]
    fn nested_extraction_resolves_to_first_level_archive() {
        let tracker = LineageTracker::new();
        tracker.track_direct("outer.tar", "/srv/in", 100);
        tracker.track_extracted("inner.zip", "outer.tar", 80);
        tracker.track_extracted("x.xml", "inner.zip", 20);

        assert_eq!(tracker.root_archive_of("x.xml").as_deref(), Some("outer.tar"));
        assert_eq!(tracker.folder_of("x.xml").as_deref(), Some("/srv/in"));

        let info = tracker.info("x.xml").unwrap();
        assert_eq!(info.root_archive.as_deref(), Some("outer.tar"));
        assert_eq!(info.origin_folder.as_deref(), Some("/srv/in"));
    }

    #[test]
    fn root_resolution_is_stable_under_sibling_order() {
        // Two sibling archives inside the same outer archive; extracting in
        // either order must pin all leaves to the outer archive.
        let build = |first: &str, second: &str| {
            let tracker = LineageTracker::new();
            tracker.track_direct("outer.zip", "/srv/in", 100);
            tracker.track_extracted(first, "outer.zip", 50);
            tracker.track_extracted(second, "outer.zip", 50);
            tracker.track_extracted("a.xml", first, 5);
            tracker.track_extracted("b.xml", second, 5);
            (
                tracker.root_archive_of("a.xml"),
                tracker.root_archive_of("b.xml"),
            )
        };

        assert_eq!(build("s1.zip", "s2.zip"), build("s2.zip", "s1.zip"));
        assert_eq!(build("s1.zip", "s2.zip").0.as_deref(), Some("outer.zip"));
    }

    #[test]
    fn remove_drops_every_map() {
        let tracker = LineageTracker::new();
        tracker.track_direct("arc.zip", "/srv/in", 100);
        tracker.track_extracted("x.xml", "arc.zip", 10);

        tracker.remove("x.xml");
        assert!(tracker.info("x.xml").is_none());
        assert!(tracker.folder_of("x.xml").is_none());
        assert!(tracker.root_archive_of("x.xml").is_none());

        // Unrelated entries survive.
        assert!(tracker.info("arc.zip").is_some());
    }
}
