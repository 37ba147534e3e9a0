//! Collision-aware filesystem moves
//!
//! All names entering a working directory go through the same uniqueness
//! rule: if `dir/base.ext` is taken, try `dir/base(1).ext`, `dir/base(2).ext`,
//! … until a free slot is found. The quarantine tree applies the same rule
//! with its own counter, continuing from any `(n)` suffix the file already
//! carries.

use fileflow_common::Result;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Result of moving a file into a directory.
#[derive(Debug)]
pub struct MovedFile {
    /// Where the file ended up.
    pub path: PathBuf,
    /// True when the preferred name was taken and a `(n)` suffix was applied.
    pub collided: bool,
}

/// Split a file name at its last dot: `"a.tar.gz"` -> `("a.tar", ".gz")`.
///
/// The extension keeps its leading dot; names without a dot get an empty
/// extension.
pub fn split_name(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => name.split_at(idx),
        _ => (name, ""),
    }
}

/// First non-existing path for `name` inside `dir`, suffixing `(n)` from 1.
pub fn unique_path(dir: &Path, name: &str) -> PathBuf {
    let candidate = dir.join(name);
    if !candidate.exists() {
        return candidate;
    }

    let (stem, ext) = split_name(name);
    let mut k: u32 = 1;
    loop {
        let path = dir.join(format!("{stem}({k}){ext}"));
        if !path.exists() {
            return path;
        }
        k += 1;
    }
}

/// Uniqueness rule for the quarantine tree.
///
/// Unlike [`unique_path`], an existing `(n)` suffix on the stem is stripped
/// first and the counter continues from it, so repeated offenders keep a
/// single running sequence inside the error directory.
pub fn unique_error_path(dir: &Path, name: &str) -> PathBuf {
    let candidate = dir.join(name);
    if !candidate.exists() {
        return candidate;
    }

    let (stem, ext) = split_name(name);
    let (base, start) = strip_copy_suffix(stem);
    let mut k = start + 1;
    loop {
        let path = dir.join(format!("{base}({k}){ext}"));
        if !path.exists() {
            return path;
        }
        k += 1;
    }
}

/// Strip a trailing `(n)` from a file stem, returning the bare stem and `n`.
fn strip_copy_suffix(stem: &str) -> (&str, u32) {
    if let Some(rest) = stem.strip_suffix(')') {
        if let Some(open) = rest.rfind('(') {
            if let Ok(n) = rest[open + 1..].parse::<u32>() {
                return (&stem[..open], n);
            }
        }
    }
    (stem, 0)
}

/// Move a file into `dest_dir`, applying the uniqueness rule on collision.
pub fn move_file_into(src: &Path, dest_dir: &Path) -> Result<MovedFile> {
    let name = file_name_lossy(src);
    let preferred = dest_dir.join(&name);
    let collided = preferred.exists();
    let target = if collided {
        unique_path(dest_dir, &name)
    } else {
        preferred
    };

    move_file(src, &target)?;
    Ok(MovedFile {
        path: target,
        collided,
    })
}

/// Move a whole directory into `dest_dir`, suffixing the directory name on
/// collision. The contents are not inspected.
pub fn move_dir_into(src: &Path, dest_dir: &Path) -> Result<PathBuf> {
    let name = file_name_lossy(src);
    let target = unique_path(dest_dir, &name);

    if fs::rename(src, &target).is_err() {
        // Cross-device move: copy the tree, then drop the source.
        copy_dir_recursive(src, &target)?;
        fs::remove_dir_all(src)?;
    }
    Ok(target)
}

/// Move a file to an exact target path, falling back to copy+delete when a
/// plain rename is not possible (e.g. across mount points).
pub fn move_file(src: &Path, target: &Path) -> Result<()> {
    if fs::rename(src, target).is_err() {
        fs::copy(src, target)?;
        fs::remove_file(src)?;
    }
    Ok(())
}

fn copy_dir_recursive(src: &Path, dest: &Path) -> io::Result<()> {
    fs::create_dir_all(dest)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let target = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

pub(crate) fn file_name_lossy(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn split_name_uses_last_dot() {
        assert_eq!(split_name("a.xml"), ("a", ".xml"));
        assert_eq!(split_name("a.tar.gz"), ("a.tar", ".gz"));
        assert_eq!(split_name("noext"), ("noext", ""));
        assert_eq!(split_name(".hidden"), (".hidden", ""));
    }

    #[test]
    fn unique_path_suffixes_in_sequence() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.xml"), b"x").unwrap();
        std::fs::write(dir.path().join("a(1).xml"), b"x").unwrap();

        let free = unique_path(dir.path(), "a.xml");
        assert_eq!(free.file_name().unwrap(), "a(2).xml");
    }

    #[test]
    fn error_path_counter_continues_from_existing_suffix() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a(3).xml"), b"x").unwrap();

        // The incoming offender already carries (3); the error tree keeps
        // counting from there instead of producing a(3)(1).xml.
        let target = unique_error_path(dir.path(), "a(3).xml");
        assert_eq!(target.file_name().unwrap(), "a(4).xml");
    }

    #[test]
    fn move_file_into_reports_collision() {
        let src_dir = tempdir().unwrap();
        let dest_dir = tempdir().unwrap();
        let src = src_dir.path().join("a.xml");
        std::fs::write(&src, b"new").unwrap();
        std::fs::write(dest_dir.path().join("a.xml"), b"old").unwrap();

        let moved = move_file_into(&src, dest_dir.path()).unwrap();
        assert!(moved.collided);
        assert_eq!(moved.path.file_name().unwrap(), "a(1).xml");
        assert!(!src.exists());
        // Incumbent untouched.
        assert_eq!(std::fs::read(dest_dir.path().join("a.xml")).unwrap(), b"old");
    }

    #[test]
    fn move_dir_into_moves_whole_tree() {
        let src_dir = tempdir().unwrap();
        let dest_dir = tempdir().unwrap();
        let sub = src_dir.path().join("batch/inner");
        std::fs::create_dir_all(&sub).unwrap();
        std::fs::write(sub.join("x.xml"), b"x").unwrap();

        let target = move_dir_into(&src_dir.path().join("batch"), dest_dir.path()).unwrap();
        assert!(target.join("inner/x.xml").exists());
        assert!(!src_dir.path().join("batch").exists());
    }
}
