//! Lineage records shared between the ingestion engine and persistence.

use serde::{Deserialize, Serialize};

/// How a file arrived in the working directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileOrigin {
    /// Moved straight out of a configured source folder.
    Direct,
    /// Produced by decompressing an archive.
    Extracted,
}

/// Lineage entry for one working file.
///
/// Serialized as-is into the `files_info` JSON column of a bundle-tracking
/// row, so field names are part of the persisted format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub file_name: String,
    pub source: FileOrigin,
    pub size_bytes: u64,
    /// Source folder the file (or its root archive) was drained from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_folder: Option<String>,
    /// First-level archive for extracted files: the archive that was itself
    /// drained from a source folder, never an intermediate nested one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_archive: Option<String>,
}

/// Classification of a quarantined file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Name collision in the working directory or inside an archive.
    DuplicateFile,
    /// Non-xml survivor after extraction finished.
    WrongFileType,
    /// Archive could not be read.
    ExtractionError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::DuplicateFile => "DUPLICATE_FILE",
            ErrorKind::WrongFileType => "WRONG_FILE_TYPE",
            ErrorKind::ExtractionError => "EXTRACTION_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
