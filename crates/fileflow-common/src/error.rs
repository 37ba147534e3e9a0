//! Error types for fileflow
//!
//! Library-level errors raised by the ingestion engine and the storage
//! contract. Orchestration code wraps these in `anyhow` with context.

use thiserror::Error;

/// Result type alias for fileflow operations
pub type Result<T> = std::result::Result<T, FlowError>;

/// Main error type for fileflow
#[derive(Error, Debug)]
pub enum FlowError {
    /// File system operations failed (move, read, write, create directory)
    #[error("File operation failed: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed
    #[error("Failed to process JSON data: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An archive could not be read or expanded
    #[error("Failed to extract archive '{archive}': {reason}")]
    Archive { archive: String, reason: String },

    /// Database operation failed
    #[error("Database operation failed: {operation} - {reason}")]
    Database { operation: String, reason: String },
}

impl FlowError {
    /// Create an archive extraction error
    pub fn archive(archive: impl Into<String>, reason: impl ToString) -> Self {
        Self::Archive {
            archive: archive.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a database error
    pub fn database(operation: impl Into<String>, reason: impl ToString) -> Self {
        Self::Database {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }
}
