//! Error types for genome-base.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for genome-base operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while ingesting, storing, or serving genomic data.
#[derive(Debug, Error)]
pub enum Error {
    /// A required input file does not exist.
    #[error("Input file not found: {}", .0.display())]
    InputNotFound(PathBuf),

    /// A single input record could not be parsed.
    #[error("Malformed record on line {line}: {message}")]
    MalformedRecord {
        /// 1-based input line number, or 0 if unknown.
        line: usize,
        /// What went wrong.
        message: String,
    },

    /// The chromosome label is outside the supported set.
    #[error("Unsupported chromosome: {0}")]
    UnsupportedChromosome(String),

    /// The store refused a batch; nothing from the batch was committed.
    #[error("Batch rejected by the store: {0}")]
    StoreWriteRejected(String),

    /// A configured array could not be opened.
    #[error("{0} array not available")]
    StoreUnavailable(String),

    /// A daemon request could not be understood.
    #[error("Invalid request: {0}")]
    Protocol(String),

    /// Tried to create an array where one already exists.
    #[error("Array {} already exists", .0.display())]
    ArrayExists(PathBuf),

    /// Another writer or maintenance run holds the array.
    #[error("Array {} is locked by another writer (remove a stale lock with `maintain workspace unlock path`)", .0.display())]
    ArrayLocked(PathBuf),

    /// The directory has no schema marker.
    #[error("{} is not an array", .0.display())]
    NotAnArray(PathBuf),

    /// Invalid or unsupported array schema.
    #[error("Schema error: {0}")]
    Schema(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Database error.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Creates a [`Error::MalformedRecord`] error.
    pub fn malformed(line: usize, message: impl Into<String>) -> Self {
        Error::MalformedRecord { line, message: message.into() }
    }

    /// Returns `true` if the error only affects one record or one batch.
    ///
    /// Ingestion skips the record or drops the batch and continues after a recoverable error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::MalformedRecord { .. } | Error::UnsupportedChromosome(_) | Error::StoreWriteRejected(_)
        )
    }
}

impl From<Error> for String {
    fn from(error: Error) -> Self {
        error.to_string()
    }
}
