//! Centralized error types for mboxstore.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the mboxstore library.
///
/// Parse problems inside a single message are deliberately NOT represented
/// here: the normalizer is total and degrades to a partial record instead
/// (see [`crate::model::message::ParseOutcome`]). Only conditions that abort
/// the run, or isolated row failures worth reporting, become errors.
#[derive(Error, Debug)]
pub enum ImportError {
    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The specified archive file does not exist.
    #[error("MBOX file not found: {0}")]
    FileNotFound(PathBuf),

    /// An existing database has a schema this version cannot write to.
    /// Never auto-migrated.
    #[error("Incompatible store schema: {reason}")]
    Schema { reason: String },

    /// An error from the underlying SQLite engine.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A single row failed to persist even after the isolating retry.
    /// Reported and counted, never fatal to the run.
    #[error("Failed to write row '{message_id}': {reason}")]
    RowWrite { message_id: String, reason: String },
}

/// Convenience alias for `Result<T, ImportError>`.
pub type Result<T> = std::result::Result<T, ImportError>;

impl ImportError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Allow `?` on `std::io::Error` inside functions returning `ImportError`
/// when no path context is available (rare — prefer `ImportError::io`).
impl From<std::io::Error> for ImportError {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            path: PathBuf::from("<unknown>"),
            source,
        }
    }
}
