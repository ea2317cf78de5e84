//! # Store Error Types
//!
//! Error types for state-file and journal operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Store error type covering state-file and journal failures.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Failed to read the state file.
    #[error("Failed to load state from {path}: {source}")]
    LoadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write the state file.
    #[error("Failed to save state to {path}: {source}")]
    SaveFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// State file exists but does not parse.
    #[error("State file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Failed to serialize state for writing.
    #[error("Failed to serialize state: {0}")]
    SerializeFailed(#[from] serde_json::Error),

    /// Failed to append to the journal.
    #[error("Failed to append to journal {path}: {source}")]
    JournalAppendFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
