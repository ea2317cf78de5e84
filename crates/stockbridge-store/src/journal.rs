//! # Journal
//!
//! Append-only text log written as a side effect of every engine operation.
//!
//! One line per entry:
//! ```text
//! [2024-06-01T12:00:00+00:00] (SUCCESS) token.refresh 'Token refreshed successfully'
//! ```
//!
//! The journal is the operator-facing audit trail; structured `tracing`
//! output exists alongside it for development. Nothing reads the journal back
//! for control flow, and a journal write failure must never fail the
//! operation that produced it.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tracing::warn;

use stockbridge_core::{LogEntry, Severity};

use crate::error::{StoreError, StoreResult};

/// Append-only journal backed by a text file.
pub struct Journal {
    /// Path of the log file, kept for error context.
    path: PathBuf,

    /// Open file handle; the mutex serializes concurrent appenders so lines
    /// never interleave.
    file: Mutex<File>,
}

impl Journal {
    /// Opens the journal file for appending, creating it if absent.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| {
                    StoreError::JournalAppendFailed {
                        path: path.clone(),
                        source,
                    }
                })?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| StoreError::JournalAppendFailed {
                path: path.clone(),
                source,
            })?;

        Ok(Journal {
            path,
            file: Mutex::new(file),
        })
    }

    /// Appends one entry with an explicit timestamp.
    ///
    /// Append failures are reported through `tracing` and swallowed: the
    /// journal is an audit side effect, not part of any operation's contract.
    pub fn append_at(
        &self,
        timestamp: DateTime<Utc>,
        operation: &str,
        severity: Severity,
        message: &str,
    ) {
        let entry = LogEntry {
            timestamp,
            operation: operation.to_string(),
            message: message.to_string(),
            severity,
        };

        let mut file = self.file.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(err) = writeln!(file, "{}", entry.render()) {
            warn!(path = %self.path.display(), %err, "Journal append failed");
        }
    }

    /// Appends one entry stamped with the current time.
    pub fn append(&self, operation: &str, severity: Severity, message: &str) {
        self.append_at(Utc::now(), operation, severity, message);
    }

    /// Convenience: INFO entry.
    pub fn info(&self, operation: &str, message: &str) {
        self.append(operation, Severity::Info, message);
    }

    /// Convenience: SUCCESS entry.
    pub fn success(&self, operation: &str, message: &str) {
        self.append(operation, Severity::Success, message);
    }

    /// Convenience: ERROR entry.
    pub fn error(&self, operation: &str, message: &str) {
        self.append(operation, Severity::Error, message);
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    #[test]
    fn test_appends_formatted_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stockbridge.log");
        let journal = Journal::open(&path).unwrap();

        let at = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        journal.append_at(at, "engine.push_one", Severity::Info, "Started syncing");
        journal.append_at(at, "engine.push_one", Severity::Error, "Offer \"X\" not found");

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            "[2024-06-01T12:00:00+00:00] (INFO) engine.push_one 'Started syncing'"
        );
        assert!(lines[1].contains("(ERROR)"));
    }

    #[test]
    fn test_reopen_appends_not_truncates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stockbridge.log");

        {
            let journal = Journal::open(&path).unwrap();
            journal.info("op", "first");
        }
        {
            let journal = Journal::open(&path).unwrap();
            journal.info("op", "second");
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }
}
