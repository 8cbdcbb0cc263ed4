//! Database layer for papers-dl
//!
//! Handles SQLite persistence for the per-date run manifest, the
//! processed-files set, and runtime state.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] — Database lifecycle, schema migrations
//! - [`manifest`] — Per-date manifest rows (download outcomes, dispatched flag)
//! - [`processed`] — Processed-files set (path + content fingerprint)
//! - [`state`] — Runtime state (clean shutdown tracking)

use crate::types::TaskStatus;
use chrono::NaiveDate;
use sqlx::{FromRow, sqlite::SqlitePool};

mod manifest;
mod migrations;
mod processed;
mod state;

/// Manifest row from the database
///
/// One row per (run_date, paper_id). The manifest is the restart-safe record
/// of download outcomes for a date; `dispatched` tracks the hand-off to the
/// processing endpoint.
#[derive(Debug, Clone, FromRow)]
pub struct ManifestRow {
    /// Run date in `YYYY-MM-DD` form
    pub run_date: String,
    /// Paper id unique within the run date
    pub paper_id: String,
    /// Paper title
    pub title: String,
    /// PDF source URL
    pub source_url: String,
    /// Destination path on disk
    pub destination: String,
    /// Task status code (see [`TaskStatus::from_i32`])
    pub status: i32,
    /// Number of download attempts made
    pub attempts: i64,
    /// Terminal error message, if the download failed
    pub error_message: Option<String>,
    /// Whether the file was handed to the processing endpoint (0 = no, 1 = yes)
    pub dispatched: i32,
    /// Dispatch outcome: NULL until dispatched, then 1 = ok, 0 = error
    pub dispatch_ok: Option<i64>,
    /// Unix timestamp when the row was created
    pub created_at: i64,
    /// Unix timestamp of the last update
    pub updated_at: i64,
}

impl ManifestRow {
    /// Decode the status code
    pub fn task_status(&self) -> TaskStatus {
        TaskStatus::from_i32(self.status)
    }

    /// Whether the file was handed to the processing endpoint
    pub fn is_dispatched(&self) -> bool {
        self.dispatched != 0
    }
}

/// Processed-file row from the database
#[derive(Debug, Clone, FromRow)]
pub struct ProcessedFileRow {
    /// Absolute file path
    pub path: String,
    /// SHA-256 content fingerprint (hex)
    pub fingerprint: String,
    /// Unix timestamp when the file was processed
    pub processed_at: i64,
}

/// Format a run date the way manifest rows store it
pub(crate) fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Database handle for papers-dl
pub struct Database {
    pool: SqlitePool,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
