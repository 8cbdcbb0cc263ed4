//! Processed-files set: which arrivals have already been dispatched.
//!
//! Keyed by absolute path plus SHA-256 content fingerprint, so a file that
//! is re-written with different contents counts as a new arrival while a
//! watcher restart never re-dispatches an unchanged one.

use crate::error::DatabaseError;
use crate::{Error, Result};

use super::{Database, ProcessedFileRow};

impl Database {
    /// Mark a file as processed
    pub async fn mark_file_processed(&self, path: &std::path::Path, fingerprint: &str) -> Result<()> {
        let path_str = path.to_string_lossy().into_owned();
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO processed_files (path, fingerprint, processed_at)
            VALUES (?, ?, ?)
            ON CONFLICT(path) DO UPDATE SET fingerprint = ?, processed_at = ?
            "#,
        )
        .bind(&path_str)
        .bind(fingerprint)
        .bind(now)
        .bind(fingerprint)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to mark file as processed: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Check whether a file with this exact content was already processed
    pub async fn is_file_processed(
        &self,
        path: &std::path::Path,
        fingerprint: &str,
    ) -> Result<bool> {
        let path_str = path.to_string_lossy().into_owned();

        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM processed_files WHERE path = ? AND fingerprint = ?
            "#,
        )
        .bind(&path_str)
        .bind(fingerprint)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to check processed file: {}",
                e
            )))
        })?;

        Ok(count > 0)
    }

    /// Fetch a processed-file row by path, regardless of fingerprint
    pub async fn get_processed_file(
        &self,
        path: &std::path::Path,
    ) -> Result<Option<ProcessedFileRow>> {
        let path_str = path.to_string_lossy().into_owned();

        sqlx::query_as::<_, ProcessedFileRow>(
            r#"
            SELECT * FROM processed_files WHERE path = ?
            "#,
        )
        .bind(&path_str)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to fetch processed file: {}",
                e
            )))
        })
    }
}
