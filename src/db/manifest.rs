//! Per-date manifest rows: download outcomes and the dispatched flag.

use crate::error::DatabaseError;
use crate::types::{PaperRecord, TaskStatus};
use crate::{Error, Result};
use chrono::NaiveDate;
use std::path::Path;

use super::{Database, ManifestRow, date_key};

impl Database {
    /// Ensure a manifest row exists for a paper on a date
    ///
    /// Inserting is a no-op if the row already exists, so a re-run keeps the
    /// prior status and attempt count (restart-safe resume).
    pub async fn upsert_task(&self, record: &PaperRecord, destination: &Path) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO manifest
                (run_date, paper_id, title, source_url, destination, status,
                 attempts, dispatched, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, 0, 0, ?, ?)
            ON CONFLICT(run_date, paper_id) DO NOTHING
            "#,
        )
        .bind(date_key(record.listing_date))
        .bind(record.id.as_str())
        .bind(&record.title)
        .bind(&record.source_url)
        .bind(destination.to_string_lossy().into_owned())
        .bind(TaskStatus::Pending.to_i32())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to upsert manifest row: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Fetch one manifest row
    pub async fn get_task(&self, date: NaiveDate, paper_id: &str) -> Result<Option<ManifestRow>> {
        sqlx::query_as::<_, ManifestRow>(
            r#"
            SELECT * FROM manifest WHERE run_date = ? AND paper_id = ?
            "#,
        )
        .bind(date_key(date))
        .bind(paper_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to fetch manifest row: {}",
                e
            )))
        })
    }

    /// Update a task's status, attempt count and terminal error
    ///
    /// Written after every task state transition so a crash mid-run loses at
    /// most the in-flight task.
    pub async fn set_task_status(
        &self,
        date: NaiveDate,
        paper_id: &str,
        status: TaskStatus,
        attempts: u32,
        error: Option<&str>,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            UPDATE manifest
            SET status = ?, attempts = ?, error_message = ?, updated_at = ?
            WHERE run_date = ? AND paper_id = ?
            "#,
        )
        .bind(status.to_i32())
        .bind(attempts as i64)
        .bind(error)
        .bind(now)
        .bind(date_key(date))
        .bind(paper_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to update manifest row: {}",
                e
            )))
        })?;

        if result.rows_affected() == 0 {
            return Err(Error::Database(DatabaseError::NotFound(format!(
                "manifest row {} / {}",
                date_key(date),
                paper_id
            ))));
        }

        Ok(())
    }

    /// Whether a paper already reached `succeeded` on a date
    ///
    /// The de-duplication check for idempotent re-runs.
    pub async fn is_task_succeeded(&self, date: NaiveDate, paper_id: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM manifest
            WHERE run_date = ? AND paper_id = ? AND status = ?
            "#,
        )
        .bind(date_key(date))
        .bind(paper_id)
        .bind(TaskStatus::Succeeded.to_i32())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to check task status: {}",
                e
            )))
        })?;

        Ok(count > 0)
    }

    /// Mark a task as handed to the processing endpoint, with its outcome
    ///
    /// `ok` records whether the endpoint accepted the file, so a restarted
    /// process can still report accurate dispatch counts.
    pub async fn mark_dispatched(&self, date: NaiveDate, paper_id: &str, ok: bool) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            UPDATE manifest SET dispatched = 1, dispatch_ok = ?, updated_at = ?
            WHERE run_date = ? AND paper_id = ?
            "#,
        )
        .bind(ok as i64)
        .bind(now)
        .bind(date_key(date))
        .bind(paper_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to mark task dispatched: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Find the task on a date whose destination ends with a file name
    ///
    /// Used by the dispatch loop to tie an arrival path back to its task
    /// without assuming both sides spell the path identically.
    pub async fn find_task_by_filename(
        &self,
        date: NaiveDate,
        file_name: &str,
    ) -> Result<Option<ManifestRow>> {
        sqlx::query_as::<_, ManifestRow>(
            r#"
            SELECT * FROM manifest
            WHERE run_date = ? AND destination LIKE '%/' || ?
            "#,
        )
        .bind(date_key(date))
        .bind(file_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to look up manifest by file name: {}",
                e
            )))
        })
    }

    /// All manifest rows for a date, ordered by insertion
    pub async fn manifest_for_date(&self, date: NaiveDate) -> Result<Vec<ManifestRow>> {
        sqlx::query_as::<_, ManifestRow>(
            r#"
            SELECT * FROM manifest WHERE run_date = ?
            ORDER BY created_at ASC, paper_id ASC
            "#,
        )
        .bind(date_key(date))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to fetch manifest for date: {}",
                e
            )))
        })
    }

    /// Succeeded tasks on a date that have not been dispatched yet
    pub async fn undispatched_succeeded(&self, date: NaiveDate) -> Result<Vec<ManifestRow>> {
        sqlx::query_as::<_, ManifestRow>(
            r#"
            SELECT * FROM manifest
            WHERE run_date = ? AND status = ? AND dispatched = 0
            ORDER BY created_at ASC, paper_id ASC
            "#,
        )
        .bind(date_key(date))
        .bind(TaskStatus::Succeeded.to_i32())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to fetch undispatched tasks: {}",
                e
            )))
        })
    }

    /// Succeeded-but-undispatched tasks across all dates
    ///
    /// The polling-mode watcher scans this instead of the filesystem.
    pub async fn all_undispatched_succeeded(&self) -> Result<Vec<ManifestRow>> {
        sqlx::query_as::<_, ManifestRow>(
            r#"
            SELECT * FROM manifest
            WHERE status = ? AND dispatched = 0
            ORDER BY run_date ASC, created_at ASC, paper_id ASC
            "#,
        )
        .bind(TaskStatus::Succeeded.to_i32())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to fetch undispatched tasks: {}",
                e
            )))
        })
    }
}
