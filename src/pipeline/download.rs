//! Download manager: listing records in, persisted PDFs and manifest rows out.

use super::{PaperPipeline, RunContext};
use crate::error::{DownloadError, Error, Result};
use crate::retry::retry_with_backoff;
use crate::types::{DownloadTask, Event, PaperId, PaperRecord, TaskOutcome, TaskStatus};
use crate::utils::destination_for;
use futures::StreamExt;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

impl PaperPipeline {
    /// Download a batch of listed papers into the run's date partition
    ///
    /// Per-task failures are isolated: one paper exhausting its retries
    /// marks that task `failed` and moves on. The only errors that abort the
    /// batch are environment-level (the partition directory cannot be
    /// created) or manifest persistence failures.
    ///
    /// The manifest row for each task is updated after every transition, so
    /// a crash mid-batch loses at most the in-flight task.
    pub(crate) async fn download_batch(
        &self,
        ctx: &RunContext,
        records: &[PaperRecord],
    ) -> Result<Vec<(PaperId, TaskOutcome)>> {
        // Unwritable partition directory is fatal for the whole run
        tokio::fs::create_dir_all(&ctx.dest_dir).await.map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!(
                    "Failed to create partition directory '{}': {}",
                    ctx.dest_dir.display(),
                    e
                ),
            ))
        })?;

        let mut outcomes = Vec::with_capacity(records.len());

        for (index, record) in records.iter().enumerate() {
            if ctx.cancel.is_cancelled() {
                warn!(remaining = records.len() - index, "Run cancelled, abandoning batch");
                break;
            }

            let mut task = DownloadTask {
                record: record.clone(),
                destination: destination_for(
                    self.config.download_dir(),
                    ctx.date,
                    record.id.as_str(),
                ),
                attempts: 0,
                status: TaskStatus::Pending,
            };

            self.db.upsert_task(&task.record, &task.destination).await?;

            // De-duplication against prior runs of the same date: file on
            // disk with contents, and the manifest says succeeded
            if file_has_contents(&task.destination).await
                && self.db.is_task_succeeded(ctx.date, record.id.as_str()).await?
            {
                debug!(id = %record.id, path = %task.destination.display(), "Already downloaded, skipping");
                self.emit_event(Event::DownloadSkipped {
                    id: record.id.clone(),
                    path: task.destination.clone(),
                });
                outcomes.push((record.id.clone(), TaskOutcome::Skipped));
                continue;
            }

            self.emit_event(Event::DownloadStarted {
                id: record.id.clone(),
            });
            task.status = TaskStatus::Downloading;
            self.db
                .set_task_status(ctx.date, record.id.as_str(), task.status, task.attempts, None)
                .await?;

            let attempts = Arc::new(AtomicU32::new(0));
            let attempts_in_closure = Arc::clone(&attempts);
            let result = retry_with_backoff(&self.config.download.retry, || {
                attempts_in_closure.fetch_add(1, Ordering::SeqCst);
                self.download_one(&task.record, &task.destination)
            })
            .await;
            task.attempts = attempts.load(Ordering::SeqCst);

            match result {
                Ok(bytes) => {
                    info!(id = %record.id, bytes, attempts = task.attempts, "Download complete");
                    task.status = TaskStatus::Succeeded;
                    self.db
                        .set_task_status(
                            ctx.date,
                            record.id.as_str(),
                            task.status,
                            task.attempts,
                            None,
                        )
                        .await?;
                    self.emit_event(Event::DownloadComplete {
                        id: record.id.clone(),
                        path: task.destination.clone(),
                    });
                    outcomes.push((record.id.clone(), TaskOutcome::Downloaded));
                }
                Err(e) => {
                    let message = e.to_string();
                    warn!(id = %record.id, attempts = task.attempts, error = %message, "Download failed terminally");
                    task.status = TaskStatus::Failed;
                    self.db
                        .set_task_status(
                            ctx.date,
                            record.id.as_str(),
                            task.status,
                            task.attempts,
                            Some(&message),
                        )
                        .await?;
                    self.emit_event(Event::DownloadFailed {
                        id: record.id.clone(),
                        error: message.clone(),
                        attempts: task.attempts,
                    });
                    outcomes.push((record.id.clone(), TaskOutcome::Failed(message)));
                }
            }

            // Politeness pacing between downloads
            if index + 1 < records.len() && !self.config.download.request_delay.is_zero() {
                tokio::time::sleep(self.config.download.request_delay).await;
            }
        }

        Ok(outcomes)
    }

    /// One download attempt: stream to a temp file, fsync, atomic rename
    ///
    /// The `.part` temp file keeps the watcher blind to the download until
    /// the rename, so an arrival can never observe a half-written PDF.
    /// Returns the number of bytes written.
    async fn download_one(&self, record: &PaperRecord, destination: &Path) -> Result<u64> {
        let temp_path = destination.with_extension("part");

        let response = self
            .http
            .get(&record.source_url)
            .timeout(self.config.download.request_timeout)
            .send()
            .await
            .map_err(|e| {
                Error::Download(DownloadError::Network {
                    id: record.id.to_string(),
                    reason: e.to_string(),
                })
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Download(DownloadError::Network {
                id: record.id.to_string(),
                reason: format!("status {}", status.as_u16()),
            }));
        }

        let mut file = tokio::fs::File::create(&temp_path).await.map_err(|e| {
            Error::Download(DownloadError::Write {
                path: temp_path.clone(),
                reason: e.to_string(),
            })
        })?;

        let mut written: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                Error::Download(DownloadError::Network {
                    id: record.id.to_string(),
                    reason: e.to_string(),
                })
            })?;
            file.write_all(&chunk).await.map_err(|e| {
                Error::Download(DownloadError::Write {
                    path: temp_path.clone(),
                    reason: e.to_string(),
                })
            })?;
            written += chunk.len() as u64;
        }

        if written == 0 {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(Error::Download(DownloadError::EmptyBody {
                id: record.id.to_string(),
            }));
        }

        // Flush to disk before the rename; succeeded must mean durable
        file.sync_all().await.map_err(|e| {
            Error::Download(DownloadError::Write {
                path: temp_path.clone(),
                reason: e.to_string(),
            })
        })?;
        drop(file);

        tokio::fs::rename(&temp_path, destination).await.map_err(|e| {
            Error::Download(DownloadError::Write {
                path: destination.to_path_buf(),
                reason: e.to_string(),
            })
        })?;

        Ok(written)
    }
}

/// Whether a destination file exists with non-zero size
async fn file_has_contents(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.len() > 0)
        .unwrap_or(false)
}
