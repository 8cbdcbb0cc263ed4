//! Daily run orchestration: the fetch → download → dispatch → report cycle.

use super::{PaperPipeline, RunContext};
use crate::arrival_watcher::partition_date;
use crate::error::{Error, Result};
use crate::retry::retry_with_backoff;
use crate::types::{
    Event, PaperReportEntry, ProcessingStatus, RunReport, RunStage, TaskStatus,
};
use chrono::NaiveDate;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

impl PaperPipeline {
    /// Execute one daily cycle for a date and return its report
    ///
    /// Stage machine: `fetching → downloading → watching_for_arrivals →
    /// dispatching → reporting`. A failed listing fetch degrades to an empty
    /// listing; per-task download and dispatch failures are isolated inside
    /// their stages. The whole cycle runs under the configured timeout
    /// budget; on expiry the run is cancelled and a partial report built
    /// from the manifest is returned. Idempotent per date: everything the
    /// manifest already records as done is skipped.
    ///
    /// # Errors
    /// Only environment-level failures (unwritable partition directory,
    /// manifest persistence failures) abort the run with an error.
    pub async fn run_once(&self, date: NaiveDate) -> Result<RunReport> {
        if !self.is_accepting() {
            return Err(Error::ShuttingDown);
        }

        let ctx = self.run_context(date);
        info!(%date, "Run started");
        self.emit_event(Event::RunStarted { date });

        let budget = self.config.schedule.run_timeout;
        let report = match tokio::time::timeout(budget, self.run_stages(&ctx)).await {
            Ok(Ok(report)) => report,
            Ok(Err(e)) => {
                warn!(%date, error = %e, "Run aborted by environment failure");
                return Err(e);
            }
            Err(_) => {
                warn!(%date, budget = ?budget, "Run exceeded its timeout budget, reporting partial state");
                ctx.cancel.cancel();
                self.emit_event(Event::StageChanged {
                    date,
                    stage: RunStage::Reporting,
                });
                self.report_for(date).await?
            }
        };

        info!(
            %date,
            total = report.total,
            succeeded = report.succeeded,
            failed = report.failed,
            dispatch_ok = report.dispatch_ok,
            dispatch_failed = report.dispatch_failed,
            "Run complete"
        );
        self.emit_event(Event::RunComplete {
            report: report.clone(),
        });

        Ok(report)
    }

    /// The sequential stages of one run
    async fn run_stages(&self, ctx: &RunContext) -> Result<RunReport> {
        let date = ctx.date;

        // Fetching. The fetcher itself never retries; the retry policy for
        // the whole fetch lives here. Exhaustion degrades to an empty
        // listing so the run still reports instead of aborting.
        self.emit_event(Event::StageChanged {
            date,
            stage: RunStage::Fetching,
        });
        let records = match retry_with_backoff(&self.config.fetch.retry, || {
            self.fetcher.fetch(date)
        })
        .await
        {
            Ok(records) => {
                self.emit_event(Event::ListingFetched {
                    date,
                    count: records.len(),
                });
                records
            }
            Err(e) => {
                warn!(%date, error = %e, "Listing fetch failed, continuing with empty listing");
                self.emit_event(Event::ListingFailed {
                    date,
                    error: e.to_string(),
                });
                Vec::new()
            }
        };

        // Downloading
        if !records.is_empty() {
            self.emit_event(Event::StageChanged {
                date,
                stage: RunStage::Downloading,
            });
            self.download_batch(ctx, &records).await?;
        }

        // Watching for arrivals, then dispatching. Runs even on an empty
        // listing: a previous crash may have left succeeded-but-undispatched
        // tasks behind for this date.
        self.emit_event(Event::StageChanged {
            date,
            stage: RunStage::WatchingForArrivals,
        });
        self.dispatch_pending(ctx).await?;

        // Reporting
        self.emit_event(Event::StageChanged {
            date,
            stage: RunStage::Reporting,
        });
        self.report_for(date).await
    }

    /// Consume arrivals until every succeeded task of this run is dispatched
    ///
    /// Waits on the arrival queue up to the configured grace period, then
    /// sweeps the manifest directly for anything the watcher missed — a
    /// succeeded download is never silently dropped.
    async fn dispatch_pending(&self, ctx: &RunContext) -> Result<()> {
        let date = ctx.date;

        let mut pending: HashSet<(NaiveDate, String)> = self
            .db
            .undispatched_succeeded(date)
            .await?
            .iter()
            .filter_map(|row| Some((date, file_name_of(&row.destination)?)))
            .collect();

        if !pending.is_empty() {
            self.emit_event(Event::StageChanged {
                date,
                stage: RunStage::Dispatching,
            });

            let deadline = tokio::time::Instant::now() + self.config.schedule.arrival_grace;
            let mut rx = self.arrivals_rx.lock().await;

            while !pending.is_empty() {
                tokio::select! {
                    _ = ctx.cancel.cancelled() => {
                        warn!(%date, "Dispatch loop cancelled");
                        break;
                    }
                    _ = tokio::time::sleep_until(deadline) => {
                        warn!(%date, remaining = pending.len(), "Arrival grace period expired");
                        break;
                    }
                    maybe = rx.recv() => match maybe {
                        Some(arrival) => {
                            self.emit_event(Event::PaperArrived {
                                path: arrival.path.clone(),
                            });
                            self.dispatch_file(&arrival.path).await?;

                            if let Some(key) = arrival_key(&arrival.path) {
                                pending.remove(&key);
                            }
                        }
                        None => {
                            warn!("Arrival channel closed");
                            break;
                        }
                    }
                }
            }
        }

        // Fallback sweep: dispatch stragglers straight from the manifest.
        // The processed-files set still guarantees exactly-once.
        for row in self.db.undispatched_succeeded(date).await? {
            if ctx.cancel.is_cancelled() {
                break;
            }
            let path = PathBuf::from(&row.destination);
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                warn!(path = %path.display(), "Arrival never observed, dispatching from manifest");
                self.dispatch_file(&path).await?;
            } else {
                warn!(path = %path.display(), "Succeeded task has no file on disk");
            }
        }

        Ok(())
    }

    /// Dispatch one file and record its terminal outcome
    ///
    /// Exactly-once: the processed-files set is consulted before the
    /// submission and updated right after its terminal result, and the
    /// manifest row (matched by partition date + file name) gets the
    /// dispatched flag. Per-item isolation: a failed submission is recorded
    /// and never propagates.
    pub(crate) async fn dispatch_file(&self, path: &Path) -> Result<()> {
        let fingerprint = match crate::utils::file_fingerprint(path).await {
            Ok(fp) => fp,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cannot fingerprint file, skipping dispatch");
                return Ok(());
            }
        };

        if self.db.is_file_processed(path, &fingerprint).await? {
            debug!(path = %path.display(), "Already dispatched, skipping");
            return Ok(());
        }

        let result = self.dispatcher.submit(path).await;
        let ok = result.status == ProcessingStatus::Ok;

        self.db.mark_file_processed(path, &fingerprint).await?;

        if let Some(date) = partition_date(path)
            && let Some(name) = path.file_name().and_then(|n| n.to_str())
            && let Some(row) = self.db.find_task_by_filename(date, name).await?
        {
            self.db.mark_dispatched(date, &row.paper_id, ok).await?;
        }

        if ok {
            if let Ok(payload) = serde_json::to_string(&result) {
                info!(path = %path.display(), result = %payload, "Dispatch complete");
            }
            self.emit_event(Event::DispatchComplete {
                path: path.to_path_buf(),
            });
        } else {
            let detail = result
                .error_detail
                .unwrap_or_else(|| "unknown dispatch failure".to_string());
            self.emit_event(Event::DispatchFailed {
                path: path.to_path_buf(),
                error: detail,
            });
        }

        Ok(())
    }

    /// Build the report for a date from the manifest
    ///
    /// Always complete: every paper the manifest knows about appears with
    /// its terminal status, whatever state the run ended in.
    pub async fn report_for(&self, date: NaiveDate) -> Result<RunReport> {
        let rows = self.db.manifest_for_date(date).await?;

        let mut report = RunReport::empty(date);
        report.total = rows.len();

        for row in &rows {
            let status = row.task_status();
            match status {
                TaskStatus::Succeeded => report.succeeded += 1,
                TaskStatus::Failed => report.failed += 1,
                TaskStatus::Pending | TaskStatus::Downloading => {}
            }
            if row.is_dispatched() {
                match row.dispatch_ok {
                    Some(1) => report.dispatch_ok += 1,
                    _ => report.dispatch_failed += 1,
                }
            }

            report.papers.push(PaperReportEntry {
                id: crate::types::PaperId::new(row.paper_id.clone()),
                status,
                attempts: row.attempts as u32,
                error: row.error_message.clone(),
                dispatched: row.is_dispatched(),
            });
        }

        Ok(report)
    }
}

/// File name component of a manifest destination string
fn file_name_of(destination: &str) -> Option<String> {
    Path::new(destination)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
}

/// Pending-set key for an arrival path: (partition date, file name)
fn arrival_key(path: &Path) -> Option<(NaiveDate, String)> {
    let date = partition_date(path)?;
    let name = path.file_name()?.to_string_lossy().into_owned();
    Some((date, name))
}
