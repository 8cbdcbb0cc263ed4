//! Arrival watching for downloaded papers
//!
//! This module watches the download root for newly completed PDF files and
//! emits an [`ArrivalEvent`] for each one, exactly once. It supports:
//! - Native filesystem notifications (`notify`), recursive over the
//!   date-partitioned tree
//! - A polling mode that scans the manifest for succeeded-but-undispatched
//!   tasks instead of the filesystem
//! - A settle check: an event is only emitted once the file's size has been
//!   stable across the configured settle interval
//! - Restart safety: on start, existing files are re-scanned against the
//!   processed-files set before live watching begins, so an arrival is never
//!   lost to a process restart
//!
//! # Example
//!
//! ```no_run
//! use papers_dl::arrival_watcher::ArrivalWatcher;
//! use papers_dl::config::Config;
//! use papers_dl::db::Database;
//! use std::sync::Arc;
//! use std::sync::atomic::AtomicBool;
//! use tokio::sync::mpsc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Arc::new(Config::default());
//! let db = Arc::new(Database::new(config.database_path()).await?);
//! let accepting = Arc::new(AtomicBool::new(true));
//! let (tx, mut rx) = mpsc::unbounded_channel();
//!
//! let mut watcher = ArrivalWatcher::new(db, config, tx, accepting)?;
//! watcher.start()?;
//!
//! tokio::spawn(async move { watcher.run().await });
//! while let Some(arrival) = rx.recv().await {
//!     println!("arrived: {}", arrival.path.display());
//! }
//! # Ok(())
//! # }
//! ```

use crate::config::{Config, WatchMode};
use crate::db::Database;
use crate::error::{Error, Result};
use crate::types::ArrivalEvent;
use crate::utils::{file_fingerprint, is_pdf_file, wait_until_settled};
use notify::{
    Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// How often the notify-mode loop wakes up to check the shutdown flag
const SHUTDOWN_POLL: std::time::Duration = std::time::Duration::from_secs(1);

/// Watches the download root and emits one arrival event per settled file
pub struct ArrivalWatcher {
    /// Filesystem watcher instance (notify mode only)
    watcher: Option<RecommendedWatcher>,

    /// Channel for receiving filesystem events (notify mode only)
    fs_rx: Option<mpsc::UnboundedReceiver<notify::Result<Event>>>,

    /// Database handle for the processed-files set and manifest scans
    db: Arc<Database>,

    /// Pipeline configuration
    config: Arc<Config>,

    /// Sink for confirmed arrivals
    arrivals_tx: mpsc::UnboundedSender<ArrivalEvent>,

    /// Cleared when the pipeline is shutting down
    accepting: Arc<AtomicBool>,

    /// Paths already emitted this session and not yet marked processed
    emitted: HashSet<PathBuf>,
}

impl ArrivalWatcher {
    /// Create a new arrival watcher
    ///
    /// # Errors
    /// Returns an error if the filesystem watcher cannot be initialized
    /// (notify mode only).
    pub fn new(
        db: Arc<Database>,
        config: Arc<Config>,
        arrivals_tx: mpsc::UnboundedSender<ArrivalEvent>,
        accepting: Arc<AtomicBool>,
    ) -> Result<Self> {
        let (watcher, fs_rx) = match config.watcher.mode {
            WatchMode::Notify => {
                let (tx, rx) = mpsc::unbounded_channel();
                let watcher = RecommendedWatcher::new(
                    move |res| {
                        if let Err(e) = tx.send(res) {
                            error!("Failed to forward filesystem event: {}", e);
                        }
                    },
                    NotifyConfig::default(),
                )
                .map_err(|e| Error::Watch(e.to_string()))?;
                (Some(watcher), Some(rx))
            }
            WatchMode::Poll => (None, None),
        };

        Ok(Self {
            watcher,
            fs_rx,
            db,
            config,
            arrivals_tx,
            accepting,
            emitted: HashSet::new(),
        })
    }

    /// Start watching the download root
    ///
    /// Creates the root if it does not exist. In notify mode this registers
    /// the recursive watch; in polling mode it is a no-op beyond the mkdir.
    ///
    /// # Errors
    /// Returns an error if the root cannot be created or watched.
    pub fn start(&mut self) -> Result<()> {
        let root = self.config.download_dir();

        if !root.exists() {
            std::fs::create_dir_all(root)
                .map_err(|e| Error::Watch(format!("Failed to create download root: {}", e)))?;
            info!("Created download root: {}", root.display());
        }

        if let Some(watcher) = &mut self.watcher {
            watcher
                .watch(root, RecursiveMode::Recursive)
                .map_err(|e| Error::Watch(format!("Failed to watch download root: {}", e)))?;
            info!("Watching download root: {}", root.display());
        } else {
            info!(
                interval = ?self.config.watcher.poll_interval,
                "Polling manifest for arrivals"
            );
        }

        Ok(())
    }

    /// Run the watcher loop until shutdown
    ///
    /// Always begins with a rescan of existing files so that arrivals from a
    /// previous session (crash, restart mid-run) are recovered before live
    /// events are consumed.
    pub async fn run(mut self) {
        info!("Arrival watcher started");

        if let Err(e) = self.rescan().await {
            error!(error = %e, "Initial rescan failed");
        }

        match self.config.watcher.mode {
            WatchMode::Notify => self.run_notify().await,
            WatchMode::Poll => self.run_poll().await,
        }

        info!("Arrival watcher stopped");
    }

    /// Notify-mode event loop
    async fn run_notify(&mut self) {
        let Some(mut rx) = self.fs_rx.take() else {
            error!("Notify mode without an event channel");
            return;
        };

        loop {
            if !self.accepting.load(Ordering::SeqCst) {
                info!("Arrival watcher shutting down");
                break;
            }

            tokio::select! {
                maybe = rx.recv() => match maybe {
                    Some(Ok(event)) => {
                        if let Err(e) = self.handle_fs_event(event).await {
                            error!(error = %e, "Error handling filesystem event");
                        }
                    }
                    Some(Err(e)) => {
                        error!("Filesystem watcher error: {}", e);
                    }
                    None => break,
                },
                _ = tokio::time::sleep(SHUTDOWN_POLL) => {
                    // Loop back around to re-check the shutdown flag
                }
            }
        }
    }

    /// Polling-mode loop: the manifest is the source of truth
    async fn run_poll(&mut self) {
        loop {
            if !self.accepting.load(Ordering::SeqCst) {
                info!("Arrival watcher shutting down");
                break;
            }

            match self.db.all_undispatched_succeeded().await {
                Ok(rows) => {
                    for row in rows {
                        let path = PathBuf::from(&row.destination);
                        if let Err(e) = self.handle_candidate(path).await {
                            error!(error = %e, "Error handling manifest candidate");
                        }
                    }
                }
                Err(e) => {
                    error!(error = %e, "Manifest scan failed");
                }
            }

            tokio::time::sleep(self.config.watcher.poll_interval).await;
        }
    }

    /// Stop watching
    pub fn stop(self) {
        // Dropping the watcher will automatically stop watching
        drop(self.watcher);
        info!("Arrival watcher stopped");
    }

    /// Re-scan existing files under the download root
    ///
    /// Walks the date partitions and runs every PDF through the same
    /// candidate handling as a live event. Files already in the
    /// processed-files set are skipped there.
    pub async fn rescan(&mut self) -> Result<usize> {
        let root = self.config.download_dir().clone();
        if !root.exists() {
            return Ok(0);
        }

        let mut candidates = Vec::new();
        let mut dirs = tokio::fs::read_dir(&root).await.map_err(Error::Io)?;
        while let Some(entry) = dirs.next_entry().await.map_err(Error::Io)? {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let mut files = tokio::fs::read_dir(&path).await.map_err(Error::Io)?;
            while let Some(file) = files.next_entry().await.map_err(Error::Io)? {
                let file_path = file.path();
                if is_pdf_file(&file_path) {
                    candidates.push(file_path);
                }
            }
        }

        candidates.sort();
        let count = candidates.len();
        debug!(count, "Rescanning existing files");

        for path in candidates {
            if let Err(e) = self.handle_candidate(path).await {
                error!(error = %e, "Error handling rescanned file");
            }
        }

        Ok(count)
    }

    /// Handle a filesystem event from the notify backend
    ///
    /// Only creation and modification events for `.pdf` files are
    /// interesting; everything else (removals, directory events, `.part`
    /// temp files) is ignored.
    async fn handle_fs_event(&mut self, event: Event) -> Result<()> {
        match event.kind {
            EventKind::Create(_) | EventKind::Modify(_) => {
                for path in event.paths {
                    if is_pdf_file(&path) {
                        self.handle_candidate(path).await?;
                    }
                }
            }
            _ => {
                // Ignore other event types (remove, access, etc.)
            }
        }

        Ok(())
    }

    /// Run one candidate file through settle, dedup, and emission
    async fn handle_candidate(&mut self, path: PathBuf) -> Result<()> {
        // Stabilize the path so rescan and live events agree on the key
        let path = tokio::fs::canonicalize(&path).await.unwrap_or(path);

        if self.emitted.contains(&path) {
            return Ok(());
        }

        let settled = wait_until_settled(
            &path,
            self.config.watcher.settle_interval,
            self.config.watcher.max_settle_checks,
        )
        .await;

        let Some(size) = settled else {
            warn!(path = %path.display(), "File never settled, skipping");
            return Ok(());
        };

        let fingerprint = file_fingerprint(&path).await?;
        if self.db.is_file_processed(&path, &fingerprint).await? {
            debug!(path = %path.display(), "Already processed, skipping");
            return Ok(());
        }

        debug!(path = %path.display(), size, "File settled, emitting arrival");
        self.emitted.insert(path.clone());

        let event = ArrivalEvent {
            path,
            discovered_at: chrono::Utc::now(),
        };

        // Receiver gone means the pipeline is shutting down; nothing to do
        self.arrivals_tx.send(event).ok();

        Ok(())
    }
}

/// Check whether a path sits inside a date partition of the download root
///
/// Used by consumers to separate current-run arrivals from stragglers of
/// earlier dates recovered by the rescan.
pub fn partition_date(path: &Path) -> Option<chrono::NaiveDate> {
    let dir_name = path.parent()?.file_name()?.to_str()?;
    chrono::NaiveDate::parse_from_str(dir_name, "%Y-%m-%d").ok()
}
