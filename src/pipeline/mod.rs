//! Core pipeline implementation split into focused submodules.
//!
//! The `PaperPipeline` struct and its methods are organized by domain:
//! - [`download`] - Download manager (dedup, retry, manifest bookkeeping)
//! - [`run`] - Daily run orchestration and reporting
//!
//! The pipeline owns the persistent state (database), the HTTP client used
//! for PDF downloads, the listing fetcher, the dispatch client, and the two
//! channels everything communicates over: a broadcast channel for lifecycle
//! events and an mpsc queue carrying arrivals from the watcher to the
//! dispatch loop.

mod download;
mod run;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use crate::arrival_watcher::ArrivalWatcher;
use crate::config::Config;
use crate::db::Database;
use crate::dispatch::DispatchClient;
use crate::error::{Error, Result};
use crate::listing::ListingFetcher;
use crate::types::{ArrivalEvent, Event};
use chrono::NaiveDate;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_util::sync::CancellationToken;

/// Run-scoped state passed through the pipeline stages
///
/// There is no process-wide run state: everything one daily cycle needs to
/// know about itself travels in this struct.
#[derive(Clone, Debug)]
pub struct RunContext {
    /// The run date
    pub date: NaiveDate,
    /// Date partition directory files land in
    pub dest_dir: PathBuf,
    /// Cancelled when the run is aborted (shutdown or timeout budget)
    pub cancel: CancellationToken,
}

/// Main pipeline instance
pub struct PaperPipeline {
    /// Database instance for persistence (manifest, processed-files set).
    /// Public for integration tests to query run state
    pub db: Arc<Database>,
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// HTTP client used for PDF downloads
    pub(crate) http: reqwest::Client,
    /// Listing fetcher (pluggable extraction strategy inside)
    pub(crate) fetcher: ListingFetcher,
    /// Dispatch client for the processing endpoint
    pub(crate) dispatcher: DispatchClient,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
    /// Arrival queue sender, handed to the watcher
    pub(crate) arrivals_tx: tokio::sync::mpsc::UnboundedSender<ArrivalEvent>,
    /// Arrival queue receiver, consumed by the dispatch loop of one run at a
    /// time (the Mutex serializes runs, never individual arrivals)
    pub(crate) arrivals_rx: tokio::sync::Mutex<tokio::sync::mpsc::UnboundedReceiver<ArrivalEvent>>,
    /// Cleared during shutdown; all background loops poll it
    accepting_new: Arc<AtomicBool>,
    /// Root cancellation token; runs derive child tokens from it
    shutdown_token: CancellationToken,
}

impl PaperPipeline {
    /// Create a new pipeline instance with the default listing extractor
    ///
    /// This initializes all core components:
    /// - Creates the download root (an unwritable root is fatal)
    /// - Opens/creates the SQLite database and runs migrations
    /// - Builds the HTTP clients for downloads and dispatch
    /// - Sets up the event broadcast and arrival channels
    pub async fn new(config: Config) -> Result<Self> {
        Self::with_extractor(
            config,
            Box::new(crate::listing::DailyListingExtractor::new()),
        )
        .await
    }

    /// Create a pipeline with a custom listing extraction strategy
    ///
    /// Listing pages differ per site and change shape over time; injecting
    /// the extractor here adapts the whole pipeline without touching it.
    pub async fn with_extractor(
        config: Config,
        extractor: Box<dyn crate::listing::ListingExtractor>,
    ) -> Result<Self> {
        // An unusable download root is an environment-level failure: nothing
        // in a run can succeed without it, so fail construction outright
        tokio::fs::create_dir_all(&config.download.download_dir)
            .await
            .map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create download root '{}': {}",
                        config.download.download_dir.display(),
                        e
                    ),
                ))
            })?;

        // Initialize database
        let db = Database::new(&config.persistence.database_path).await?;

        if db.was_unclean_shutdown().await? {
            tracing::info!("Previous session ended uncleanly; watcher will rescan existing files");
        }

        // Mark that we're starting up (for unclean shutdown detection)
        db.set_clean_start().await?;

        let http = reqwest::Client::builder()
            .user_agent(config.fetch.user_agent.clone())
            .build()
            .map_err(Error::Network)?;

        let fetcher = ListingFetcher::with_extractor(&config.fetch, extractor)?;
        let dispatcher = DispatchClient::new(&config.dispatch)?;

        // Broadcast channel for lifecycle events; subscribers that lag more
        // than the buffer simply miss old events
        let (event_tx, _rx) = tokio::sync::broadcast::channel(1024);

        let (arrivals_tx, arrivals_rx) = tokio::sync::mpsc::unbounded_channel();

        Ok(Self {
            db: Arc::new(db),
            config: Arc::new(config),
            http,
            fetcher,
            dispatcher,
            event_tx,
            arrivals_tx,
            arrivals_rx: tokio::sync::Mutex::new(arrivals_rx),
            accepting_new: Arc::new(AtomicBool::new(true)),
            shutdown_token: CancellationToken::new(),
        })
    }

    /// Subscribe to pipeline events
    ///
    /// Multiple subscribers are supported. Each subscriber receives all
    /// events independently.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Get the current configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Whether the pipeline is accepting new runs
    pub fn is_accepting(&self) -> bool {
        self.accepting_new.load(Ordering::SeqCst)
    }

    /// The shared flag background loops watch for shutdown
    pub fn accepting_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.accepting_new)
    }

    /// Build the context for one run
    pub(crate) fn run_context(&self, date: NaiveDate) -> RunContext {
        RunContext {
            date,
            dest_dir: crate::utils::date_dir(self.config.download_dir(), date),
            cancel: self.shutdown_token.child_token(),
        }
    }

    /// Emit an event to all subscribers
    ///
    /// If there are no active subscribers the event is silently dropped;
    /// the pipeline never depends on anyone listening.
    pub(crate) fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }

    /// Spawn the arrival watcher as a background task
    ///
    /// The watcher rescans existing files first (restart safety), then
    /// feeds arrivals into the pipeline's dispatch loop until shutdown.
    pub fn spawn_arrival_watcher(&self) -> Result<tokio::task::JoinHandle<()>> {
        let mut watcher = ArrivalWatcher::new(
            Arc::clone(&self.db),
            Arc::clone(&self.config),
            self.arrivals_tx.clone(),
            self.accepting_flag(),
        )?;
        watcher.start()?;

        Ok(tokio::spawn(async move {
            watcher.run().await;
        }))
    }

    /// Shut the pipeline down
    ///
    /// Stops accepting new runs, cancels any run in flight, and records a
    /// clean shutdown so the next startup can skip crash recovery.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Pipeline shutting down");
        self.accepting_new.store(false, Ordering::SeqCst);
        self.shutdown_token.cancel();
        self.db.set_clean_shutdown().await?;
        Ok(())
    }
}
