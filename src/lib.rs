//! # papers-dl
//!
//! Unattended daily acquisition and processing pipeline for academic papers.
//!
//! ## Design Philosophy
//!
//! papers-dl is designed to be:
//! - **Unattended** - One scheduled daily cycle, restart-safe state, no babysitting
//! - **Idempotent** - Re-running a date never re-downloads or re-dispatches
//! - **Library-first** - The binary is a thin shell; everything is a Rust crate API
//! - **Event-driven** - Consumers subscribe to lifecycle events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use papers_dl::{PaperPipeline, config::Config};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let pipeline = Arc::new(PaperPipeline::new(config).await?);
//!
//!     // Background watcher feeds arrivals to the dispatch loop
//!     let _watcher = pipeline.spawn_arrival_watcher()?;
//!
//!     // Subscribe to events
//!     let mut events = pipeline.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     // One cycle for today
//!     let report = pipeline.run_once(chrono::Local::now().date_naive()).await?;
//!     println!("{}", serde_json::to_string_pretty(&report)?);
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Arrival watching for downloaded papers
pub mod arrival_watcher;
/// Configuration types
pub mod config;
/// Database persistence layer
pub mod db;
/// Dispatch client for the processing endpoint
pub mod dispatch;
/// Error types
pub mod error;
/// Daily listing retrieval and extraction strategies
pub mod listing;
/// Core pipeline implementation (decomposed into focused submodules)
pub mod pipeline;
/// Retry logic with exponential backoff
pub mod retry;
/// Daily run scheduling
pub mod scheduler;
/// Scheduler task execution
pub mod scheduler_task;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use config::{Config, WatchMode};
pub use db::Database;
pub use dispatch::DispatchClient;
pub use error::{DatabaseError, DispatchError, DownloadError, Error, FetchError, Result};
pub use listing::{DailyListingExtractor, ListingExtractor, ListingFetcher};
pub use pipeline::{PaperPipeline, RunContext};
pub use scheduler::DailySchedule;
pub use scheduler_task::SchedulerTask;
pub use types::{
    ArrivalEvent, Event, PaperId, PaperRecord, ProcessingResult, ProcessingStatus, RunReport,
    RunStage, TaskStatus,
};

use std::sync::Arc;

/// Helper function to run the pipeline with graceful signal handling.
///
/// Waits for a termination signal and then calls the pipeline's
/// `shutdown()` method.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use papers_dl::{PaperPipeline, Config, run_with_shutdown};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Config::default();
///     let pipeline = Arc::new(PaperPipeline::new(config).await?);
///
///     // Run with automatic signal handling
///     run_with_shutdown(pipeline).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(pipeline: Arc<PaperPipeline>) -> Result<()> {
    wait_for_signal().await;
    pipeline.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
