//! Error types for papers-dl
//!
//! This module provides error handling for the library, including:
//! - Domain-specific error types (Fetch, Download, Dispatch, Database)
//! - Context information (paper id, file path, run date, etc.)
//!
//! Retryability classification lives in [`crate::retry`], which implements
//! [`crate::retry::IsRetryable`] for [`Error`].

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for papers-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for papers-dl
///
/// This is the primary error type used throughout the library. Each variant includes
/// contextual information to help diagnose issues.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "download_dir")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Listing fetch or parse error
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Download-related error
    #[error("download error: {0}")]
    Download(#[from] DownloadError),

    /// Dispatch-related error (processing endpoint)
    #[error("dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem watching error
    #[error("arrival watch error: {0}")]
    Watch(String),

    /// Shutdown in progress - not starting new runs
    #[error("shutdown in progress: not starting new runs")]
    ShuttingDown,

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Record not found
    #[error("record not found: {0}")]
    NotFound(String),
}

/// Listing fetch errors
///
/// Produced by the listing fetcher. The fetcher itself never retries; the
/// runner decides whether and how often to retry a failed fetch.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Listing page returned a non-success HTTP status
    #[error("listing request to {url} returned status {status}")]
    Status {
        /// The listing URL that was requested
        url: String,
        /// The HTTP status code returned
        status: u16,
    },

    /// Listing page could not be reached
    #[error("listing unreachable: {0}")]
    Unreachable(String),

    /// Listing page was fetched but no paper records could be extracted
    #[error("listing parse failed: {0}")]
    Parse(String),
}

/// Download-related errors
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Transient network failure while downloading a paper (retryable)
    #[error("network failure downloading {id}: {reason}")]
    Network {
        /// The paper id being downloaded
        id: String,
        /// What went wrong
        reason: String,
    },

    /// Filesystem write failure (not retryable, fails the task immediately)
    #[error("failed to write {path}: {reason}")]
    Write {
        /// The destination path being written
        path: PathBuf,
        /// What went wrong
        reason: String,
    },

    /// The server returned an empty body for a paper
    #[error("empty response body for {id}")]
    EmptyBody {
        /// The paper id being downloaded
        id: String,
    },
}

/// Dispatch-related errors (processing endpoint)
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The submission did not complete within the configured timeout (retryable)
    #[error("dispatch of {path} timed out after {timeout_secs}s")]
    Timeout {
        /// The file being dispatched
        path: PathBuf,
        /// The timeout that expired, in seconds
        timeout_secs: u64,
    },

    /// Transient network failure while talking to the endpoint (retryable)
    #[error("network failure dispatching {path}: {reason}")]
    Network {
        /// The file being dispatched
        path: PathBuf,
        /// What went wrong
        reason: String,
    },

    /// The endpoint answered with an error status or error payload (not retried)
    #[error("processing endpoint rejected {path}: {detail}")]
    Endpoint {
        /// The file being dispatched
        path: PathBuf,
        /// The endpoint's error detail
        detail: String,
    },

    /// The file to dispatch could not be read
    #[error("failed to read {path} for dispatch: {reason}")]
    Read {
        /// The file that could not be read
        path: PathBuf,
        /// What went wrong
        reason: String,
    },
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_includes_context() {
        let err = Error::Download(DownloadError::Network {
            id: "2401.12345".to_string(),
            reason: "connection reset".to_string(),
        });
        let msg = err.to_string();
        assert!(msg.contains("2401.12345"));
        assert!(msg.contains("connection reset"));
    }

    #[test]
    fn dispatch_timeout_display() {
        let err = DispatchError::Timeout {
            path: PathBuf::from("/data/2401.12345.pdf"),
            timeout_secs: 60,
        };
        assert!(err.to_string().contains("60s"));
    }

    #[test]
    fn fetch_status_display() {
        let err = FetchError::Status {
            url: "https://example.com/papers".to_string(),
            status: 503,
        };
        let msg = err.to_string();
        assert!(msg.contains("503"));
        assert!(msg.contains("https://example.com/papers"));
    }

    #[test]
    fn config_error_display() {
        let err = Error::Config {
            message: "download_dir is not writable".to_string(),
            key: Some("download_dir".to_string()),
        };
        assert!(err.to_string().contains("download_dir is not writable"));
    }
}
