//! Retry logic with exponential backoff
//!
//! This module provides configurable retry logic for transient failures.
//! It implements exponential backoff with optional jitter to prevent thundering herd.
//!
//! # Example
//!
//! ```no_run
//! use papers_dl::retry::{IsRetryable, retry_with_backoff};
//! use papers_dl::config::RetryConfig;
//!
//! #[derive(Debug)]
//! enum MyError {
//!     Transient,
//!     Permanent,
//! }
//!
//! impl std::fmt::Display for MyError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{self:?}")
//!     }
//! }
//!
//! impl IsRetryable for MyError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, MyError::Transient)
//!     }
//! }
//!
//! # async fn example() -> Result<(), MyError> {
//! let config = RetryConfig::default();
//! let result = retry_with_backoff(&config, || async {
//!     // Your operation here
//!     Ok::<_, MyError>(())
//! }).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::{DispatchError, DownloadError, Error};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (network timeouts, connection reset, endpoint busy) should return `true`.
/// Permanent failures (filesystem write failure, parse error, rejected payload) should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

/// Implementation of IsRetryable for our Error type
impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            // reqwest transients: timeouts and connection-level failures
            Error::Network(e) => e.is_timeout() || e.is_connect(),
            // Listing fetches are retried as a whole by the runner; transport
            // problems and 5xx statuses are worth another attempt, parse
            // failures are not
            Error::Fetch(e) => match e {
                crate::error::FetchError::Unreachable(_) => true,
                crate::error::FetchError::Status { status, .. } => *status >= 500,
                crate::error::FetchError::Parse(_) => false,
            },
            // Per-task download failures: network yes, filesystem no
            Error::Download(e) => matches!(
                e,
                DownloadError::Network { .. } | DownloadError::EmptyBody { .. }
            ),
            // Dispatch: timeouts and transport failures retry, endpoint
            // rejections and unreadable files do not
            Error::Dispatch(e) => matches!(
                e,
                DispatchError::Timeout { .. } | DispatchError::Network { .. }
            ),
            // I/O errors can be retryable in some cases
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::Interrupted
            ),
            // Database errors should not be retried (likely permanent)
            Error::Database(_) | Error::Sqlx(_) => false,
            // Config errors are permanent
            Error::Config { .. } => false,
            // Serialization errors are permanent
            Error::Serialization(_) => false,
            // Watcher errors are filesystem-level, not transient
            Error::Watch(_) => false,
            // Shutdown in progress - not retryable
            Error::ShuttingDown => false,
            // Unknown errors - be conservative and don't retry
            Error::Other(_) => false,
        }
    }
}

/// Execute an async operation with exponential backoff retry logic
///
/// # Arguments
///
/// * `config` - Retry configuration (max attempts, delays, backoff multiplier, jitter)
/// * `operation` - Async closure that returns Result<T, E> where E implements IsRetryable
///
/// # Returns
///
/// Returns the successful result or the last error after all retry attempts are exhausted.
pub async fn retry_with_backoff<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(attempts = attempt + 1, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < config.max_attempts => {
                attempt += 1;

                tracing::warn!(
                    error = %e,
                    attempt = attempt,
                    max_attempts = config.max_attempts,
                    delay_ms = delay.as_millis(),
                    "Operation failed, retrying"
                );

                let jittered_delay = if config.jitter {
                    add_jitter(delay)
                } else {
                    delay
                };

                tokio::time::sleep(jittered_delay).await;

                // Exponential backoff, capped at max_delay
                let next_delay =
                    Duration::from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier);
                delay = next_delay.min(config.max_delay);
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::error!(
                        error = %e,
                        attempts = attempt + 1,
                        "Operation failed after all retry attempts exhausted"
                    );
                } else {
                    tracing::error!(
                        error = %e,
                        "Operation failed with non-retryable error"
                    );
                }
                return Err(e);
            }
        }
    }
}

/// Add random jitter to a delay to prevent thundering herd
///
/// Jitter is uniformly distributed between 0% and 100% of the delay, so the
/// actual delay falls between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    let jittered_secs = delay.as_secs_f64() * (1.0 + jitter_factor);
    Duration::from_secs_f64(jittered_secs)
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    enum TestError {
        Transient,
        Permanent,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                TestError::Transient => write!(f, "transient error"),
                TestError::Permanent => write!(f, "permanent error"),
            }
        }
    }

    impl IsRetryable for TestError {
        fn is_retryable(&self) -> bool {
            matches!(self, TestError::Transient)
        }
    }

    fn fast_config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }

    #[tokio::test]
    async fn success_without_retry_calls_once() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = retry_with_backoff(&fast_config(3), || {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, TestError>(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 1, "should only call once");
    }

    #[tokio::test]
    async fn transient_failures_retry_then_succeed() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = retry_with_backoff(&fast_config(3), || {
            let counter = counter_clone.clone();
            async move {
                let count = counter.fetch_add(1, Ordering::SeqCst);
                if count < 2 {
                    Err(TestError::Transient)
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(
            counter.load(Ordering::SeqCst),
            3,
            "should retry twice before success"
        );
    }

    #[tokio::test]
    async fn retries_are_capped_at_max_attempts() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = retry_with_backoff(&fast_config(2), || {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<i32, _>(TestError::Transient)
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(
            counter.load(Ordering::SeqCst),
            3,
            "should try initial + 2 retries"
        );
    }

    #[tokio::test]
    async fn permanent_error_is_not_retried() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = retry_with_backoff(&fast_config(5), || {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<i32, _>(TestError::Permanent)
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(
            counter.load(Ordering::SeqCst),
            1,
            "should not retry permanent error"
        );
    }

    #[tokio::test]
    async fn backoff_delays_increase_exponentially() {
        let config = RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter: false,
        };

        let timestamps = Arc::new(tokio::sync::Mutex::new(Vec::new()));
        let ts_clone = timestamps.clone();

        let _result = retry_with_backoff(&config, || {
            let ts = ts_clone.clone();
            async move {
                ts.lock().await.push(std::time::Instant::now());
                Err::<i32, _>(TestError::Transient)
            }
        })
        .await;

        let ts = timestamps.lock().await;
        assert_eq!(ts.len(), 4, "initial + 3 retries = 4 calls");

        let gap1 = ts[1].duration_since(ts[0]);
        let gap2 = ts[2].duration_since(ts[1]);
        let gap3 = ts[3].duration_since(ts[2]);

        assert!(gap1 >= Duration::from_millis(40), "first delay ~50ms, was {gap1:?}");
        assert!(gap2 >= Duration::from_millis(80), "second delay ~100ms, was {gap2:?}");
        assert!(gap3 >= Duration::from_millis(160), "third delay ~200ms, was {gap3:?}");
    }

    #[tokio::test]
    async fn individual_delays_never_exceed_max_delay() {
        // Aggressive multiplier: uncapped delays would be 50ms, 500ms, 5000ms
        let config = RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_millis(200),
            backoff_multiplier: 10.0,
            jitter: false,
        };

        let timestamps = Arc::new(tokio::sync::Mutex::new(Vec::new()));
        let ts_clone = timestamps.clone();

        let _result = retry_with_backoff(&config, || {
            let ts = ts_clone.clone();
            async move {
                ts.lock().await.push(std::time::Instant::now());
                Err::<i32, _>(TestError::Transient)
            }
        })
        .await;

        let ts = timestamps.lock().await;
        assert_eq!(ts.len(), 4);

        let max_allowed = Duration::from_millis(350); // 200ms + scheduling tolerance
        for i in 1..ts.len() {
            let gap = ts[i].duration_since(ts[i - 1]);
            assert!(
                gap <= max_allowed,
                "delay between attempt {} and {} was {:?}, exceeds cap",
                i,
                i + 1,
                gap
            );
        }
    }

    #[tokio::test]
    async fn zero_max_attempts_fails_on_first_transient_error() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = retry_with_backoff(&fast_config(0), || {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<i32, _>(TestError::Transient)
            }
        })
        .await;

        assert!(matches!(result, Err(TestError::Transient)));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn add_jitter_stays_within_bounds_over_many_iterations() {
        let delay = Duration::from_millis(50);
        for i in 0..200 {
            let jittered = add_jitter(delay);
            assert!(
                jittered >= delay,
                "iteration {i}: jittered {jittered:?} < base delay {delay:?}"
            );
            assert!(
                jittered <= delay * 2,
                "iteration {i}: jittered {jittered:?} > 2x base delay"
            );
        }
    }

    #[test]
    fn add_jitter_on_zero_delay_returns_zero() {
        assert_eq!(add_jitter(Duration::ZERO), Duration::ZERO);
    }

    // -----------------------------------------------------------------------
    // IsRetryable classification for this crate's Error variants
    // -----------------------------------------------------------------------

    #[test]
    fn download_network_error_is_retryable() {
        let err = Error::Download(DownloadError::Network {
            id: "2401.12345".to_string(),
            reason: "connection reset".to_string(),
        });
        assert!(err.is_retryable());
    }

    #[test]
    fn download_write_error_is_not_retryable() {
        let err = Error::Download(DownloadError::Write {
            path: PathBuf::from("/papers/x.pdf"),
            reason: "read-only filesystem".to_string(),
        });
        assert!(
            !err.is_retryable(),
            "filesystem failures require user action, not retries"
        );
    }

    #[test]
    fn download_empty_body_is_retryable() {
        let err = Error::Download(DownloadError::EmptyBody {
            id: "2401.12345".to_string(),
        });
        assert!(err.is_retryable());
    }

    #[test]
    fn dispatch_timeout_is_retryable() {
        let err = Error::Dispatch(DispatchError::Timeout {
            path: PathBuf::from("/papers/x.pdf"),
            timeout_secs: 60,
        });
        assert!(err.is_retryable());
    }

    #[test]
    fn dispatch_endpoint_rejection_is_not_retryable() {
        let err = Error::Dispatch(DispatchError::Endpoint {
            path: PathBuf::from("/papers/x.pdf"),
            detail: "unsupported file".to_string(),
        });
        assert!(!err.is_retryable(), "endpoint rejections are recorded, not retried");
    }

    #[test]
    fn dispatch_unreadable_file_is_not_retryable() {
        let err = Error::Dispatch(DispatchError::Read {
            path: PathBuf::from("/papers/x.pdf"),
            reason: "no such file".to_string(),
        });
        assert!(!err.is_retryable());
    }

    #[test]
    fn fetch_unreachable_is_retryable() {
        let err = Error::Fetch(FetchError::Unreachable("dns failure".to_string()));
        assert!(err.is_retryable());
    }

    #[test]
    fn fetch_server_error_status_is_retryable() {
        let err = Error::Fetch(FetchError::Status {
            url: "https://example.com/papers".to_string(),
            status: 503,
        });
        assert!(err.is_retryable());
    }

    #[test]
    fn fetch_client_error_status_is_not_retryable() {
        let err = Error::Fetch(FetchError::Status {
            url: "https://example.com/papers".to_string(),
            status: 404,
        });
        assert!(!err.is_retryable());
    }

    #[test]
    fn fetch_parse_error_is_not_retryable() {
        let err = Error::Fetch(FetchError::Parse("no records found".to_string()));
        assert!(!err.is_retryable());
    }

    #[test]
    fn io_timeout_is_retryable() {
        let err = Error::Io(std::io::Error::new(std::io::ErrorKind::TimedOut, "timeout"));
        assert!(err.is_retryable());
    }

    #[test]
    fn io_permission_denied_is_not_retryable() {
        let err = Error::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        ));
        assert!(!err.is_retryable());
    }

    #[test]
    fn shutdown_is_not_retryable() {
        assert!(!Error::ShuttingDown.is_retryable());
    }

    #[test]
    fn database_error_is_not_retryable() {
        use crate::error::DatabaseError;
        let err = Error::Database(DatabaseError::QueryFailed("db error".to_string()));
        assert!(!err.is_retryable());
    }
}
