//! Dispatch client for the processing endpoint
//!
//! Submits downloaded files to the external processing service as multipart
//! uploads and normalizes whatever comes back into a [`ProcessingResult`].
//! Failure isolation contract: [`DispatchClient::submit`] never returns an
//! error — timeouts and transport failures are retried up to the configured
//! cap, endpoint rejections are recorded as-is, and the terminal outcome is
//! always a result the caller can aggregate and move past.

use crate::config::DispatchConfig;
use crate::error::{DispatchError, Error, Result};
use crate::retry::retry_with_backoff;
use crate::types::{ProcessingResult, ProcessingStatus};
use std::path::Path;
use tracing::{debug, warn};

/// Client for the processing endpoint
pub struct DispatchClient {
    /// HTTP client (shared connection pool)
    client: reqwest::Client,

    /// Processing endpoint URL
    endpoint_url: String,

    /// Bound on one submission round-trip
    timeout: std::time::Duration,

    /// Retry policy for timeouts and transient network failures
    retry: crate::config::RetryConfig,
}

impl DispatchClient {
    /// Create a dispatch client
    pub fn new(config: &DispatchConfig) -> Result<Self> {
        let client = reqwest::Client::builder().build().map_err(Error::Network)?;

        Ok(Self {
            client,
            endpoint_url: config.endpoint_url.clone(),
            timeout: config.timeout,
            retry: config.retry.clone(),
        })
    }

    /// Submit one file and return its terminal processing outcome
    ///
    /// Retries timeouts and transient network errors per the configured
    /// policy; on exhaustion (or a non-retryable failure) returns a
    /// `ProcessingResult` with status `error` and the failure detail.
    pub async fn submit(&self, path: &Path) -> ProcessingResult {
        debug!(path = %path.display(), endpoint = %self.endpoint_url, "Dispatching file");

        let outcome = retry_with_backoff(&self.retry, || self.try_submit(path)).await;

        match outcome {
            Ok(payload) => ProcessingResult {
                source_file: path.to_path_buf(),
                status: ProcessingStatus::Ok,
                payload: Some(payload),
                error_detail: None,
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Dispatch terminally failed");
                ProcessingResult {
                    source_file: path.to_path_buf(),
                    status: ProcessingStatus::Error,
                    payload: None,
                    error_detail: Some(e.to_string()),
                }
            }
        }
    }

    /// One submission attempt with classified errors
    async fn try_submit(&self, path: &Path) -> Result<serde_json::Value> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            Error::Dispatch(DispatchError::Read {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
        })?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload.pdf".to_string());

        let metadata = serde_json::json!({
            "source_file": path.to_string_lossy(),
        });

        let file_part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("application/pdf")
            .map_err(Error::Network)?;

        let form = reqwest::multipart::Form::new()
            .part("file", file_part)
            .text("metadata", metadata.to_string());

        let request = self
            .client
            .post(&self.endpoint_url)
            .multipart(form)
            .timeout(self.timeout);

        let response = match tokio::time::timeout(self.timeout, request.send()).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) if e.is_timeout() => {
                return Err(Error::Dispatch(DispatchError::Timeout {
                    path: path.to_path_buf(),
                    timeout_secs: self.timeout.as_secs(),
                }));
            }
            Ok(Err(e)) => {
                return Err(Error::Dispatch(DispatchError::Network {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                }));
            }
            Err(_) => {
                return Err(Error::Dispatch(DispatchError::Timeout {
                    path: path.to_path_buf(),
                    timeout_secs: self.timeout.as_secs(),
                }));
            }
        };

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            Error::Dispatch(DispatchError::Network {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
        })?;

        if !status.is_success() {
            return Err(Error::Dispatch(DispatchError::Endpoint {
                path: path.to_path_buf(),
                detail: format!("status {}: {}", status.as_u16(), truncate(&body, 200)),
            }));
        }

        let value: serde_json::Value = serde_json::from_str(&body).map_err(|_| {
            Error::Dispatch(DispatchError::Endpoint {
                path: path.to_path_buf(),
                detail: format!("non-JSON response: {}", truncate(&body, 200)),
            })
        })?;

        normalize_response(path, value)
    }
}

/// Normalize the endpoint's response shape
///
/// Accepts `{status, payload}`, `{status, error}`, or any bare JSON object,
/// so downstream consumers never see the endpoint's own schema. An explicit
/// error status or `error` field becomes an `Endpoint` error (recorded by
/// the caller, never retried).
fn normalize_response(path: &Path, value: serde_json::Value) -> Result<serde_json::Value> {
    let status = value.get("status").and_then(|s| s.as_str());

    if status == Some("error") || (status.is_none() && value.get("error").is_some()) {
        let detail = value
            .get("error")
            .map(|e| match e.as_str() {
                Some(s) => s.to_string(),
                None => e.to_string(),
            })
            .unwrap_or_else(|| "endpoint returned error status".to_string());

        return Err(Error::Dispatch(DispatchError::Endpoint {
            path: path.to_path_buf(),
            detail,
        }));
    }

    // {status: ok, payload: ...} unwraps to the payload; anything else is
    // passed through whole
    match value.get("payload") {
        Some(payload) => Ok(payload.clone()),
        None => Ok(value),
    }
}

/// Clip a response body for error messages
fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
