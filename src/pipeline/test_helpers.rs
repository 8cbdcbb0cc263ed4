//! Shared fixtures for pipeline tests.

use crate::config::{Config, RetryConfig};
use crate::error::FetchError;
use crate::listing::ListingExtractor;
use crate::pipeline::PaperPipeline;
use crate::types::{PaperId, PaperRecord};
use chrono::NaiveDate;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Run date used across pipeline tests.
pub(crate) fn test_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
}

/// Extractor that ignores the page and returns fixed records.
///
/// Lets tests point `source_url` at a wiremock server instead of the id's
/// canonical host.
pub(crate) struct FixedExtractor(pub Vec<PaperRecord>);

impl ListingExtractor for FixedExtractor {
    fn extract(
        &self,
        _html: &str,
        date: NaiveDate,
    ) -> std::result::Result<Vec<PaperRecord>, FetchError> {
        Ok(self
            .0
            .iter()
            .cloned()
            .map(|mut r| {
                r.listing_date = date;
                r
            })
            .collect())
    }
}

/// A paper record whose PDF is served by the given mock server.
pub(crate) fn record_for_server(server_url: &str, id: &str) -> PaperRecord {
    PaperRecord {
        id: PaperId::new(id),
        title: format!("Paper {id}"),
        source_url: format!("{server_url}/pdf/{id}.pdf"),
        listing_url: None,
        listing_date: test_date(),
    }
}

/// Config wired for tests: temp dirs, mock endpoints, fast retries.
pub(crate) fn test_config(temp_dir: &TempDir, listing_url: &str, endpoint_url: &str) -> Config {
    let fast_retry = |max_attempts: u32| RetryConfig {
        max_attempts,
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(100),
        backoff_multiplier: 2.0,
        jitter: false,
    };

    let mut config = Config::default();
    config.fetch.listing_url = listing_url.to_string();
    config.fetch.retry = fast_retry(1);
    config.fetch.request_timeout = Duration::from_secs(5);
    config.download.download_dir = temp_dir.path().join("downloaded_papers");
    config.download.request_timeout = Duration::from_secs(5);
    config.download.request_delay = Duration::ZERO;
    config.download.retry = fast_retry(2);
    config.dispatch.endpoint_url = endpoint_url.to_string();
    config.dispatch.timeout = Duration::from_secs(5);
    config.dispatch.retry = fast_retry(2);
    config.watcher.settle_interval = Duration::from_millis(30);
    config.watcher.poll_interval = Duration::from_millis(50);
    config.schedule.arrival_grace = Duration::from_secs(2);
    config.schedule.run_timeout = Duration::from_secs(60);
    config.persistence.database_path = temp_dir.path().join("state").join("papers-dl.db");
    config.persistence.log_dir = temp_dir.path().join("logs");
    config
}

/// Pipeline with fixed listing records and mock endpoints.
pub(crate) async fn create_test_pipeline(
    listing_url: &str,
    endpoint_url: &str,
    records: Vec<PaperRecord>,
) -> (Arc<PaperPipeline>, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(&temp_dir, listing_url, endpoint_url);

    let pipeline = PaperPipeline::with_extractor(config, Box::new(FixedExtractor(records)))
        .await
        .unwrap();

    (Arc::new(pipeline), temp_dir)
}
