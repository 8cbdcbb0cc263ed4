//! Daily listing retrieval
//!
//! The [`ListingFetcher`] performs a single HTTP GET of the listing page and
//! delegates record extraction to a pluggable [`ListingExtractor`] strategy.
//! It performs no retry itself: the runner owns the retry policy around the
//! whole fetch, so a flaky listing page never hides inside this component.

mod extract;

pub use extract::{DailyListingExtractor, ListingExtractor};

use crate::config::FetchConfig;
use crate::error::{Error, FetchError, Result};
use crate::types::PaperRecord;
use chrono::NaiveDate;
use tracing::{debug, info};

/// Fetches the paper listing for a date
pub struct ListingFetcher {
    /// HTTP client (shared connection pool, custom User-Agent)
    client: reqwest::Client,

    /// Listing page URL
    listing_url: String,

    /// Cap on records taken from one listing (None = unlimited)
    max_papers: Option<usize>,

    /// Extraction strategy applied to the fetched page
    extractor: Box<dyn ListingExtractor>,
}

impl ListingFetcher {
    /// Create a fetcher with the default extraction strategy
    pub fn new(config: &FetchConfig) -> Result<Self> {
        Self::with_extractor(config, Box::new(DailyListingExtractor::new()))
    }

    /// Create a fetcher with a custom extraction strategy
    ///
    /// Listing pages change shape over time; swapping the extractor is the
    /// supported way to adapt without touching the pipeline.
    pub fn with_extractor(
        config: &FetchConfig,
        extractor: Box<dyn ListingExtractor>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.request_timeout)
            .build()
            .map_err(Error::Network)?;

        Ok(Self {
            client,
            listing_url: config.listing_url.clone(),
            max_papers: config.max_papers,
            extractor,
        })
    }

    /// Fetch the listing for a date and extract its paper records
    ///
    /// Fails with [`FetchError`] on network or parse failure. No side
    /// effects beyond the network call.
    pub async fn fetch(&self, date: NaiveDate) -> Result<Vec<PaperRecord>> {
        debug!(url = %self.listing_url, %date, "Fetching paper listing");

        let response = self
            .client
            .get(&self.listing_url)
            .send()
            .await
            .map_err(|e| FetchError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: self.listing_url.clone(),
                status: status.as_u16(),
            }
            .into());
        }

        let html = response
            .text()
            .await
            .map_err(|e| FetchError::Unreachable(e.to_string()))?;

        let mut records = self.extractor.extract(&html, date)?;

        if records.is_empty() {
            return Err(FetchError::Parse("no paper records found in listing".to_string()).into());
        }

        // Listing pages link entries relatively; resolve them against the
        // listing URL so records carry absolute URLs
        if let Ok(base) = url::Url::parse(&self.listing_url) {
            for record in &mut records {
                if let Some(listing_url) = record.listing_url.take() {
                    record.listing_url = match base.join(&listing_url) {
                        Ok(absolute) => Some(absolute.to_string()),
                        Err(_) => Some(listing_url),
                    };
                }
            }
        }

        if let Some(cap) = self.max_papers
            && records.len() > cap
        {
            debug!(found = records.len(), cap, "Truncating listing to max_papers");
            records.truncate(cap);
        }

        info!(count = records.len(), %date, "Listing fetched");
        Ok(records)
    }
}
