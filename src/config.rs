//! Configuration types for papers-dl

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Listing fetch configuration
///
/// Groups settings for retrieving the daily paper listing.
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FetchConfig {
    /// URL of the daily listing page (default: "https://huggingface.co/papers")
    #[serde(default = "default_listing_url")]
    pub listing_url: String,

    /// Request timeout for the listing fetch (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// Maximum number of papers to take from one listing (None = unlimited)
    #[serde(default = "default_max_papers")]
    pub max_papers: Option<usize>,

    /// User-Agent header sent with all requests
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Retry policy applied by the runner around the whole fetch
    #[serde(default = "default_fetch_retry")]
    pub retry: RetryConfig,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            listing_url: default_listing_url(),
            request_timeout: default_request_timeout(),
            max_papers: default_max_papers(),
            user_agent: default_user_agent(),
            retry: default_fetch_retry(),
        }
    }
}

/// Download behavior configuration (directory layout, retry, pacing)
///
/// Groups settings related to how paper PDFs are fetched and stored.
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Root of the date-partitioned download tree (default: "./downloaded_papers")
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Per-request timeout for one PDF download (default: 60 seconds)
    #[serde(default = "default_download_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// Delay inserted between consecutive downloads (default: 1 second)
    ///
    /// Politeness pacing so a batch does not hammer the upstream host.
    #[serde(default = "default_request_delay", with = "duration_serde")]
    pub request_delay: Duration,

    /// Retry policy for transient per-task failures
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            request_timeout: default_download_timeout(),
            request_delay: default_request_delay(),
            retry: RetryConfig::default(),
        }
    }
}

/// Dispatch configuration (processing endpoint)
///
/// Groups settings for submitting downloaded files to the processing service.
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Processing endpoint URL (default: "http://localhost:8000/process")
    #[serde(default = "default_endpoint_url")]
    pub endpoint_url: String,

    /// Bound on one submission round-trip (default: 60 seconds)
    #[serde(default = "default_dispatch_timeout", with = "duration_serde")]
    pub timeout: Duration,

    /// Retry policy for timeouts and transient network failures
    #[serde(default = "default_dispatch_retry")]
    pub retry: RetryConfig,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            endpoint_url: default_endpoint_url(),
            timeout: default_dispatch_timeout(),
            retry: default_dispatch_retry(),
        }
    }
}

/// Arrival watching mode
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchMode {
    /// Native filesystem notifications (default)
    #[default]
    Notify,
    /// Periodic manifest scan for succeeded-but-undispatched tasks
    Poll,
}

/// Arrival watcher configuration
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// How arrivals are detected
    #[serde(default)]
    pub mode: WatchMode,

    /// Minimum time a file's size must stay unchanged before it is
    /// considered fully written (default: 2 seconds)
    #[serde(default = "default_settle_interval", with = "duration_serde")]
    pub settle_interval: Duration,

    /// Maximum number of settle checks before giving up on a file
    /// (default: 30)
    #[serde(default = "default_max_settle_checks")]
    pub max_settle_checks: u32,

    /// Scan interval in polling mode (default: 5 seconds)
    #[serde(default = "default_poll_interval", with = "duration_serde")]
    pub poll_interval: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            mode: WatchMode::default(),
            settle_interval: default_settle_interval(),
            max_settle_checks: default_max_settle_checks(),
            poll_interval: default_poll_interval(),
        }
    }
}

/// Daily schedule configuration
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Local time of day at which the daily run triggers (default: 00:00:00)
    #[serde(default = "default_daily_run_time", with = "time_format")]
    pub daily_run_time: NaiveTime,

    /// Run one cycle immediately at startup (default: false)
    #[serde(default)]
    pub run_immediately: bool,

    /// Timeout budget for one whole daily cycle (default: 2 hours)
    #[serde(default = "default_run_timeout", with = "duration_serde")]
    pub run_timeout: Duration,

    /// How long the run waits for arrivals after downloads finish
    /// (default: 60 seconds)
    #[serde(default = "default_arrival_grace", with = "duration_serde")]
    pub arrival_grace: Duration,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            daily_run_time: default_daily_run_time(),
            run_immediately: false,
            run_timeout: default_run_timeout(),
            arrival_grace: default_arrival_grace(),
        }
    }
}

/// Data storage configuration
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// SQLite database path for the manifest and processed-files set
    /// (default: "./state/papers-dl.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Directory for per-day log files (default: "./logs")
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            log_dir: default_log_dir(),
        }
    }
}

/// Main configuration for the paper pipeline
///
/// Fields are organized into logical sub-configs:
/// - [`fetch`](FetchConfig) — listing retrieval
/// - [`download`](DownloadConfig) — PDF storage, retry, pacing
/// - [`dispatch`](DispatchConfig) — processing endpoint submission
/// - [`watcher`](WatcherConfig) — arrival detection and settle checking
/// - [`schedule`](ScheduleConfig) — daily trigger and run budget
/// - [`persistence`](PersistenceConfig) — database and log locations
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Listing retrieval settings
    #[serde(default)]
    pub fetch: FetchConfig,

    /// PDF download settings
    #[serde(default)]
    pub download: DownloadConfig,

    /// Processing endpoint settings
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Arrival watcher settings
    #[serde(default)]
    pub watcher: WatcherConfig,

    /// Daily schedule settings
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Data storage settings
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

// Convenience accessors — spare call sites the sub-config hop.
impl Config {
    /// Root of the date-partitioned download tree
    pub fn download_dir(&self) -> &PathBuf {
        &self.download.download_dir
    }

    /// SQLite database path
    pub fn database_path(&self) -> &PathBuf {
        &self.persistence.database_path
    }
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

// Default value functions for serde

fn default_listing_url() -> String {
    "https://huggingface.co/papers".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_max_papers() -> Option<usize> {
    Some(10)
}

fn default_user_agent() -> String {
    format!("papers-dl/{}", env!("CARGO_PKG_VERSION"))
}

fn default_fetch_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 2,
        ..RetryConfig::default()
    }
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("./downloaded_papers")
}

fn default_download_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_request_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_endpoint_url() -> String {
    "http://localhost:8000/process".to_string()
}

fn default_dispatch_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_dispatch_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 3,
        ..RetryConfig::default()
    }
}

fn default_settle_interval() -> Duration {
    Duration::from_secs(2)
}

fn default_max_settle_checks() -> u32 {
    30
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_daily_run_time() -> NaiveTime {
    NaiveTime::from_hms_opt(0, 0, 0).unwrap_or(NaiveTime::MIN)
}

fn default_run_timeout() -> Duration {
    Duration::from_secs(2 * 60 * 60)
}

fn default_arrival_grace() -> Duration {
    Duration::from_secs(60)
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./state/papers-dl.db")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("./logs")
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

/// Serde module for serializing/deserializing Duration as whole seconds
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

/// Serde module for serializing/deserializing NaiveTime as HH:MM[:SS] strings
mod time_format {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = time.format("%H:%M:%S").to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(&s, "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(&s, "%H:%M"))
            .map_err(serde::de::Error::custom)
    }
}
