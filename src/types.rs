//! Core types for papers-dl

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Unique identifier for a paper within a listing
///
/// Typically an arxiv-style id such as `2401.12345`, but any string unique
/// within one listing date is accepted.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaperId(pub String);

impl PaperId {
    /// Create a new PaperId
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for PaperId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for PaperId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl std::fmt::Display for PaperId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single paper from a daily listing
///
/// Produced by the listing fetcher; immutable once created.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperRecord {
    /// Unique id within the listing (e.g. arxiv id)
    pub id: PaperId,
    /// Paper title
    pub title: String,
    /// Direct URL of the PDF to download
    pub source_url: String,
    /// URL of the listing entry the record came from, if known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listing_url: Option<String>,
    /// The listing date this record belongs to
    pub listing_date: NaiveDate,
}

/// Download task status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Not yet attempted
    Pending,
    /// Download in progress
    Downloading,
    /// File fully written to its destination
    Succeeded,
    /// All attempts exhausted or a non-retryable error occurred
    Failed,
}

impl TaskStatus {
    /// Convert integer status code to TaskStatus enum
    pub fn from_i32(status: i32) -> Self {
        match status {
            0 => TaskStatus::Pending,
            1 => TaskStatus::Downloading,
            2 => TaskStatus::Succeeded,
            3 => TaskStatus::Failed,
            _ => TaskStatus::Failed, // Default to Failed for unknown status
        }
    }

    /// Convert TaskStatus enum to integer status code
    pub fn to_i32(&self) -> i32 {
        match self {
            TaskStatus::Pending => 0,
            TaskStatus::Downloading => 1,
            TaskStatus::Succeeded => 2,
            TaskStatus::Failed => 3,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Downloading => "downloading",
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// A unit of download work owned by the download manager
#[derive(Clone, Debug)]
pub struct DownloadTask {
    /// The paper being downloaded
    pub record: PaperRecord,
    /// Final destination path (`download_dir/YYYY-MM-DD/<id>.pdf`)
    pub destination: PathBuf,
    /// Number of attempts made so far
    pub attempts: u32,
    /// Current status
    pub status: TaskStatus,
}

/// Outcome of one download task within a batch
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TaskOutcome {
    /// File downloaded and renamed into place
    Downloaded,
    /// Destination already present and recorded succeeded for this date
    Skipped,
    /// All attempts exhausted; the terminal error message is recorded
    Failed(String),
}

/// A newly completed file observed under the download root
///
/// Ephemeral: produced by the arrival watcher, consumed once by the dispatch
/// loop. Duplicate suppression happens via the processed-files set, not here.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArrivalEvent {
    /// Absolute path of the settled file
    pub path: PathBuf,
    /// When the watcher confirmed the file as fully written
    pub discovered_at: DateTime<Utc>,
}

/// Processing outcome status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    /// The endpoint accepted the file and returned a payload
    Ok,
    /// Submission failed terminally (timeout, transport, or endpoint error)
    Error,
}

/// Normalized result of submitting one file to the processing endpoint
///
/// The dispatch client never raises past this boundary: every submission,
/// successful or not, becomes exactly one `ProcessingResult`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProcessingResult {
    /// The file that was submitted
    pub source_file: PathBuf,
    /// Terminal outcome
    pub status: ProcessingStatus,
    /// The endpoint's payload, when status is `ok`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    /// Failure detail, when status is `error`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

/// Stage of a daily run
///
/// `idle → fetching → downloading → watching_for_arrivals → dispatching →
/// reporting → idle`. Terminal failure at any stage jumps to `Reporting`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStage {
    /// No run in progress
    Idle,
    /// Fetching the day's listing
    Fetching,
    /// Downloading listed papers
    Downloading,
    /// Waiting for the watcher to confirm arrivals
    WatchingForArrivals,
    /// Submitting arrived files to the processing endpoint
    Dispatching,
    /// Aggregating the final report
    Reporting,
}

/// Terminal per-paper entry in a run report
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PaperReportEntry {
    /// Paper id
    pub id: PaperId,
    /// Terminal download status
    pub status: TaskStatus,
    /// Number of download attempts made
    pub attempts: u32,
    /// Terminal error, if the download failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Whether the file was submitted to the processing endpoint
    pub dispatched: bool,
}

/// Aggregated outcome of one daily run
///
/// Always complete: every paper id from the listing appears in `papers` with
/// its terminal status, even when a whole sub-stage failed.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunReport {
    /// The run date
    pub date: NaiveDate,
    /// Number of papers in the listing
    pub total: usize,
    /// Downloads that reached `succeeded`
    pub succeeded: usize,
    /// Downloads that terminally failed
    pub failed: usize,
    /// Dispatches whose ProcessingResult was `ok`
    pub dispatch_ok: usize,
    /// Dispatches whose ProcessingResult was `error`
    pub dispatch_failed: usize,
    /// Per-paper terminal outcomes
    pub papers: Vec<PaperReportEntry>,
}

impl RunReport {
    /// An empty report for a date (used when the listing yields nothing)
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            total: 0,
            succeeded: 0,
            failed: 0,
            dispatch_ok: 0,
            dispatch_failed: 0,
            papers: Vec::new(),
        }
    }
}

/// Event emitted during the pipeline lifecycle
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A daily run started
    RunStarted {
        /// The run date
        date: NaiveDate,
    },

    /// The run moved to a new stage
    StageChanged {
        /// The run date
        date: NaiveDate,
        /// The stage just entered
        stage: RunStage,
    },

    /// The listing was fetched successfully
    ListingFetched {
        /// The run date
        date: NaiveDate,
        /// Number of records extracted
        count: usize,
    },

    /// The listing fetch exhausted its retries
    ListingFailed {
        /// The run date
        date: NaiveDate,
        /// Terminal error message
        error: String,
    },

    /// A paper download started
    DownloadStarted {
        /// Paper id
        id: PaperId,
    },

    /// A paper was skipped because a prior run already downloaded it
    DownloadSkipped {
        /// Paper id
        id: PaperId,
        /// Existing destination path
        path: PathBuf,
    },

    /// A paper was fully written to its destination
    DownloadComplete {
        /// Paper id
        id: PaperId,
        /// Destination path
        path: PathBuf,
    },

    /// A paper download failed terminally
    DownloadFailed {
        /// Paper id
        id: PaperId,
        /// Terminal error message
        error: String,
        /// Attempts made
        attempts: u32,
    },

    /// The watcher confirmed a settled file
    PaperArrived {
        /// Settled file path
        path: PathBuf,
    },

    /// A file was submitted and the endpoint returned `ok`
    DispatchComplete {
        /// Submitted file path
        path: PathBuf,
    },

    /// A file's submission terminally failed
    DispatchFailed {
        /// Submitted file path
        path: PathBuf,
        /// Terminal error detail
        error: String,
    },

    /// A daily run finished and its report is final
    RunComplete {
        /// The finished report
        report: RunReport,
    },
}
