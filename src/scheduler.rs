//! Daily run scheduling
//!
//! A [`DailySchedule`] decides when the pipeline's daily cycle is due. The
//! evaluation is deliberately dumb: a run is due once the local clock passes
//! the configured time of day, at most once per date. Missed slots (process
//! down at the scheduled time) fire on the next evaluation rather than being
//! skipped, so a late-started daemon still runs today's cycle.
//!
//! # Example
//!
//! ```rust
//! use papers_dl::scheduler::DailySchedule;
//! use chrono::{Local, NaiveTime};
//!
//! let schedule = DailySchedule::new(NaiveTime::from_hms_opt(3, 30, 0).unwrap());
//! if let Some(date) = schedule.due_date(Local::now(), None) {
//!     // run the cycle for `date`
//! }
//! ```

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime};

/// Evaluates when the daily cycle should run
#[derive(Clone, Copy, Debug)]
pub struct DailySchedule {
    /// Local time of day the run triggers
    run_time: NaiveTime,
}

impl DailySchedule {
    /// Create a schedule triggering at the given local time of day
    pub fn new(run_time: NaiveTime) -> Self {
        Self { run_time }
    }

    /// The configured trigger time
    pub fn run_time(&self) -> NaiveTime {
        self.run_time
    }

    /// The date a run is due for, if any
    ///
    /// Due when the current local time has passed the trigger time and no
    /// run has happened for today yet. Returns the date to run for.
    pub fn due_date(
        &self,
        now: DateTime<Local>,
        last_run: Option<NaiveDate>,
    ) -> Option<NaiveDate> {
        let today = now.date_naive();

        if last_run == Some(today) {
            return None;
        }
        if now.time() < self.run_time {
            return None;
        }

        Some(today)
    }

    /// The next trigger instant after `now`, for logging
    pub fn next_run_after(&self, now: DateTime<Local>) -> NaiveDateTime {
        let today = now.date_naive();
        if now.time() < self.run_time {
            today.and_time(self.run_time)
        } else {
            today.succ_opt().unwrap_or(today).and_time(self.run_time)
        }
    }
}
