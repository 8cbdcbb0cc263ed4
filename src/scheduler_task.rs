//! Scheduler task: the daemon loop that triggers daily runs
//!
//! The task wakes up periodically, asks the [`DailySchedule`] whether a run
//! is due, and triggers `run_once` at most once per date. It respects the
//! pipeline's shutdown flag and exits cleanly when the pipeline stops
//! accepting runs.
//!
//! # Example
//!
//! ```no_run
//! use papers_dl::{PaperPipeline, config::Config};
//! use papers_dl::scheduler_task::SchedulerTask;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::default();
//! let pipeline = Arc::new(PaperPipeline::new(config).await?);
//!
//! let task = SchedulerTask::new(pipeline.clone());
//!
//! // Run scheduler task (blocks until shutdown)
//! tokio::spawn(async move {
//!     task.run().await;
//! });
//! # Ok(())
//! # }
//! ```

use crate::PaperPipeline;
use crate::scheduler::DailySchedule;
use chrono::{Local, NaiveDate};
use std::sync::Arc;
use tokio::time::{Duration, sleep};
use tracing::{error, info};

/// How often the loop re-evaluates the schedule
const SCHEDULE_TICK: Duration = Duration::from_secs(30);

/// Daemon loop that triggers the daily cycle
pub struct SchedulerTask {
    /// Schedule evaluation
    schedule: DailySchedule,

    /// Pipeline to trigger runs on; also carries the shutdown flag
    pipeline: Arc<PaperPipeline>,
}

impl SchedulerTask {
    /// Create a scheduler task from the pipeline's configuration
    pub fn new(pipeline: Arc<PaperPipeline>) -> Self {
        let schedule = DailySchedule::new(pipeline.get_config().schedule.daily_run_time);
        Self { schedule, pipeline }
    }

    /// Run the scheduling loop until shutdown
    ///
    /// The loop:
    /// 1. Checks the pipeline's shutdown flag
    /// 2. Evaluates the schedule; if a run is due, executes it inline
    ///    (runs are strictly sequential; a long run simply delays the check)
    /// 3. Sleeps until the next tick
    ///
    /// If `run_immediately` is configured, one cycle for today executes
    /// before the loop starts.
    pub async fn run(self) {
        info!(
            run_time = %self.schedule.run_time(),
            "Scheduler task started"
        );

        let mut last_run: Option<NaiveDate> = None;

        if self.pipeline.get_config().schedule.run_immediately {
            info!("Running one cycle immediately as configured");
            self.trigger(Local::now().date_naive(), &mut last_run).await;
        }

        loop {
            if !self.pipeline.is_accepting() {
                info!("Scheduler task shutting down");
                break;
            }

            if let Some(date) = self.schedule.due_date(Local::now(), last_run) {
                self.trigger(date, &mut last_run).await;
                info!(
                    next_run = %self.schedule.next_run_after(Local::now()),
                    "Next scheduled run"
                );
            }

            sleep(SCHEDULE_TICK).await;
        }

        info!("Scheduler task stopped");
    }

    /// Execute one cycle and record it as done for the date
    ///
    /// The date is recorded even on failure: a failed run is retried on the
    /// next date, not in a tight loop all day.
    async fn trigger(&self, date: NaiveDate, last_run: &mut Option<NaiveDate>) {
        *last_run = Some(date);

        match self.pipeline.run_once(date).await {
            Ok(report) => {
                info!(
                    %date,
                    total = report.total,
                    succeeded = report.succeeded,
                    failed = report.failed,
                    "Scheduled run finished"
                );
            }
            Err(e) => {
                error!(%date, error = %e, "Scheduled run failed");
            }
        }
    }
}
