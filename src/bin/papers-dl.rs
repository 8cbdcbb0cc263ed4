//! CLI entry point for the papers-dl daemon.
//!
//! Runs the daily acquisition pipeline either as a long-lived daemon
//! (scheduled by `daily_run_time`) or as a single cycle with `--once`.
//! Run reports are printed to stdout as JSON; logs go to stderr and to a
//! per-day file under the configured log directory.

use chrono::NaiveDate;
use clap::Parser;
use papers_dl::{Config, Error, PaperPipeline, Result, SchedulerTask, run_with_shutdown};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Scheduled, unattended acquisition and processing of daily paper listings
#[derive(Debug, Parser)]
#[command(name = "papers-dl", version, about)]
struct Args {
    /// Path to a JSON configuration file (defaults apply when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run a single cycle and exit instead of starting the daemon
    #[arg(long)]
    once: bool,

    /// Date to run for with --once (defaults to today)
    #[arg(long, value_name = "YYYY-MM-DD")]
    date: Option<NaiveDate>,

    /// Increase log verbosity (-v: debug, -vv: trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    let config = load_config(args.config.as_deref()).await?;

    // Logs go to stderr and a per-day file; stdout carries only report JSON
    let _log_guard = init_logging(&config, args.verbose)?;

    debug!(?args, "CLI arguments parsed");
    info!("papers-dl starting");

    let pipeline = Arc::new(PaperPipeline::new(config).await?);
    let _watcher_handle = pipeline.spawn_arrival_watcher()?;

    if args.once {
        let date = args.date.unwrap_or_else(|| chrono::Local::now().date_naive());
        let report = pipeline.run_once(date).await?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        pipeline.shutdown().await?;
        return Ok(());
    }

    // Daemon mode: print each finished run's report to stdout
    let mut events = pipeline.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let papers_dl::Event::RunComplete { report } = event
                && let Ok(json) = serde_json::to_string_pretty(&report)
            {
                println!("{json}");
            }
        }
    });

    let scheduler = SchedulerTask::new(pipeline.clone());
    tokio::spawn(async move {
        scheduler.run().await;
    });

    run_with_shutdown(pipeline).await
}

/// Load configuration from a JSON file, or fall back to defaults
async fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    match path {
        Some(path) => {
            let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
                Error::Config {
                    message: format!("cannot read config file '{}': {}", path.display(), e),
                    key: None,
                }
            })?;
            let config: Config = serde_json::from_str(&raw)?;
            Ok(config)
        }
        None => Ok(Config::default()),
    }
}

/// Install the tracing subscriber: stderr plus a daily log file
///
/// Returns the appender guard; dropping it flushes buffered log lines, so
/// it must live for the whole process.
fn init_logging(config: &Config, verbose: u8) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    std::fs::create_dir_all(&config.persistence.log_dir).map_err(|e| Error::Config {
        message: format!(
            "cannot create log directory '{}': {}",
            config.persistence.log_dir.display(),
            e
        ),
        key: Some("log_dir".to_string()),
    })?;

    let file_appender =
        tracing_appender::rolling::daily(&config.persistence.log_dir, "papers-dl.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false),
        )
        .init();

    Ok(guard)
}
