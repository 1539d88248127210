//! Tracing subscriber setup

use anyhow::{Context, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "info";
const VERBOSE_LOG_FILTER: &str = "debug";
const LOG_FILE_PREFIX: &str = "veriwatch.log";

/// Keeps the file writer flushing; hold it until the process exits
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

fn filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose { VERBOSE_LOG_FILTER } else { DEFAULT_LOG_FILTER })
    })
}

/// Install the global subscriber
///
/// Logs go to stderr; with `log_dir` they are also written to a daily
/// rolling file without ANSI colors. `RUST_LOG` overrides the level.
pub fn init(log_dir: Option<&Path>, verbose: bool) -> Result<LogGuard> {
    let console = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(filter(verbose));

    let Some(dir) = log_dir else {
        tracing_subscriber::registry()
            .with(console)
            .try_init()
            .context("Failed to install logger")?;
        return Ok(LogGuard { _file: None });
    };

    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX));

    tracing_subscriber::registry()
        .with(console)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(filter(verbose)),
        )
        .try_init()
        .context("Failed to install logger")?;

    Ok(LogGuard { _file: Some(guard) })
}
