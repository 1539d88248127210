//! Run a monitoring session in the foreground

use super::{build_sink, event_log, log_lifecycle};
use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use std::sync::Arc;
use tracing::warn;
use veriwatch_cli::settings::Settings;
use veriwatch_cli::util;
use veriwatch_watcher::{Monitor, ScanMode};

pub async fn run(settings: &Settings) -> Result<()> {
    let log = event_log(settings);
    let config = settings.monitor_config();
    let baseline_existed = settings.baseline_path().exists();

    log_lifecycle(
        log.as_ref(),
        &format!("Monitoring started for {}", config.root.display()),
    )
    .await;

    let mode = config.mode;
    let interval = config.poll_interval();
    let mut handle = match Monitor::start(config, Arc::new(build_sink(settings))).await {
        Ok(handle) => handle,
        Err(e) => {
            log_lifecycle(log.as_ref(), &format!("Fatal error: {}", e)).await;
            return Err(e).context("Failed to start monitoring");
        }
    };

    if !baseline_existed {
        log_lifecycle(log.as_ref(), "Baseline created.").await;
        println!(
            "No baseline found, created one from {} files",
            handle.baseline().len().to_string().cyan()
        );
    }

    println!("{}", "Monitoring".bold());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Root:      {}", handle.root().display().to_string().cyan());
    match mode {
        ScanMode::Polling => println!("Mode:      polling every {}", util::format_interval(interval)),
        ScanMode::Event => println!("Mode:      filesystem events"),
    }
    println!("Files:     {}", handle.baseline().len());
    println!("{}", "Press Ctrl-C to stop".dimmed());
    println!();

    let mut failed = 0usize;
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for Ctrl-C")?;
                break;
            }
            Some(failure) = handle.next_delivery_failure() => {
                failed += 1;
                warn!("Alert not delivered to {}: {}", failure.sink, failure.event);
            }
        }
    }

    println!();
    handle.stop().await.context("Monitor did not shut down cleanly")?;
    log_lifecycle(log.as_ref(), "Monitoring stopped by user.").await;

    println!("{} Monitoring stopped", "✓".green());
    if failed > 0 {
        println!("  {} {} alerts could not be delivered", "!".yellow(), failed);
    }
    Ok(())
}
