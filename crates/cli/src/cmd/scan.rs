//! One check cycle against the stored baseline

use super::{build_sink, event_log, log_lifecycle};
use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use veriwatch_cli::settings::Settings;
use veriwatch_watcher::scan_once;

/// Returns true when changes were found
pub async fn run(settings: &Settings) -> Result<bool> {
    let sink = build_sink(settings);
    let report = scan_once(settings.monitor_config(), &sink)
        .await
        .context("Scan failed")?;

    if report.populated {
        log_lifecycle(event_log(settings).as_ref(), "Baseline created.").await;
        println!(
            "No baseline found, created one from {} files",
            report.files.to_string().cyan()
        );
        return Ok(false);
    }

    if !report.unreadable.is_empty() {
        println!(
            "{} {} files could not be read",
            "!".yellow(),
            report.unreadable.len()
        );
        for path in &report.unreadable {
            println!("  {}", path.dimmed());
        }
    }
    if !report.failures.is_empty() {
        println!(
            "{} {} deliveries failed",
            "!".yellow(),
            report.failures.len()
        );
    }

    if report.events.is_empty() {
        println!("{} No changes ({} files)", "✓".green(), report.files);
        Ok(false)
    } else {
        println!(
            "{} changes found ({} files)",
            report.events.len().to_string().yellow().bold(),
            report.files
        );
        Ok(true)
    }
}
