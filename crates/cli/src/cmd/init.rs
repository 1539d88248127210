//! Create the baseline for a monitored directory

use super::{event_log, log_lifecycle};
use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use std::path::{Path, PathBuf};
use veriwatch_cli::settings::{example_config_for, Settings, CONFIG_FILE_NAME};
use veriwatch_watcher::{scan_once, FanoutSink};

pub async fn run(settings: &Settings, config_source: Option<&Path>, force: bool) -> Result<()> {
    // 1. Config file, unless one was already loaded
    if config_source.is_none() {
        let config_path = PathBuf::from(CONFIG_FILE_NAME);
        if !config_path.exists() {
            std::fs::write(&config_path, example_config_for(settings))
                .with_context(|| format!("Failed to write {}", config_path.display()))?;
            println!("{} Wrote config to {}", "✓".green(), config_path.display());
        }
    }

    // 2. Watch root
    let root = &settings.monitor.root;
    if !root.exists() {
        std::fs::create_dir_all(root)
            .with_context(|| format!("Failed to create {}", root.display()))?;
        println!("{} Created {}", "✓".green(), root.display());
    }

    // 3. Baseline
    let baseline_path = settings.baseline_path();
    if baseline_path.exists() {
        if !force {
            anyhow::bail!(
                "Baseline already exists: {} (use --force to rebuild it)",
                baseline_path.display()
            );
        }
        std::fs::remove_file(&baseline_path)
            .with_context(|| format!("Failed to remove {}", baseline_path.display()))?;
    }

    let report = scan_once(settings.monitor_config(), &FanoutSink::new())
        .await
        .context("Failed to create baseline")?;
    log_lifecycle(event_log(settings).as_ref(), "Baseline created.").await;

    println!(
        "{} Baseline created ({} files) at {}",
        "✓".green(),
        report.files,
        baseline_path.display()
    );
    if !report.unreadable.is_empty() {
        println!(
            "  {} {} unreadable files were skipped",
            "!".yellow(),
            report.unreadable.len()
        );
    }
    println!("  {}", "Start monitoring with 'vw watch'".dimmed());

    Ok(())
}
