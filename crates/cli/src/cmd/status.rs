//! Show baseline summary

use anyhow::{Context, Result};
use chrono::Utc;
use owo_colors::OwoColorize;
use veriwatch_baseline::persist;
use veriwatch_cli::settings::Settings;
use veriwatch_cli::util;

pub async fn run(settings: &Settings) -> Result<()> {
    let baseline_path = settings.baseline_path();
    let loaded = persist::load_with_info(&baseline_path)
        .with_context(|| format!("Failed to read baseline {}", baseline_path.display()))?;

    println!("{}", "Baseline Status".bold());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!();
    println!("Root:          {}", settings.monitor.root.display().to_string().cyan());
    println!("Baseline:      {}", baseline_path.display());
    println!("Mode:          {}", settings.monitor.mode);
    if let Some(log) = &settings.output.event_log {
        println!("Event log:     {}", log.display());
    }
    println!();

    let Some((baseline, info)) = loaded else {
        println!("{}", "No baseline yet".yellow());
        println!("  {}", "Tip: Create one with 'vw init'".dimmed());
        return Ok(());
    };

    println!("Files:         {}", baseline.len());
    println!("Total size:    {}", util::format_size(baseline.total_size()));
    println!("Algorithm:     {}", info.algorithm);
    println!(
        "Saved:         {} ({})",
        util::format_relative_time(info.saved_at, Utc::now()),
        util::format_absolute_time(info.saved_at).dimmed()
    );

    // The baseline records the canonical root it was taken from
    let configured = settings.monitor.root.canonicalize().ok();
    if configured.as_deref() != Some(info.root.as_path()) {
        println!();
        println!(
            "{} Baseline was taken from {}",
            "!".yellow(),
            info.root.display()
        );
    }

    Ok(())
}
