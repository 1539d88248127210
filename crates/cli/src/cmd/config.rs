//! Configuration display command

use anyhow::Result;
use owo_colors::OwoColorize;
use std::path::Path;
use veriwatch_cli::settings::{self, Settings};

/// Print the effective configuration
pub async fn run_show(settings: &Settings, source: Option<&Path>) -> Result<()> {
    println!("{}", "Configuration".bold());
    match source {
        Some(path) => println!("{}: {}\n", "Location".dimmed(), path.display().dimmed()),
        None => println!("{}\n", "No config file, using defaults".dimmed()),
    }

    let monitor = &settings.monitor;
    println!("{}", "[monitor]".yellow());
    println!("  {} = {}", "root".cyan(), monitor.root.display());
    println!("  {} = {}", "mode".cyan(), monitor.mode);
    println!("  {} = {}", "poll_interval_ms".cyan(), monitor.poll_interval_ms);
    println!("  {} = {}", "settle_window_ms".cyan(), monitor.settle_window_ms);
    println!(
        "  {} = {} {}",
        "settle_max_ms".cyan(),
        monitor.settle_max_ms,
        if monitor.settle_max_ms == 0 { "(no limit)".dimmed().to_string() } else { String::new() }
    );
    println!("  {} = {}", "baseline_path".cyan(), settings.baseline_path().display());
    println!("  {} = {}", "deep_poll".cyan(), monitor.deep_poll);
    println!(
        "  {} = {} {}",
        "reconcile_interval_secs".cyan(),
        monitor.reconcile_interval_secs,
        "(event mode)".dimmed()
    );
    println!("  {} = {}", "event_queue_capacity".cyan(), monitor.event_queue_capacity);
    println!("  {} = {}", "read_retries".cyan(), monitor.read_retries);
    println!("  {} = {}", "hash_attempts".cyan(), monitor.hash_attempts);

    println!("\n{}", "[monitor.ignore]".yellow());
    println!("  {} = {}", "use_vwignore".cyan(), monitor.ignore.use_vwignore);
    println!("  {} = {}", "use_gitignore".cyan(), monitor.ignore.use_gitignore);
    println!(
        "  {} = {:?}",
        "additional_patterns".cyan(),
        monitor.ignore.additional_patterns
    );

    let output = &settings.output;
    println!("\n{}", "[output]".yellow());
    let show = |path: &Option<std::path::PathBuf>| match path {
        Some(p) => p.display().to_string(),
        None => "(off)".dimmed().to_string(),
    };
    println!("  {} = {}", "event_log".cyan(), show(&output.event_log));
    println!("  {} = {}", "json_log".cyan(), show(&output.json_log));
    println!("  {} = {}", "console".cyan(), output.console);

    Ok(())
}

/// Print the config file path
pub async fn run_path(source: Option<&Path>) -> Result<()> {
    match source.map(Path::to_path_buf).or_else(settings::user_config_path) {
        Some(path) => println!("{}", path.display()),
        None => anyhow::bail!("Could not determine config file path"),
    }
    Ok(())
}

/// Print the example configuration
pub async fn run_example() -> Result<()> {
    print!("{}", settings::example_config());
    Ok(())
}
