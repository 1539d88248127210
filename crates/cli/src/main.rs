//! veriwatch CLI - vw command

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use veriwatch_cli::logging;
use veriwatch_cli::settings::{Overrides, Settings};
use veriwatch_watcher::ScanMode;

mod cmd;

/// veriwatch - file integrity monitor
#[derive(Parser)]
#[command(name = "vw")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (default: ./veriwatch.toml, then the user config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory to monitor
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Baseline file
    #[arg(long, global = true)]
    baseline: Option<PathBuf>,

    /// Event log file
    #[arg(long, global = true)]
    event_log: Option<PathBuf>,

    /// Also write diagnostics to a daily rolling file in this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Debug-level diagnostics
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Polling,
    Event,
}

impl From<ModeArg> for ScanMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Polling => ScanMode::Polling,
            ModeArg::Event => ScanMode::Event,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Write an example config and create the baseline
    Init {
        /// Rebuild the baseline even if one exists
        #[arg(long)]
        force: bool,
    },
    /// Monitor until Ctrl-C
    Watch {
        /// How changes are detected
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,

        /// Polling mode: time between scans in milliseconds
        #[arg(long)]
        interval_ms: Option<u64>,

        /// Polling mode: trust size and mtime instead of hashing every file
        #[arg(long)]
        shallow: bool,

        /// Don't print alerts to stdout
        #[arg(short, long)]
        quiet: bool,
    },
    /// Run one check cycle (exit code 1 if changes were found)
    Scan {
        /// Don't print alerts to stdout
        #[arg(short, long)]
        quiet: bool,
    },
    /// Show baseline summary
    Status,
    /// Show configuration
    Config {
        /// Print the example configuration instead
        #[arg(long)]
        example: bool,

        /// Print the config file path only
        #[arg(long)]
        path: bool,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let _log_guard = logging::init(cli.log_dir.as_deref(), cli.verbose)?;

    if let Commands::Config { example: true, .. } = cli.command {
        return cmd::config::run_example().await.map(|_| ExitCode::SUCCESS);
    }

    let mut overrides = Overrides {
        root: cli.root,
        baseline: cli.baseline,
        event_log: cli.event_log,
        ..Overrides::default()
    };
    match &cli.command {
        Commands::Watch { mode, interval_ms, shallow, quiet } => {
            overrides.mode = mode.map(ScanMode::from);
            overrides.poll_interval_ms = *interval_ms;
            if *shallow {
                overrides.deep_poll = Some(false);
            }
            overrides.quiet = *quiet;
        }
        Commands::Scan { quiet } => overrides.quiet = *quiet,
        _ => {}
    }

    let loaded = Settings::load(cli.config.as_deref())?;
    let source = loaded.source;
    let mut settings = loaded.settings;
    settings.apply_env(|key| std::env::var(key).ok());
    settings.apply_overrides(&overrides);

    let result = match cli.command {
        Commands::Init { force } => cmd::init::run(&settings, source.as_deref(), force).await,
        Commands::Watch { .. } => cmd::watch::run(&settings).await,
        Commands::Scan { .. } => {
            let changed = cmd::scan::run(&settings).await?;
            return Ok(if changed { ExitCode::from(1) } else { ExitCode::SUCCESS });
        }
        Commands::Status => cmd::status::run(&settings).await,
        Commands::Config { path, .. } => {
            if path {
                cmd::config::run_path(source.as_deref()).await
            } else {
                cmd::config::run_show(&settings, source.as_deref()).await
            }
        }
    };
    result.map(|_| ExitCode::SUCCESS)
}
