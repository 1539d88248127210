//! `veriwatch.toml` loading
//!
//! Values come from, lowest precedence first: built-in defaults, the config
//! file, `VW_*` environment variables, then command-line flags.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use veriwatch_watcher::{MonitorConfig, ScanMode, DEFAULT_ROOT};

/// Config file looked up in the current directory
pub const CONFIG_FILE_NAME: &str = "veriwatch.toml";

pub const ENV_ROOT: &str = "VW_ROOT";
pub const ENV_BASELINE: &str = "VW_BASELINE";
pub const ENV_EVENT_LOG: &str = "VW_EVENT_LOG";

const DEFAULT_BASELINE: &str = "baseline.json";
const DEFAULT_EVENT_LOG: &str = "fim_events.log";

/// Everything a command needs, as read from disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_monitor")]
    pub monitor: MonitorConfig,

    #[serde(default)]
    pub output: OutputSettings,
}

/// Where change events are written besides the tracing log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSettings {
    /// Plain-text event log with `[timestamp] message` lines
    #[serde(default = "default_event_log")]
    pub event_log: Option<PathBuf>,

    /// One JSON object per event
    #[serde(default)]
    pub json_log: Option<PathBuf>,

    /// Print alerts to stdout
    #[serde(default = "default_console")]
    pub console: bool,
}

fn default_monitor() -> MonitorConfig {
    MonitorConfig::new(DEFAULT_ROOT)
}

fn default_event_log() -> Option<PathBuf> {
    Some(PathBuf::from(DEFAULT_EVENT_LOG))
}

fn default_console() -> bool {
    true
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            event_log: default_event_log(),
            json_log: None,
            console: default_console(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            monitor: default_monitor(),
            output: OutputSettings::default(),
        }
    }
}

/// Values given on the command line
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub root: Option<PathBuf>,
    pub baseline: Option<PathBuf>,
    pub event_log: Option<PathBuf>,
    pub mode: Option<ScanMode>,
    pub poll_interval_ms: Option<u64>,
    pub deep_poll: Option<bool>,
    pub quiet: bool,
}

/// Settings plus the file they came from
#[derive(Debug, Clone)]
pub struct LoadedSettings {
    pub settings: Settings,
    pub source: Option<PathBuf>,
}

impl Settings {
    /// Parse a config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&text)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load from `explicit`, or the first config file found, or defaults
    ///
    /// An explicit path that does not exist is an error; a missing default
    /// file is not.
    pub fn load(explicit: Option<&Path>) -> Result<LoadedSettings> {
        let source = match explicit {
            Some(path) => {
                if !path.exists() {
                    anyhow::bail!("Config file not found: {}", path.display());
                }
                Some(path.to_path_buf())
            }
            None => find_config_file(),
        };

        let settings = match &source {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        Ok(LoadedSettings { settings, source })
    }

    /// Apply `VW_ROOT`, `VW_BASELINE` and `VW_EVENT_LOG`
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(root) = non_empty(ENV_ROOT) {
            self.monitor.root = PathBuf::from(root);
        }
        if let Some(baseline) = non_empty(ENV_BASELINE) {
            self.monitor.baseline_path = Some(PathBuf::from(baseline));
        }
        if let Some(log) = non_empty(ENV_EVENT_LOG) {
            self.output.event_log = Some(PathBuf::from(log));
        }
    }

    pub fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(root) = &overrides.root {
            self.monitor.root = root.clone();
        }
        if let Some(baseline) = &overrides.baseline {
            self.monitor.baseline_path = Some(baseline.clone());
        }
        if let Some(log) = &overrides.event_log {
            self.output.event_log = Some(log.clone());
        }
        if let Some(mode) = overrides.mode {
            self.monitor.mode = mode;
        }
        if let Some(interval) = overrides.poll_interval_ms {
            self.monitor.poll_interval_ms = interval;
        }
        if let Some(deep) = overrides.deep_poll {
            self.monitor.deep_poll = deep;
        }
        if overrides.quiet {
            self.output.console = false;
        }
    }

    /// Baseline file, falling back to `baseline.json` in the working directory
    pub fn baseline_path(&self) -> PathBuf {
        self.monitor
            .baseline_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_BASELINE))
    }

    /// Monitor config with the baseline path filled in
    ///
    /// Event logs that live inside the watch root are added to the ignore
    /// patterns, otherwise every appended line would be reported as a change.
    pub fn monitor_config(&self) -> MonitorConfig {
        let mut config = MonitorConfig {
            baseline_path: Some(self.baseline_path()),
            ..self.monitor.clone()
        };
        let outputs = [&self.output.event_log, &self.output.json_log];
        for output in outputs.into_iter().flatten() {
            if let Some(pattern) = anchored_pattern(&config.root, output) {
                config.ignore.additional_patterns.push(pattern);
            }
        }
        config
    }
}

/// `/rel/path` pattern for `file` when it lies under `root`
fn anchored_pattern(root: &Path, file: &Path) -> Option<String> {
    let root = root.canonicalize().ok()?;
    let parent = match file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.canonicalize().ok()?,
        _ => std::env::current_dir().ok()?,
    };
    let full = parent.join(file.file_name()?);
    let rel = full.strip_prefix(&root).ok()?;

    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(format!("/{}", parts.join("/")))
}

/// First existing config file: `./veriwatch.toml`, then the user config dir
pub fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.is_file() {
        return Some(local);
    }
    user_config_path().filter(|p| p.is_file())
}

/// `<config dir>/veriwatch/config.toml`
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("veriwatch").join("config.toml"))
}

/// Commented example written by `vw init` and printed by `vw config`
pub fn example_config() -> &'static str {
    r#"# veriwatch configuration

[monitor]
# Directory to watch
root = "watched_folder"

# "polling" walks the tree every poll_interval_ms; "event" uses native
# filesystem notifications with a periodic reconciliation
mode = "polling"
poll_interval_ms = 10000

# Quiet time before a changed file is hashed (ms)
settle_window_ms = 1500
# Longest a busy file may be deferred, 0 = no limit (ms)
settle_max_ms = 0

# Persisted baseline
baseline_path = "baseline.json"

# Hash every file on every poll; false trusts size and mtime only
deep_poll = true

# Event mode only: full reconciliation interval, 0 = disabled (s)
reconcile_interval_secs = 300

[monitor.ignore]
use_vwignore = true
use_gitignore = false
# Extra gitignore-style patterns, e.g. ["*.tmp", "/cache/"]
additional_patterns = []

[output]
event_log = "fim_events.log"
# json_log = "fim_events.jsonl"
console = true
"#
}

/// Example config with the root and baseline of `settings` filled in
pub fn example_config_for(settings: &Settings) -> String {
    let quote = |path: &Path| toml::Value::String(path.display().to_string()).to_string();
    example_config()
        .replacen(
            "root = \"watched_folder\"",
            &format!("root = {}", quote(&settings.monitor.root)),
            1,
        )
        .replacen(
            "baseline_path = \"baseline.json\"",
            &format!("baseline_path = {}", quote(&settings.baseline_path())),
            1,
        )
}
