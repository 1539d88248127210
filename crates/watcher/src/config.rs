//! Monitor configuration

use crate::ignore::IgnoreConfig;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use veriwatch_core::MAX_ATTEMPTS;

/// Invalid configuration, fatal at startup
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("watch root does not exist: {}", .0.display())]
    RootMissing(PathBuf),

    #[error("watch root is not a directory: {}", .0.display())]
    RootNotDirectory(PathBuf),

    #[error("watch root cannot be read: {}: {source}", .path.display())]
    RootUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("failed to load ignore rules: {0}")]
    Ignore(String),
}

/// How the scanner learns about changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
    /// Walk the tree on a fixed interval
    #[default]
    Polling,
    /// Native filesystem notifications
    Event,
}

impl std::fmt::Display for ScanMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanMode::Polling => write!(f, "polling"),
            ScanMode::Event => write!(f, "event"),
        }
    }
}

/// Settings for one monitoring session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Directory to watch
    #[serde(default = "default_root")]
    pub root: PathBuf,

    #[serde(default)]
    pub mode: ScanMode,

    /// Polling mode: time between tree walks
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Quiet time a path needs before it is fingerprinted
    #[serde(default = "default_settle_window_ms")]
    pub settle_window_ms: u64,

    /// Longest a busy path may be deferred (0 = unlimited)
    #[serde(default)]
    pub settle_max_ms: u64,

    /// Where the baseline is persisted (none = memory only)
    #[serde(default)]
    pub baseline_path: Option<PathBuf>,

    /// Polling mode: hash every file on every poll, so same-size rewrites
    /// with a restored mtime are still caught. Off trades that for speed.
    #[serde(default = "default_deep_poll")]
    pub deep_poll: bool,

    /// Event mode: full reconciliation interval (0 = disabled)
    #[serde(default = "default_reconcile_interval_secs")]
    pub reconcile_interval_secs: u64,

    /// Capacity of the scanner -> debouncer channel
    #[serde(default = "default_event_queue_capacity")]
    pub event_queue_capacity: usize,

    /// Times an unreadable settled path is re-queued
    #[serde(default = "default_read_retries")]
    pub read_retries: u32,

    /// Read attempts per fingerprint before a file counts as unstable
    #[serde(default = "default_hash_attempts")]
    pub hash_attempts: u8,

    #[serde(default)]
    pub ignore: IgnoreConfig,
}

/// Watch root used when a config file names none
pub const DEFAULT_ROOT: &str = "watched_folder";

fn default_root() -> PathBuf {
    PathBuf::from(DEFAULT_ROOT)
}

fn default_deep_poll() -> bool {
    true
}

fn default_poll_interval_ms() -> u64 {
    10_000
}

fn default_settle_window_ms() -> u64 {
    1_500
}

fn default_reconcile_interval_secs() -> u64 {
    300
}

fn default_event_queue_capacity() -> usize {
    4_096
}

fn default_read_retries() -> u32 {
    3
}

fn default_hash_attempts() -> u8 {
    3
}

impl MonitorConfig {
    /// Defaults for everything but the root
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            mode: ScanMode::default(),
            poll_interval_ms: default_poll_interval_ms(),
            settle_window_ms: default_settle_window_ms(),
            settle_max_ms: 0,
            baseline_path: None,
            deep_poll: true,
            reconcile_interval_secs: default_reconcile_interval_secs(),
            event_queue_capacity: default_event_queue_capacity(),
            read_retries: default_read_retries(),
            hash_attempts: default_hash_attempts(),
            ignore: IgnoreConfig::default(),
        }
    }

    /// Check values and canonicalize the root
    pub fn validate(mut self) -> Result<Self, ConfigError> {
        let root = match self.root.canonicalize() {
            Ok(root) => root,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ConfigError::RootMissing(self.root))
            }
            Err(source) => {
                return Err(ConfigError::RootUnreadable {
                    path: self.root,
                    source,
                })
            }
        };
        if !root.is_dir() {
            return Err(ConfigError::RootNotDirectory(root));
        }
        std::fs::read_dir(&root).map_err(|source| ConfigError::RootUnreadable {
            path: root.clone(),
            source,
        })?;
        self.root = root;

        if self.poll_interval_ms == 0 {
            return Err(invalid("poll_interval_ms", "must be greater than zero"));
        }
        if self.settle_window_ms == 0 {
            return Err(invalid("settle_window_ms", "must be greater than zero"));
        }
        if self.settle_max_ms != 0 && self.settle_max_ms < self.settle_window_ms {
            return Err(invalid(
                "settle_max_ms",
                "must be 0 or at least settle_window_ms",
            ));
        }
        if self.event_queue_capacity == 0 {
            return Err(invalid("event_queue_capacity", "must be greater than zero"));
        }
        if self.hash_attempts == 0 || self.hash_attempts > MAX_ATTEMPTS {
            return Err(invalid(
                "hash_attempts",
                &format!("must be between 1 and {}", MAX_ATTEMPTS),
            ));
        }

        if let Some(path) = self.baseline_path.take() {
            let path = if path.is_absolute() {
                path
            } else {
                std::env::current_dir()
                    .map_err(|source| ConfigError::RootUnreadable {
                        path: path.clone(),
                        source,
                    })?
                    .join(path)
            };
            self.baseline_path = Some(path);
        }

        Ok(self)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn settle_window(&self) -> Duration {
        Duration::from_millis(self.settle_window_ms)
    }

    pub fn settle_max(&self) -> Option<Duration> {
        (self.settle_max_ms > 0).then(|| Duration::from_millis(self.settle_max_ms))
    }

    pub fn reconcile_interval(&self) -> Option<Duration> {
        (self.reconcile_interval_secs > 0).then(|| Duration::from_secs(self.reconcile_interval_secs))
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_from_minimal_toml() {
        let config: MonitorConfig = toml::from_str(r#"root = "/srv/watched""#).unwrap();
        assert_eq!(config.mode, ScanMode::Polling);
        assert_eq!(config.poll_interval(), Duration::from_secs(10));
        assert_eq!(config.settle_window(), Duration::from_millis(1500));
        assert_eq!(config.settle_max(), None);
        assert_eq!(config.reconcile_interval(), Some(Duration::from_secs(300)));
        assert_eq!(config.read_retries, 3);
        assert!(config.deep_poll);
    }

    #[test]
    fn test_root_defaults_when_absent() {
        let config: MonitorConfig = toml::from_str("deep_poll = false").unwrap();
        assert_eq!(config.root, PathBuf::from(DEFAULT_ROOT));
        assert!(!config.deep_poll);
    }

    #[test]
    fn test_mode_is_lowercase() {
        let config: MonitorConfig = toml::from_str(
            r#"
            root = "/srv"
            mode = "event"
            reconcile_interval_secs = 0
            "#,
        )
        .unwrap();
        assert_eq!(config.mode, ScanMode::Event);
        assert_eq!(config.reconcile_interval(), None);
    }

    #[test]
    fn test_validate_canonicalizes_root() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("watched");
        std::fs::create_dir(&nested).unwrap();

        let config = MonitorConfig::new(nested.join("../watched")).validate().unwrap();
        assert_eq!(config.root, nested.canonicalize().unwrap());
    }

    #[test]
    fn test_validate_rejects_missing_root() {
        let temp_dir = TempDir::new().unwrap();
        let result = MonitorConfig::new(temp_dir.path().join("gone")).validate();
        assert!(matches!(result, Err(ConfigError::RootMissing(_))));
    }

    #[test]
    fn test_validate_rejects_file_root() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("file.txt");
        std::fs::write(&file, b"x").unwrap();
        let result = MonitorConfig::new(file).validate();
        assert!(matches!(result, Err(ConfigError::RootNotDirectory(_))));
    }

    #[test]
    fn test_validate_rejects_zero_intervals() {
        let temp_dir = TempDir::new().unwrap();
        let config = MonitorConfig {
            poll_interval_ms: 0,
            ..MonitorConfig::new(temp_dir.path())
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue {
                field: "poll_interval_ms",
                ..
            })
        ));

        let config = MonitorConfig {
            settle_window_ms: 500,
            settle_max_ms: 100,
            ..MonitorConfig::new(temp_dir.path())
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_too_many_hash_attempts() {
        let temp_dir = TempDir::new().unwrap();
        let config = MonitorConfig {
            hash_attempts: 40,
            ..MonitorConfig::new(temp_dir.path())
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue {
                field: "hash_attempts",
                ..
            })
        ));

        let config = MonitorConfig {
            hash_attempts: MAX_ATTEMPTS,
            ..MonitorConfig::new(temp_dir.path())
        };
        assert!(config.validate().is_ok());
    }
}
