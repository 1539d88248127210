//! Common utilities for integration tests

#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;
use veriwatch_cli::settings::Settings;

/// A watched directory with the settings a `vw` invocation would build
pub struct TestSetup {
    _temp: TempDir,
    pub base: PathBuf,
    pub root: PathBuf,
    pub settings: Settings,
}

impl TestSetup {
    /// Root at `<temp>/watched`, baseline and logs next to it
    pub fn new() -> Self {
        let temp = TempDir::new().expect("create temp dir");
        let base = temp.path().canonicalize().expect("canonicalize temp dir");
        let root = base.join("watched");
        fs::create_dir_all(&root).expect("create root");

        let mut settings = Settings::default();
        settings.monitor.root = root.clone();
        settings.monitor.baseline_path = Some(base.join("baseline.json"));
        settings.monitor.poll_interval_ms = 50;
        settings.monitor.settle_window_ms = 200;
        settings.output.event_log = Some(base.join("fim_events.log"));
        settings.output.json_log = Some(base.join("fim_events.jsonl"));
        settings.output.console = false;

        Self {
            _temp: temp,
            base,
            root,
            settings,
        }
    }

    pub fn write(&self, rel: &str, content: &str) {
        let path = self.root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent");
        }
        fs::write(path, content).expect("write file");
    }

    pub fn remove(&self, rel: &str) {
        fs::remove_file(self.root.join(rel)).expect("remove file");
    }

    /// Event log lines with the timestamp stripped
    pub fn event_log_messages(&self) -> Vec<String> {
        let path = self.settings.output.event_log.clone().expect("event log configured");
        let text = fs::read_to_string(path).unwrap_or_default();
        text.lines()
            .map(|line| match line.split_once("] ") {
                Some((_, message)) => message.to_string(),
                None => line.to_string(),
            })
            .collect()
    }

    pub fn json_log_values(&self) -> Vec<serde_json::Value> {
        let path = self.settings.output.json_log.clone().expect("json log configured");
        let text = fs::read_to_string(path).unwrap_or_default();
        text.lines()
            .map(|line| serde_json::from_str(line).expect("valid json line"))
            .collect()
    }
}
