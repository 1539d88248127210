//! Shared fixtures for monitor integration tests

#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;
use veriwatch_core::ChangeEvent;
use veriwatch_watcher::{MonitorConfig, ScanMode};

/// How long a test waits for an expected event
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(10);

/// A watched directory plus a state directory outside of it
pub struct TestTree {
    _temp: TempDir,
    pub root: PathBuf,
    pub state_dir: PathBuf,
}

impl TestTree {
    pub fn new() -> Self {
        let temp = TempDir::new().expect("create temp dir");
        let base = temp.path().canonicalize().expect("canonicalize temp dir");
        let root = base.join("watched");
        let state_dir = base.join("state");
        fs::create_dir_all(&root).expect("create root");
        fs::create_dir_all(&state_dir).expect("create state dir");
        Self {
            _temp: temp,
            root,
            state_dir,
        }
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    pub fn write(&self, rel: &str, content: impl AsRef<[u8]>) {
        let path = self.path(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent");
        }
        fs::write(path, content).expect("write file");
    }

    /// Write under an ignored temp name, then rename into place
    pub fn write_atomic(&self, rel: &str, content: impl AsRef<[u8]>) {
        let staging = format!("{}.tmp", rel);
        self.write(&staging, content);
        self.rename(&staging, rel);
    }

    pub fn remove(&self, rel: &str) {
        fs::remove_file(self.path(rel)).expect("remove file");
    }

    pub fn rename(&self, from: &str, to: &str) {
        fs::rename(self.path(from), self.path(to)).expect("rename file");
    }

    pub fn baseline_path(&self) -> PathBuf {
        self.state_dir.join("baseline.json")
    }

    /// Fast polling with a short settle window and a persisted baseline
    pub fn polling_config(&self) -> MonitorConfig {
        MonitorConfig {
            mode: ScanMode::Polling,
            poll_interval_ms: 50,
            settle_window_ms: 250,
            baseline_path: Some(self.baseline_path()),
            ..MonitorConfig::new(&self.root)
        }
    }

    pub fn event_config(&self) -> MonitorConfig {
        MonitorConfig {
            mode: ScanMode::Event,
            settle_window_ms: 250,
            reconcile_interval_secs: 0,
            baseline_path: Some(self.baseline_path()),
            ..MonitorConfig::new(&self.root)
        }
    }
}

/// Wait for the next event or panic
pub async fn next_event(rx: &mut mpsc::Receiver<ChangeEvent>) -> ChangeEvent {
    tokio::time::timeout(EVENT_TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for a change event")
        .expect("event channel closed")
}

/// Collect exactly `count` events
pub async fn next_events(rx: &mut mpsc::Receiver<ChangeEvent>, count: usize) -> Vec<ChangeEvent> {
    let mut events = Vec::with_capacity(count);
    for _ in 0..count {
        events.push(next_event(rx).await);
    }
    events
}

/// Assert that nothing arrives for `quiet`
pub async fn assert_quiet(rx: &mut mpsc::Receiver<ChangeEvent>, quiet: Duration) {
    if let Ok(Some(event)) = tokio::time::timeout(quiet, rx.recv()).await {
        panic!("unexpected change event: {}", event);
    }
}

/// Poll `check` until it holds or the timeout passes
pub async fn wait_until(mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + EVENT_TIMEOUT;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    check()
}
