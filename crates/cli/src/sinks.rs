//! Concrete event sinks for the `vw` binary

use async_trait::async_trait;
use chrono::{DateTime, Local};
use owo_colors::OwoColorize;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use veriwatch_core::{ChangeEvent, ChangeKind};
use veriwatch_watcher::{EventSink, SinkError};

/// Append-only text log with `[YYYY-mm-dd HH:MM:SS] message` lines
#[derive(Debug, Clone)]
pub struct EventLog {
    path: PathBuf,
}

impl EventLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Format one log line, newline included
    pub fn format_line(at: DateTime<Local>, message: &str) -> String {
        format!("[{}] {}\n", at.format("%Y-%m-%d %H:%M:%S"), message)
    }

    /// Append `message` stamped with the local time
    pub async fn append(&self, message: &str) -> io::Result<()> {
        append_to(&self.path, Self::format_line(Local::now(), message).as_bytes()).await
    }
}

async fn append_to(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path).await?;
    file.write_all(data).await?;
    file.flush().await
}

/// Writes each event's one-line summary to an [`EventLog`]
pub struct LogFileSink {
    log: EventLog,
}

impl LogFileSink {
    pub fn new(log: EventLog) -> Self {
        Self { log }
    }
}

#[async_trait]
impl EventSink for LogFileSink {
    fn name(&self) -> &str {
        "event-log"
    }

    async fn deliver(&self, event: &ChangeEvent) -> Result<(), SinkError> {
        self.log.append(&event.to_string()).await?;
        Ok(())
    }
}

/// One JSON object per line
pub struct JsonLinesSink {
    path: PathBuf,
}

impl JsonLinesSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl EventSink for JsonLinesSink {
    fn name(&self) -> &str {
        "json-log"
    }

    async fn deliver(&self, event: &ChangeEvent) -> Result<(), SinkError> {
        let mut line = serde_json::to_vec(event).map_err(|e| SinkError::Failed(e.to_string()))?;
        line.push(b'\n');
        append_to(&self.path, &line).await?;
        Ok(())
    }
}

/// Prints an alert with subject and body to stdout
pub struct ConsoleSink;

impl ConsoleSink {
    pub fn render(event: &ChangeEvent) -> String {
        let marker = match event.kind() {
            ChangeKind::Created => "+".green().to_string(),
            ChangeKind::Modified => "~".yellow().to_string(),
            ChangeKind::Deleted => "-".red().to_string(),
        };
        format!(
            "{} {}\n{}",
            marker,
            event.subject().bold(),
            event.body().dimmed()
        )
    }
}

#[async_trait]
impl EventSink for ConsoleSink {
    fn name(&self) -> &str {
        "console"
    }

    async fn deliver(&self, event: &ChangeEvent) -> Result<(), SinkError> {
        println!("{}", Self::render(event));
        Ok(())
    }
}
