//! CLI command implementations

pub mod config;
pub mod init;
pub mod scan;
pub mod status;
pub mod watch;

use veriwatch_cli::settings::Settings;
use veriwatch_cli::sinks::{ConsoleSink, EventLog, JsonLinesSink, LogFileSink};
use veriwatch_watcher::FanoutSink;

/// Every sink the settings turn on
pub fn build_sink(settings: &Settings) -> FanoutSink {
    let mut sink = FanoutSink::new();
    if settings.output.console {
        sink.push(Box::new(ConsoleSink));
    }
    if let Some(path) = &settings.output.event_log {
        sink.push(Box::new(LogFileSink::new(EventLog::new(path))));
    }
    if let Some(path) = &settings.output.json_log {
        sink.push(Box::new(JsonLinesSink::new(path)));
    }
    sink
}

/// The plain-text event log, when one is configured
pub fn event_log(settings: &Settings) -> Option<EventLog> {
    settings.output.event_log.as_ref().map(EventLog::new)
}

/// Append a lifecycle line; failures are logged, not fatal
pub async fn log_lifecycle(log: Option<&EventLog>, message: &str) {
    if let Some(log) = log {
        if let Err(e) = log.append(message).await {
            tracing::warn!("Failed to write event log {}: {}", log.path().display(), e);
        }
    }
}
