//! Event delivery

use async_trait::async_trait;
use std::io;
use thiserror::Error;
use tokio::sync::mpsc;
use veriwatch_core::ChangeEvent;

/// Failure inside one sink
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink is closed")]
    Closed,

    #[error("sink I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("{0}")]
    Failed(String),
}

/// A delivery that did not go through, as reported by the monitor handle
#[derive(Debug, Error)]
#[error("failed to deliver \"{event}\" to {sink}: {source}")]
pub struct SinkDeliveryError {
    pub sink: String,
    pub event: ChangeEvent,
    #[source]
    pub source: SinkError,
}

/// Destination for change events
///
/// Called once per event, in the order events were classified. Failed
/// deliveries are not retried.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Short name used in logs and delivery errors
    fn name(&self) -> &str;

    async fn deliver(&self, event: &ChangeEvent) -> Result<(), SinkError>;
}

/// Forwards events into an mpsc channel
///
/// Delivery waits for room in the channel, so a slow consumer slows down
/// classification instead of losing events.
pub struct ChannelSink {
    tx: mpsc::Sender<ChangeEvent>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ChangeEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    fn name(&self) -> &str {
        "channel"
    }

    async fn deliver(&self, event: &ChangeEvent) -> Result<(), SinkError> {
        self.tx
            .send(event.clone())
            .await
            .map_err(|_| SinkError::Closed)
    }
}

/// Delivers to several sinks in order
///
/// Every sink is attempted even when an earlier one fails; the first failure
/// is returned.
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Box<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: impl EventSink + 'static) -> Self {
        self.push(Box::new(sink));
        self
    }

    pub fn push(&mut self, sink: Box<dyn EventSink>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[async_trait]
impl EventSink for FanoutSink {
    fn name(&self) -> &str {
        "fanout"
    }

    async fn deliver(&self, event: &ChangeEvent) -> Result<(), SinkError> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.deliver(event).await {
                tracing::debug!("Sink {} failed: {}", sink.name(), e);
                let e = SinkError::Failed(format!("{}: {}", sink.name(), e));
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
