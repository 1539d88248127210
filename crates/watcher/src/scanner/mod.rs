//! Change detection backends
//!
//! Both backends only report *that* something may have changed at a path;
//! deciding what actually changed is left to the differ.

pub mod event;
pub mod polling;
pub mod walk;

pub use event::EventScanner;
pub use polling::PollingScanner;
pub use walk::{fingerprint_tree, walk_metadata, walk_subtree, TreeScan, TreeWalk, WalkError};

use crate::config::{MonitorConfig, ScanMode};
use crate::ignore::IgnoreRules;
use crate::observation::ScanSignal;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, watch};

/// Scanner setup failure
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("failed to watch {}: {source}", .path.display())]
    Watch {
        path: std::path::PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error(transparent)]
    Walk(#[from] WalkError),
}

/// Producer of [`ScanSignal`]s
#[async_trait]
pub trait Scanner: Send {
    fn name(&self) -> &'static str;

    /// Run until `stop` flips to true or the receiver is gone
    async fn run(self: Box<Self>, tx: mpsc::Sender<ScanSignal>, stop: watch::Receiver<bool>);
}

/// Construct the scanner selected by `config.mode`
///
/// Blocking: the polling scanner takes its first snapshot here and the event
/// scanner registers its watches, so nothing that happens after this returns
/// can be missed.
pub fn build_scanner(
    config: &MonitorConfig,
    ignore: Arc<IgnoreRules>,
) -> Result<Box<dyn Scanner>, ScanError> {
    match config.mode {
        ScanMode::Polling => Ok(Box::new(PollingScanner::new(config, ignore)?)),
        ScanMode::Event => Ok(Box::new(EventScanner::new(config, ignore)?)),
    }
}
