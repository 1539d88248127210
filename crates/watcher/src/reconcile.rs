//! Periodic reconciliation
//!
//! Notification backends can miss changes (overflow, races during startup,
//! network filesystems), so in event mode a full reconciliation is requested
//! on a fixed interval as a safety net.

use crate::observation::{RescanReason, ScanSignal};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Periodic reconciliation trigger
///
/// Does no scanning itself: it asks for a rescan through the same channel
/// the scanner uses, so the reconciliation runs on the differ task like any
/// other pass.
pub struct PeriodicReconciler {
    /// Scan interval (default: 5 minutes)
    interval: Duration,

    /// Scanner -> debouncer channel
    signal_tx: mpsc::Sender<ScanSignal>,
}

impl PeriodicReconciler {
    /// Create new periodic reconciler
    pub fn new(interval: Duration, signal_tx: mpsc::Sender<ScanSignal>) -> Self {
        Self {
            interval,
            signal_tx,
        }
    }

    /// Run until `stop` flips to true
    ///
    /// The first request is sent one full interval after start.
    pub async fn run(self, mut stop: watch::Receiver<bool>) {
        let mut timer = interval_at(Instant::now() + self.interval, self.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("Starting periodic reconciliation (interval: {:?})", self.interval);

        loop {
            if *stop.borrow() {
                break;
            }
            tokio::select! {
                _ = stop.changed() => break,
                _ = timer.tick() => {
                    debug!("Periodic reconciliation due");
                    if self
                        .signal_tx
                        .send(ScanSignal::Rescan(RescanReason::Periodic))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
            }
        }

        debug!("Periodic reconciliation stopped");
    }
}
