//! Per-path debouncing
//!
//! A path is handed to the differ only after it has been quiet for the settle
//! window. Rapid successive writes therefore collapse into one settled entry
//! and the file is fingerprinted in its final state.

use crate::observation::{ObservationKind, RawObservation, RescanReason, ScanSignal};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, trace};
use veriwatch_core::RelPath;

/// A path whose settle window expired
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettledPath {
    pub path: RelPath,
    /// Kind of the most recent observation
    pub last_kind: ObservationKind,
    /// Observations folded into this entry
    pub observations: u32,
}

/// Debouncer output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settled {
    /// Paths that expired together, sorted by path
    Paths(Vec<SettledPath>),
    Reconcile(RescanReason),
}

#[derive(Debug)]
struct Pending {
    first_seen: Instant,
    deadline: Instant,
    last_kind: ObservationKind,
    observations: u32,
}

/// Settle-window bookkeeping, free of any timer
///
/// Time only enters through observation timestamps and the `now` passed to
/// [`Debouncer::drain_due`].
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    max_delay: Option<Duration>,
    pending: HashMap<RelPath, Pending>,
}

impl Debouncer {
    pub fn new(window: Duration, max_delay: Option<Duration>) -> Self {
        Self {
            window,
            max_delay,
            pending: HashMap::new(),
        }
    }

    /// Record an observation, (re)starting its path's window
    pub fn observe(&mut self, observation: RawObservation) {
        let RawObservation {
            path,
            kind,
            observed_at,
        } = observation;
        let window = self.window;
        let max_delay = self.max_delay;

        let pending = self.pending.entry(path).or_insert_with(|| Pending {
            first_seen: observed_at,
            deadline: observed_at,
            last_kind: kind,
            observations: 0,
        });

        let mut deadline = pending.deadline.max(observed_at + window);
        if let Some(max_delay) = max_delay {
            deadline = deadline.min(pending.first_seen + max_delay);
        }
        pending.deadline = deadline;
        pending.last_kind = kind;
        pending.observations += 1;
    }

    /// Earliest deadline among pending paths
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|p| p.deadline).min()
    }

    /// Remove and return every path whose deadline is at or before `now`
    pub fn drain_due(&mut self, now: Instant) -> Vec<SettledPath> {
        let due: Vec<RelPath> = self
            .pending
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(path, _)| path.clone())
            .collect();

        let mut settled: Vec<SettledPath> = due
            .into_iter()
            .filter_map(|path| {
                self.pending.remove(&path).map(|p| SettledPath {
                    path,
                    last_kind: p.last_kind,
                    observations: p.observations,
                })
            })
            .collect();
        settled.sort_by(|a, b| a.path.cmp(&b.path));
        settled
    }

    /// Drop everything pending, returning how many paths were discarded
    pub fn clear(&mut self) -> usize {
        let count = self.pending.len();
        self.pending.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Debouncer task
///
/// Reads scan signals, forwards rescans immediately and emits settled paths
/// whenever the earliest deadline passes. Pending paths are dropped on stop.
pub async fn run_debouncer(
    mut debouncer: Debouncer,
    mut input: mpsc::Receiver<ScanSignal>,
    output: mpsc::UnboundedSender<Settled>,
    mut stop: watch::Receiver<bool>,
) {
    let mut input_open = true;

    loop {
        if *stop.borrow() {
            break;
        }
        if !input_open && debouncer.is_empty() {
            break;
        }

        let deadline = debouncer.next_deadline();
        tokio::select! {
            biased;
            _ = stop.changed() => break,
            signal = input.recv(), if input_open => match signal {
                Some(ScanSignal::Observed(observation)) => {
                    trace!("Observed {:?} {}", observation.kind, observation.path);
                    debouncer.observe(observation);
                }
                Some(ScanSignal::Rescan(reason)) => {
                    info!("Reconciliation requested ({})", reason);
                    if output.send(Settled::Reconcile(reason)).is_err() {
                        break;
                    }
                }
                None => input_open = false,
            },
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                let settled = debouncer.drain_due(Instant::now());
                if !settled.is_empty() {
                    debug!("{} paths settled", settled.len());
                    if output.send(Settled::Paths(settled)).is_err() {
                        break;
                    }
                }
            }
        }
    }

    let dropped = debouncer.clear();
    if dropped > 0 {
        debug!("Dropped {} unsettled paths", dropped);
    }
}
