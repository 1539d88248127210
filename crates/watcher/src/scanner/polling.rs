//! Interval polling

use super::walk::{walk_metadata, FileMeta, WalkError};
use super::Scanner;
use crate::config::MonitorConfig;
use crate::ignore::IgnoreRules;
use crate::observation::{ObservationKind, RawObservation, ScanSignal};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use veriwatch_core::{Digest, Fingerprinter, RelPath};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PollEntry {
    meta: FileMeta,
    /// Only filled in deep mode
    digest: Option<Digest>,
}

/// What one poll saw
#[derive(Debug, Clone, Default)]
pub struct PollSnapshot {
    entries: BTreeMap<RelPath, PollEntry>,
}

impl PollSnapshot {
    /// Walk `root`, hashing every file when `deep` is set
    ///
    /// Files that cannot be read keep their entry from `previous` so a
    /// transient failure does not look like a disappearance.
    pub fn take(
        root: &Path,
        ignore: &IgnoreRules,
        deep: Option<&Fingerprinter>,
        previous: &PollSnapshot,
    ) -> Result<Self, WalkError> {
        let mut walk = walk_metadata(root, ignore)?;
        let mut entries = BTreeMap::new();

        for (rel, meta) in std::mem::take(&mut walk.files) {
            let digest = match deep {
                None => None,
                Some(fingerprinter) => match fingerprinter.fingerprint(root, &rel) {
                    Ok(record) => Some(record.digest),
                    Err(err) if err.is_missing() => continue,
                    Err(err) => {
                        debug!("Deep poll could not hash {}: {}", rel, err);
                        if let Some(entry) = previous.entries.get(&rel) {
                            entries.insert(rel, *entry);
                        }
                        continue;
                    }
                },
            };
            entries.insert(rel, PollEntry { meta, digest });
        }

        for (rel, entry) in &previous.entries {
            if !entries.contains_key(rel) && walk.is_unreadable(rel) {
                entries.insert(rel.clone(), *entry);
            }
        }

        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Observations explaining how `previous` became `next`, in path order
pub fn diff_snapshots(previous: &PollSnapshot, next: &PollSnapshot, now: Instant) -> Vec<RawObservation> {
    let mut observations = Vec::new();

    for (rel, entry) in &next.entries {
        match previous.entries.get(rel) {
            None => observations.push(RawObservation::at(rel.clone(), ObservationKind::Appeared, now)),
            Some(old) if old != entry => {
                observations.push(RawObservation::at(rel.clone(), ObservationKind::MetadataChanged, now))
            }
            Some(_) => {}
        }
    }
    for rel in previous.entries.keys() {
        if !next.entries.contains_key(rel) {
            observations.push(RawObservation::at(rel.clone(), ObservationKind::Disappeared, now));
        }
    }

    observations.sort_by(|a, b| a.path.cmp(&b.path));
    observations
}

/// Walks the tree on a fixed interval
pub struct PollingScanner {
    root: PathBuf,
    interval: Duration,
    ignore: Arc<IgnoreRules>,
    deep: Option<Fingerprinter>,
    snapshot: PollSnapshot,
}

impl PollingScanner {
    /// Takes the first snapshot immediately (blocking)
    pub fn new(config: &MonitorConfig, ignore: Arc<IgnoreRules>) -> Result<Self, WalkError> {
        let deep = config
            .deep_poll
            .then(|| Fingerprinter::new(config.hash_attempts));
        let snapshot = PollSnapshot::take(&config.root, &ignore, deep.as_ref(), &PollSnapshot::default())?;
        debug!("Initial poll snapshot: {} files", snapshot.len());

        Ok(Self {
            root: config.root.clone(),
            interval: config.poll_interval(),
            ignore,
            deep,
            snapshot,
        })
    }
}

#[async_trait]
impl Scanner for PollingScanner {
    fn name(&self) -> &'static str {
        "polling"
    }

    async fn run(self: Box<Self>, tx: mpsc::Sender<ScanSignal>, mut stop: watch::Receiver<bool>) {
        let mut this = *self;
        info!(
            "Polling {} every {:?}{}",
            this.root.display(),
            this.interval,
            if this.deep.is_some() { " (deep)" } else { "" }
        );

        let mut ticker = interval_at(Instant::now() + this.interval, this.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *stop.borrow() {
                break;
            }
            tokio::select! {
                _ = stop.changed() => break,
                _ = ticker.tick() => {}
            }

            let root = this.root.clone();
            let ignore = this.ignore.clone();
            let deep = this.deep.clone();
            let previous = std::mem::take(&mut this.snapshot);

            let joined = tokio::task::spawn_blocking(move || {
                let next = PollSnapshot::take(&root, &ignore, deep.as_ref(), &previous);
                (previous, next)
            })
            .await;

            let (previous, next) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    error!("Poll task failed: {}", e);
                    break;
                }
            };

            let next = match next {
                Ok(next) => next,
                Err(e) => {
                    warn!("Poll of {} failed: {}", this.root.display(), e);
                    this.snapshot = previous;
                    continue;
                }
            };

            let observations = diff_snapshots(&previous, &next, Instant::now());
            this.snapshot = next;

            if !observations.is_empty() {
                debug!("Poll found {} changed paths", observations.len());
            }
            for observation in observations {
                if tx.send(ScanSignal::Observed(observation)).await.is_err() {
                    return;
                }
            }
        }

        debug!("Polling scanner stopped");
    }
}
