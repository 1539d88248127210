//! Monitoring sessions
//!
//! ```text
//! scanner --ScanSignal--> debouncer --Settled--> differ --ChangeEvent--> sink
//!    ^                                             |
//!    +---- periodic reconciler / reconcile_now     +--> baseline file
//! ```
//!
//! Every task watches the same stop flag. The differ task is the only
//! writer of the baseline.

use crate::config::{ConfigError, MonitorConfig, ScanMode};
use crate::debounce::{run_debouncer, Debouncer, Settled};
use crate::differ::{DiffOutcome, Differ};
use crate::ignore::IgnoreRules;
use crate::observation::{ObservationKind, RawObservation, RescanReason, ScanSignal};
use crate::reconcile::PeriodicReconciler;
use crate::scanner::{build_scanner, ScanError, WalkError};
use crate::sink::{EventSink, SinkDeliveryError};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::{spawn_blocking, JoinError, JoinHandle};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use veriwatch_baseline::{persist, Baseline, BaselineStore};
use veriwatch_core::{ChangeEvent, Fingerprinter, RelPath};

/// Failure starting or stopping a session
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Watch(#[from] ScanError),

    #[error("initial scan failed: {0}")]
    Scan(#[from] WalkError),

    #[error("background task failed: {0}")]
    Join(#[from] JoinError),
}

/// Writes the baseline back to disk
#[derive(Clone)]
struct Persistence {
    path: PathBuf,
    root: PathBuf,
    store: Arc<BaselineStore>,
}

impl Persistence {
    fn save(&self) {
        let snapshot = self.store.snapshot();
        match persist::save(&self.path, &self.root, &snapshot) {
            Ok(()) => debug!("Baseline saved to {}", self.path.display()),
            // In-memory baseline stays authoritative
            Err(e) => warn!("Failed to save baseline: {}", e),
        }
    }

    async fn save_async(&self) {
        let this = self.clone();
        if let Err(e) = spawn_blocking(move || this.save()).await {
            warn!("Baseline save task failed: {}", e);
        }
    }
}

/// Validated configuration plus the state built from it
struct Session {
    config: MonitorConfig,
    ignore: Arc<IgnoreRules>,
    store: Arc<BaselineStore>,
    differ: Arc<Differ>,
    persistence: Option<Persistence>,
    /// A persisted baseline was loaded
    seeded: bool,
}

impl Session {
    /// Blocking: validates the root and reads the baseline file
    fn prepare(config: MonitorConfig) -> Result<Self, MonitorError> {
        let config = config.validate()?;

        let ignore = IgnoreRules::load(
            &config.root,
            config.ignore.clone(),
            config.baseline_path.as_deref(),
        )
        .map_err(|e| ConfigError::Ignore(e.to_string()))?;
        let ignore = Arc::new(ignore);
        debug!("Loaded {} ignore sources", ignore.active_sources());

        let store = Arc::new(BaselineStore::default());
        let seeded = match &config.baseline_path {
            None => false,
            Some(path) => match persist::load(path) {
                Ok(Some(baseline)) => {
                    info!(
                        "Loaded baseline ({} files) from {}",
                        baseline.len(),
                        path.display()
                    );
                    store.replace(baseline);
                    true
                }
                Ok(None) => false,
                Err(e) => {
                    warn!("{}; starting from a fresh baseline", e);
                    false
                }
            },
        };

        let persistence = config.baseline_path.clone().map(|path| Persistence {
            path,
            root: config.root.clone(),
            store: store.clone(),
        });

        let differ = Arc::new(Differ::new(
            config.root.clone(),
            store.clone(),
            ignore.clone(),
            Fingerprinter::new(config.hash_attempts),
        ));

        Ok(Self {
            config,
            ignore,
            store,
            differ,
            persistence,
            seeded,
        })
    }

    /// Reconcile against the loaded baseline, or build a fresh one
    async fn initial_pass(&self) -> Result<DiffOutcome, MonitorError> {
        let differ = self.differ.clone();
        let seeded = self.seeded;
        let outcome = spawn_blocking(move || {
            if seeded {
                differ.reconcile()
            } else {
                differ.populate()
            }
        })
        .await??;
        Ok(outcome)
    }
}

/// Deliver events in order, collecting failures
async fn deliver_events(sink: &dyn EventSink, events: &[ChangeEvent]) -> Vec<SinkDeliveryError> {
    let mut failures = Vec::new();
    for event in events {
        if let Err(source) = sink.deliver(event).await {
            error!("Failed to deliver \"{}\" to {}: {}", event, sink.name(), source);
            failures.push(SinkDeliveryError {
                sink: sink.name().to_string(),
                event: event.clone(),
                source,
            });
        }
    }
    failures
}

/// State owned by the differ task
struct Pipeline {
    differ: Arc<Differ>,
    sink: Arc<dyn EventSink>,
    failures: mpsc::UnboundedSender<SinkDeliveryError>,
    persistence: Option<Persistence>,
    /// Re-queues unreadable paths into the debouncer
    retry_tx: mpsc::Sender<ScanSignal>,
    retries: HashMap<RelPath, u32>,
    read_retries: u32,
    /// Still unreadable after `read_retries`; re-checked every `recheck_interval`
    parked: BTreeSet<RelPath>,
    recheck_interval: Duration,
}

impl Pipeline {
    async fn run(mut self, mut settled: mpsc::UnboundedReceiver<Settled>, mut stop: watch::Receiver<bool>) {
        let mut recheck = interval_at(Instant::now() + self.recheck_interval, self.recheck_interval);
        recheck.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *stop.borrow() {
                break;
            }
            let item = tokio::select! {
                biased;
                _ = stop.changed() => break,
                item = settled.recv() => item,
                _ = recheck.tick() => {
                    self.recheck_parked();
                    continue;
                }
            };
            let Some(item) = item else { break };

            // Runs to completion even if stop arrives meanwhile
            self.handle(item).await;
        }
        debug!("Differ task stopped");
    }

    async fn handle(&mut self, item: Settled) {
        let differ = self.differ.clone();
        match item {
            Settled::Paths(settled) => {
                let paths: Vec<RelPath> = settled.into_iter().map(|s| s.path).collect();
                let requested = paths.clone();
                let outcome = match spawn_blocking(move || differ.apply_settled(&paths)).await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        error!("Diff pass failed: {}", e);
                        return;
                    }
                };
                self.schedule_retries(&requested, &outcome.unreadable);
                self.finish(outcome).await;
            }
            Settled::Reconcile(reason) => {
                info!("Running reconciliation scan ({})", reason);
                let outcome = match spawn_blocking(move || differ.reconcile()).await {
                    Ok(Ok(outcome)) => outcome,
                    Ok(Err(e)) => {
                        warn!("Reconciliation failed: {}", e);
                        return;
                    }
                    Err(e) => {
                        error!("Reconciliation task failed: {}", e);
                        return;
                    }
                };
                self.retries.clear();
                let still_unreadable: BTreeSet<&RelPath> = outcome.unreadable.iter().collect();
                self.parked.retain(|path| still_unreadable.contains(path));
                self.finish(outcome).await;
            }
        }
    }

    fn schedule_retries(&mut self, requested: &[RelPath], unreadable: &[RelPath]) {
        let unreadable_set: BTreeSet<&RelPath> = unreadable.iter().collect();
        for path in requested {
            if !unreadable_set.contains(path) {
                self.retries.remove(path);
                if self.parked.remove(path) {
                    debug!("Readable again: {}", path);
                }
            }
        }

        for path in unreadable {
            if self.parked.contains(path) {
                continue;
            }
            let attempts = self.retries.entry(path.clone()).or_insert(0);
            *attempts += 1;
            if *attempts > self.read_retries {
                warn!(
                    "Still unreadable after {} retries, re-checking every {:?}: {}",
                    self.read_retries, self.recheck_interval, path
                );
                self.retries.remove(path);
                self.parked.insert(path.clone());
                continue;
            }

            debug!("Re-queueing unreadable {} ({}/{})", path, attempts, self.read_retries);
            self.requeue(path);
        }
    }

    /// Push every parked path through the debouncer again
    fn recheck_parked(&self) {
        for path in &self.parked {
            self.requeue(path);
        }
    }

    fn requeue(&self, path: &RelPath) {
        let observation = RawObservation::new(path.clone(), ObservationKind::MetadataChanged);
        if let Err(e) = self.retry_tx.try_send(ScanSignal::Observed(observation)) {
            debug!("Could not re-queue {}: {}", path, e);
        }
    }

    async fn finish(&mut self, outcome: DiffOutcome) {
        if outcome.events.is_empty() {
            return;
        }
        self.deliver(&outcome.events).await;
        if let Some(persistence) = &self.persistence {
            persistence.save_async().await;
        }
    }

    async fn deliver(&self, events: &[ChangeEvent]) {
        for failure in deliver_events(self.sink.as_ref(), events).await {
            // Nobody listening is fine, the failure is already logged
            let _ = self.failures.send(failure);
        }
    }
}

/// Entry point for long-running sessions
pub struct Monitor;

impl Monitor {
    /// Start monitoring `config.root`
    ///
    /// Returns once the initial reconciliation (or population) has been
    /// applied and its events delivered; from then on changes are reported
    /// to `sink` as they settle.
    pub async fn start(config: MonitorConfig, sink: Arc<dyn EventSink>) -> Result<MonitorHandle, MonitorError> {
        let session = spawn_blocking(move || Session::prepare(config)).await??;
        let config = session.config.clone();

        let (signal_tx, signal_rx) = mpsc::channel(config.event_queue_capacity);
        let (settled_tx, settled_rx) = mpsc::unbounded_channel();
        let (failure_tx, failure_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = watch::channel(false);

        // Watches go in before the initial pass so nothing slips in between
        let scanner = {
            let config = config.clone();
            let ignore = session.ignore.clone();
            spawn_blocking(move || build_scanner(&config, ignore)).await??
        };

        let initial = session.initial_pass().await?;

        let pipeline = Pipeline {
            differ: session.differ.clone(),
            sink,
            failures: failure_tx,
            persistence: session.persistence.clone(),
            retry_tx: signal_tx.clone(),
            retries: HashMap::new(),
            read_retries: config.read_retries,
            parked: BTreeSet::new(),
            recheck_interval: config.poll_interval(),
        };
        pipeline.deliver(&initial.events).await;
        if let Some(persistence) = &session.persistence {
            persistence.save_async().await;
        }

        info!(
            "Monitoring started for {} ({} mode, {} files)",
            config.root.display(),
            config.mode,
            session.store.len()
        );

        let mut tasks: Vec<(&'static str, JoinHandle<()>)> = Vec::new();
        tasks.push((
            scanner.name(),
            tokio::spawn(scanner.run(signal_tx.clone(), stop_rx.clone())),
        ));
        tasks.push((
            "debouncer",
            tokio::spawn(run_debouncer(
                Debouncer::new(config.settle_window(), config.settle_max()),
                signal_rx,
                settled_tx,
                stop_rx.clone(),
            )),
        ));
        if config.mode == ScanMode::Event {
            if let Some(interval) = config.reconcile_interval() {
                tasks.push((
                    "reconciler",
                    tokio::spawn(PeriodicReconciler::new(interval, signal_tx.clone()).run(stop_rx.clone())),
                ));
            }
        }
        tasks.push(("differ", tokio::spawn(pipeline.run(settled_rx, stop_rx))));

        Ok(MonitorHandle {
            root: config.root,
            store: session.store,
            stop_tx,
            signal_tx,
            failures: failure_rx,
            tasks,
            persistence: session.persistence,
        })
    }
}

/// Control surface of a running session
///
/// Dropping the handle without calling [`MonitorHandle::stop`] also ends
/// every task, but skips the final baseline save.
pub struct MonitorHandle {
    root: PathBuf,
    store: Arc<BaselineStore>,
    stop_tx: watch::Sender<bool>,
    signal_tx: mpsc::Sender<ScanSignal>,
    failures: mpsc::UnboundedReceiver<SinkDeliveryError>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
    persistence: Option<Persistence>,
}

impl MonitorHandle {
    /// Canonical watch root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Baseline as of the last completed diff pass
    pub fn baseline(&self) -> Arc<Baseline> {
        self.store.snapshot()
    }

    /// Ask for a full reconciliation
    ///
    /// Returns false when the session is already shutting down.
    pub async fn reconcile_now(&self) -> bool {
        self.signal_tx
            .send(ScanSignal::Rescan(RescanReason::Requested))
            .await
            .is_ok()
    }

    /// Next event that a sink failed to accept
    pub async fn next_delivery_failure(&mut self) -> Option<SinkDeliveryError> {
        self.failures.recv().await
    }

    /// Non-blocking variant of [`MonitorHandle::next_delivery_failure`]
    pub fn try_next_delivery_failure(&mut self) -> Option<SinkDeliveryError> {
        self.failures.try_recv().ok()
    }

    /// Stop every task, then save the baseline
    ///
    /// An in-flight diff pass finishes first; unsettled paths are dropped.
    pub async fn stop(self) -> Result<(), MonitorError> {
        self.stop_tx.send_replace(true);

        let mut first_error = None;
        for (name, task) in self.tasks {
            if let Err(e) = task.await {
                error!("{} task failed: {}", name, e);
                first_error.get_or_insert(MonitorError::Join(e));
            }
        }

        if let Some(persistence) = &self.persistence {
            persistence.save_async().await;
        }
        info!("Monitoring stopped for {}", self.root.display());

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Outcome of [`scan_once`]
#[derive(Debug)]
pub struct ScanReport {
    /// Delivered (or attempted) events, in path order
    pub events: Vec<ChangeEvent>,
    pub unreadable: Vec<RelPath>,
    /// No baseline existed; one was created instead of compared against
    pub populated: bool,
    /// Files in the baseline after the scan
    pub files: usize,
    pub failures: Vec<SinkDeliveryError>,
}

/// One check cycle: load, reconcile (or populate), deliver, save
pub async fn scan_once(config: MonitorConfig, sink: &dyn EventSink) -> Result<ScanReport, MonitorError> {
    let session = spawn_blocking(move || Session::prepare(config)).await??;
    let outcome = session.initial_pass().await?;

    let failures = deliver_events(sink, &outcome.events).await;
    if let Some(persistence) = &session.persistence {
        persistence.save_async().await;
    }

    Ok(ScanReport {
        events: outcome.events,
        unreadable: outcome.unreadable,
        populated: !session.seeded,
        files: session.store.len(),
        failures,
    })
}
