//! Native filesystem notifications via `notify`

use super::{ScanError, Scanner};
use crate::config::MonitorConfig;
use crate::ignore::IgnoreRules;
use crate::observation::{ObservationKind, RawObservation, RescanReason, ScanSignal};
use async_trait::async_trait;
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};
use veriwatch_core::RelPath;

/// Subscribes to recursive notifications for the watch root
///
/// The backend callback runs on its own thread and hands events over through
/// a bounded channel with `try_send`; when that channel is full the event is
/// dropped and a rescan is requested instead.
pub struct EventScanner {
    root: PathBuf,
    ignore: Arc<IgnoreRules>,
    watcher: RecommendedWatcher,
    events: mpsc::Receiver<notify::Result<Event>>,
    overflowed: Arc<AtomicBool>,
}

impl EventScanner {
    pub fn new(config: &MonitorConfig, ignore: Arc<IgnoreRules>) -> Result<Self, ScanError> {
        let (event_tx, events) = mpsc::channel(config.event_queue_capacity);
        let overflowed = Arc::new(AtomicBool::new(false));

        let flag = overflowed.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            match event_tx.try_send(res) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => flag.store(true, Ordering::Release),
                Err(TrySendError::Closed(_)) => {}
            }
        })
        .map_err(|source| ScanError::Watch {
            path: config.root.clone(),
            source,
        })?;

        watcher
            .watch(&config.root, RecursiveMode::Recursive)
            .map_err(|source| ScanError::Watch {
                path: config.root.clone(),
                source,
            })?;

        Ok(Self {
            root: config.root.clone(),
            ignore,
            watcher,
            events,
            overflowed,
        })
    }
}

#[async_trait]
impl Scanner for EventScanner {
    fn name(&self) -> &'static str {
        "event"
    }

    async fn run(self: Box<Self>, tx: mpsc::Sender<ScanSignal>, mut stop: watch::Receiver<bool>) {
        let EventScanner {
            root,
            ignore,
            watcher,
            mut events,
            overflowed,
        } = *self;
        info!("Watching {} for filesystem events", root.display());

        loop {
            if *stop.borrow() {
                break;
            }
            let received = tokio::select! {
                biased;
                _ = stop.changed() => break,
                received = events.recv() => received,
            };
            let Some(result) = received else { break };

            // Items were dropped while the queue was full; whatever is still
            // queued is not the whole story any more
            if overflowed.swap(false, Ordering::AcqRel) {
                warn!("Event queue overflowed, requesting reconciliation");
                if tx.send(ScanSignal::Rescan(RescanReason::Overflow)).await.is_err() {
                    break;
                }
            }

            let signals = match result {
                Ok(event) => translate(&root, &ignore, event, Instant::now()),
                Err(e) => {
                    warn!("Watch backend error: {}", e);
                    vec![ScanSignal::Rescan(RescanReason::BackendError)]
                }
            };

            for signal in signals {
                if tx.send(signal).await.is_err() {
                    return;
                }
            }
        }

        drop(watcher);
        debug!("Event scanner stopped");
    }
}

/// Map one backend event onto scan signals
///
/// Paths outside the root, the root itself and ignored paths are dropped.
pub fn translate(root: &Path, ignore: &IgnoreRules, event: Event, now: Instant) -> Vec<ScanSignal> {
    if event.need_rescan() {
        warn!("Watch backend requested a rescan");
        return vec![ScanSignal::Rescan(RescanReason::Overflow)];
    }
    trace!("Backend event: {:?}", event);

    let kind = match event.kind {
        EventKind::Access(_) => return Vec::new(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut signals = Vec::with_capacity(2);
            if let Some(from) = event.paths.first() {
                signals.extend(observe(root, ignore, from, ObservationKind::Disappeared, now));
            }
            if let Some(to) = event.paths.get(1) {
                signals.extend(observe(root, ignore, to, ObservationKind::Appeared, now));
            }
            return signals;
        }
        EventKind::Create(_) => ObservationKind::Appeared,
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => ObservationKind::Disappeared,
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => ObservationKind::Appeared,
        EventKind::Remove(_) => ObservationKind::Disappeared,
        EventKind::Modify(_) | EventKind::Any | EventKind::Other => ObservationKind::MetadataChanged,
    };

    event
        .paths
        .iter()
        .filter_map(|path| observe(root, ignore, path, kind, now))
        .collect()
}

fn observe(
    root: &Path,
    ignore: &IgnoreRules,
    path: &Path,
    kind: ObservationKind,
    now: Instant,
) -> Option<ScanSignal> {
    let rel = RelPath::from_absolute(root, path).ok()?;
    if ignore.should_ignore(&rel) {
        return None;
    }
    Some(ScanSignal::Observed(RawObservation::at(rel, kind, now)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, DataChange, Flag, RemoveKind};

    fn signals(root: &Path, event: Event) -> Vec<(String, ObservationKind)> {
        translate(root, &IgnoreRules::builtin(root), event, Instant::now())
            .into_iter()
            .map(|signal| match signal {
                ScanSignal::Observed(o) => (o.path.as_str().to_string(), o.kind),
                ScanSignal::Rescan(reason) => panic!("unexpected rescan: {}", reason),
            })
            .collect()
    }

    #[test]
    fn test_translate_basic_kinds() {
        let root = Path::new("/srv/watched");

        let create = Event::new(EventKind::Create(CreateKind::File)).add_path(root.join("a.txt"));
        assert_eq!(signals(root, create), [("a.txt".to_string(), ObservationKind::Appeared)]);

        let modify = Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
            .add_path(root.join("docs/b.txt"));
        assert_eq!(
            signals(root, modify),
            [("docs/b.txt".to_string(), ObservationKind::MetadataChanged)]
        );

        let remove = Event::new(EventKind::Remove(RemoveKind::File)).add_path(root.join("a.txt"));
        assert_eq!(signals(root, remove), [("a.txt".to_string(), ObservationKind::Disappeared)]);

        let access = Event::new(EventKind::Access(AccessKind::Read)).add_path(root.join("a.txt"));
        assert!(signals(root, access).is_empty());
    }

    #[test]
    fn test_translate_renames() {
        let root = Path::new("/srv/watched");

        let both = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(root.join("x.txt"))
            .add_path(root.join("y.txt"));
        assert_eq!(
            signals(root, both),
            [
                ("x.txt".to_string(), ObservationKind::Disappeared),
                ("y.txt".to_string(), ObservationKind::Appeared),
            ]
        );

        let from = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::From)))
            .add_path(root.join("x.txt"));
        assert_eq!(signals(root, from), [("x.txt".to_string(), ObservationKind::Disappeared)]);

        let to = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::To)))
            .add_path(root.join("y.txt"));
        assert_eq!(signals(root, to), [("y.txt".to_string(), ObservationKind::Appeared)]);
    }

    #[test]
    fn test_translate_drops_outside_ignored_and_root() {
        let root = Path::new("/srv/watched");
        let event = Event::new(EventKind::Create(CreateKind::Any))
            .add_path(PathBuf::from("/etc/passwd"))
            .add_path(root.to_path_buf())
            .add_path(root.join(".notes.txt.swp"))
            .add_path(root.join("kept.txt"));
        assert_eq!(signals(root, event), [("kept.txt".to_string(), ObservationKind::Appeared)]);
    }

    #[test]
    fn test_translate_rescan_flag() {
        let root = Path::new("/srv/watched");
        let event = Event::new(EventKind::Other).set_flag(Flag::Rescan);
        let out = translate(root, &IgnoreRules::builtin(root), event, Instant::now());
        assert_eq!(out, [ScanSignal::Rescan(RescanReason::Overflow)]);
    }
}
