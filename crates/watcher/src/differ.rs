//! Classification of settled paths against the baseline
//!
//! Fingerprinting happens before the baseline lock is taken; the lock is then
//! held for exactly one classify-and-update pass, visited in path order.

use crate::ignore::IgnoreRules;
use crate::scanner::walk::{covered_by, fingerprint_tree, walk_subtree, TreeScan, WalkError};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use veriwatch_baseline::{Baseline, BaselineStore};
use veriwatch_core::{ChangeEvent, FileRecord, Fingerprinter, ReadError, RelPath};

/// What is on disk at a path right now
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    Present(FileRecord),
    Missing,
    /// Exists (or may exist) but could not be fingerprinted
    Unreadable,
}

/// Result of one pass
#[derive(Debug, Default)]
pub struct DiffOutcome {
    /// In path order
    pub events: Vec<ChangeEvent>,
    pub unreadable: Vec<RelPath>,
}

impl DiffOutcome {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.unreadable.is_empty()
    }
}

/// Decide what, if anything, changed at one path
///
/// Identical content never produces an event, whatever the metadata says.
/// An unreadable file is neither created nor deleted.
pub fn classify(previous: Option<&FileRecord>, probe: &Probe) -> Option<ChangeEvent> {
    match (previous, probe) {
        (None, Probe::Present(current)) => Some(ChangeEvent::created(current)),
        (Some(previous), Probe::Present(current)) if !previous.same_content(current) => {
            Some(ChangeEvent::modified(previous, current))
        }
        (Some(previous), Probe::Missing) => Some(ChangeEvent::deleted(previous)),
        _ => None,
    }
}

/// Classify every probe and fold the result into `baseline`
pub fn apply_probes(baseline: &mut Baseline, probes: BTreeMap<RelPath, Probe>) -> DiffOutcome {
    let mut outcome = DiffOutcome::default();

    for (path, probe) in probes {
        let event = classify(baseline.get(path.as_str()), &probe);
        match probe {
            // Also refreshes size/mtime after a metadata-only touch
            Probe::Present(record) => {
                baseline.insert(record);
            }
            Probe::Missing => {
                baseline.remove(path.as_str());
            }
            Probe::Unreadable => outcome.unreadable.push(path),
        }
        if let Some(event) = event {
            info!("{}", event);
            outcome.events.push(event);
        }
    }

    outcome
}

/// Turns settled paths and full scans into change events
pub struct Differ {
    root: PathBuf,
    store: Arc<BaselineStore>,
    ignore: Arc<IgnoreRules>,
    fingerprinter: Fingerprinter,
}

impl Differ {
    pub fn new(
        root: PathBuf,
        store: Arc<BaselineStore>,
        ignore: Arc<IgnoreRules>,
        fingerprinter: Fingerprinter,
    ) -> Self {
        Self {
            root,
            store,
            ignore,
            fingerprinter,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn store(&self) -> &Arc<BaselineStore> {
        &self.store
    }

    /// Fingerprint one path
    pub fn probe(&self, path: &RelPath) -> Probe {
        match self.fingerprinter.fingerprint(&self.root, path) {
            Ok(record) => Probe::Present(record),
            Err(err) if err.is_missing() => Probe::Missing,
            // Replaced by a symlink or special file: the monitored file is gone
            Err(ReadError::NotAFile { .. }) => Probe::Missing,
            Err(err) => {
                warn!("Unreadable: {}", err);
                Probe::Unreadable
            }
        }
    }

    /// Handle paths whose settle window expired
    ///
    /// A directory on disk expands to the files below it, and every path
    /// expands to the baseline entries below it, so moving or deleting a
    /// directory yields one event per file.
    pub fn apply_settled(&self, paths: &[RelPath]) -> DiffOutcome {
        let probes = self.expand(paths);
        debug!("Settling {} paths ({} after expansion)", paths.len(), probes.len());
        self.store.update(|baseline| apply_probes(baseline, probes))
    }

    fn expand(&self, paths: &[RelPath]) -> BTreeMap<RelPath, Probe> {
        let snapshot = self.store.snapshot();
        let mut targets = BTreeSet::new();
        let mut unreadable = BTreeSet::new();

        for path in paths {
            let is_dir = fs::symlink_metadata(path.to_path(&self.root))
                .map(|meta| meta.is_dir())
                .unwrap_or(false);

            if is_dir {
                // A tracked file may have been replaced by this directory
                if snapshot.contains(path.as_str()) {
                    targets.insert(path.clone());
                }
                match walk_subtree(&self.root, path, &self.ignore) {
                    Ok(walk) => {
                        targets.extend(walk.files.into_keys());
                        unreadable.extend(walk.unreadable);
                    }
                    Err(err) if err.is_missing() => {}
                    Err(err) => {
                        warn!("Unreadable: {}", err);
                        unreadable.insert(path.clone());
                    }
                }
            } else {
                targets.insert(path.clone());
            }

            targets.extend(snapshot.children_of(path).map(|record| record.path.clone()));
        }

        let mut probes: BTreeMap<RelPath, Probe> = unreadable
            .iter()
            .map(|path| (path.clone(), Probe::Unreadable))
            .collect();
        for target in targets {
            if probes.contains_key(&target) {
                continue;
            }
            let probe = if covered_by(&unreadable, &target) {
                Probe::Unreadable
            } else {
                self.probe(&target)
            };
            probes.insert(target, probe);
        }
        probes
    }

    /// Compare the whole tree against the baseline
    ///
    /// Used at startup with a persisted baseline and whenever individual
    /// observations can no longer be trusted (overflow, backend errors).
    pub fn reconcile(&self) -> Result<DiffOutcome, WalkError> {
        let TreeScan {
            records,
            unreadable,
        } = fingerprint_tree(&self.root, &self.ignore, &self.fingerprinter)?;

        let outcome = self.store.update(|baseline| {
            let mut probes: BTreeMap<RelPath, Probe> = BTreeMap::new();
            for path in baseline.paths() {
                if records.contains_key(path) {
                    continue;
                }
                let probe = if covered_by(&unreadable, path) {
                    Probe::Unreadable
                } else {
                    Probe::Missing
                };
                probes.insert(path.clone(), probe);
            }
            for path in &unreadable {
                probes.entry(path.clone()).or_insert(Probe::Unreadable);
            }
            for (path, record) in records {
                probes.insert(path, Probe::Present(record));
            }
            apply_probes(baseline, probes)
        });

        info!(
            "Reconciliation found {} changes ({} unreadable)",
            outcome.events.len(),
            outcome.unreadable.len()
        );
        Ok(outcome)
    }

    /// Build the baseline from scratch without emitting events
    pub fn populate(&self) -> Result<DiffOutcome, WalkError> {
        let TreeScan {
            records,
            unreadable,
        } = fingerprint_tree(&self.root, &self.ignore, &self.fingerprinter)?;

        let baseline = Baseline::from_records(records.into_values());
        info!("Baseline created ({} files)", baseline.len());
        self.store.replace(baseline);

        Ok(DiffOutcome {
            events: Vec::new(),
            unreadable: unreadable.into_iter().collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;
    use veriwatch_core::{hash_bytes, ChangeKind};

    fn rel(path: &str) -> RelPath {
        RelPath::new(path).unwrap()
    }

    fn record(path: &str, content: &[u8]) -> FileRecord {
        FileRecord::new(
            rel(path),
            content.len() as u64,
            SystemTime::UNIX_EPOCH,
            hash_bytes(content),
        )
    }

    fn setup() -> (TempDir, PathBuf, Differ) {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().canonicalize().unwrap();
        let differ = Differ::new(
            root.clone(),
            Arc::new(BaselineStore::default()),
            Arc::new(IgnoreRules::builtin(&root)),
            Fingerprinter::default(),
        );
        (temp_dir, root, differ)
    }

    fn summary(outcome: &DiffOutcome) -> Vec<(&str, ChangeKind)> {
        outcome
            .events
            .iter()
            .map(|e| (e.path().as_str(), e.kind()))
            .collect()
    }

    #[test]
    fn test_classify_table() {
        let old = record("a.txt", b"hello");
        let same = FileRecord {
            modified: SystemTime::UNIX_EPOCH + Duration::from_secs(60),
            ..old.clone()
        };
        let new = record("a.txt", b"hello!");

        let created = classify(None, &Probe::Present(old.clone())).unwrap();
        assert_eq!(created.kind(), ChangeKind::Created);
        assert_eq!(created.new_digest(), Some(old.digest));

        let modified = classify(Some(&old), &Probe::Present(new.clone())).unwrap();
        assert_eq!(modified.kind(), ChangeKind::Modified);
        assert_eq!(modified.previous_digest(), Some(old.digest));
        assert_eq!(modified.new_digest(), Some(new.digest));

        let deleted = classify(Some(&old), &Probe::Missing).unwrap();
        assert_eq!(deleted.kind(), ChangeKind::Deleted);
        assert_eq!(deleted.previous_digest(), Some(old.digest));

        assert!(classify(Some(&old), &Probe::Present(same)).is_none());
        assert!(classify(Some(&old), &Probe::Unreadable).is_none());
        assert!(classify(None, &Probe::Unreadable).is_none());
        assert!(classify(None, &Probe::Missing).is_none());
    }

    #[test]
    fn test_unreadable_keeps_baseline_entry() {
        let mut baseline = Baseline::from_records([record("a.txt", b"hello")]);
        let probes = BTreeMap::from([(rel("a.txt"), Probe::Unreadable)]);

        let outcome = apply_probes(&mut baseline, probes);
        assert!(outcome.events.is_empty());
        assert_eq!(outcome.unreadable, [rel("a.txt")]);
        assert_eq!(baseline.get("a.txt").unwrap().digest, hash_bytes(b"hello"));
    }

    #[test]
    fn test_metadata_only_touch_refreshes_record() {
        let mut baseline = Baseline::from_records([record("a.txt", b"hello")]);
        let touched = FileRecord {
            modified: SystemTime::UNIX_EPOCH + Duration::from_secs(3600),
            ..record("a.txt", b"hello")
        };

        let outcome = apply_probes(
            &mut baseline,
            BTreeMap::from([(rel("a.txt"), Probe::Present(touched.clone()))]),
        );
        assert!(outcome.is_empty());
        assert_eq!(baseline.get("a.txt"), Some(&touched));
    }

    #[test]
    fn test_apply_settled_create_modify_delete() {
        let (_guard, root, differ) = setup();

        fs::write(root.join("b.txt"), b"world").unwrap();
        let outcome = differ.apply_settled(&[rel("b.txt")]);
        assert_eq!(summary(&outcome), [("b.txt", ChangeKind::Created)]);
        assert_eq!(outcome.events[0].new_digest(), Some(hash_bytes(b"world")));

        fs::write(root.join("b.txt"), b"world!").unwrap();
        let outcome = differ.apply_settled(&[rel("b.txt")]);
        assert_eq!(summary(&outcome), [("b.txt", ChangeKind::Modified)]);

        fs::remove_file(root.join("b.txt")).unwrap();
        let outcome = differ.apply_settled(&[rel("b.txt")]);
        assert_eq!(summary(&outcome), [("b.txt", ChangeKind::Deleted)]);
        assert_eq!(outcome.events[0].previous_digest(), Some(hash_bytes(b"world!")));
        assert!(differ.store().is_empty());
    }

    #[test]
    fn test_rename_is_delete_plus_create() {
        let (_guard, root, differ) = setup();
        fs::write(root.join("x.txt"), b"payload").unwrap();
        differ.populate().unwrap();

        fs::rename(root.join("x.txt"), root.join("y.txt")).unwrap();
        let outcome = differ.apply_settled(&[rel("y.txt"), rel("x.txt")]);
        assert_eq!(
            summary(&outcome),
            [("x.txt", ChangeKind::Deleted), ("y.txt", ChangeKind::Created)]
        );
    }

    #[test]
    fn test_directory_delete_expands_to_files() {
        let (_guard, root, differ) = setup();
        fs::create_dir_all(root.join("docs/sub")).unwrap();
        fs::write(root.join("docs/a.txt"), b"1").unwrap();
        fs::write(root.join("docs/sub/b.txt"), b"2").unwrap();
        fs::write(root.join("keep.txt"), b"3").unwrap();
        differ.populate().unwrap();

        fs::remove_dir_all(root.join("docs")).unwrap();
        let outcome = differ.apply_settled(&[rel("docs")]);
        assert_eq!(
            summary(&outcome),
            [("docs/a.txt", ChangeKind::Deleted), ("docs/sub/b.txt", ChangeKind::Deleted)]
        );
        assert_eq!(differ.store().len(), 1);
    }

    #[test]
    fn test_file_replaced_by_directory_and_back() {
        let (_guard, root, differ) = setup();
        fs::write(root.join("a"), b"file").unwrap();
        differ.populate().unwrap();

        fs::remove_file(root.join("a")).unwrap();
        fs::create_dir(root.join("a")).unwrap();
        fs::write(root.join("a/x.txt"), b"inner").unwrap();
        let outcome = differ.apply_settled(&[rel("a"), rel("a/x.txt")]);
        assert_eq!(
            summary(&outcome),
            [("a", ChangeKind::Deleted), ("a/x.txt", ChangeKind::Created)]
        );
        assert_eq!(outcome.events[0].previous_digest(), Some(hash_bytes(b"file")));
        assert!(!differ.store().snapshot().contains("a"));

        fs::remove_dir_all(root.join("a")).unwrap();
        fs::write(root.join("a"), b"file again").unwrap();
        let outcome = differ.apply_settled(&[rel("a")]);
        assert_eq!(
            summary(&outcome),
            [("a", ChangeKind::Created), ("a/x.txt", ChangeKind::Deleted)]
        );
        assert_eq!(differ.store().len(), 1);
    }

    #[test]
    fn test_directory_moved_in_expands_to_files() {
        let (_guard, root, differ) = setup();
        let outside = TempDir::new().unwrap();
        fs::create_dir_all(outside.path().join("incoming")).unwrap();
        fs::write(outside.path().join("incoming/one.txt"), b"1").unwrap();
        fs::write(outside.path().join("incoming/two.txt"), b"2").unwrap();
        differ.populate().unwrap();

        // Copy rather than rename: the scratch dir may be on another filesystem
        fs::create_dir(root.join("incoming")).unwrap();
        for name in ["one.txt", "two.txt"] {
            fs::copy(outside.path().join("incoming").join(name), root.join("incoming").join(name))
                .unwrap();
        }

        let outcome = differ.apply_settled(&[rel("incoming")]);
        assert_eq!(
            summary(&outcome),
            [("incoming/one.txt", ChangeKind::Created), ("incoming/two.txt", ChangeKind::Created)]
        );
    }

    #[test]
    fn test_populate_is_silent() {
        let (_guard, root, differ) = setup();
        fs::write(root.join("a.txt"), b"hello").unwrap();
        fs::write(root.join("b.txt"), b"world").unwrap();

        let outcome = differ.populate().unwrap();
        assert!(outcome.is_empty());
        assert_eq!(differ.store().len(), 2);
    }

    #[test]
    fn test_reconcile_reports_only_discrepancies() {
        let (_guard, root, differ) = setup();
        for (name, content) in [("a.txt", "a"), ("b.txt", "b"), ("c.txt", "c"), ("d.txt", "d")] {
            fs::write(root.join(name), content).unwrap();
        }
        differ.populate().unwrap();

        fs::write(root.join("a.txt"), b"a2").unwrap();
        fs::remove_file(root.join("b.txt")).unwrap();
        fs::write(root.join("e.txt"), b"e").unwrap();

        let outcome = differ.reconcile().unwrap();
        assert_eq!(
            summary(&outcome),
            [
                ("a.txt", ChangeKind::Modified),
                ("b.txt", ChangeKind::Deleted),
                ("e.txt", ChangeKind::Created),
            ]
        );

        // Second pass over the same tree is quiet
        assert!(differ.reconcile().unwrap().is_empty());
    }

    #[test]
    fn test_reconcile_after_restart_is_quiet() {
        let (_guard, root, differ) = setup();
        fs::write(root.join("a.txt"), b"hello").unwrap();
        differ.populate().unwrap();

        let restored = Differ::new(
            root.clone(),
            Arc::new(BaselineStore::new((*differ.store().snapshot()).clone())),
            Arc::new(IgnoreRules::builtin(&root)),
            Fingerprinter::default(),
        );
        assert!(restored.reconcile().unwrap().events.is_empty());
    }
}
