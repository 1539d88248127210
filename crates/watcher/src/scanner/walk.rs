//! Tree walking shared by polling, reconciliation and directory expansion

use crate::ignore::IgnoreRules;
use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;
use tracing::{debug, warn};
use veriwatch_core::{FileRecord, Fingerprinter, ReadError, RelPath};
use walkdir::{DirEntry, WalkDir};

/// The walk could not even start
#[derive(Debug, Error)]
#[error("cannot walk {}: {source}", .path.display())]
pub struct WalkError {
    pub path: PathBuf,
    #[source]
    pub source: walkdir::Error,
}

impl WalkError {
    /// The starting directory no longer exists
    pub fn is_missing(&self) -> bool {
        self.source.io_error().map(io::Error::kind) == Some(io::ErrorKind::NotFound)
    }
}

/// Cheap per-file state used to spot candidates for re-fingerprinting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMeta {
    pub size: u64,
    pub modified: Option<SystemTime>,
}

/// Metadata snapshot of a tree
#[derive(Debug, Default)]
pub struct TreeWalk {
    pub files: BTreeMap<RelPath, FileMeta>,
    /// Files and directories that could not be listed or stat'ed
    pub unreadable: BTreeSet<RelPath>,
}

impl TreeWalk {
    /// True when `path` or one of its parent directories was unreadable
    pub fn is_unreadable(&self, path: &RelPath) -> bool {
        covered_by(&self.unreadable, path)
    }
}

/// Fingerprinted snapshot of a tree
#[derive(Debug, Default)]
pub struct TreeScan {
    pub records: BTreeMap<RelPath, FileRecord>,
    pub unreadable: BTreeSet<RelPath>,
}

impl TreeScan {
    pub fn is_unreadable(&self, path: &RelPath) -> bool {
        covered_by(&self.unreadable, path)
    }
}

/// `path` itself or any ancestor directory is in `set`
pub fn covered_by(set: &BTreeSet<RelPath>, path: &RelPath) -> bool {
    if set.is_empty() {
        return false;
    }
    let path = path.as_str();
    set.contains(path)
        || path
            .match_indices('/')
            .any(|(idx, _)| set.contains(&path[..idx]))
}

/// Walk the whole tree under `root`
pub fn walk_metadata(root: &Path, ignore: &IgnoreRules) -> Result<TreeWalk, WalkError> {
    walk_from(root, root, ignore)
}

/// Walk the directory `dir` below `root`
pub fn walk_subtree(root: &Path, dir: &RelPath, ignore: &IgnoreRules) -> Result<TreeWalk, WalkError> {
    walk_from(root, &dir.to_path(root), ignore)
}

fn walk_from(root: &Path, start: &Path, ignore: &IgnoreRules) -> Result<TreeWalk, WalkError> {
    let mut walk = TreeWalk::default();

    for entry in WalkDir::new(start)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !is_ignored(root, ignore, e))
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                if err.depth() == 0 {
                    return Err(WalkError {
                        path: start.to_path_buf(),
                        source: err,
                    });
                }
                if err.io_error().map(io::Error::kind) == Some(io::ErrorKind::NotFound) {
                    // Removed while we were walking
                    continue;
                }
                match err.path().map(|p| RelPath::from_absolute(root, p)) {
                    Some(Ok(rel)) => {
                        warn!("Unreadable: {} ({})", rel, err);
                        walk.unreadable.insert(rel);
                    }
                    _ => warn!("Walk error under {}: {}", start.display(), err),
                }
                continue;
            }
        };

        // Symlinks and special files are not monitored
        if !entry.file_type().is_file() {
            continue;
        }

        let rel = match RelPath::from_absolute(root, entry.path()) {
            Ok(rel) => rel,
            Err(e) => {
                warn!("Skipping {}: {}", entry.path().display(), e);
                continue;
            }
        };

        match entry.metadata() {
            Ok(meta) => {
                walk.files.insert(
                    rel,
                    FileMeta {
                        size: meta.len(),
                        modified: meta.modified().ok(),
                    },
                );
            }
            Err(err) if err.io_error().map(io::Error::kind) == Some(io::ErrorKind::NotFound) => {}
            Err(err) => {
                warn!("Unreadable: {} ({})", rel, err);
                walk.unreadable.insert(rel);
            }
        }
    }

    Ok(walk)
}

fn is_ignored(root: &Path, ignore: &IgnoreRules, entry: &DirEntry) -> bool {
    if entry.depth() == 0 {
        return false;
    }
    match RelPath::from_absolute(root, entry.path()) {
        Ok(rel) => ignore.should_ignore_entry(&rel, entry.file_type().is_dir()),
        Err(_) => false,
    }
}

/// Walk and fingerprint every file under `root`
///
/// Files that vanish between listing and hashing are simply absent from the
/// result; files that cannot be read are reported as unreadable.
pub fn fingerprint_tree(
    root: &Path,
    ignore: &IgnoreRules,
    fingerprinter: &Fingerprinter,
) -> Result<TreeScan, WalkError> {
    let walk = walk_metadata(root, ignore)?;
    let mut scan = TreeScan {
        records: BTreeMap::new(),
        unreadable: walk.unreadable,
    };

    for rel in walk.files.into_keys() {
        match fingerprinter.fingerprint(root, &rel) {
            Ok(record) => {
                scan.records.insert(rel, record);
            }
            Err(err) if err.is_missing() || matches!(err, ReadError::NotAFile { .. }) => {
                debug!("{} vanished during scan", rel);
            }
            Err(err) => {
                warn!("Unreadable: {}", err);
                scan.unreadable.insert(rel);
            }
        }
    }

    debug!(
        "Scanned {} files under {} ({} unreadable)",
        scan.records.len(),
        root.display(),
        scan.unreadable.len()
    );
    Ok(scan)
}
