//! Classified integrity events

use crate::hash::Digest;
use crate::path::RelPath;
use crate::record::FileRecord;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Kind of classified change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// Path was not in the baseline and now exists
    Created,
    /// Path exists in both, content digest differs
    Modified,
    /// Path was in the baseline and no longer exists
    Deleted,
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeKind::Created => write!(f, "created"),
            ChangeKind::Modified => write!(f, "modified"),
            ChangeKind::Deleted => write!(f, "deleted"),
        }
    }
}

/// One detected change, as handed to an event sink
///
/// `previous_digest` is present for Modified and Deleted, `new_digest` for
/// Created and Modified. The constructors are the only way to build one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeEvent {
    path: RelPath,
    kind: ChangeKind,
    previous_digest: Option<Digest>,
    new_digest: Option<Digest>,
    detected_at: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn created(current: &FileRecord) -> Self {
        Self::build(current.path.clone(), ChangeKind::Created, None, Some(current.digest))
    }

    pub fn modified(previous: &FileRecord, current: &FileRecord) -> Self {
        Self::build(
            current.path.clone(),
            ChangeKind::Modified,
            Some(previous.digest),
            Some(current.digest),
        )
    }

    pub fn deleted(previous: &FileRecord) -> Self {
        Self::build(previous.path.clone(), ChangeKind::Deleted, Some(previous.digest), None)
    }

    fn build(
        path: RelPath,
        kind: ChangeKind,
        previous_digest: Option<Digest>,
        new_digest: Option<Digest>,
    ) -> Self {
        Self {
            path,
            kind,
            previous_digest,
            new_digest,
            detected_at: Utc::now(),
        }
    }

    pub fn path(&self) -> &RelPath {
        &self.path
    }

    pub fn kind(&self) -> ChangeKind {
        self.kind
    }

    pub fn previous_digest(&self) -> Option<Digest> {
        self.previous_digest
    }

    pub fn new_digest(&self) -> Option<Digest> {
        self.new_digest
    }

    pub fn detected_at(&self) -> DateTime<Utc> {
        self.detected_at
    }

    /// One-line alert subject
    pub fn subject(&self) -> &'static str {
        match self.kind {
            ChangeKind::Created => "FIM Alert: New file detected",
            ChangeKind::Modified => "FIM Alert: File modified",
            ChangeKind::Deleted => "FIM Alert: File deleted",
        }
    }

    /// Multi-line alert body with path, time and digests
    pub fn body(&self) -> String {
        let time = self.detected_at.format("%Y-%m-%d %H:%M:%S UTC");
        match (self.previous_digest, self.new_digest) {
            (None, Some(new)) => {
                format!("New file detected:\n\nPath: {}\nTime: {}\nHash: {}\n", self.path, time, new)
            }
            (Some(old), Some(new)) => format!(
                "File modified:\n\nPath: {}\nTime: {}\n\nOld hash: {}\nNew hash: {}\n",
                self.path, time, old, new
            ),
            (Some(old), None) => format!(
                "File deleted:\n\nPath: {}\nTime: {}\n\nLast known hash: {}\n",
                self.path, time, old
            ),
            (None, None) => unreachable!("ChangeEvent always carries at least one digest"),
        }
    }
}

impl std::fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            ChangeKind::Created => write!(f, "New file detected: {}", self.path),
            ChangeKind::Modified => write!(f, "Modified file: {}", self.path),
            ChangeKind::Deleted => write!(f, "Deleted file: {}", self.path),
        }
    }
}
