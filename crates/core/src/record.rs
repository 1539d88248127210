//! Fingerprinted file state

use crate::hash::Digest;
use crate::path::RelPath;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Verified state of one file: where it is, how big, when it was last
/// written, and what its content hashes to.
///
/// Records are never edited in place; any change produces a new record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub path: RelPath,
    pub size: u64,
    pub modified: SystemTime,
    pub digest: Digest,
}

impl FileRecord {
    pub fn new(path: RelPath, size: u64, modified: SystemTime, digest: Digest) -> Self {
        Self {
            path,
            size,
            modified,
            digest,
        }
    }

    /// Everything but the path, as stored in a persisted baseline
    pub fn state(&self) -> RecordState {
        RecordState {
            size: self.size,
            modified: self.modified,
            digest: self.digest,
        }
    }

    /// True when content is identical, regardless of metadata
    pub fn same_content(&self, other: &FileRecord) -> bool {
        self.digest == other.digest
    }
}

/// The path-less part of a [`FileRecord`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordState {
    pub size: u64,
    pub modified: SystemTime,
    pub digest: Digest,
}

impl RecordState {
    pub fn into_record(self, path: RelPath) -> FileRecord {
        FileRecord::new(path, self.size, self.modified, self.digest)
    }
}
