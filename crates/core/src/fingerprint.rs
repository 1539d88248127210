//! Fingerprinting of single files
//!
//! A fingerprint is only produced from a read during which the file held
//! still: metadata is taken before and after hashing and the read is retried
//! when size or mtime moved in between.

use crate::hash::hash_file;
use crate::path::RelPath;
use crate::record::FileRecord;
use std::fs::{self, Metadata};
use std::io;
use std::path::Path;
use std::thread::sleep;
use std::time::Duration;
use thiserror::Error;

/// Upper bound on read attempts per fingerprint
pub const MAX_ATTEMPTS: u8 = 10;

/// Failure to fingerprint one file
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("file vanished: {path}")]
    NotFound { path: RelPath },

    #[error("permission denied: {path}")]
    PermissionDenied { path: RelPath },

    #[error("not a regular file: {path}")]
    NotAFile { path: RelPath },

    #[error("file {path} is unstable after {attempts} read attempts (file changing too rapidly)")]
    Unstable { path: RelPath, attempts: u8 },

    #[error("I/O error reading {path}: {source}")]
    Io {
        path: RelPath,
        #[source]
        source: io::Error,
    },
}

impl ReadError {
    pub fn from_io(path: &RelPath, err: io::Error) -> Self {
        let path = path.clone();
        match err.kind() {
            io::ErrorKind::NotFound => ReadError::NotFound { path },
            io::ErrorKind::PermissionDenied => ReadError::PermissionDenied { path },
            _ => ReadError::Io { path, source: err },
        }
    }

    /// The file is gone, as opposed to present but unreadable right now
    pub fn is_missing(&self) -> bool {
        matches!(self, ReadError::NotFound { .. })
    }

    pub fn path(&self) -> &RelPath {
        match self {
            ReadError::NotFound { path }
            | ReadError::PermissionDenied { path }
            | ReadError::NotAFile { path }
            | ReadError::Unstable { path, .. }
            | ReadError::Io { path, .. } => path,
        }
    }
}

/// Computes [`FileRecord`]s
#[derive(Debug, Clone)]
pub struct Fingerprinter {
    max_attempts: u8,
    backoff: Duration,
}

impl Fingerprinter {
    /// `max_attempts` is clamped to `1..=MAX_ATTEMPTS`
    pub fn new(max_attempts: u8) -> Self {
        Self {
            max_attempts: max_attempts.clamp(1, MAX_ATTEMPTS),
            backoff: Duration::from_millis(50),
        }
    }

    /// Override the base retry delay (doubles on each attempt)
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Fingerprint `rel` under `root`
    pub fn fingerprint(&self, root: &Path, rel: &RelPath) -> Result<FileRecord, ReadError> {
        let full = rel.to_path(root);

        for attempt in 0..self.max_attempts {
            let before = stat(&full, rel)?;
            if !before.file_type().is_file() {
                return Err(ReadError::NotAFile { path: rel.clone() });
            }

            let digest = hash_file(&full).map_err(|e| ReadError::from_io(rel, e))?;

            let after = stat(&full, rel)?;
            if same_state(&before, &after) {
                let modified = after.modified().map_err(|e| ReadError::from_io(rel, e))?;
                return Ok(FileRecord::new(rel.clone(), after.len(), modified, digest));
            }

            if attempt + 1 < self.max_attempts {
                sleep(self.backoff_for(attempt));
            }
        }

        Err(ReadError::Unstable {
            path: rel.clone(),
            attempts: self.max_attempts,
        })
    }
}

impl Fingerprinter {
    /// Delay before retrying after `attempt`: base, 2x, 4x, ...
    fn backoff_for(&self, attempt: u8) -> Duration {
        let factor = 1u32.checked_shl(u32::from(attempt)).unwrap_or(u32::MAX);
        self.backoff.saturating_mul(factor)
    }
}

impl Default for Fingerprinter {
    fn default() -> Self {
        Self::new(3)
    }
}

fn stat(full: &Path, rel: &RelPath) -> Result<Metadata, ReadError> {
    fs::symlink_metadata(full).map_err(|e| ReadError::from_io(rel, e))
}

fn same_state(a: &Metadata, b: &Metadata) -> bool {
    a.len() == b.len() && a.modified().ok() == b.modified().ok()
}
