//! On-disk baseline format
//!
//! ```text
//! {
//!   "version": 1,
//!   "algorithm": "sha256",
//!   "root": "/srv/watched",
//!   "saved_at": "2024-01-03T14:30:00Z",
//!   "entries": {
//!     "a.txt": { "size": 5, "modified": {...}, "digest": "2cf2..." }
//!   }
//! }
//! ```

use crate::Baseline;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use veriwatch_core::hash::ALGORITHM;
use veriwatch_core::{RecordState, RelPath};

/// Current persisted format version
pub const FORMAT_VERSION: u32 = 1;

/// Failure loading or saving a persisted baseline
#[derive(Debug, Error)]
pub enum BaselineError {
    #[error("baseline I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("corrupt baseline at {}: {reason}", .path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("baseline at {} was written with {found}, this build uses {expected}", .path.display())]
    AlgorithmMismatch {
        path: PathBuf,
        found: String,
        expected: &'static str,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedBaseline {
    version: u32,
    algorithm: String,
    root: PathBuf,
    saved_at: DateTime<Utc>,
    entries: BTreeMap<RelPath, RecordState>,
}

/// Header of a persisted baseline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaselineInfo {
    pub root: PathBuf,
    pub algorithm: String,
    pub saved_at: DateTime<Utc>,
}

/// Load a persisted baseline
///
/// Returns `Ok(None)` when no file exists yet.
pub fn load(path: &Path) -> Result<Option<Baseline>, BaselineError> {
    Ok(load_with_info(path)?.map(|(baseline, _)| baseline))
}

/// Load a persisted baseline together with its header
pub fn load_with_info(path: &Path) -> Result<Option<(Baseline, BaselineInfo)>, BaselineError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(BaselineError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let persisted: PersistedBaseline =
        serde_json::from_slice(&bytes).map_err(|e| BaselineError::Corrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    if persisted.version != FORMAT_VERSION {
        return Err(BaselineError::Corrupt {
            path: path.to_path_buf(),
            reason: format!("unsupported version {}", persisted.version),
        });
    }
    if persisted.algorithm != ALGORITHM {
        return Err(BaselineError::AlgorithmMismatch {
            path: path.to_path_buf(),
            found: persisted.algorithm,
            expected: ALGORITHM,
        });
    }

    let info = BaselineInfo {
        root: persisted.root,
        algorithm: persisted.algorithm,
        saved_at: persisted.saved_at,
    };
    let baseline = Baseline::from_records(
        persisted
            .entries
            .into_iter()
            .map(|(rel, state)| state.into_record(rel)),
    );
    debug!("Loaded baseline with {} entries from {}", baseline.len(), path.display());
    Ok(Some((baseline, info)))
}

/// Save a baseline atomically
pub fn save(path: &Path, root: &Path, baseline: &Baseline) -> Result<(), BaselineError> {
    let persisted = PersistedBaseline {
        version: FORMAT_VERSION,
        algorithm: ALGORITHM.to_string(),
        root: root.to_path_buf(),
        saved_at: Utc::now(),
        entries: baseline.iter().map(|r| (r.path.clone(), r.state())).collect(),
    };

    let data = serde_json::to_vec_pretty(&persisted).map_err(|e| BaselineError::Corrupt {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    atomic_write(path, &data).map_err(|source| BaselineError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    debug!("Saved baseline with {} entries to {}", baseline.len(), path.display());
    Ok(())
}

/// Atomic write helper
///
/// Writes data to a temporary file next to the target, fsyncs it, then
/// renames it over the target path. Readers see either the old or the new
/// file, never a torn one.
pub fn atomic_write(target: &Path, data: &[u8]) -> io::Result<()> {
    let dir = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;

    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "baseline".to_string());

    let mut tmp = tempfile::Builder::new()
        .prefix(&format!(".{}.", file_name))
        .suffix(".tmp")
        .tempfile_in(&dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(target).map_err(|e| e.error)?;

    #[cfg(unix)]
    std::fs::File::open(&dir)?.sync_all()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};
    use veriwatch_core::{hash_bytes, FileRecord};

    fn sample() -> Baseline {
        Baseline::from_records([
            FileRecord::new(
                RelPath::new("a.txt").unwrap(),
                5,
                SystemTime::UNIX_EPOCH + Duration::new(1_700_000_000, 123_456_789),
                hash_bytes(b"hello"),
            ),
            FileRecord::new(
                RelPath::new("nested/b.txt").unwrap(),
                5,
                SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_100),
                hash_bytes(b"world"),
            ),
        ])
    }

    #[test]
    fn test_save_then_load_preserves_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("baseline.json");

        let baseline = sample();
        save(&path, Path::new("/srv/watched"), &baseline).unwrap();

        let loaded = load(&path).unwrap().unwrap();
        assert_eq!(loaded, baseline);
    }

    #[test]
    fn test_load_with_info_reports_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("baseline.json");
        save(&path, Path::new("/srv/watched"), &sample()).unwrap();

        let (baseline, info) = load_with_info(&path).unwrap().unwrap();
        assert_eq!(baseline.len(), 2);
        assert_eq!(info.root, PathBuf::from("/srv/watched"));
        assert_eq!(info.algorithm, ALGORITHM);
    }

    #[test]
    fn test_load_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(&dir.path().join("nope.json")).unwrap().is_none());
    }

    #[test]
    fn test_load_garbage_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("baseline.json");
        std::fs::write(&path, b"{ not json").unwrap();
        assert!(matches!(load(&path), Err(BaselineError::Corrupt { .. })));
    }

    #[test]
    fn test_load_rejects_short_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("baseline.json");
        let json = format!(
            r#"{{"version":1,"algorithm":"{}","root":"/r","saved_at":"2024-01-03T14:30:00Z",
               "entries":{{"a.txt":{{"size":1,"modified":{{"secs_since_epoch":0,"nanos_since_epoch":0}},"digest":"abcd"}}}}}}"#,
            ALGORITHM
        );
        std::fs::write(&path, json).unwrap();
        assert!(matches!(load(&path), Err(BaselineError::Corrupt { .. })));
    }

    #[test]
    fn test_load_rejects_unknown_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("baseline.json");
        let json = format!(
            r#"{{"version":99,"algorithm":"{}","root":"/r","saved_at":"2024-01-03T14:30:00Z","entries":{{}}}}"#,
            ALGORITHM
        );
        std::fs::write(&path, json).unwrap();
        assert!(matches!(load(&path), Err(BaselineError::Corrupt { .. })));
    }

    #[test]
    fn test_load_rejects_other_algorithm() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("baseline.json");
        let json = r#"{"version":1,"algorithm":"md5","root":"/r","saved_at":"2024-01-03T14:30:00Z","entries":{}}"#;
        std::fs::write(&path, json).unwrap();
        assert!(matches!(load(&path), Err(BaselineError::AlgorithmMismatch { .. })));
    }

    #[test]
    fn test_atomic_write_replaces_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("state/baseline.json");

        atomic_write(&target, b"first").unwrap();
        atomic_write(&target, b"second").unwrap();

        assert_eq!(std::fs::read(&target).unwrap(), b"second");
        let leftovers: Vec<_> = std::fs::read_dir(target.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
