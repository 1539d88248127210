//! Integrity primitives for veriwatch
//!
//! This crate provides the foundational pieces the monitor is built on:
//! - Content digests (SHA-256, or BLAKE3 behind the `blake3` feature)
//! - Canonical root-relative paths
//! - File records and the fingerprinter that produces them
//! - Classified change events

pub mod event;
pub mod fingerprint;
pub mod hash;
pub mod path;
pub mod record;

// Re-export main types for convenience
pub use event::{ChangeEvent, ChangeKind};
pub use fingerprint::{Fingerprinter, ReadError, MAX_ATTEMPTS};
pub use hash::{hash_bytes, Digest, IncrementalHasher};
pub use path::{PathError, RelPath};
pub use record::{FileRecord, RecordState};
