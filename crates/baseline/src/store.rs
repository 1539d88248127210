//! Shared owner of the baseline

use crate::Baseline;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use veriwatch_core::FileRecord;

/// Holds the baseline behind a lock with a single-writer contract
///
/// Mutation happens only through [`BaselineStore::update`], which holds the
/// write lock for the whole closure: one diff-and-update pass is applied
/// atomically. Readers get an `Arc` snapshot that no later update can touch.
pub struct BaselineStore {
    /// Copy-on-write: snapshots share the map until the next update
    inner: RwLock<Arc<Baseline>>,
    /// Bumped by every completed update pass
    generation: AtomicU64,
}

impl BaselineStore {
    pub fn new(baseline: Baseline) -> Self {
        Self {
            inner: RwLock::new(Arc::new(baseline)),
            generation: AtomicU64::new(0),
        }
    }

    /// Consistent view of the baseline as of the last completed update
    pub fn snapshot(&self) -> Arc<Baseline> {
        self.inner.read().clone()
    }

    /// Lookup a single record
    pub fn get(&self, path: &str) -> Option<FileRecord> {
        self.inner.read().get(path).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Run one diff-and-update pass with exclusive access
    ///
    /// The closure sees the current baseline mutably; nothing else can read
    /// or write it until the closure returns.
    pub fn update<R>(&self, f: impl FnOnce(&mut Baseline) -> R) -> R {
        let mut guard = self.inner.write();
        let result = f(Arc::make_mut(&mut guard));
        self.generation.fetch_add(1, Ordering::SeqCst);
        result
    }

    /// Swap in a whole new baseline
    pub fn replace(&self, baseline: Baseline) {
        *self.inner.write() = Arc::new(baseline);
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Number of update passes applied so far
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

impl Default for BaselineStore {
    fn default() -> Self {
        Self::new(Baseline::new())
    }
}
