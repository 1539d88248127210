//! The trusted path -> record map

use std::collections::BTreeMap;
use std::ops::Bound;
use veriwatch_core::{FileRecord, RelPath};

/// Last verified state of the watched tree
///
/// Keys are kept sorted so that every walk over the baseline (and every
/// diff pass built on one) visits paths in lexicographic order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Baseline {
    entries: BTreeMap<RelPath, FileRecord>,
}

impl Baseline {
    /// Create an empty baseline
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from records, last one wins on duplicate paths
    pub fn from_records(records: impl IntoIterator<Item = FileRecord>) -> Self {
        let entries = records.into_iter().map(|r| (r.path.clone(), r)).collect();
        Self { entries }
    }

    pub fn get(&self, path: &str) -> Option<&FileRecord> {
        self.entries.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    /// Insert or replace, returning the previous record
    pub fn insert(&mut self, record: FileRecord) -> Option<FileRecord> {
        self.entries.insert(record.path.clone(), record)
    }

    pub fn remove(&mut self, path: &str) -> Option<FileRecord> {
        self.entries.remove(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Records in path order
    pub fn iter(&self) -> impl Iterator<Item = &FileRecord> {
        self.entries.values()
    }

    /// Paths in order
    pub fn paths(&self) -> impl Iterator<Item = &RelPath> {
        self.entries.keys()
    }

    /// Records stored below directory `dir`
    pub fn children_of<'a>(&'a self, dir: &RelPath) -> impl Iterator<Item = &'a FileRecord> + 'a {
        let prefix = format!("{}/", dir);
        self.entries
            .range::<str, _>((Bound::Included(prefix.as_str()), Bound::Unbounded))
            .take_while(move |(path, _)| path.as_str().starts_with(&prefix))
            .map(|(_, record)| record)
    }

    /// Sum of recorded file sizes
    pub fn total_size(&self) -> u64 {
        self.entries.values().map(|r| r.size).sum()
    }
}
