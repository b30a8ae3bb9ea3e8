//! Hash-keyed lookup of the entries a log holds.

use std::collections::HashMap;

use crate::entry::Entry;

/// The log's materialized entry cache, keyed by entry hash.
#[derive(Debug, Clone, Default)]
pub struct EntryIndex {
    entries: HashMap<String, Entry>,
}

impl EntryIndex {
    /// Build an index from entries, collapsing duplicates by hash.
    pub fn new(entries: impl IntoIterator<Item = Entry>) -> Self {
        Self {
            entries: entries.into_iter().map(|e| (e.hash.clone(), e)).collect(),
        }
    }

    #[must_use]
    pub fn get(&self, hash: &str) -> Option<&Entry> {
        self.entries.get(hash)
    }

    #[must_use]
    pub fn contains(&self, hash: &str) -> bool {
        self.entries.contains_key(hash)
    }

    pub fn set(&mut self, hash: impl Into<String>, entry: Entry) {
        self.entries.insert(hash.into(), entry);
    }

    /// Merge another hash-to-entry map into this one.
    pub fn add(&mut self, other: impl IntoIterator<Item = (String, Entry)>) {
        self.entries.extend(other);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn values(&self) -> impl Iterator<Item = &Entry> {
        self.entries.values()
    }
}
