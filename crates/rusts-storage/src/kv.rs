//! Key/value seams between the index and the table store
//!
//! The index writes whole blocks keyed by a numeric id (tag key id, metric
//! id) and reads them back through snapshots of immutable tables. Any store
//! that can honour these three traits can sit underneath the index.

use crate::error::Result;
use std::sync::Arc;

/// Append-only writer producing one immutable table.
///
/// Nothing added becomes visible to readers before `commit` returns.
pub trait KvFlusher {
    /// Add one value. Keys must be strictly ascending within a table.
    fn add(&mut self, key: u32, value: &[u8]) -> Result<()>;

    /// Seal the table and publish it
    fn commit(&mut self) -> Result<()>;
}

/// Read access to one immutable table
pub trait KvTableReader: Send + Sync {
    /// Value stored under `key`, if any
    fn get(&self, key: u32) -> Option<&[u8]>;

    /// All keys in ascending order
    fn keys(&self) -> Vec<u32>;

    /// Human readable name (file name for on-disk tables)
    fn name(&self) -> &str;
}

/// Consistent view over a set of tables, ordered newest to oldest
pub trait KvSnapshot: Send + Sync {
    /// Table readers, newest first
    fn readers(&self) -> &[Arc<dyn KvTableReader>];

    /// Value from the newest table holding `key`
    fn get(&self, key: u32) -> Option<&[u8]> {
        self.readers().iter().find_map(|reader| reader.get(key))
    }
}

/// Snapshot over a fixed list of readers
#[derive(Clone, Default)]
pub struct Snapshot {
    readers: Arc<Vec<Arc<dyn KvTableReader>>>,
}

impl Snapshot {
    /// Create a snapshot; `readers` must already be ordered newest first
    pub fn new(readers: Vec<Arc<dyn KvTableReader>>) -> Self {
        Self {
            readers: Arc::new(readers),
        }
    }

    /// Number of tables visible in this snapshot
    pub fn len(&self) -> usize {
        self.readers.len()
    }

    /// Check if the snapshot has no tables
    pub fn is_empty(&self) -> bool {
        self.readers.is_empty()
    }
}

impl KvSnapshot for Snapshot {
    fn readers(&self) -> &[Arc<dyn KvTableReader>] {
        &self.readers
    }
}

impl std::fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.readers.iter().map(|r| r.name().to_string()))
            .finish()
    }
}
