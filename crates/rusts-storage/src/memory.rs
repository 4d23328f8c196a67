//! In-memory tables
//!
//! Same visibility rules as `KvStore`, without touching the filesystem.
//! Used by unit tests and by callers that build indexes for a single query.

use crate::error::{Result, StorageError};
use crate::kv::{KvFlusher, KvTableReader, Snapshot};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Immutable in-memory table
#[derive(Debug, Clone, Default)]
pub struct MemoryTable {
    name: String,
    entries: BTreeMap<u32, Vec<u8>>,
}

impl MemoryTable {
    /// Create a table from key/value pairs
    pub fn new(name: impl Into<String>, entries: BTreeMap<u32, Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            entries,
        }
    }

    /// Number of keys in the table
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the table is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KvTableReader for MemoryTable {
    fn get(&self, key: u32) -> Option<&[u8]> {
        self.entries.get(&key).map(|v| v.as_slice())
    }

    fn keys(&self) -> Vec<u32> {
        self.entries.keys().copied().collect()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Collection of in-memory tables, newest first
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Vec<Arc<MemoryTable>>>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Start writing a new table
    pub fn new_flusher(&self) -> MemoryFlusher {
        MemoryFlusher {
            tables: Arc::clone(&self.tables),
            entries: Some(BTreeMap::new()),
            last_key: None,
        }
    }

    /// Consistent view of every committed table, newest first
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::new(
            self.tables
                .read()
                .iter()
                .map(|t| Arc::clone(t) as Arc<dyn KvTableReader>)
                .collect(),
        )
    }

    /// Number of committed tables
    pub fn table_count(&self) -> usize {
        self.tables.read().len()
    }
}

/// `KvFlusher` producing one `MemoryTable`
pub struct MemoryFlusher {
    tables: Arc<RwLock<Vec<Arc<MemoryTable>>>>,
    entries: Option<BTreeMap<u32, Vec<u8>>>,
    last_key: Option<u32>,
}

impl MemoryFlusher {
    /// Keys added so far
    pub fn pending_keys(&self) -> Vec<u32> {
        self.entries
            .as_ref()
            .map(|e| e.keys().copied().collect())
            .unwrap_or_default()
    }
}

impl KvFlusher for MemoryFlusher {
    fn add(&mut self, key: u32, value: &[u8]) -> Result<()> {
        let entries = self.entries.as_mut().ok_or(StorageError::FlusherClosed)?;
        if let Some(previous) = self.last_key {
            if key <= previous {
                return Err(StorageError::KeyOutOfOrder { previous, key });
            }
        }
        entries.insert(key, value.to_vec());
        self.last_key = Some(key);
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        let entries = self.entries.take().ok_or(StorageError::FlusherClosed)?;
        if entries.is_empty() {
            return Ok(());
        }
        let mut tables = self.tables.write();
        let name = format!("memory_{:08}", tables.len() + 1);
        tables.insert(0, Arc::new(MemoryTable::new(name, entries)));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::KvSnapshot;

    #[test]
    fn test_memory_store_visibility() {
        let store = MemoryStore::new();
        let mut flusher = store.new_flusher();
        flusher.add(1, b"a").unwrap();
        flusher.add(4, b"b").unwrap();
        assert_eq!(flusher.pending_keys(), vec![1, 4]);
        assert!(store.snapshot().is_empty());

        flusher.commit().unwrap();
        let snapshot = store.snapshot();
        assert_eq!(snapshot.get(4), Some(&b"b"[..]));
        assert_eq!(snapshot.readers()[0].keys(), vec![1, 4]);
    }

    #[test]
    fn test_memory_store_newest_wins() {
        let store = MemoryStore::new();
        for value in [&b"old"[..], b"new"] {
            let mut flusher = store.new_flusher();
            flusher.add(9, value).unwrap();
            flusher.commit().unwrap();
        }
        assert_eq!(store.table_count(), 2);
        assert_eq!(store.snapshot().get(9), Some(&b"new"[..]));
    }

    #[test]
    fn test_memory_flusher_key_order() {
        let store = MemoryStore::new();
        let mut flusher = store.new_flusher();
        flusher.add(5, b"a").unwrap();
        assert!(matches!(
            flusher.add(2, b"b"),
            Err(StorageError::KeyOutOfOrder { previous: 5, key: 2 })
        ));
    }
}
