//! Series index flusher
//!
//! Takes per-version entry sets of a tag key and regroups them by tag value
//! before handing them to the inverted flusher.

use crate::config::IndexConfig;
use crate::error::Result;
use crate::inverted::InvertedIndexFlusher;
use crate::postings::{VersionedBitmap, VersionedBitmaps, VersionedTagKvEntrySet};
use rusts_core::TagKeyId;
use rusts_storage::KvFlusher;
use std::collections::BTreeMap;
use tracing::debug;

/// Writes the inverted index from versioned entry sets
pub struct SeriesIndexFlusher<F: KvFlusher> {
    inverted: InvertedIndexFlusher<F>,
}

impl<F: KvFlusher> SeriesIndexFlusher<F> {
    pub fn new(kv: F, config: IndexConfig) -> Self {
        Self {
            inverted: InvertedIndexFlusher::new(kv, config),
        }
    }

    /// Flush every version of one tag key.
    ///
    /// When two entry sets share a version, the later one wins per tag value.
    pub fn flush_tag_key(&mut self, tag_id: TagKeyId, entry_sets: &[VersionedTagKvEntrySet]) -> Result<()> {
        let mut by_value: BTreeMap<&str, VersionedBitmaps> = BTreeMap::new();
        for entry_set in entry_sets {
            for (tag_value, bitmap) in &entry_set.entry_set {
                by_value
                    .entry(tag_value.as_str())
                    .or_default()
                    .insert(VersionedBitmap {
                        version: entry_set.version,
                        time_range: entry_set.time_range,
                        bitmap: bitmap.clone(),
                    });
            }
        }

        debug!(tag_id, versions = entry_sets.len(), values = by_value.len(), "Flushing tag key");
        if let Err(e) = self.flush_values(&by_value) {
            // Values already added to the trie must not leak into the next key
            self.inverted.reset();
            return Err(e);
        }
        self.inverted.flush_tag_key(tag_id)
    }

    fn flush_values(&mut self, by_value: &BTreeMap<&str, VersionedBitmaps>) -> Result<()> {
        for (tag_value, versions) in by_value {
            for entry in versions.iter() {
                self.inverted
                    .flush_version(entry.version, entry.time_range, &entry.bitmap)?;
            }
            self.inverted.flush_tag_value(tag_value);
        }
        Ok(())
    }

    pub fn commit(&mut self) -> Result<()> {
        self.inverted.commit()
    }

    pub fn into_inner(self) -> F {
        self.inverted.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inverted::InvertedIndexReader;
    use roaring::RoaringBitmap;
    use rusts_core::TimeRange;
    use rusts_storage::MemoryStore;

    fn entry_set(version: i64, values: &[(&str, &[u32])]) -> VersionedTagKvEntrySet {
        let mut set = VersionedTagKvEntrySet::new(version, TimeRange::new(version * 10, version * 10 + 10));
        for (value, ids) in values {
            set.entry_set
                .insert(value.to_string(), ids.iter().copied().collect::<RoaringBitmap>());
        }
        set
    }

    #[test]
    fn test_round_trip_independent_of_order() {
        let sets = vec![
            entry_set(2, &[("b", &[3]), ("a", &[1, 2])]),
            entry_set(1, &[("a", &[1]), ("c", &[9])]),
        ];

        let mut blocks = Vec::new();
        for order in [[0, 1], [1, 0]] {
            let store = MemoryStore::new();
            let mut flusher = SeriesIndexFlusher::new(store.new_flusher(), IndexConfig::default());
            let input: Vec<_> = order.iter().map(|&i| sets[i].clone()).collect();
            flusher.flush_tag_key(4, &input).unwrap();
            flusher.commit().unwrap();

            let reader = InvertedIndexReader::new(store.snapshot(), IndexConfig::default());
            for set in &sets {
                let read = reader.get_entry_set(4, set.version).unwrap().unwrap();
                assert_eq!(read, set.entry_set);
            }
            blocks.push(rusts_storage::KvSnapshot::get(&store.snapshot(), 4).unwrap().to_vec());
        }
        assert_eq!(blocks[0], blocks[1]);
    }

    #[test]
    fn test_duplicate_version_overwrites() {
        let sets = vec![
            entry_set(1, &[("a", &[1])]),
            entry_set(1, &[("a", &[5, 6])]),
        ];
        let store = MemoryStore::new();
        let mut flusher = SeriesIndexFlusher::new(store.new_flusher(), IndexConfig::default());
        flusher.flush_tag_key(1, &sets).unwrap();
        flusher.commit().unwrap();

        let reader = InvertedIndexReader::new(store.snapshot(), IndexConfig::default());
        let read = reader.get_entry_set(1, 1).unwrap().unwrap();
        assert_eq!(read["a"], [5, 6].into_iter().collect::<RoaringBitmap>());
        assert_eq!(reader.versions(1).unwrap(), vec![1]);
    }

    #[test]
    fn test_failed_tag_key_does_not_leak() {
        let mut broken = entry_set(2, &[("b", &[2])]);
        broken.time_range = TimeRange::new(50, 10);
        let sets = vec![entry_set(1, &[("a", &[1])]), broken];

        let store = MemoryStore::new();
        let mut flusher = SeriesIndexFlusher::new(store.new_flusher(), IndexConfig::default());
        assert!(matches!(
            flusher.flush_tag_key(1, &sets),
            Err(crate::error::IndexError::Core(_))
        ));
        assert_eq!(flusher.inverted.trie().key_num(), 0);

        flusher.flush_tag_key(2, &[entry_set(3, &[("c", &[3])])]).unwrap();
        flusher.commit().unwrap();

        let reader = InvertedIndexReader::new(store.snapshot(), IndexConfig::default());
        let read = reader.get_entry_set(2, 3).unwrap().unwrap();
        assert_eq!(read.keys().collect::<Vec<_>>(), vec!["c"]);
        assert_eq!(reader.versions(2).unwrap(), vec![3]);
        assert!(reader.get_entry_set(2, 1).unwrap().is_none());
        assert!(reader.get_entry_set(1, 1).unwrap().is_none());
    }
}
