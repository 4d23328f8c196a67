use crate::config::IndexConfig;
use crate::error::Result;
use crate::inverted::EntrySetBlock;
use roaring::RoaringBitmap;
use rusts_core::{TagKeyId, TimeRange, Version};
use rusts_storage::KvSnapshot;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Answers tag value queries over the entry-set blocks of a snapshot.
///
/// Every table in the snapshot may hold a block for the same tag key;
/// series queries union across all of them.
pub struct InvertedIndexReader<S: KvSnapshot> {
    snapshot: S,
    config: IndexConfig,
}

impl<S: KvSnapshot> InvertedIndexReader<S> {
    pub fn new(snapshot: S, config: IndexConfig) -> Self {
        Self { snapshot, config }
    }

    /// Parsed blocks for `tag_id`, newest table first
    fn blocks(&self, tag_id: TagKeyId) -> impl Iterator<Item = Result<EntrySetBlock<'_>>> + '_ {
        let verify = self.config.verify_checksums;
        self.snapshot
            .readers()
            .iter()
            .filter_map(move |reader| reader.get(tag_id))
            .map(move |block| EntrySetBlock::parse(block, verify))
    }

    /// Series carrying any of `tag_values` in a version overlapping
    /// `time_range`
    pub fn get_series_ids_by_tag_values(
        &self,
        tag_id: TagKeyId,
        tag_values: &[&str],
        time_range: TimeRange,
    ) -> Result<RoaringBitmap> {
        self.collect_series(tag_id, time_range, |block| {
            block.trie().find_offsets_by_in(tag_values)
        })
    }

    /// Series whose value starts with `prefix` in a version overlapping
    /// `time_range`
    pub fn get_series_ids_by_like(
        &self,
        tag_id: TagKeyId,
        prefix: &str,
        time_range: TimeRange,
    ) -> Result<RoaringBitmap> {
        self.collect_series(tag_id, time_range, |block| {
            block.trie().find_offsets_by_like(prefix.as_bytes())
        })
    }

    /// Series carrying any value of the tag key
    pub fn get_series_ids_for_tag_key(
        &self,
        tag_id: TagKeyId,
        time_range: TimeRange,
    ) -> Result<RoaringBitmap> {
        self.get_series_ids_by_like(tag_id, "", time_range)
    }

    fn collect_series<F>(&self, tag_id: TagKeyId, time_range: TimeRange, find: F) -> Result<RoaringBitmap>
    where
        F: Fn(&EntrySetBlock<'_>) -> Vec<usize>,
    {
        let mut series = RoaringBitmap::new();
        for block in self.blocks(tag_id) {
            let block = block?;
            if !block.time_range().overlaps(&time_range) {
                continue;
            }
            for offset in find(&block) {
                for entry in block.postings(offset)? {
                    let entry = entry?;
                    if entry.time_range.overlaps(&time_range) {
                        series |= entry.bitmap()?;
                    }
                }
            }
        }
        debug!(tag_id, series = series.len(), "Resolved tag value postings");
        Ok(series)
    }

    /// Tag value -> series set of one version, taken from the newest table
    /// holding that version
    pub fn get_entry_set(
        &self,
        tag_id: TagKeyId,
        version: Version,
    ) -> Result<Option<BTreeMap<String, RoaringBitmap>>> {
        for block in self.blocks(tag_id) {
            let block = block?;
            let mut entry_set = BTreeMap::new();
            let mut found = false;
            for offset in 0..block.len() {
                for entry in block.postings(offset)? {
                    let entry = entry?;
                    if entry.version == version {
                        found = true;
                        entry_set.insert(block.tag_value(offset)?, entry.bitmap()?);
                        break;
                    }
                }
            }
            if found {
                return Ok(Some(entry_set));
            }
        }
        Ok(None)
    }

    /// Versions present for the tag key, ascending
    pub fn versions(&self, tag_id: TagKeyId) -> Result<Vec<Version>> {
        let mut versions = BTreeSet::new();
        for block in self.blocks(tag_id) {
            let block = block?;
            for offset in 0..block.len() {
                for entry in block.postings(offset)? {
                    versions.insert(entry?.version);
                }
            }
        }
        Ok(versions.into_iter().collect())
    }

    /// Up to `limit` distinct values starting with `prefix`, in rank order
    /// of the newest block first
    pub fn suggest_tag_values(&self, tag_id: TagKeyId, prefix: &str, limit: usize) -> Result<Vec<String>> {
        let mut seen = BTreeSet::new();
        let mut values = Vec::new();
        for block in self.blocks(tag_id) {
            let block = block?;
            for offset in block.trie().find_offsets_by_like(prefix.as_bytes()) {
                if values.len() >= limit {
                    return Ok(values);
                }
                let value = block.tag_value(offset)?;
                if seen.insert(value.clone()) {
                    values.push(value);
                }
            }
        }
        values.truncate(limit);
        Ok(values)
    }

    pub fn snapshot(&self) -> &S {
        &self.snapshot
    }
}
