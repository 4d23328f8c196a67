use crate::checksum::append_crc32;
use crate::config::IndexConfig;
use crate::error::Result;
use crate::postings::PostingsBuffer;
use crate::trie::TrieBuilder;
use roaring::RoaringBitmap;
use rusts_compression::{put_uvarint, put_varint};
use rusts_core::{TagKeyId, TimeRange, Version};
use rusts_storage::KvFlusher;
use tracing::{debug, warn};

/// Writes one entry-set block per tag key.
///
/// Call order per tag key: `flush_version` for every version of a value,
/// then `flush_tag_value`; repeat per value; then `flush_tag_key`. Tag keys
/// must be flushed in ascending id order. Nothing becomes visible before
/// `commit`.
pub struct InvertedIndexFlusher<F: KvFlusher> {
    kv: F,
    config: IndexConfig,
    trie: TrieBuilder<PostingsBuffer>,
    pending: PostingsBuffer,
    /// Covers every version flushed since the last reset; `None` until the
    /// first version arrives
    time_range: Option<TimeRange>,
    block: Vec<u8>,
}

impl<F: KvFlusher> InvertedIndexFlusher<F> {
    pub fn new(kv: F, config: IndexConfig) -> Self {
        Self {
            kv,
            config,
            trie: TrieBuilder::new(),
            pending: PostingsBuffer::new(),
            time_range: None,
            block: Vec::new(),
        }
    }

    /// Append one version of the current tag value. `time_range` must not
    /// end before it starts.
    pub fn flush_version(
        &mut self,
        version: Version,
        time_range: TimeRange,
        bitmap: &RoaringBitmap,
    ) -> Result<()> {
        let time_range = TimeRange::try_new(time_range.start, time_range.end)?;
        self.pending.push(version, time_range, bitmap)?;
        self.time_range = Some(match self.time_range {
            Some(range) => range.union(&time_range),
            None => time_range,
        });
        Ok(())
    }

    /// Store the versions flushed so far under `tag_value`
    pub fn flush_tag_value(&mut self, tag_value: &str) {
        let postings = std::mem::take(&mut self.pending);
        if tag_value.is_empty() {
            warn!(
                versions = postings.version_count(),
                "Dropping postings of empty tag value"
            );
            return;
        }
        self.trie.add(tag_value.as_bytes(), postings);
    }

    /// Serialize the current tag key's block and hand it to the KV flusher
    pub fn flush_tag_key(&mut self, tag_id: TagKeyId) -> Result<()> {
        let result = self.write_block(tag_id);
        if self.config.auto_reset {
            self.reset();
        }
        result
    }

    fn write_block(&mut self, tag_id: TagKeyId) -> Result<()> {
        self.block.clear();
        encode_entry_set(&self.trie, self.time_range, &mut self.block)?;
        debug!(
            tag_id,
            values = self.trie.key_num(),
            nodes = self.trie.node_num(),
            bytes = self.block.len(),
            "Flushing entry set"
        );
        self.kv.add(tag_id, &self.block)?;
        Ok(())
    }

    /// Reset builder state and commit the underlying KV flusher
    pub fn commit(&mut self) -> Result<()> {
        self.reset();
        self.kv.commit()?;
        Ok(())
    }

    /// Drop the trie, pending postings and time range
    pub fn reset(&mut self) {
        self.trie.reset();
        self.pending.clear();
        self.time_range = None;
    }

    /// Trie of the tag key being built
    pub fn trie(&self) -> &TrieBuilder<PostingsBuffer> {
        &self.trie
    }

    pub fn kv(&self) -> &F {
        &self.kv
    }

    pub fn into_inner(self) -> F {
        self.kv
    }
}

/// Encode the block for `trie` into `out`
fn encode_entry_set(
    trie: &TrieBuilder<PostingsBuffer>,
    time_range: Option<TimeRange>,
    out: &mut Vec<u8>,
) -> Result<()> {
    let louds = trie.marshal_binary()?;
    // A key without versions writes an empty range.
    let range = time_range.unwrap_or(TimeRange::new(0, 0));

    put_varint(out, range.start);
    put_varint(out, range.end);
    put_uvarint(out, louds.tree_len() as u64);
    louds.write_tree(out)?;

    put_uvarint(out, louds.values.len() as u64);
    for postings in &louds.values {
        put_uvarint(out, postings.encoded_len() as u64);
    }
    for postings in &louds.values {
        postings.write_to(out);
    }

    append_crc32(out);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IndexError;
    use crate::inverted::EntrySetBlock;
    use rusts_storage::{KvSnapshot, MemoryStore, StorageError};

    fn bitmap(ids: &[u32]) -> RoaringBitmap {
        ids.iter().copied().collect()
    }

    #[test]
    fn test_flush_tag_key() {
        let store = MemoryStore::new();
        let mut flusher = InvertedIndexFlusher::new(store.new_flusher(), IndexConfig::default());

        flusher
            .flush_version(100, TimeRange::new(10, 20), &bitmap(&[1, 2, 3]))
            .unwrap();
        flusher.flush_tag_value("us-east");
        flusher
            .flush_version(100, TimeRange::new(5, 15), &bitmap(&[4, 5]))
            .unwrap();
        flusher
            .flush_version(101, TimeRange::new(15, 30), &bitmap(&[4]))
            .unwrap();
        flusher.flush_tag_value("us-west");
        flusher.flush_tag_key(7).unwrap();

        // Auto reset
        assert_eq!(flusher.trie().key_num(), 0);
        assert_eq!(flusher.kv().pending_keys(), vec![7]);
        flusher.commit().unwrap();

        let snapshot = store.snapshot();
        let block = EntrySetBlock::parse(snapshot.get(7).unwrap(), true).unwrap();
        assert_eq!(block.time_range(), TimeRange::new(5, 30));
        assert_eq!(block.len(), 2);

        let offset = block.trie().find_offset(b"us-west").unwrap();
        assert_eq!(block.tag_value(offset).unwrap(), "us-west");
        let versions: Vec<_> = block
            .postings(offset)
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[1].version, 101);
        assert_eq!(versions[1].bitmap().unwrap(), bitmap(&[4]));
    }

    #[test]
    fn test_disabled_auto_reset_keeps_trie() {
        let store = MemoryStore::new();
        let config = IndexConfig::default().with_auto_reset(false);
        let mut flusher = InvertedIndexFlusher::new(store.new_flusher(), config);

        for value in ["football", "foo", "f", "fo"] {
            flusher
                .flush_version(1, TimeRange::new(0, 1), &bitmap(&[1]))
                .unwrap();
            flusher.flush_tag_value(value);
        }
        flusher.flush_tag_value("");
        flusher.flush_tag_key(1).unwrap();

        assert_eq!(flusher.trie().node_num(), 8);
        assert_eq!(flusher.trie().key_num(), 4);
        assert_eq!(flusher.trie().get(b"fo").unwrap().version_count(), 1);

        flusher.commit().unwrap();
        assert_eq!(flusher.trie().key_num(), 0);
    }

    #[test]
    fn test_empty_tag_key() {
        let store = MemoryStore::new();
        let mut flusher = InvertedIndexFlusher::new(store.new_flusher(), IndexConfig::default());
        flusher.flush_tag_key(3).unwrap();
        flusher.commit().unwrap();

        let snapshot = store.snapshot();
        let block = EntrySetBlock::parse(snapshot.get(3).unwrap(), true).unwrap();
        assert!(block.is_empty());
        assert_eq!(block.time_range(), TimeRange::new(0, 0));
    }

    #[test]
    fn test_kv_error_propagates() {
        let store = MemoryStore::new();
        let mut flusher = InvertedIndexFlusher::new(store.new_flusher(), IndexConfig::default());
        flusher.flush_tag_key(5).unwrap();

        flusher
            .flush_version(1, TimeRange::new(0, 1), &bitmap(&[1]))
            .unwrap();
        flusher.flush_tag_value("a");
        let err = flusher.flush_tag_key(5).unwrap_err();
        assert!(matches!(
            err,
            IndexError::Storage(StorageError::KeyOutOfOrder { .. })
        ));
        // State is reset even on failure
        assert!(flusher.trie().is_empty());
    }
}
