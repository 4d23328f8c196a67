use crate::checksum::split_crc32;
use crate::error::{IndexError, Result};
use crate::postings::PostingsIter;
use crate::querier::TrieQuerier;
use rusts_compression::ByteReader;
use rusts_core::TimeRange;

/// Parsed view over one persisted entry-set block
#[derive(Debug, Clone)]
pub struct EntrySetBlock<'a> {
    time_range: TimeRange,
    trie: TrieQuerier<'a>,
    /// End offset of every postings list inside `data`
    ends: Vec<usize>,
    data: &'a [u8],
}

impl<'a> EntrySetBlock<'a> {
    /// Parse and validate a block. Every length is checked against the
    /// block size before anything is returned.
    pub fn parse(block: &'a [u8], verify_checksum: bool) -> Result<Self> {
        let body = split_crc32(block, "entry set", verify_checksum)?;
        let mut reader = ByteReader::new(body);

        let start = reader.read_varint()?;
        let end = reader.read_varint()?;
        let tree = reader.read_len_prefixed()?;
        let trie = TrieQuerier::new(tree)?;

        let value_count = reader.read_len()?;
        if value_count != trie.key_count() {
            return Err(IndexError::Corrupted(format!(
                "entry set holds {} postings lists for {} tag values",
                value_count,
                trie.key_count()
            )));
        }

        let mut ends = Vec::with_capacity(value_count);
        let mut total = 0usize;
        for _ in 0..value_count {
            let len = reader.read_len()?;
            total = total
                .checked_add(len)
                .ok_or_else(|| IndexError::Corrupted("postings length overflow".to_string()))?;
            ends.push(total);
        }

        let data = reader.read_bytes(reader.remaining())?;
        if data.len() != total {
            return Err(IndexError::Corrupted(format!(
                "postings section is {} bytes, lengths add up to {}",
                data.len(),
                total
            )));
        }

        Ok(Self {
            time_range: TimeRange::new(start, end),
            trie,
            ends,
            data,
        })
    }

    /// Time range covering every version in the block
    pub fn time_range(&self) -> TimeRange {
        self.time_range
    }

    pub fn trie(&self) -> &TrieQuerier<'a> {
        &self.trie
    }

    /// Number of tag values
    pub fn len(&self) -> usize {
        self.ends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ends.is_empty()
    }

    /// Postings of the tag value at `offset`
    pub fn postings(&self, offset: usize) -> Result<PostingsIter<'a>> {
        let end = *self.ends.get(offset).ok_or_else(|| {
            IndexError::Corrupted(format!("postings offset {} out of range", offset))
        })?;
        let start = if offset == 0 { 0 } else { self.ends[offset - 1] };
        PostingsIter::new(&self.data[start..end])
    }

    /// Tag value at `offset`
    pub fn tag_value(&self, offset: usize) -> Result<String> {
        let key = self.trie.key_at(offset).ok_or_else(|| {
            IndexError::Corrupted(format!("no tag value at offset {}", offset))
        })?;
        String::from_utf8(key)
            .map_err(|e| IndexError::Corrupted(format!("tag value is not UTF-8: {}", e)))
    }
}
