//! Versioned postings: the per-tag-value payload of the inverted index
//!
//! ```text
//! [version_count uvarint]
//! ( [version varint][start - version varint][end - version varint]
//!   [bitmap_len uvarint][roaring bitmap] ) * version_count
//! ```

use crate::error::{IndexError, Result};
use roaring::RoaringBitmap;
use rusts_compression::{put_uvarint, put_varint, uvarint_len, ByteReader};
use rusts_core::{TimeRange, Version};
use std::collections::BTreeMap;

/// Series set of one tag value at one version
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedBitmap {
    pub version: Version,
    pub time_range: TimeRange,
    pub bitmap: RoaringBitmap,
}

/// Versioned bitmaps of one tag value, kept sorted by version.
///
/// Inserting a version that is already present overwrites it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VersionedBitmaps {
    versions: Vec<VersionedBitmap>,
}

impl VersionedBitmaps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a version
    pub fn insert(&mut self, entry: VersionedBitmap) {
        match self
            .versions
            .binary_search_by_key(&entry.version, |v| v.version)
        {
            Ok(pos) => self.versions[pos] = entry,
            Err(pos) => self.versions.insert(pos, entry),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &VersionedBitmap> {
        self.versions.iter()
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}

/// Tag value -> series set of one tag key at one version
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedTagKvEntrySet {
    pub version: Version,
    pub time_range: TimeRange,
    pub entry_set: BTreeMap<String, RoaringBitmap>,
}

impl VersionedTagKvEntrySet {
    pub fn new(version: Version, time_range: TimeRange) -> Self {
        Self {
            version,
            time_range,
            entry_set: BTreeMap::new(),
        }
    }

    /// Add a series under `tag_value`
    pub fn insert(&mut self, tag_value: impl Into<String>, series_id: u32) {
        self.entry_set
            .entry(tag_value.into())
            .or_default()
            .insert(series_id);
    }
}

/// Postings being accumulated for the current tag value
#[derive(Debug, Clone, Default)]
pub struct PostingsBuffer {
    version_count: u32,
    buf: Vec<u8>,
}

impl PostingsBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one versioned record. Nothing is appended on error.
    pub fn push(&mut self, version: Version, time_range: TimeRange, bitmap: &RoaringBitmap) -> Result<()> {
        let mark = self.buf.len();
        let result = self.encode(version, time_range, bitmap);
        if result.is_err() {
            self.buf.truncate(mark);
        } else {
            self.version_count += 1;
        }
        result
    }

    fn encode(&mut self, version: Version, time_range: TimeRange, bitmap: &RoaringBitmap) -> Result<()> {
        put_varint(&mut self.buf, version);
        put_varint(&mut self.buf, time_range.start.wrapping_sub(version));
        put_varint(&mut self.buf, time_range.end.wrapping_sub(version));
        let size = bitmap.serialized_size();
        put_uvarint(&mut self.buf, size as u64);
        self.buf.reserve(size);
        bitmap
            .serialize_into(&mut self.buf)
            .map_err(|e| IndexError::Encode(format!("failed to serialize bitmap: {}", e)))
    }

    pub fn version_count(&self) -> u32 {
        self.version_count
    }

    pub fn is_empty(&self) -> bool {
        self.version_count == 0
    }

    /// Size of the record written by `write_to`
    pub fn encoded_len(&self) -> usize {
        uvarint_len(self.version_count as u64) + self.buf.len()
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        put_uvarint(out, self.version_count as u64);
        out.extend_from_slice(&self.buf);
    }

    pub fn clear(&mut self) {
        self.version_count = 0;
        self.buf.clear();
    }
}

/// One decoded record; the bitmap stays serialized until asked for
#[derive(Debug, Clone, Copy)]
pub struct PostingsEntry<'a> {
    pub version: Version,
    pub time_range: TimeRange,
    bitmap: &'a [u8],
}

impl PostingsEntry<'_> {
    pub fn bitmap(&self) -> Result<RoaringBitmap> {
        RoaringBitmap::deserialize_from(self.bitmap)
            .map_err(|e| IndexError::Corrupted(format!("invalid bitmap in postings: {}", e)))
    }
}

/// Iterates the records of one encoded postings list
pub struct PostingsIter<'a> {
    reader: ByteReader<'a>,
    remaining: u64,
}

impl<'a> PostingsIter<'a> {
    pub fn new(data: &'a [u8]) -> Result<Self> {
        let mut reader = ByteReader::new(data);
        let remaining = reader.read_uvarint()?;
        Ok(Self { reader, remaining })
    }

    fn read_entry(&mut self) -> Result<PostingsEntry<'a>> {
        let version = self.reader.read_varint()?;
        let start = version.wrapping_add(self.reader.read_varint()?);
        let end = version.wrapping_add(self.reader.read_varint()?);
        let bitmap = self.reader.read_len_prefixed()?;
        Ok(PostingsEntry {
            version,
            time_range: TimeRange::new(start, end),
            bitmap,
        })
    }
}

impl<'a> Iterator for PostingsIter<'a> {
    type Item = Result<PostingsEntry<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let entry = self.read_entry();
        if entry.is_err() {
            self.remaining = 0;
        }
        Some(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bitmap(ids: &[u32]) -> RoaringBitmap {
        ids.iter().copied().collect()
    }

    #[test]
    fn test_versioned_bitmaps_overwrite() {
        let mut versions = VersionedBitmaps::new();
        versions.insert(VersionedBitmap {
            version: 20,
            time_range: TimeRange::new(0, 10),
            bitmap: bitmap(&[1]),
        });
        versions.insert(VersionedBitmap {
            version: 10,
            time_range: TimeRange::new(0, 10),
            bitmap: bitmap(&[2]),
        });
        versions.insert(VersionedBitmap {
            version: 20,
            time_range: TimeRange::new(5, 15),
            bitmap: bitmap(&[3]),
        });

        assert_eq!(versions.len(), 2);
        let order: Vec<Version> = versions.iter().map(|v| v.version).collect();
        assert_eq!(order, vec![10, 20]);
        let last = versions.iter().last().unwrap();
        assert_eq!(last.bitmap, bitmap(&[3]));
        assert_eq!(last.time_range, TimeRange::new(5, 15));
    }

    #[test]
    fn test_postings_decode() {
        let mut postings = PostingsBuffer::new();
        postings
            .push(100, TimeRange::new(1_000, 2_000), &bitmap(&[1, 2, 3]))
            .unwrap();
        postings
            .push(-5, TimeRange::new(i64::MIN, i64::MAX), &bitmap(&[]))
            .unwrap();
        assert_eq!(postings.version_count(), 2);

        let mut out = Vec::new();
        postings.write_to(&mut out);
        assert_eq!(out.len(), postings.encoded_len());

        let entries: Vec<_> = PostingsIter::new(&out)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].version, 100);
        assert_eq!(entries[0].time_range, TimeRange::new(1_000, 2_000));
        assert_eq!(entries[0].bitmap().unwrap(), bitmap(&[1, 2, 3]));
        assert_eq!(entries[1].version, -5);
        assert_eq!(entries[1].time_range, TimeRange::new(i64::MIN, i64::MAX));
        assert!(entries[1].bitmap().unwrap().is_empty());

        postings.clear();
        assert!(postings.is_empty());
        assert_eq!(postings.encoded_len(), 1);
    }

    #[test]
    fn test_truncated_postings() {
        let mut postings = PostingsBuffer::new();
        postings
            .push(1, TimeRange::new(0, 10), &bitmap(&[7, 8, 9]))
            .unwrap();
        let mut out = Vec::new();
        postings.write_to(&mut out);
        out.truncate(out.len() - 2);

        let mut iter = PostingsIter::new(&out).unwrap();
        assert!(iter.next().unwrap().is_err());
        assert!(iter.next().is_none());
    }
}
