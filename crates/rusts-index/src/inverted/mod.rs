//! Inverted index: tag value -> versioned series postings, one block per
//! tag key
//!
//! Block layout (all integers varints unless noted):
//!
//! ```text
//! [min_start varint][max_end varint][tree_len uvarint][tree]
//! [value_count uvarint][data_len uvarint] * value_count
//! [postings] * value_count
//! [crc32 u32 BE over everything before it]
//! ```
//!
//! `tree` is the LOUDS trie of the tag values; the i-th postings list
//! belongs to the value of rank i.

mod block;
mod flusher;
mod reader;

pub use block::EntrySetBlock;
pub use flusher::InvertedIndexFlusher;
pub use reader::InvertedIndexReader;
