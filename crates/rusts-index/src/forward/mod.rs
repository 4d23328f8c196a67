//! Forward index: series -> tag values, one block per metric
//!
//! ```text
//! metric block  := version_block* version_table footer
//! version_table := [count uvarint] ([version varint][block_len uvarint])*
//! footer        := [version_table_pos u32 LE][crc32 u32 BE]
//!
//! version_block := tag_keys series lut dict vfooter
//! tag_keys      := [count uvarint] ([len uvarint][key])*
//! series        := [len uvarint][roaring bitmap of every series]
//! lut           := ([seq_len uvarint][bitmap_len uvarint][bitmap][value_idx uvarint]*)*
//! dict          := [value_count uvarint][group_size uvarint][group_count uvarint]
//!                  [compressed_len uvarint]* group*
//! group         := snappy(([len uvarint][bytes])*)
//! vfooter       := [series_pos u32 LE][lut_pos u32 LE][dict_pos u32 LE][crc32 u32 BE]
//! ```
//!
//! A tag key's sequence number is its position in `tag_keys`; the `lut`
//! holds one entry per sequence. Value indexes point into `dict`, which is
//! sorted in trie rank order of the distinct values.

mod flusher;
mod reader;

use std::collections::BTreeMap;

use rusts_core::SeriesId;

pub use flusher::ForwardIndexFlusher;
pub use reader::ForwardIndexReader;

/// Tag key -> (series -> tag value) of one version
pub type SeriesTagValues = BTreeMap<String, BTreeMap<SeriesId, String>>;

/// Size of the metric block footer
pub(crate) const METRIC_FOOTER_SIZE: usize = 8;

/// Size of the version block footer
pub(crate) const VERSION_FOOTER_SIZE: usize = 16;
