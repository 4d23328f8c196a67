//! RusTs Index - Tag and series indexes built on succinct tries
//!
//! This crate provides the persistent indexes of the tag/series subsystem:
//! - **Trie**: ordered byte trie builder marshaled into LOUDS form, and a
//!   querier navigating the LOUDS bytes in place
//! - **Inverted index**: tag value -> versioned series bitmaps, one block
//!   per tag key
//! - **Forward index**: series -> tag values per metric and version, with
//!   Snappy-compressed string dictionaries
//! - **Metric metadata**: tag key ids and field ids per metric
//!
//! Flushers write through `rusts_storage::KvFlusher`; readers query a
//! `rusts_storage::KvSnapshot`.

pub mod checksum;
pub mod config;
pub mod error;
pub mod forward;
pub mod inverted;
pub mod metadata;
pub mod postings;
pub mod querier;
pub mod series;
pub mod trie;

pub use config::IndexConfig;
pub use error::{IndexError, Result};
pub use forward::{ForwardIndexFlusher, ForwardIndexReader, SeriesTagValues};
pub use inverted::{EntrySetBlock, InvertedIndexFlusher, InvertedIndexReader};
pub use metadata::{FieldMeta, MetricMeta, MetricsMetaFlusher, MetricsMetaReader};
pub use postings::{VersionedBitmap, VersionedBitmaps, VersionedTagKvEntrySet};
pub use querier::TrieQuerier;
pub use series::SeriesIndexFlusher;
pub use trie::{LoudsTrie, TrieBuilder};
