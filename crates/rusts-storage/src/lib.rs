//! RusTs Storage - Table store underneath the index
//!
//! This crate provides the key/value layer the index is written to:
//! - KV traits (`KvFlusher`, `KvSnapshot`, `KvTableReader`)
//! - Tables (immutable, checksummed key/value files)
//! - Store (directory of tables with snapshot isolation)
//! - Memory tables for tests and transient indexes

pub mod config;
pub mod error;
pub mod kv;
pub mod memory;
pub mod store;
pub mod table;

pub use config::StoreConfig;
pub use error::{Result, StorageError};
pub use kv::{KvFlusher, KvSnapshot, KvTableReader, Snapshot};
pub use memory::{MemoryFlusher, MemoryStore, MemoryTable};
pub use store::{KvStore, TableFlusher};
pub use table::{IndexEntry, TableMeta, TableReader, TableWriter};
