//! Storage error types

use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Table corrupted: {0}")]
    Corrupted(String),

    #[error("Checksum mismatch in {context}: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        context: String,
        expected: u32,
        actual: u32,
    },

    #[error("Key {key} added after key {previous}; table keys must be strictly ascending")]
    KeyOutOfOrder { previous: u32, key: u32 },

    #[error("Value of {0} bytes exceeds the table value limit")]
    ValueTooLarge(usize),

    #[error("Flusher already committed")]
    FlusherClosed,

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for storage operations
pub type Result<T> = std::result::Result<T, StorageError>;
