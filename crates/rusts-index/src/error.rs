//! Index error types

use rusts_compression::CompressionError;
use thiserror::Error;

/// Index errors
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] rusts_storage::StorageError),

    #[error("Core error: {0}")]
    Core(#[from] rusts_core::CoreError),

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Corrupted block: {0}")]
    Corrupted(String),

    #[error("Insufficient block size: need at least {needed} bytes, got {actual}")]
    InsufficientBlockSize { needed: usize, actual: usize },

    #[error("Checksum mismatch in {context}: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        context: &'static str,
        expected: u32,
        actual: u32,
    },

    #[error("Decompression failed: {0}")]
    Decompression(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for index operations
pub type Result<T> = std::result::Result<T, IndexError>;

impl From<CompressionError> for IndexError {
    fn from(e: CompressionError) -> Self {
        match e {
            CompressionError::DecompressionFailed(msg) => IndexError::Decompression(msg),
            CompressionError::CompressionFailed(msg) => IndexError::Encode(msg),
            other => IndexError::Corrupted(other.to_string()),
        }
    }
}
