//! Error types for rusts-core

use thiserror::Error;

/// Core error types
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid time range: start {start} is after end {end}")]
    InvalidTimeRange { start: i64, end: i64 },

    #[error("Unknown field type code: {0}")]
    UnknownFieldType(u8),

    #[error("Unknown field type name: {0}")]
    UnknownFieldTypeName(String),
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
