//! RusTs Compression - Encoding primitives for the index formats
//!
//! This crate provides the low-level building blocks the index blocks are
//! made of:
//! - **Varints**: LEB128 / zigzag integers and a forward-only `ByteReader`
//! - **Bit-vectors**: append-only succinct bit-vectors with rank/select,
//!   queryable in place over their marshaled bytes
//! - **Block compression**: Snappy, used for string dictionary groups

pub mod bits;
pub mod block;
pub mod error;
pub mod varint;

pub use bits::{BitVector, BitVectorView, RankSelect};
pub use block::BlockCompressor;
pub use error::{CompressionError, Result};
pub use varint::{put_uvarint, put_varint, uvarint_len, ByteReader};
