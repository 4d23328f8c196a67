//! Variable-length integer encoding
//!
//! Unsigned values use LEB128; signed values are zigzag-mapped first so
//! small negative deltas stay short. `ByteReader` is the forward-only cursor
//! every block decoder in the index is built on.

use crate::error::{CompressionError, Result};

/// Append `value` as an unsigned LEB128 varint
#[inline]
pub fn put_uvarint(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            buf.push(byte);
            break;
        } else {
            buf.push(byte | 0x80);
        }
    }
}

/// Append `value` as a zigzag-encoded varint
#[inline]
pub fn put_varint(buf: &mut Vec<u8>, value: i64) {
    put_uvarint(buf, zigzag_encode(value));
}

/// Number of bytes `value` occupies as an unsigned varint
#[inline]
pub fn uvarint_len(value: u64) -> usize {
    let bits = 64 - (value | 1).leading_zeros() as usize;
    bits.div_ceil(7)
}

/// Zigzag encode a signed integer to unsigned
/// Maps: 0 -> 0, -1 -> 1, 1 -> 2, -2 -> 3, 2 -> 4, ...
#[inline]
pub fn zigzag_encode(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

/// Zigzag decode an unsigned integer to signed
#[inline]
pub fn zigzag_decode(value: u64) -> i64 {
    ((value >> 1) as i64) ^ (-((value & 1) as i64))
}

/// Forward-only cursor over an encoded block.
///
/// There is no way to move backwards; callers that need an earlier section
/// open a new reader on the relevant sub-slice.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    /// Create a reader positioned at the start of `data`
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Current position from the start of the underlying slice
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left to read
    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// True once every byte has been consumed
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Read an unsigned varint
    pub fn read_uvarint(&mut self) -> Result<u64> {
        let mut value = 0u64;
        let mut shift = 0;

        loop {
            if self.pos >= self.data.len() {
                return Err(CompressionError::BufferUnderflow);
            }

            let byte = self.data[self.pos];
            self.pos += 1;

            if shift == 63 && byte > 1 {
                return Err(CompressionError::InvalidData("varint overflow".to_string()));
            }
            value |= ((byte & 0x7F) as u64) << shift;

            if byte & 0x80 == 0 {
                break;
            }

            shift += 7;
            if shift >= 64 {
                return Err(CompressionError::InvalidData("varint overflow".to_string()));
            }
        }

        Ok(value)
    }

    /// Read a zigzag-encoded signed varint
    pub fn read_varint(&mut self) -> Result<i64> {
        Ok(zigzag_decode(self.read_uvarint()?))
    }

    /// Read an unsigned varint that must fit in `usize` and in the rest of
    /// the buffer. Used for length prefixes.
    pub fn read_len(&mut self) -> Result<usize> {
        let len = self.read_uvarint()?;
        let len = usize::try_from(len)
            .map_err(|_| CompressionError::InvalidData(format!("length {} too large", len)))?;
        if len > self.remaining() {
            return Err(CompressionError::BufferOverflow {
                needed: len,
                available: self.remaining(),
            });
        }
        Ok(len)
    }

    /// Read a single byte
    pub fn read_u8(&mut self) -> Result<u8> {
        let byte = *self
            .data
            .get(self.pos)
            .ok_or(CompressionError::BufferUnderflow)?;
        self.pos += 1;
        Ok(byte)
    }

    /// Borrow the next `len` bytes
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(CompressionError::BufferOverflow {
                needed: len,
                available: self.remaining(),
            });
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    /// Borrow a varint length-prefixed byte string
    pub fn read_len_prefixed(&mut self) -> Result<&'a [u8]> {
        let len = self.read_len()?;
        self.read_bytes(len)
    }

    /// Skip `len` bytes without looking at them
    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.read_bytes(len).map(|_| ())
    }

    /// Skip a varint length-prefixed section, still validating its length
    pub fn skip_len_prefixed(&mut self) -> Result<()> {
        let len = self.read_len()?;
        self.skip(len)
    }
}
