//! Block compression using Snappy
//!
//! String dictionaries are split into fixed-size groups and every group is
//! compressed on its own, so a reader only pays for the groups it touches.
//! The raw (unframed) Snappy format is used; group boundaries are tracked by
//! the surrounding block's length table.

use crate::error::{CompressionError, Result};

/// Reusable Snappy block compressor.
///
/// Holds the encoder/decoder state so hot loops do not reallocate hash
/// tables for every group.
pub struct BlockCompressor {
    encoder: snap::raw::Encoder,
    decoder: snap::raw::Decoder,
}

impl BlockCompressor {
    /// Create a new compressor
    pub fn new() -> Self {
        Self {
            encoder: snap::raw::Encoder::new(),
            decoder: snap::raw::Decoder::new(),
        }
    }

    /// Compress `data` and append the result to `out`, returning the number
    /// of bytes appended
    pub fn compress_into(&mut self, data: &[u8], out: &mut Vec<u8>) -> Result<usize> {
        let start = out.len();
        out.resize(start + snap::raw::max_compress_len(data.len()), 0);
        let written = self
            .encoder
            .compress(data, &mut out[start..])
            .map_err(|e| CompressionError::CompressionFailed(e.to_string()))?;
        out.truncate(start + written);
        Ok(written)
    }

    /// Compress `data` into a fresh buffer
    pub fn compress(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        self.encoder
            .compress_vec(data)
            .map_err(|e| CompressionError::CompressionFailed(e.to_string()))
    }

    /// Decompress `data` into `out`, replacing its contents.
    ///
    /// `out` keeps its capacity between calls, which is what the readers'
    /// scratch buffers rely on.
    pub fn decompress_into(&mut self, data: &[u8], out: &mut Vec<u8>) -> Result<()> {
        let len = snap::raw::decompress_len(data)
            .map_err(|e| CompressionError::DecompressionFailed(e.to_string()))?;
        out.clear();
        out.resize(len, 0);
        let written = self
            .decoder
            .decompress(data, out)
            .map_err(|e| CompressionError::DecompressionFailed(e.to_string()))?;
        out.truncate(written);
        Ok(())
    }

    /// Decompress `data` into a fresh buffer
    pub fn decompress(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.decompress_into(data, &mut out)?;
        Ok(out)
    }
}

impl Default for BlockCompressor {
    fn default() -> Self {
        Self::new()
    }
}
