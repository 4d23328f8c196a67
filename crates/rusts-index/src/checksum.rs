//! CRC32 trailers shared by the index block formats

use crate::error::{IndexError, Result};
use crc32fast::Hasher;

/// Size of the CRC32 trailer
pub const CHECKSUM_SIZE: usize = 4;

/// Append a big-endian CRC32 of everything currently in `buf`
pub fn append_crc32(buf: &mut Vec<u8>) {
    let mut hasher = Hasher::new();
    hasher.update(buf);
    let checksum = hasher.finalize();
    buf.extend_from_slice(&checksum.to_be_bytes());
}

/// CRC32 of `data`
pub fn crc32(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Split off the big-endian CRC32 trailer of `block` and return the body.
///
/// With `verify` unset the trailer is only stripped, not checked.
pub fn split_crc32<'a>(block: &'a [u8], context: &'static str, verify: bool) -> Result<&'a [u8]> {
    if block.len() < CHECKSUM_SIZE {
        return Err(IndexError::InsufficientBlockSize {
            needed: CHECKSUM_SIZE,
            actual: block.len(),
        });
    }
    let (body, trailer) = block.split_at(block.len() - CHECKSUM_SIZE);
    if verify {
        let expected = u32::from_be_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
        let actual = crc32(body);
        if expected != actual {
            return Err(IndexError::ChecksumMismatch {
                context,
                expected,
                actual,
            });
        }
    }
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_split() {
        let mut buf = b"entry set".to_vec();
        append_crc32(&mut buf);
        assert_eq!(buf.len(), 9 + CHECKSUM_SIZE);
        assert_eq!(split_crc32(&buf, "test", true).unwrap(), b"entry set");
    }

    #[test]
    fn test_mismatch_and_short() {
        let mut buf = b"entry set".to_vec();
        append_crc32(&mut buf);
        buf[0] ^= 1;
        assert!(matches!(
            split_crc32(&buf, "test", true),
            Err(IndexError::ChecksumMismatch { .. })
        ));
        assert!(split_crc32(&buf, "test", false).is_ok());

        assert!(matches!(
            split_crc32(&[1, 2], "test", true),
            Err(IndexError::InsufficientBlockSize { needed: 4, actual: 2 })
        ));
    }
}
