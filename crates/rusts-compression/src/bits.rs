//! Succinct bit-vectors with rank/select
//!
//! `BitVector` is the append-only builder; `BitVectorView` answers the same
//! queries directly over the marshaled bytes so persisted tries can be
//! queried without copying or rebuilding anything.
//!
//! Binary layout:
//!
//! ```text
//! [num_bits uvarint][words: u64 LE * ceil(num_bits / 64)][samples: u32 LE * (num_bits / 512 + 1)]
//! ```
//!
//! `samples[k]` holds the number of set bits before bit `k * 512`. Rank reads
//! one sample plus at most eight words; select binary-searches the samples and
//! then scans inside one superblock.

use crate::error::{CompressionError, Result};
use crate::varint::{put_uvarint, ByteReader};

const WORD_BITS: usize = 64;
const SUPERBLOCK_BITS: usize = 512;
const WORDS_PER_SUPERBLOCK: usize = SUPERBLOCK_BITS / WORD_BITS;

/// Read-only rank/select queries shared by the owned and borrowed forms.
pub trait RankSelect {
    /// Number of bits
    fn len(&self) -> usize;

    /// Word `i` (bit `j` of the vector is bit `j % 64` of word `j / 64`)
    fn word(&self, i: usize) -> u64;

    /// Number of set bits before bit `k * 512`
    fn sample(&self, k: usize) -> usize;

    /// True if the vector holds no bits
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value of the bit at `pos`; positions past the end read as `false`
    #[inline]
    fn bit(&self, pos: usize) -> bool {
        if pos >= self.len() {
            return false;
        }
        self.word(pos / WORD_BITS) & (1u64 << (pos % WORD_BITS)) != 0
    }

    /// Number of set bits in `[0, pos)`
    fn rank1(&self, pos: usize) -> usize {
        let pos = pos.min(self.len());
        let superblock = pos / SUPERBLOCK_BITS;
        let mut count = self.sample(superblock);

        let word_end = pos / WORD_BITS;
        for i in superblock * WORDS_PER_SUPERBLOCK..word_end {
            count += self.word(i).count_ones() as usize;
        }

        let rem = pos % WORD_BITS;
        if rem != 0 {
            count += (self.word(word_end) & ((1u64 << rem) - 1)).count_ones() as usize;
        }
        count
    }

    /// Number of occurrences of `bit` in `[0, pos)`
    #[inline]
    fn rank(&self, pos: usize, bit: bool) -> usize {
        if bit {
            self.rank1(pos)
        } else {
            pos.min(self.len()) - self.rank1(pos)
        }
    }

    /// Total number of occurrences of `bit`
    #[inline]
    fn count(&self, bit: bool) -> usize {
        self.rank(self.len(), bit)
    }

    /// Position of the `(rank + 1)`-th occurrence of `bit`.
    ///
    /// Returns `len()` when the vector holds `rank` or fewer occurrences.
    fn select(&self, rank: usize, bit: bool) -> usize {
        let len = self.len();
        if rank >= self.count(bit) {
            return len;
        }

        let before = |k: usize| -> usize {
            let ones = self.sample(k);
            if bit {
                ones
            } else {
                k * SUPERBLOCK_BITS - ones
            }
        };

        // Largest superblock whose preceding count is <= rank.
        let (mut lo, mut hi) = (0usize, len / SUPERBLOCK_BITS);
        while lo < hi {
            let mid = lo + (hi - lo).div_ceil(2);
            if before(mid) <= rank {
                lo = mid;
            } else {
                hi = mid - 1;
            }
        }

        let mut remaining = rank - before(lo);
        let word_count = len.div_ceil(WORD_BITS);
        for i in lo * WORDS_PER_SUPERBLOCK..word_count {
            let word = if bit { self.word(i) } else { !self.word(i) };
            let ones = word.count_ones() as usize;
            if remaining < ones {
                return i * WORD_BITS + select_in_word(word, remaining);
            }
            remaining -= ones;
        }
        len
    }
}

/// Position of the `(rank + 1)`-th set bit inside `word`
#[inline]
fn select_in_word(mut word: u64, rank: usize) -> usize {
    for _ in 0..rank {
        word &= word - 1;
    }
    word.trailing_zeros() as usize
}

/// Append-only bit-vector with incrementally maintained rank samples
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitVector {
    words: Vec<u64>,
    samples: Vec<u32>,
    len: usize,
    ones: usize,
}

impl BitVector {
    /// Create an empty bit-vector
    pub fn new() -> Self {
        Self {
            words: Vec::new(),
            samples: vec![0],
            len: 0,
            ones: 0,
        }
    }

    /// Create an empty bit-vector able to hold `bits` bits without growing
    pub fn with_capacity(bits: usize) -> Self {
        let mut samples = Vec::with_capacity(bits / SUPERBLOCK_BITS + 1);
        samples.push(0);
        Self {
            words: Vec::with_capacity(bits.div_ceil(WORD_BITS)),
            samples,
            len: 0,
            ones: 0,
        }
    }

    /// Append one bit
    #[inline]
    pub fn push_back(&mut self, bit: bool) {
        let offset = self.len % WORD_BITS;
        if offset == 0 {
            self.words.push(0);
        }
        if bit {
            let last = self.words.len() - 1;
            self.words[last] |= 1u64 << offset;
            self.ones += 1;
        }
        self.len += 1;
        if self.len % SUPERBLOCK_BITS == 0 {
            self.samples.push(self.ones as u32);
        }
    }

    /// Drop every bit, keeping the allocations
    pub fn clear(&mut self) {
        self.words.clear();
        self.samples.clear();
        self.samples.push(0);
        self.len = 0;
        self.ones = 0;
    }

    /// Size of the marshaled form in bytes
    pub fn marshaled_len(&self) -> usize {
        crate::varint::uvarint_len(self.len as u64) + self.words.len() * 8 + self.samples.len() * 4
    }

    /// Append the binary form to `buf`
    pub fn marshal_binary_into(&self, buf: &mut Vec<u8>) -> Result<()> {
        if self.ones > u32::MAX as usize {
            return Err(CompressionError::CompressionFailed(format!(
                "bit-vector with {} set bits exceeds the rank sample width",
                self.ones
            )));
        }
        buf.reserve(self.marshaled_len());
        put_uvarint(buf, self.len as u64);
        for word in &self.words {
            buf.extend_from_slice(&word.to_le_bytes());
        }
        for sample in &self.samples {
            buf.extend_from_slice(&sample.to_le_bytes());
        }
        Ok(())
    }

    /// Marshal into a fresh buffer
    pub fn marshal_binary(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.marshaled_len());
        self.marshal_binary_into(&mut buf)?;
        Ok(buf)
    }

    /// Decode an owned copy from its binary form
    pub fn unmarshal_binary(data: &[u8]) -> Result<Self> {
        let view = BitVectorView::new(data)?;
        let words = (0..view.len().div_ceil(WORD_BITS)).map(|i| view.word(i)).collect();
        let samples = (0..view.len() / SUPERBLOCK_BITS + 1)
            .map(|k| view.sample(k) as u32)
            .collect();
        Ok(Self {
            words,
            samples,
            len: view.len(),
            ones: view.count(true),
        })
    }
}

impl Default for BitVector {
    fn default() -> Self {
        Self::new()
    }
}

impl RankSelect for BitVector {
    #[inline]
    fn len(&self) -> usize {
        self.len
    }

    #[inline]
    fn word(&self, i: usize) -> u64 {
        self.words.get(i).copied().unwrap_or(0)
    }

    #[inline]
    fn sample(&self, k: usize) -> usize {
        self.samples[k] as usize
    }
}

/// Zero-copy view over a marshaled `BitVector`
#[derive(Debug, Clone, Copy)]
pub struct BitVectorView<'a> {
    words: &'a [u8],
    samples: &'a [u8],
    len: usize,
}

impl<'a> BitVectorView<'a> {
    /// Parse a view; `data` must be exactly one marshaled bit-vector
    pub fn new(data: &'a [u8]) -> Result<Self> {
        let mut reader = ByteReader::new(data);
        let len = usize::try_from(reader.read_uvarint()?)
            .map_err(|_| CompressionError::InvalidData("bit-vector length overflow".to_string()))?;

        let word_bytes = len.div_ceil(WORD_BITS) * 8;
        let sample_bytes = (len / SUPERBLOCK_BITS + 1) * 4;
        if reader.remaining() != word_bytes + sample_bytes {
            return Err(CompressionError::InvalidData(format!(
                "bit-vector of {} bits needs {} payload bytes, found {}",
                len,
                word_bytes + sample_bytes,
                reader.remaining()
            )));
        }

        let words = reader.read_bytes(word_bytes)?;
        let samples = reader.read_bytes(sample_bytes)?;
        let view = Self { words, samples, len };
        view.validate()?;
        Ok(view)
    }

    /// Recompute every sample from the words. Rank and select trust the
    /// samples, so a view is only handed out once they agree.
    fn validate(&self) -> Result<()> {
        let word_count = self.len.div_ceil(WORD_BITS);
        let tail = self.len % WORD_BITS;
        if tail != 0 && self.word(word_count - 1) >> tail != 0 {
            return Err(CompressionError::InvalidData(
                "bit-vector has bits set past its length".to_string(),
            ));
        }

        let mut ones = 0;
        for k in 0..=self.len / SUPERBLOCK_BITS {
            if self.sample(k) != ones {
                return Err(CompressionError::InvalidData(format!(
                    "bit-vector sample {} is {}, expected {}",
                    k,
                    self.sample(k),
                    ones
                )));
            }
            let first = k * WORDS_PER_SUPERBLOCK;
            let last = (first + WORDS_PER_SUPERBLOCK).min(word_count);
            for i in first..last {
                ones += self.word(i).count_ones() as usize;
            }
        }
        Ok(())
    }
}

impl RankSelect for BitVectorView<'_> {
    #[inline]
    fn len(&self) -> usize {
        self.len
    }

    #[inline]
    fn word(&self, i: usize) -> u64 {
        match self.words.get(i * 8..i * 8 + 8) {
            Some(b) => u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]),
            None => 0,
        }
    }

    #[inline]
    fn sample(&self, k: usize) -> usize {
        match self.samples.get(k * 4..k * 4 + 4) {
            Some(b) => u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as usize,
            None => 0,
        }
    }
}
