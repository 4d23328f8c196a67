//! Table - Immutable key/value file format
//!
//! A table stores opaque values under ascending `u32` keys. Values are
//! written back to back after the header; a key index and a fixed footer
//! close the file.
//!
//! ```text
//! [magic "RTSK"][version u16 LE]
//! [value]*
//! [index: count u32 LE, (key u32 LE, offset u64 LE, len u32 LE)*]
//! [footer: index_offset u64 LE, index_len u32 LE, index_crc u32 LE, magic "RTSK"]
//! ```

use crate::error::{Result, StorageError};
use crate::kv::KvTableReader;
use crc32fast::Hasher;
use memmap2::{Mmap, MmapOptions};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Table file magic number
const TABLE_MAGIC: [u8; 4] = [0x52, 0x54, 0x53, 0x4B]; // "RTSK"

/// Table file version
const TABLE_VERSION: u16 = 1;

const HEADER_SIZE: usize = 6;
const FOOTER_SIZE: usize = 20;
const INDEX_ENTRY_SIZE: usize = 16;

/// Location of one value inside a table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub key: u32,
    pub offset: u64,
    pub len: u32,
}

/// Summary returned when a table is sealed
#[derive(Debug, Clone)]
pub struct TableMeta {
    /// Number of keys in the table
    pub key_count: usize,
    /// Total file size in bytes
    pub file_size: u64,
}

/// Streaming writer for table files
pub struct TableWriter {
    writer: BufWriter<File>,
    offset: u64,
    index: Vec<IndexEntry>,
}

impl TableWriter {
    /// Create a table file at `path`, truncating any existing file
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        writer.write_all(&TABLE_MAGIC)?;
        writer.write_all(&TABLE_VERSION.to_le_bytes())?;

        Ok(Self {
            writer,
            offset: HEADER_SIZE as u64,
            index: Vec::new(),
        })
    }

    /// Append a value; keys must be strictly ascending
    pub fn add(&mut self, key: u32, value: &[u8]) -> Result<()> {
        if let Some(last) = self.index.last() {
            if key <= last.key {
                return Err(StorageError::KeyOutOfOrder {
                    previous: last.key,
                    key,
                });
            }
        }
        let len = u32::try_from(value.len()).map_err(|_| StorageError::ValueTooLarge(value.len()))?;

        self.writer.write_all(value)?;
        self.index.push(IndexEntry {
            key,
            offset: self.offset,
            len,
        });
        self.offset += value.len() as u64;
        Ok(())
    }

    /// Number of values added so far
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Check if nothing was added
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Write the index and footer, optionally fsync, and close the file
    pub fn finish(mut self, sync: bool) -> Result<TableMeta> {
        let mut index_bytes = Vec::with_capacity(4 + self.index.len() * INDEX_ENTRY_SIZE);
        index_bytes.extend_from_slice(&(self.index.len() as u32).to_le_bytes());
        for entry in &self.index {
            index_bytes.extend_from_slice(&entry.key.to_le_bytes());
            index_bytes.extend_from_slice(&entry.offset.to_le_bytes());
            index_bytes.extend_from_slice(&entry.len.to_le_bytes());
        }

        let mut hasher = Hasher::new();
        hasher.update(&index_bytes);
        let checksum = hasher.finalize();

        let index_offset = self.offset;
        self.writer.write_all(&index_bytes)?;
        self.writer.write_all(&index_offset.to_le_bytes())?;
        self.writer.write_all(&(index_bytes.len() as u32).to_le_bytes())?;
        self.writer.write_all(&checksum.to_le_bytes())?;
        self.writer.write_all(&TABLE_MAGIC)?;
        self.writer.flush()?;

        if sync {
            self.writer.get_ref().sync_all()?;
        }

        Ok(TableMeta {
            key_count: self.index.len(),
            file_size: index_offset + index_bytes.len() as u64 + FOOTER_SIZE as u64,
        })
    }
}

/// Backing bytes of an open table
enum TableData {
    Mmap(Mmap),
    Heap(Vec<u8>),
}

impl TableData {
    fn bytes(&self) -> &[u8] {
        match self {
            TableData::Mmap(mmap) => mmap,
            TableData::Heap(buf) => buf,
        }
    }
}

/// Reader over one sealed table file
pub struct TableReader {
    path: PathBuf,
    name: String,
    file_number: u64,
    data: TableData,
    index: Vec<IndexEntry>,
}

impl TableReader {
    /// Open a table, memory-mapping it when it is at least `mmap_threshold`
    /// bytes long and reading it onto the heap otherwise
    pub fn open(path: impl AsRef<Path>, file_number: u64, mmap_threshold: u64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let file_size = file.metadata()?.len();

        let data = if file_size >= mmap_threshold {
            // SAFETY: table files are immutable once renamed into place.
            TableData::Mmap(unsafe { MmapOptions::new().map(&file)? })
        } else {
            TableData::Heap(std::fs::read(&path)?)
        };

        let index = Self::read_index(data.bytes(), &path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Self {
            path,
            name,
            file_number,
            data,
            index,
        })
    }

    fn read_index(bytes: &[u8], path: &Path) -> Result<Vec<IndexEntry>> {
        if bytes.len() < HEADER_SIZE + FOOTER_SIZE {
            return Err(StorageError::Corrupted(format!(
                "{}: {} bytes is smaller than header and footer",
                path.display(),
                bytes.len()
            )));
        }
        if bytes[0..4] != TABLE_MAGIC || bytes[bytes.len() - 4..] != TABLE_MAGIC {
            return Err(StorageError::Corrupted(format!(
                "{}: invalid table magic",
                path.display()
            )));
        }
        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != TABLE_VERSION {
            return Err(StorageError::Corrupted(format!(
                "{}: unsupported table version {}",
                path.display(),
                version
            )));
        }

        let footer = &bytes[bytes.len() - FOOTER_SIZE..];
        let index_offset = read_u64(&footer[0..8]) as usize;
        let index_len = read_u32(&footer[8..12]) as usize;
        let expected_crc = read_u32(&footer[12..16]);

        let index_end = bytes.len() - FOOTER_SIZE;
        if index_offset < HEADER_SIZE || index_offset.checked_add(index_len) != Some(index_end) {
            return Err(StorageError::Corrupted(format!(
                "{}: index position {}+{} out of range",
                path.display(),
                index_offset,
                index_len
            )));
        }

        let index_bytes = &bytes[index_offset..index_end];
        let mut hasher = Hasher::new();
        hasher.update(index_bytes);
        let actual_crc = hasher.finalize();
        if actual_crc != expected_crc {
            return Err(StorageError::ChecksumMismatch {
                context: format!("{} index", path.display()),
                expected: expected_crc,
                actual: actual_crc,
            });
        }

        if index_bytes.len() < 4 {
            return Err(StorageError::Corrupted(format!("{}: empty index", path.display())));
        }
        let count = read_u32(&index_bytes[0..4]) as usize;
        if index_bytes.len() != 4 + count * INDEX_ENTRY_SIZE {
            return Err(StorageError::Corrupted(format!(
                "{}: index holds {} bytes for {} entries",
                path.display(),
                index_bytes.len(),
                count
            )));
        }

        let mut index: Vec<IndexEntry> = Vec::with_capacity(count);
        for chunk in index_bytes[4..].chunks_exact(INDEX_ENTRY_SIZE) {
            let entry = IndexEntry {
                key: read_u32(&chunk[0..4]),
                offset: read_u64(&chunk[4..12]),
                len: read_u32(&chunk[12..16]),
            };
            let end = entry.offset.saturating_add(entry.len as u64);
            if entry.offset < HEADER_SIZE as u64 || end > index_offset as u64 {
                return Err(StorageError::Corrupted(format!(
                    "{}: value for key {} out of range",
                    path.display(),
                    entry.key
                )));
            }
            if let Some(prev) = index.last() {
                if prev.key >= entry.key {
                    return Err(StorageError::Corrupted(format!(
                        "{}: index keys not ascending at {}",
                        path.display(),
                        entry.key
                    )));
                }
            }
            index.push(entry);
        }

        Ok(index)
    }

    /// Path of the table file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sequence number encoded in the file name
    pub fn file_number(&self) -> u64 {
        self.file_number
    }

    /// Index entries in key order
    pub fn entries(&self) -> &[IndexEntry] {
        &self.index
    }
}

impl KvTableReader for TableReader {
    fn get(&self, key: u32) -> Option<&[u8]> {
        let pos = self.index.binary_search_by_key(&key, |e| e.key).ok()?;
        let entry = self.index[pos];
        let start = entry.offset as usize;
        self.data.bytes().get(start..start + entry.len as usize)
    }

    fn keys(&self) -> Vec<u32> {
        self.index.iter().map(|e| e.key).collect()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn read_u32(b: &[u8]) -> u32 {
    u32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

fn read_u64(b: &[u8]) -> u64 {
    u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]])
}
