//! Store - Directory of immutable tables
//!
//! Every flusher produces one new table file. A table becomes visible to
//! snapshots only after `commit` has renamed it into place, so readers never
//! observe a partially written table.

use crate::config::StoreConfig;
use crate::error::{Result, StorageError};
use crate::kv::{KvFlusher, KvTableReader, Snapshot};
use crate::table::{TableReader, TableWriter};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

const TABLE_EXTENSION: &str = "rtsk";
const TEMP_EXTENSION: &str = "tmp";

struct StoreInner {
    config: StoreConfig,
    /// Open tables, newest first
    tables: RwLock<Vec<Arc<TableReader>>>,
    next_file_number: AtomicU64,
}

/// Directory-backed table store
#[derive(Clone)]
pub struct KvStore {
    inner: Arc<StoreInner>,
}

impl KvStore {
    /// Open (or create) the store directory and load existing tables
    pub fn open(config: StoreConfig) -> Result<Self> {
        config.validate()?;
        std::fs::create_dir_all(&config.dir)?;

        let mut tables = Vec::new();
        let mut max_number = 0u64;

        for entry in std::fs::read_dir(&config.dir)? {
            let path = entry?.path();
            let extension = path.extension().and_then(|e| e.to_str());

            if extension == Some(TEMP_EXTENSION) {
                // Leftover from a flusher that never committed.
                warn!("Removing uncommitted table {:?}", path);
                if let Err(e) = std::fs::remove_file(&path) {
                    warn!("Failed to remove {:?}: {}", path, e);
                }
                continue;
            }
            if extension != Some(TABLE_EXTENSION) {
                continue;
            }

            let Some(number) = parse_file_number(&path, &config.file_prefix) else {
                continue;
            };
            // Counted even when unreadable so its number is never reused
            max_number = max_number.max(number);
            match TableReader::open(&path, number, config.mmap_threshold) {
                Ok(table) => tables.push(Arc::new(table)),
                Err(e) => warn!("Skipping corrupt table {:?}: {}", path, e),
            }
        }

        tables.sort_by(|a, b| b.file_number().cmp(&a.file_number()));
        info!("Opened table store {:?} with {} tables", config.dir, tables.len());

        Ok(Self {
            inner: Arc::new(StoreInner {
                config,
                tables: RwLock::new(tables),
                next_file_number: AtomicU64::new(max_number + 1),
            }),
        })
    }

    /// Start writing a new table
    pub fn new_flusher(&self) -> Result<TableFlusher> {
        let number = self.inner.next_file_number.fetch_add(1, Ordering::SeqCst);
        let final_path = self.table_path(number);
        let temp_path = final_path.with_extension(TEMP_EXTENSION);
        let writer = TableWriter::create(&temp_path)?;

        Ok(TableFlusher {
            store: Arc::clone(&self.inner),
            writer: Some(writer),
            number,
            temp_path,
            final_path,
        })
    }

    /// Consistent view of every committed table, newest first
    pub fn snapshot(&self) -> Snapshot {
        let tables = self.inner.tables.read();
        Snapshot::new(
            tables
                .iter()
                .map(|t| Arc::clone(t) as Arc<dyn KvTableReader>)
                .collect(),
        )
    }

    /// Number of committed tables
    pub fn table_count(&self) -> usize {
        self.inner.tables.read().len()
    }

    /// Paths of committed tables, newest first
    pub fn table_paths(&self) -> Vec<PathBuf> {
        self.inner
            .tables
            .read()
            .iter()
            .map(|t| t.path().to_path_buf())
            .collect()
    }

    /// Store configuration
    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    fn table_path(&self, number: u64) -> PathBuf {
        self.inner.config.dir.join(format!(
            "{}_{:08}.{}",
            self.inner.config.file_prefix, number, TABLE_EXTENSION
        ))
    }
}

fn parse_file_number(path: &Path, prefix: &str) -> Option<u64> {
    let stem = path.file_stem()?.to_str()?;
    let (file_prefix, number) = stem.rsplit_once('_')?;
    if file_prefix != prefix {
        return None;
    }
    number.parse().ok()
}

/// `KvFlusher` writing one table of a `KvStore`
pub struct TableFlusher {
    store: Arc<StoreInner>,
    writer: Option<TableWriter>,
    number: u64,
    temp_path: PathBuf,
    final_path: PathBuf,
}

impl TableFlusher {
    /// Path the table will have once committed
    pub fn path(&self) -> &Path {
        &self.final_path
    }
}

impl KvFlusher for TableFlusher {
    fn add(&mut self, key: u32, value: &[u8]) -> Result<()> {
        self.writer
            .as_mut()
            .ok_or(StorageError::FlusherClosed)?
            .add(key, value)
    }

    fn commit(&mut self) -> Result<()> {
        let writer = self.writer.take().ok_or(StorageError::FlusherClosed)?;

        if writer.is_empty() {
            drop(writer);
            std::fs::remove_file(&self.temp_path)?;
            debug!("Discarded empty table {:?}", self.final_path);
            return Ok(());
        }

        let meta = writer.finish(self.store.config.sync_on_commit)?;
        std::fs::rename(&self.temp_path, &self.final_path)?;

        let reader = TableReader::open(
            &self.final_path,
            self.number,
            self.store.config.mmap_threshold,
        )?;

        let mut tables = self.store.tables.write();
        let pos = tables
            .iter()
            .position(|t| t.file_number() < self.number)
            .unwrap_or(tables.len());
        tables.insert(pos, Arc::new(reader));

        info!(
            "Committed table {:?} ({} keys, {} bytes)",
            self.final_path, meta.key_count, meta.file_size
        );
        Ok(())
    }
}

impl Drop for TableFlusher {
    fn drop(&mut self) {
        if self.writer.take().is_some() {
            if let Err(e) = std::fs::remove_file(&self.temp_path) {
                warn!("Failed to remove uncommitted table {:?}: {}", self.temp_path, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::KvSnapshot;
    use tempfile::TempDir;

    fn test_config(dir: &TempDir) -> StoreConfig {
        StoreConfig {
            sync_on_commit: false,
            ..StoreConfig::new(dir.path())
        }
    }

    #[test]
    fn test_commit_publishes_table() {
        let dir = TempDir::new().unwrap();
        let store = KvStore::open(test_config(&dir)).unwrap();

        let mut flusher = store.new_flusher().unwrap();
        flusher.add(1, b"a").unwrap();
        assert!(store.snapshot().get(1).is_none());

        flusher.commit().unwrap();
        assert_eq!(store.snapshot().get(1), Some(&b"a"[..]));
        assert!(matches!(flusher.commit(), Err(StorageError::FlusherClosed)));
        assert!(matches!(flusher.add(2, b"b"), Err(StorageError::FlusherClosed)));
    }

    #[test]
    fn test_snapshot_orders_newest_first() {
        let dir = TempDir::new().unwrap();
        let store = KvStore::open(test_config(&dir)).unwrap();

        let mut first = store.new_flusher().unwrap();
        first.add(7, b"old").unwrap();
        first.commit().unwrap();

        let before = store.snapshot();

        let mut second = store.new_flusher().unwrap();
        second.add(7, b"new").unwrap();
        second.commit().unwrap();

        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.get(7), Some(&b"new"[..]));
        assert_eq!(snapshot.readers()[1].get(7), Some(&b"old"[..]));

        // older snapshots are unaffected by later commits
        assert_eq!(before.len(), 1);
        assert_eq!(before.get(7), Some(&b"old"[..]));
    }

    #[test]
    fn test_reopen_loads_tables() {
        let dir = TempDir::new().unwrap();
        {
            let store = KvStore::open(test_config(&dir)).unwrap();
            for value in [&b"v1"[..], b"v2", b"v3"] {
                let mut flusher = store.new_flusher().unwrap();
                flusher.add(1, value).unwrap();
                flusher.commit().unwrap();
            }
        }

        let store = KvStore::open(test_config(&dir)).unwrap();
        assert_eq!(store.table_count(), 3);
        assert_eq!(store.snapshot().get(1), Some(&b"v3"[..]));

        let mut flusher = store.new_flusher().unwrap();
        flusher.add(1, b"v4").unwrap();
        flusher.commit().unwrap();
        assert_eq!(store.snapshot().get(1), Some(&b"v4"[..]));
    }

    #[test]
    fn test_reopen_skips_corrupt_table() {
        let dir = TempDir::new().unwrap();
        {
            let store = KvStore::open(test_config(&dir)).unwrap();
            let mut flusher = store.new_flusher().unwrap();
            flusher.add(1, b"good").unwrap();
            flusher.commit().unwrap();
        }
        let corrupt = dir.path().join("table_00000005.rtsk");
        std::fs::write(&corrupt, b"not a table").unwrap();

        let store = KvStore::open(test_config(&dir)).unwrap();
        assert_eq!(store.table_count(), 1);
        assert_eq!(store.snapshot().get(1), Some(&b"good"[..]));

        // The corrupt file keeps its number
        let mut flusher = store.new_flusher().unwrap();
        flusher.add(1, b"newer").unwrap();
        flusher.commit().unwrap();
        assert!(corrupt.exists());
        assert_eq!(store.table_paths()[0], dir.path().join("table_00000006.rtsk"));
        assert_eq!(store.snapshot().get(1), Some(&b"newer"[..]));
    }

    #[test]
    fn test_dropped_flusher_leaves_nothing() {
        let dir = TempDir::new().unwrap();
        let store = KvStore::open(test_config(&dir)).unwrap();
        {
            let mut flusher = store.new_flusher().unwrap();
            flusher.add(1, b"a").unwrap();
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
        assert_eq!(store.table_count(), 0);
    }

    #[test]
    fn test_empty_commit_creates_no_table() {
        let dir = TempDir::new().unwrap();
        let store = KvStore::open(test_config(&dir)).unwrap();
        let mut flusher = store.new_flusher().unwrap();
        flusher.commit().unwrap();
        assert_eq!(store.table_count(), 0);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_parse_file_number() {
        assert_eq!(parse_file_number(Path::new("table_00000012.rtsk"), "table"), Some(12));
        assert_eq!(parse_file_number(Path::new("other_00000012.rtsk"), "table"), None);
        assert_eq!(parse_file_number(Path::new("table.rtsk"), "table"), None);
    }
}
