use super::SeriesTagValues;
use crate::checksum::append_crc32;
use crate::config::IndexConfig;
use crate::error::{IndexError, Result};
use crate::trie::TrieBuilder;
use roaring::RoaringBitmap;
use rusts_compression::{put_uvarint, put_varint, BlockCompressor};
use rusts_core::{MetricId, Version};
use rusts_storage::KvFlusher;
use tracing::{debug, warn};

/// Writes one forward index block per metric.
///
/// `flush_version` encodes a version block; `flush_metric` seals every
/// version flushed since the previous metric. Metrics must be flushed in
/// ascending id order.
pub struct ForwardIndexFlusher<F: KvFlusher> {
    kv: F,
    config: IndexConfig,
    compressor: BlockCompressor,
    dict_trie: TrieBuilder<u32>,
    /// Version blocks of the current metric
    metric: Vec<u8>,
    versions: Vec<(Version, usize)>,
    group: Vec<u8>,
}

impl<F: KvFlusher> ForwardIndexFlusher<F> {
    pub fn new(kv: F, config: IndexConfig) -> Self {
        Self {
            kv,
            config,
            compressor: BlockCompressor::new(),
            dict_trie: TrieBuilder::new(),
            metric: Vec::new(),
            versions: Vec::new(),
            group: Vec::new(),
        }
    }

    /// Encode one version of the current metric
    pub fn flush_version(&mut self, version: Version, series: &SeriesTagValues) -> Result<()> {
        if self.versions.iter().any(|&(v, _)| v == version) {
            return Err(IndexError::Encode(format!(
                "version {} flushed twice for the same metric",
                version
            )));
        }

        let start = self.metric.len();
        let result = self.encode_version(series);
        if self.config.auto_reset {
            self.dict_trie.reset();
        }
        if let Err(e) = result {
            self.metric.truncate(start);
            return Err(e);
        }

        let len = self.metric.len() - start;
        debug!(version, tag_keys = series.len(), bytes = len, "Flushed forward version");
        self.versions.push((version, len));
        Ok(())
    }

    fn encode_version(&mut self, series: &SeriesTagValues) -> Result<()> {
        let start = self.metric.len();
        let keys: Vec<(&str, Vec<(u32, &str)>)> = series
            .iter()
            .filter(|(key, _)| {
                if key.is_empty() {
                    warn!("Skipping empty tag key in forward index");
                }
                !key.is_empty()
            })
            .map(|(key, values)| {
                let values = values
                    .iter()
                    .filter(|(_, value)| !value.is_empty())
                    .map(|(&id, value)| (id, value.as_str()))
                    .collect();
                (key.as_str(), values)
            })
            .collect();

        // Distinct values in rank order
        self.dict_trie.reset();
        let mut distinct: Vec<&str> = Vec::new();
        for (_, values) in &keys {
            for &(_, value) in values {
                if self.dict_trie.get(value.as_bytes()).is_none() {
                    self.dict_trie.add(value.as_bytes(), distinct.len() as u32);
                    distinct.push(value);
                }
            }
        }
        let louds = self.dict_trie.marshal_binary()?;
        let mut rank_of = vec![0u32; distinct.len()];
        for (rank, &&idx) in louds.values.iter().enumerate() {
            rank_of[idx as usize] = rank as u32;
        }
        let dict: Vec<&str> = louds.values.iter().map(|&&idx| distinct[idx as usize]).collect();

        // Tag keys
        let buf = &mut self.metric;
        put_uvarint(buf, keys.len() as u64);
        for (key, _) in &keys {
            put_uvarint(buf, key.len() as u64);
            buf.extend_from_slice(key.as_bytes());
        }

        // Series
        let series_pos = buf.len() - start;
        let all: RoaringBitmap = keys
            .iter()
            .flat_map(|(_, values)| values.iter().map(|&(id, _)| id))
            .collect();
        write_bitmap(buf, &all)?;

        // LUT
        let lut_pos = buf.len() - start;
        let mut entry = Vec::new();
        for (_, values) in &keys {
            entry.clear();
            let bitmap: RoaringBitmap = values.iter().map(|&(id, _)| id).collect();
            write_bitmap(&mut entry, &bitmap)?;
            for &(_, value) in values {
                let idx = self
                    .dict_trie
                    .get(value.as_bytes())
                    .ok_or_else(|| IndexError::Encode(format!("value {:?} missing from dictionary", value)))?;
                put_uvarint(&mut entry, rank_of[*idx as usize] as u64);
            }
            put_uvarint(buf, entry.len() as u64);
            buf.extend_from_slice(&entry);
        }

        // Dictionary
        let dict_pos = buf.len() - start;
        let group_size = self.config.dict_block_size.max(1);
        let groups: Vec<&[&str]> = dict.chunks(group_size).collect();
        put_uvarint(buf, dict.len() as u64);
        put_uvarint(buf, group_size as u64);
        put_uvarint(buf, groups.len() as u64);
        let mut compressed = Vec::new();
        let mut lens = Vec::with_capacity(groups.len());
        for group in &groups {
            self.group.clear();
            for value in group.iter() {
                put_uvarint(&mut self.group, value.len() as u64);
                self.group.extend_from_slice(value.as_bytes());
            }
            lens.push(self.compressor.compress_into(&self.group, &mut compressed)?);
        }
        for len in lens {
            put_uvarint(buf, len as u64);
        }
        buf.extend_from_slice(&compressed);

        // Footer
        for pos in [series_pos, lut_pos, dict_pos] {
            let pos = u32::try_from(pos)
                .map_err(|_| IndexError::Encode(format!("version block offset {} exceeds u32", pos)))?;
            buf.extend_from_slice(&pos.to_le_bytes());
        }
        let crc = crate::checksum::crc32(&buf[start..]);
        buf.extend_from_slice(&crc.to_be_bytes());
        Ok(())
    }

    /// Seal the pending versions into the block for `metric_id`
    pub fn flush_metric(&mut self, metric_id: MetricId) -> Result<()> {
        let result = self.write_metric(metric_id);
        self.metric.clear();
        self.versions.clear();
        result
    }

    fn write_metric(&mut self, metric_id: MetricId) -> Result<()> {
        if self.versions.is_empty() {
            debug!(metric_id, "No versions to flush");
            return Ok(());
        }
        let table_pos = u32::try_from(self.metric.len()).map_err(|_| {
            IndexError::Encode(format!("metric block of {} bytes exceeds u32", self.metric.len()))
        })?;

        put_uvarint(&mut self.metric, self.versions.len() as u64);
        for &(version, len) in &self.versions {
            put_varint(&mut self.metric, version);
            put_uvarint(&mut self.metric, len as u64);
        }
        self.metric.extend_from_slice(&table_pos.to_le_bytes());
        append_crc32(&mut self.metric);

        debug!(
            metric_id,
            versions = self.versions.len(),
            bytes = self.metric.len(),
            "Flushing forward index"
        );
        self.kv.add(metric_id, &self.metric)?;
        Ok(())
    }

    pub fn commit(&mut self) -> Result<()> {
        self.metric.clear();
        self.versions.clear();
        self.dict_trie.reset();
        self.kv.commit()?;
        Ok(())
    }

    pub fn into_inner(self) -> F {
        self.kv
    }
}

fn write_bitmap(buf: &mut Vec<u8>, bitmap: &RoaringBitmap) -> Result<()> {
    put_uvarint(buf, bitmap.serialized_size() as u64);
    bitmap
        .serialize_into(buf)
        .map_err(|e| IndexError::Encode(format!("failed to serialize bitmap: {}", e)))
}
