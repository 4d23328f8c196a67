//! Metric metadata: tag key ids and field ids of every metric
//!
//! ```text
//! [tag_count uvarint]   ([len uvarint][tag key][tag_id uvarint])*
//! [field_count uvarint] ([len uvarint][field name][type u8][field_id uvarint])*
//! [crc32 u32 BE]
//! ```
//!
//! Entries are sorted by name.

use crate::checksum::{append_crc32, split_crc32};
use crate::config::IndexConfig;
use crate::error::{IndexError, Result};
use rusts_compression::{put_uvarint, ByteReader};
use rusts_core::{FieldId, FieldType, MetricId, TagKeyId};
use rusts_storage::{KvFlusher, KvSnapshot};
use std::collections::BTreeMap;
use tracing::debug;

/// Field id and type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldMeta {
    pub id: FieldId,
    pub field_type: FieldType,
}

/// Decoded metadata of one metric
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricMeta {
    pub tag_keys: BTreeMap<String, TagKeyId>,
    pub fields: BTreeMap<String, FieldMeta>,
}

impl MetricMeta {
    fn encode(&self, buf: &mut Vec<u8>) {
        put_uvarint(buf, self.tag_keys.len() as u64);
        for (key, &id) in &self.tag_keys {
            put_uvarint(buf, key.len() as u64);
            buf.extend_from_slice(key.as_bytes());
            put_uvarint(buf, id as u64);
        }
        put_uvarint(buf, self.fields.len() as u64);
        for (name, field) in &self.fields {
            put_uvarint(buf, name.len() as u64);
            buf.extend_from_slice(name.as_bytes());
            buf.push(field.field_type.code());
            put_uvarint(buf, field.id as u64);
        }
        append_crc32(buf);
    }

    fn decode(block: &[u8], verify: bool) -> Result<Self> {
        let body = split_crc32(block, "metric meta", verify)?;
        let mut reader = ByteReader::new(body);
        let mut meta = MetricMeta::default();

        let tag_count = reader.read_len()?;
        for _ in 0..tag_count {
            let key = read_name(&mut reader)?;
            let id = u32::try_from(reader.read_uvarint()?)
                .map_err(|_| IndexError::Corrupted(format!("tag id of {:?} overflows", key)))?;
            meta.tag_keys.insert(key, id);
        }

        let field_count = reader.read_len()?;
        for _ in 0..field_count {
            let name = read_name(&mut reader)?;
            let field_type = FieldType::from_code(reader.read_u8()?)?;
            let id = u16::try_from(reader.read_uvarint()?)
                .map_err(|_| IndexError::Corrupted(format!("field id of {:?} overflows", name)))?;
            meta.fields.insert(name, FieldMeta { id, field_type });
        }

        if !reader.is_empty() {
            return Err(IndexError::Corrupted(format!(
                "{} trailing bytes in metric meta",
                reader.remaining()
            )));
        }
        Ok(meta)
    }
}

fn read_name(reader: &mut ByteReader<'_>) -> Result<String> {
    let bytes = reader.read_len_prefixed()?;
    String::from_utf8(bytes.to_vec())
        .map_err(|e| IndexError::Corrupted(format!("name is not UTF-8: {}", e)))
}

/// Writes one metadata block per metric
pub struct MetricsMetaFlusher<F: KvFlusher> {
    kv: F,
    pending: MetricMeta,
    buf: Vec<u8>,
}

impl<F: KvFlusher> MetricsMetaFlusher<F> {
    pub fn new(kv: F) -> Self {
        Self {
            kv,
            pending: MetricMeta::default(),
            buf: Vec::new(),
        }
    }

    /// Record a tag key of the current metric
    pub fn flush_tag_key_id(&mut self, tag_key: &str, tag_id: TagKeyId) {
        self.pending.tag_keys.insert(tag_key.to_string(), tag_id);
    }

    /// Record a field of the current metric
    pub fn flush_field_id(&mut self, field_name: &str, field_type: FieldType, field_id: FieldId) {
        self.pending.fields.insert(
            field_name.to_string(),
            FieldMeta {
                id: field_id,
                field_type,
            },
        );
    }

    /// Write the recorded tag keys and fields under `metric_id`
    pub fn flush_metric_meta(&mut self, metric_id: MetricId) -> Result<()> {
        let meta = std::mem::take(&mut self.pending);
        self.buf.clear();
        meta.encode(&mut self.buf);
        debug!(
            metric_id,
            tag_keys = meta.tag_keys.len(),
            fields = meta.fields.len(),
            "Flushing metric meta"
        );
        self.kv.add(metric_id, &self.buf)?;
        Ok(())
    }

    pub fn commit(&mut self) -> Result<()> {
        self.pending = MetricMeta::default();
        self.kv.commit()?;
        Ok(())
    }
}

/// Reads metric metadata; the newest table holding a metric wins
pub struct MetricsMetaReader<S: KvSnapshot> {
    snapshot: S,
    config: IndexConfig,
}

impl<S: KvSnapshot> MetricsMetaReader<S> {
    pub fn new(snapshot: S, config: IndexConfig) -> Self {
        Self { snapshot, config }
    }

    pub fn read_metric_meta(&self, metric_id: MetricId) -> Result<Option<MetricMeta>> {
        match self.snapshot.get(metric_id) {
            Some(block) => MetricMeta::decode(block, self.config.verify_checksums).map(Some),
            None => Ok(None),
        }
    }

    pub fn read_tag_id(&self, metric_id: MetricId, tag_key: &str) -> Result<Option<TagKeyId>> {
        Ok(self
            .read_metric_meta(metric_id)?
            .and_then(|meta| meta.tag_keys.get(tag_key).copied()))
    }

    pub fn read_field_id(&self, metric_id: MetricId, field_name: &str) -> Result<Option<FieldMeta>> {
        Ok(self
            .read_metric_meta(metric_id)?
            .and_then(|meta| meta.fields.get(field_name).copied()))
    }

    /// Largest field id of the metric, 0 when it has none
    pub fn read_max_field_id(&self, metric_id: MetricId) -> Result<FieldId> {
        Ok(self
            .read_metric_meta(metric_id)?
            .and_then(|meta| meta.fields.values().map(|f| f.id).max())
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusts_storage::MemoryStore;

    #[test]
    fn test_meta_round_trip() {
        let store = MemoryStore::new();
        let mut flusher = MetricsMetaFlusher::new(store.new_flusher());
        flusher.flush_tag_key_id("host", 1);
        flusher.flush_tag_key_id("region", 2);
        flusher.flush_field_id("usage", FieldType::Gauge, 1);
        flusher.flush_field_id("requests", FieldType::Sum, 3);
        flusher.flush_metric_meta(10).unwrap();
        flusher.flush_tag_key_id("host", 5);
        flusher.flush_metric_meta(11).unwrap();
        flusher.commit().unwrap();

        let reader = MetricsMetaReader::new(store.snapshot(), IndexConfig::default());
        assert_eq!(reader.read_tag_id(10, "region").unwrap(), Some(2));
        assert_eq!(reader.read_tag_id(10, "zone").unwrap(), None);
        assert_eq!(
            reader.read_field_id(10, "requests").unwrap(),
            Some(FieldMeta {
                id: 3,
                field_type: FieldType::Sum
            })
        );
        assert_eq!(reader.read_max_field_id(10).unwrap(), 3);

        let meta = reader.read_metric_meta(11).unwrap().unwrap();
        assert_eq!(meta.tag_keys.len(), 1);
        assert!(meta.fields.is_empty());
        assert_eq!(reader.read_max_field_id(11).unwrap(), 0);
        assert_eq!(reader.read_max_field_id(12).unwrap(), 0);
        assert!(reader.read_metric_meta(12).unwrap().is_none());
    }

    #[test]
    fn test_newest_table_wins() {
        let store = MemoryStore::new();
        for id in [1, 2] {
            let mut flusher = MetricsMetaFlusher::new(store.new_flusher());
            flusher.flush_tag_key_id("host", id);
            flusher.flush_metric_meta(1).unwrap();
            flusher.commit().unwrap();
        }
        let reader = MetricsMetaReader::new(store.snapshot(), IndexConfig::default());
        assert_eq!(reader.read_tag_id(1, "host").unwrap(), Some(2));
    }

    #[test]
    fn test_unknown_field_type() {
        let mut buf = Vec::new();
        put_uvarint(&mut buf, 0);
        put_uvarint(&mut buf, 1);
        put_uvarint(&mut buf, 1);
        buf.push(b'f');
        buf.push(99);
        put_uvarint(&mut buf, 1);
        append_crc32(&mut buf);
        assert!(matches!(
            MetricMeta::decode(&buf, true),
            Err(IndexError::Core(rusts_core::CoreError::UnknownFieldType(99)))
        ));
    }
}
