use super::{METRIC_FOOTER_SIZE, VERSION_FOOTER_SIZE};
use crate::checksum::split_crc32;
use crate::config::IndexConfig;
use crate::error::{IndexError, Result};
use roaring::RoaringBitmap;
use rusts_compression::{BlockCompressor, ByteReader};
use rusts_core::{MetricId, SeriesId, Version};
use rusts_storage::KvSnapshot;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

/// Resolves tag values of series from forward index blocks.
///
/// Holds a decompression scratch buffer, so queries take `&mut self`; use
/// one reader per concurrent query. Readers over the same snapshot are
/// independent.
pub struct ForwardIndexReader<S: KvSnapshot> {
    snapshot: S,
    config: IndexConfig,
    compressor: BlockCompressor,
    scratch: Vec<u8>,
}

impl<S: KvSnapshot> ForwardIndexReader<S> {
    pub fn new(snapshot: S, config: IndexConfig) -> Self {
        Self {
            snapshot,
            config,
            compressor: BlockCompressor::new(),
            scratch: Vec::new(),
        }
    }

    /// Distinct values of each of `tag_keys` at `version`, in dictionary
    /// order, aligned to `tag_keys`.
    ///
    /// `Ok(None)` when the version is missing or holds none of the keys; a
    /// key that is missing while others are present yields an empty list.
    pub fn get_tag_values(
        &mut self,
        metric_id: MetricId,
        tag_keys: &[&str],
        version: Version,
    ) -> Result<Option<Vec<Vec<String>>>> {
        let Self {
            snapshot,
            config,
            compressor,
            scratch,
        } = self;
        let Some(block) = find_version_block(snapshot, metric_id, version, config.verify_checksums)?
        else {
            return Ok(None);
        };
        let Some(lookup) = block.lookup(tag_keys)? else {
            return Ok(None);
        };

        let mut needed = BTreeSet::new();
        let per_key: Vec<BTreeSet<u32>> = lookup
            .seqs
            .iter()
            .map(|seq| {
                let indexes: BTreeSet<u32> = seq
                    .map(|s| lookup.entries[&s].values.iter().copied().collect())
                    .unwrap_or_default();
                needed.extend(indexes.iter().copied());
                indexes
            })
            .collect();

        let resolved = block.dict()?.resolve(&needed, compressor, scratch)?;
        let result: Vec<Vec<String>> = per_key
            .into_iter()
            .map(|indexes| indexes.iter().map(|idx| resolved[idx].clone()).collect::<Vec<_>>())
            .collect();
        debug!(metric_id, version, values = resolved.len(), "Resolved tag values");
        Ok(Some(result))
    }

    /// Per series, the value of each of `tag_keys` at `version`, aligned to
    /// `tag_keys`
    pub fn get_series_tag_values(
        &mut self,
        metric_id: MetricId,
        tag_keys: &[&str],
        version: Version,
    ) -> Result<Option<BTreeMap<SeriesId, Vec<Option<String>>>>> {
        let Self {
            snapshot,
            config,
            compressor,
            scratch,
        } = self;
        let Some(block) = find_version_block(snapshot, metric_id, version, config.verify_checksums)?
        else {
            return Ok(None);
        };
        let Some(lookup) = block.lookup(tag_keys)? else {
            return Ok(None);
        };

        let needed: BTreeSet<u32> = lookup
            .entries
            .values()
            .flat_map(|entry| entry.values.iter().copied())
            .collect();
        let resolved = block.dict()?.resolve(&needed, compressor, scratch)?;

        let mut series: BTreeMap<SeriesId, Vec<Option<String>>> = BTreeMap::new();
        for (i, seq) in lookup.seqs.iter().enumerate() {
            let Some(entry) = seq.map(|s| &lookup.entries[&s]) else {
                continue;
            };
            for (series_id, idx) in entry.bitmap.iter().zip(&entry.values) {
                series
                    .entry(series_id)
                    .or_insert_with(|| vec![None; tag_keys.len()])[i] = Some(resolved[idx].clone());
            }
        }
        Ok(Some(series))
    }

    /// Every series of the metric at `version`
    pub fn series_ids(&self, metric_id: MetricId, version: Version) -> Result<Option<RoaringBitmap>> {
        match find_version_block(&self.snapshot, metric_id, version, self.config.verify_checksums)? {
            Some(block) => Ok(Some(block.series()?)),
            None => Ok(None),
        }
    }

    /// Tag keys of the metric at `version`, in sequence order
    pub fn tag_keys(&self, metric_id: MetricId, version: Version) -> Result<Option<Vec<String>>> {
        match find_version_block(&self.snapshot, metric_id, version, self.config.verify_checksums)? {
            Some(block) => Ok(Some(
                block.tag_keys()?.into_iter().map(str::to_string).collect(),
            )),
            None => Ok(None),
        }
    }

    /// Versions stored for the metric across all tables, ascending
    pub fn versions(&self, metric_id: MetricId) -> Result<Vec<Version>> {
        let mut versions = BTreeSet::new();
        for reader in self.snapshot.readers() {
            if let Some(block) = reader.get(metric_id) {
                let metric = MetricBlock::parse(block, self.config.verify_checksums)?;
                versions.extend(metric.versions()?);
            }
        }
        Ok(versions.into_iter().collect())
    }

    pub fn snapshot(&self) -> &S {
        &self.snapshot
    }
}

/// Newest version block for (`metric_id`, `version`)
fn find_version_block<'a, S: KvSnapshot>(
    snapshot: &'a S,
    metric_id: MetricId,
    version: Version,
    verify: bool,
) -> Result<Option<VersionBlock<'a>>> {
    for reader in snapshot.readers() {
        let Some(block) = reader.get(metric_id) else {
            continue;
        };
        let metric = MetricBlock::parse(block, verify)?;
        if let Some(data) = metric.find(version)? {
            return VersionBlock::parse(data, verify).map(Some);
        }
    }
    Ok(None)
}

fn insufficient(needed: usize, actual: usize) -> IndexError {
    IndexError::InsufficientBlockSize { needed, actual }
}

fn read_pos(bytes: &[u8]) -> usize {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize
}

struct MetricBlock<'a> {
    versions: &'a [u8],
    table: &'a [u8],
}

impl<'a> MetricBlock<'a> {
    fn parse(block: &'a [u8], verify: bool) -> Result<Self> {
        if block.len() < METRIC_FOOTER_SIZE {
            return Err(insufficient(METRIC_FOOTER_SIZE, block.len()));
        }
        let body = split_crc32(block, "forward metric", verify)?;
        let (content, footer) = body.split_at(body.len() - 4);
        let table_pos = read_pos(footer);
        if table_pos > content.len() {
            return Err(IndexError::Corrupted(format!(
                "version table position {} beyond block content of {} bytes",
                table_pos,
                content.len()
            )));
        }
        let (versions, table) = content.split_at(table_pos);
        Ok(Self { versions, table })
    }

    /// Next (version, version block) of the table
    fn read_entry(&self, reader: &mut ByteReader<'a>, offset: &mut usize) -> Result<(Version, &'a [u8])> {
        let version = reader.read_varint()?;
        let len = usize::try_from(reader.read_uvarint()?)
            .map_err(|_| IndexError::Corrupted("version block length overflow".to_string()))?;
        let end = offset
            .checked_add(len)
            .filter(|&end| end <= self.versions.len())
            .ok_or_else(|| {
                IndexError::Corrupted(format!(
                    "version {} block [{}, +{}) beyond {} bytes",
                    version,
                    offset,
                    len,
                    self.versions.len()
                ))
            })?;
        let data = &self.versions[*offset..end];
        *offset = end;
        Ok((version, data))
    }

    /// Every version in write order. Decodes the whole table.
    fn versions(&self) -> Result<Vec<Version>> {
        let mut reader = ByteReader::new(self.table);
        let count = reader.read_uvarint()?;
        let mut offset = 0;
        let mut versions = Vec::new();
        for _ in 0..count {
            versions.push(self.read_entry(&mut reader, &mut offset)?.0);
        }
        if !reader.is_empty() {
            return Err(IndexError::Corrupted(format!(
                "{} trailing bytes after version table",
                reader.remaining()
            )));
        }
        Ok(versions)
    }

    /// Block of `version`; entries after the first match are not decoded
    fn find(&self, version: Version) -> Result<Option<&'a [u8]>> {
        let mut reader = ByteReader::new(self.table);
        let count = reader.read_uvarint()?;
        let mut offset = 0;
        for _ in 0..count {
            let (v, data) = self.read_entry(&mut reader, &mut offset)?;
            if v == version {
                return Ok(Some(data));
            }
        }
        Ok(None)
    }
}

struct LutEntry {
    bitmap: RoaringBitmap,
    /// Dictionary index per series, in bitmap order
    values: Vec<u32>,
}

struct Lookup {
    /// Sequence of each requested key
    seqs: Vec<Option<usize>>,
    entries: BTreeMap<usize, LutEntry>,
}

struct VersionBlock<'a> {
    tag_keys: &'a [u8],
    series: &'a [u8],
    lut: &'a [u8],
    dict: &'a [u8],
}

impl<'a> VersionBlock<'a> {
    fn parse(block: &'a [u8], verify: bool) -> Result<Self> {
        if block.len() < VERSION_FOOTER_SIZE {
            return Err(insufficient(VERSION_FOOTER_SIZE, block.len()));
        }
        let body = split_crc32(block, "forward version", verify)?;
        let (content, footer) = body.split_at(body.len() - 12);
        let series_pos = read_pos(&footer[0..4]);
        let lut_pos = read_pos(&footer[4..8]);
        let dict_pos = read_pos(&footer[8..12]);
        if series_pos > lut_pos || lut_pos > dict_pos || dict_pos > content.len() {
            return Err(IndexError::Corrupted(format!(
                "version block footer out of range: series {}, lut {}, dict {}, size {}",
                series_pos,
                lut_pos,
                dict_pos,
                content.len()
            )));
        }
        Ok(Self {
            tag_keys: &content[..series_pos],
            series: &content[series_pos..lut_pos],
            lut: &content[lut_pos..dict_pos],
            dict: &content[dict_pos..],
        })
    }

    fn tag_keys(&self) -> Result<Vec<&'a str>> {
        let mut reader = ByteReader::new(self.tag_keys);
        let count = reader.read_len()?;
        let mut keys = Vec::with_capacity(count);
        for _ in 0..count {
            let key = std::str::from_utf8(reader.read_len_prefixed()?)
                .map_err(|e| IndexError::Corrupted(format!("tag key is not UTF-8: {}", e)))?;
            keys.push(key);
        }
        Ok(keys)
    }

    fn series(&self) -> Result<RoaringBitmap> {
        let mut reader = ByteReader::new(self.series);
        read_bitmap(reader.read_len_prefixed()?)
    }

    /// Map the requested keys to sequences and decode their LUT entries.
    ///
    /// The LUT is scanned forward up to the largest requested sequence;
    /// other entries are skipped by length.
    fn lookup(&self, requested: &[&str]) -> Result<Option<Lookup>> {
        let sequences: HashMap<&str, usize> = self
            .tag_keys()?
            .into_iter()
            .enumerate()
            .map(|(seq, key)| (key, seq))
            .collect();
        let seqs: Vec<Option<usize>> = requested
            .iter()
            .map(|key| sequences.get(key).copied())
            .collect();
        let wanted: BTreeSet<usize> = seqs.iter().flatten().copied().collect();
        let Some(&max_seq) = wanted.last() else {
            return Ok(None);
        };

        let mut reader = ByteReader::new(self.lut);
        let mut entries = BTreeMap::new();
        for seq in 0..=max_seq {
            if !wanted.contains(&seq) {
                reader.skip_len_prefixed()?;
                continue;
            }
            let mut entry = ByteReader::new(reader.read_len_prefixed()?);
            let bitmap = read_bitmap(entry.read_len_prefixed()?)?;
            let mut values = Vec::with_capacity(bitmap.len() as usize);
            for _ in 0..bitmap.len() {
                let idx = u32::try_from(entry.read_uvarint()?)
                    .map_err(|_| IndexError::Corrupted("dictionary index overflow".to_string()))?;
                values.push(idx);
            }
            if !entry.is_empty() {
                return Err(IndexError::Corrupted(format!(
                    "{} trailing bytes in lookup entry {}",
                    entry.remaining(),
                    seq
                )));
            }
            entries.insert(seq, LutEntry { bitmap, values });
        }
        Ok(Some(Lookup { seqs, entries }))
    }

    fn dict(&self) -> Result<Dictionary<'a>> {
        Dictionary::parse(self.dict)
    }
}

fn read_bitmap(data: &[u8]) -> Result<RoaringBitmap> {
    RoaringBitmap::deserialize_from(data)
        .map_err(|e| IndexError::Corrupted(format!("invalid series bitmap: {}", e)))
}

/// String dictionary split into Snappy-compressed groups
struct Dictionary<'a> {
    value_count: usize,
    group_size: usize,
    groups: Vec<&'a [u8]>,
}

impl<'a> Dictionary<'a> {
    fn parse(data: &'a [u8]) -> Result<Self> {
        let mut reader = ByteReader::new(data);
        let value_count = usize::try_from(reader.read_uvarint()?)
            .map_err(|_| IndexError::Corrupted("dictionary size overflow".to_string()))?;
        let group_size = usize::try_from(reader.read_uvarint()?)
            .map_err(|_| IndexError::Corrupted("dictionary group size overflow".to_string()))?;
        let group_count = reader.read_len()?;
        if group_size == 0 || group_count != value_count.div_ceil(group_size) {
            return Err(IndexError::Corrupted(format!(
                "dictionary of {} values in {} groups of {}",
                value_count, group_count, group_size
            )));
        }

        let mut lens = Vec::with_capacity(group_count);
        for _ in 0..group_count {
            lens.push(reader.read_len()?);
        }
        let total: usize = lens.iter().sum();
        if total != reader.remaining() {
            return Err(IndexError::Corrupted(format!(
                "dictionary groups are {} bytes, lengths add up to {}",
                reader.remaining(),
                total
            )));
        }
        let groups = lens
            .into_iter()
            .map(|len| reader.read_bytes(len))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self {
            value_count,
            group_size,
            groups,
        })
    }

    /// Resolve sorted dictionary indexes. Each group holding a needed index
    /// is decompressed once.
    fn resolve(
        &self,
        indexes: &BTreeSet<u32>,
        compressor: &mut BlockCompressor,
        scratch: &mut Vec<u8>,
    ) -> Result<HashMap<u32, String>> {
        let mut resolved = HashMap::with_capacity(indexes.len());
        let mut current: Option<usize> = None;
        let mut ranges: Vec<(usize, usize)> = Vec::with_capacity(self.group_size);

        for &idx in indexes {
            let i = idx as usize;
            if i >= self.value_count {
                return Err(IndexError::Corrupted(format!(
                    "dictionary index {} out of {} values",
                    idx, self.value_count
                )));
            }
            let group = i / self.group_size;
            if current != Some(group) {
                compressor.decompress_into(self.groups[group], scratch)?;
                ranges.clear();
                let mut reader = ByteReader::new(scratch);
                while !reader.is_empty() {
                    let len = reader.read_len()?;
                    let start = reader.position();
                    reader.skip(len)?;
                    ranges.push((start, start + len));
                }
                let expected = self.group_size.min(self.value_count - group * self.group_size);
                if ranges.len() != expected {
                    return Err(IndexError::Corrupted(format!(
                        "dictionary group {} holds {} values, expected {}",
                        group,
                        ranges.len(),
                        expected
                    )));
                }
                current = Some(group);
            }

            let (start, end) = ranges[i % self.group_size];
            let value = String::from_utf8(scratch[start..end].to_vec())
                .map_err(|e| IndexError::Corrupted(format!("tag value is not UTF-8: {}", e)))?;
            resolved.insert(idx, value);
        }
        Ok(resolved)
    }
}
