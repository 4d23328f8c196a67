//! Core data types for the RusTs tag/series index

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Nanosecond-precision Unix epoch timestamp
pub type Timestamp = i64;

/// Series identifier. Postings are roaring bitmaps, so ids are 32-bit.
pub type SeriesId = u32;

/// Metric (measurement) identifier
pub type MetricId = u32;

/// Tag key identifier, unique per metric and tag key
pub type TagKeyId = u32;

/// Field identifier within a metric
pub type FieldId = u16;

/// Write version. Versions grow monotonically with every flush cycle.
pub type Version = i64;

/// Aggregation type of a metric field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Sum,
    Min,
    Max,
    Last,
    First,
    Gauge,
}

impl FieldType {
    /// Stable one-byte code used in persisted metadata blocks
    pub fn code(self) -> u8 {
        match self {
            FieldType::Sum => 1,
            FieldType::Min => 2,
            FieldType::Max => 3,
            FieldType::Last => 4,
            FieldType::First => 5,
            FieldType::Gauge => 6,
        }
    }

    /// Decode a persisted field type code
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            1 => Ok(FieldType::Sum),
            2 => Ok(FieldType::Min),
            3 => Ok(FieldType::Max),
            4 => Ok(FieldType::Last),
            5 => Ok(FieldType::First),
            6 => Ok(FieldType::Gauge),
            other => Err(CoreError::UnknownFieldType(other)),
        }
    }

    /// Get the type name of this field type
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldType::Sum => "sum",
            FieldType::Min => "min",
            FieldType::Max => "max",
            FieldType::Last => "last",
            FieldType::First => "first",
            FieldType::Gauge => "gauge",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

impl FromStr for FieldType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sum" => Ok(FieldType::Sum),
            "min" => Ok(FieldType::Min),
            "max" => Ok(FieldType::Max),
            "last" => Ok(FieldType::Last),
            "first" => Ok(FieldType::First),
            "gauge" => Ok(FieldType::Gauge),
            _ => Err(CoreError::UnknownFieldTypeName(s.to_string())),
        }
    }
}

/// Time range of a write version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    /// Start timestamp (inclusive)
    pub start: Timestamp,
    /// End timestamp (exclusive)
    pub end: Timestamp,
}

impl TimeRange {
    /// Create a new time range
    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        Self { start, end }
    }

    /// Create a time range, rejecting `start > end`
    pub fn try_new(start: Timestamp, end: Timestamp) -> Result<Self> {
        if start > end {
            return Err(CoreError::InvalidTimeRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Check if a timestamp falls within this range
    pub fn contains(&self, ts: Timestamp) -> bool {
        ts >= self.start && ts < self.end
    }

    /// Check if this range overlaps with another
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Smallest range covering both `self` and `other`
    pub fn union(&self, other: &TimeRange) -> TimeRange {
        TimeRange {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

impl Default for TimeRange {
    fn default() -> Self {
        Self {
            start: i64::MIN,
            end: i64::MAX,
        }
    }
}
