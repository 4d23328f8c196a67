//! RusTs Core - Shared types for the tag/series index
//!
//! This crate provides the identifiers and small value types used throughout
//! the index crates:
//! - `SeriesId`, `MetricId`, `TagKeyId`, `FieldId`: numeric identifiers
//! - `Version`: write version scoping a set of postings
//! - `TimeRange`: half-open time window attached to a version
//! - `FieldType`: aggregation type of a metric field

pub mod error;
pub mod types;

pub use error::{CoreError, Result};
pub use types::*;
