//! Core types, traits, and algorithms for forumstat
//!
//! This crate provides the record types, time bucketing, the aggregation and
//! gap-filling engines, error handling, timezone configuration, and the
//! storage trait used by all other forumstat crates.

pub mod aggregate;
pub mod error;
pub mod fill;
pub mod granularity;
pub mod storage;
pub mod timezone;
pub mod types;

#[cfg(test)]
pub mod test_utils;

// Re-export commonly used types
pub use error::{ForumstatError, Result};
pub use granularity::Granularity;
pub use types::{
    BalanceRecord, CompactBalanceRecord, HourlyRecord, MonthAggData, RawBalanceRecord,
    TimeSeriesRecord, UsedTimeRecord,
};
