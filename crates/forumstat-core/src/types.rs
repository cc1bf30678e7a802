//! Core record types for forumstat
//!
//! Every chart and summary is built from these records. Timestamps are
//! milliseconds since the Unix epoch throughout.

use serde::{Deserialize, Serialize};

/// Anything the aggregation and gap-filling engines can place on a time axis.
pub trait TimeSeriesRecord {
    /// Milliseconds since the Unix epoch
    fn timestamp(&self) -> i64;
}

/// A single balance change of a forum user
///
/// # Examples
/// ```
/// use forumstat_core::types::{BalanceRecord, TimeSeriesRecord};
///
/// let record = BalanceRecord::new(1_700_000_000_000, "每日登录奖励", 12.0, 1034.5)
///     .with_username("alice");
/// assert_eq!(record.timestamp(), 1_700_000_000_000);
/// assert_eq!(record.username.as_deref(), Some("alice"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceRecord {
    /// When the change happened
    pub timestamp: i64,
    /// Category label, e.g. "每日登录奖励"
    #[serde(rename = "type")]
    pub kind: String,
    /// Signed change of the balance
    pub delta: f64,
    /// Running balance right after this change
    pub balance: f64,
    /// Owner of the record; absent on some synthetic records
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl BalanceRecord {
    /// Create a record without an owner
    pub fn new(timestamp: i64, kind: impl Into<String>, delta: f64, balance: f64) -> Self {
        Self {
            timestamp,
            kind: kind.into(),
            delta,
            balance,
            username: None,
        }
    }

    /// Attach an owner
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }
}

impl TimeSeriesRecord for BalanceRecord {
    fn timestamp(&self) -> i64 {
        self.timestamp
    }
}

/// A balance change as a page source yields it, before an owner is attached
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawBalanceRecord {
    pub timestamp: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub delta: f64,
    pub balance: f64,
}

impl RawBalanceRecord {
    /// Attach the crawled user
    pub fn into_record(self, username: &str) -> BalanceRecord {
        BalanceRecord {
            timestamp: self.timestamp,
            kind: self.kind,
            delta: self.delta,
            balance: self.balance,
            username: Some(username.to_string()),
        }
    }
}

/// Storage form of [`BalanceRecord`]: `[timestamp, typeId, delta, balance]`
///
/// Serializes as a 4-element JSON array.
///
/// ```
/// use forumstat_core::types::CompactBalanceRecord;
///
/// let compact = CompactBalanceRecord(1_700_000_000_000, 3, -5.0, 100.25);
/// assert_eq!(
///     serde_json::to_string(&compact).unwrap(),
///     "[1700000000000,3,-5.0,100.25]"
/// );
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompactBalanceRecord(pub i64, pub u32, pub f64, pub f64);

impl CompactBalanceRecord {
    pub fn timestamp(&self) -> i64 {
        self.0
    }

    pub fn type_id(&self) -> u32 {
        self.1
    }

    pub fn delta(&self) -> f64 {
        self.2
    }

    pub fn balance(&self) -> f64 {
        self.3
    }

    /// Bit-exact identity used for de-duplication
    pub fn identity(&self) -> (i64, u32, u64, u64) {
        (self.0, self.1, self.2.to_bits(), self.3.to_bits())
    }
}

impl TimeSeriesRecord for CompactBalanceRecord {
    fn timestamp(&self) -> i64 {
        self.0
    }
}

/// Active seconds attributed to one time bucket (an hour in the live store,
/// a day inside [`MonthAggData`])
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsedTimeRecord {
    pub timestamp: i64,
    pub seconds: u64,
}

impl UsedTimeRecord {
    pub fn new(timestamp: i64, seconds: u64) -> Self {
        Self { timestamp, seconds }
    }
}

impl TimeSeriesRecord for UsedTimeRecord {
    fn timestamp(&self) -> i64 {
        self.timestamp
    }
}

/// Total seconds spent in one hour of the day (0-23) over some period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourlyRecord {
    pub hour: u32,
    pub seconds: u64,
}

/// Compressed activity of one closed month
///
/// Written once when the month is rolled up and never changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthAggData {
    /// 0-based month index
    pub month: u32,
    /// One entry per hour of day, 0 through 23
    pub hourly_records: Vec<HourlyRecord>,
    /// One entry per calendar day of the month
    pub daily_records: Vec<UsedTimeRecord>,
}

impl MonthAggData {
    /// Total seconds in the month
    pub fn total_seconds(&self) -> u64 {
        self.daily_records.iter().map(|d| d.seconds).sum()
    }
}
