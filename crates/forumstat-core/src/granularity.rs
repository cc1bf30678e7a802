//! Time bucketing by granularity
//!
//! All bucket boundaries are computed in a caller-supplied timezone. The same
//! timezone is expected to be used for display (see [`format_bucket`]), so a
//! bucket labelled "2024-03-01" always starts at local midnight of that day.
//!
//! Minute and hour buckets step by a fixed duration. Day, month and year
//! buckets are calendar-aware: the next bucket is constructed from the next
//! local calendar date, so DST changes, month lengths and leap years never
//! make the series drift.

use chrono::{
    DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveDateTime, Offset, TimeZone,
};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;

const MINUTE_MS: i64 = 60_000;
const HOUR_MS: i64 = 3_600_000;

/// Time granularity of a bucketed series
///
/// # Examples
/// ```
/// use forumstat_core::granularity::Granularity;
/// use std::str::FromStr;
///
/// assert_eq!(Granularity::from_str("day").unwrap(), Granularity::Day);
/// assert_eq!(Granularity::Month.to_string(), "month");
/// assert!(Granularity::from_str("week").is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Minute,
    Hour,
    Day,
    Month,
    Year,
}

impl Granularity {
    /// All granularities from finest to coarsest
    pub const ALL: [Granularity; 5] = [
        Granularity::Minute,
        Granularity::Hour,
        Granularity::Day,
        Granularity::Month,
        Granularity::Year,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Minute => "minute",
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Month => "month",
            Self::Year => "year",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "minute" => Ok(Self::Minute),
            "hour" => Ok(Self::Hour),
            "day" => Ok(Self::Day),
            "month" => Ok(Self::Month),
            "year" => Ok(Self::Year),
            _ => Err(format!("Invalid granularity: {s}")),
        }
    }
}

/// Convert epoch milliseconds to a zoned datetime
pub fn to_local(timestamp: i64, tz: &Tz) -> Option<DateTime<Tz>> {
    DateTime::from_timestamp_millis(timestamp).map(|utc| utc.with_timezone(tz))
}

/// Map a local wall-clock time to an instant.
///
/// Ambiguous times take the earlier instant; times inside a DST gap move to
/// the first valid minute after the gap.
fn resolve_local(tz: &Tz, naive: NaiveDateTime) -> DateTime<Tz> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(earliest, _) => earliest,
        LocalResult::None => (1..=24 * 60)
            .find_map(|m| {
                tz.from_local_datetime(&(naive + Duration::minutes(m)))
                    .earliest()
            })
            .unwrap_or_else(|| tz.from_utc_datetime(&naive)),
    }
}

/// Instant of local midnight starting `date`
pub fn date_start(date: NaiveDate, tz: &Tz) -> Option<i64> {
    date.and_hms_opt(0, 0, 0)
        .map(|naive| resolve_local(tz, naive).timestamp_millis())
}

/// Floor `value` to a multiple of `step` (towards negative infinity)
fn floor_to(value: i64, step: i64) -> i64 {
    value.div_euclid(step) * step
}

/// Start of the bucket containing `timestamp`
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use forumstat_core::granularity::{bucket_start, Granularity};
///
/// let t = Utc.with_ymd_and_hms(2024, 2, 29, 10, 30, 15).unwrap().timestamp_millis();
/// let month = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap().timestamp_millis();
/// assert_eq!(bucket_start(t, Granularity::Month, &chrono_tz::UTC), month);
/// ```
pub fn bucket_start(timestamp: i64, granularity: Granularity, tz: &Tz) -> i64 {
    let Some(local) = to_local(timestamp, tz) else {
        return timestamp;
    };

    match granularity {
        // Truncate in the offset in effect at `timestamp`, so a repeated
        // wall-clock hour still yields a bucket containing the instant.
        Granularity::Minute | Granularity::Hour => {
            let offset_ms = i64::from(local.offset().fix().local_minus_utc()) * 1000;
            let step = if granularity == Granularity::Minute {
                MINUTE_MS
            } else {
                HOUR_MS
            };
            floor_to(timestamp + offset_ms, step) - offset_ms
        }
        Granularity::Day => date_start(local.date_naive(), tz).unwrap_or(timestamp),
        Granularity::Month => NaiveDate::from_ymd_opt(local.year(), local.month(), 1)
            .and_then(|date| date_start(date, tz))
            .unwrap_or(timestamp),
        Granularity::Year => NaiveDate::from_ymd_opt(local.year(), 1, 1)
            .and_then(|date| date_start(date, tz))
            .unwrap_or(timestamp),
    }
}

/// Start of the bucket following the one that begins at `timestamp`
///
/// Minute and hour add a fixed duration. Day, month and year build the next
/// calendar date directly.
pub fn next_bucket_start(timestamp: i64, granularity: Granularity, tz: &Tz) -> i64 {
    match granularity {
        Granularity::Minute => timestamp + MINUTE_MS,
        Granularity::Hour => timestamp + HOUR_MS,
        Granularity::Day | Granularity::Month | Granularity::Year => {
            let Some(local) = to_local(timestamp, tz) else {
                return timestamp;
            };
            let date = local.date_naive();
            let next = match granularity {
                Granularity::Day => date.succ_opt(),
                Granularity::Month => {
                    if date.month() == 12 {
                        NaiveDate::from_ymd_opt(date.year() + 1, 1, 1)
                    } else {
                        NaiveDate::from_ymd_opt(date.year(), date.month() + 1, 1)
                    }
                }
                _ => NaiveDate::from_ymd_opt(date.year() + 1, 1, 1),
            };
            next.and_then(|date| date_start(date, tz))
                .unwrap_or(timestamp)
        }
    }
}

/// Iterator over consecutive bucket starts in `[start, end]`
///
/// `start` should already be a bucket start; `end` is inclusive.
#[derive(Debug, Clone)]
pub struct Buckets {
    next: Option<i64>,
    end: i64,
    granularity: Granularity,
    tz: Tz,
}

impl Buckets {
    pub fn new(start: i64, end: i64, granularity: Granularity, tz: Tz) -> Self {
        Self {
            next: (start <= end).then_some(start),
            end,
            granularity,
            tz,
        }
    }
}

impl Iterator for Buckets {
    type Item = i64;

    fn next(&mut self) -> Option<i64> {
        let current = self.next?;
        let following = next_bucket_start(current, self.granularity, &self.tz);
        self.next = (following > current && following <= self.end).then_some(following);
        Some(current)
    }
}

/// Human-readable label of a bucket in the same timezone used for bucketing
pub fn format_bucket(timestamp: i64, granularity: Granularity, tz: &Tz) -> String {
    let Some(local) = to_local(timestamp, tz) else {
        return timestamp.to_string();
    };
    let pattern = match granularity {
        Granularity::Minute => "%Y-%m-%d %H:%M",
        Granularity::Hour => "%Y-%m-%d %H:00",
        Granularity::Day => "%Y-%m-%d",
        Granularity::Month => "%Y-%m",
        Granularity::Year => "%Y",
    };
    local.format(pattern).to_string()
}
