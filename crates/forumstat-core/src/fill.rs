//! Gap filling for sparse time series
//!
//! Charts need one value per bucket while source data only exists where
//! something happened. [`fill_gaps`] walks every bucket of a range and emits
//! either the real record sitting exactly on that bucket or a synthetic one
//! produced by the caller's generator.

use crate::error::{ForumstatError, Result};
use crate::granularity::{Buckets, Granularity, bucket_start};
use crate::types::TimeSeriesRecord;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Optional bounds of a filled series (epoch ms, inclusive)
///
/// `None` means "derive from the data".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillRange {
    pub start: Option<i64>,
    pub end: Option<i64>,
}

impl FillRange {
    pub fn new(start: Option<i64>, end: Option<i64>) -> Self {
        Self { start, end }
    }

    /// Span exactly the records given
    pub fn from_data() -> Self {
        Self::default()
    }

    pub fn between(start: i64, end: i64) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    pub fn is_unspecified(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}

/// Produce a gap-free series at `granularity`.
///
/// Range resolution: an unspecified start falls back to the first record's
/// timestamp (or the end), an unspecified end to the last record's timestamp
/// (or the start). Both bounds are truncated to their bucket start. With no
/// records and no bounds the result is empty.
///
/// Records are sorted ascending; when several share a timestamp the one
/// positioned last wins. For each bucket a record whose timestamp equals the
/// bucket start is emitted unchanged and becomes the new left neighbour.
/// Every other bucket is produced by `generate(bucket, left)`, where `left`
/// is the nearest preceding real record. Buckets before the first real record
/// see the first record as their neighbour; `left` is only `None` when there
/// are no records at all.
///
/// Records that do not sit on a bucket start are never emitted, so callers
/// usually aggregate to the same granularity first.
///
/// # Errors
///
/// [`ForumstatError::InvalidRange`] when the bucketed end precedes the
/// bucketed start.
///
/// # Examples
///
/// ```
/// use forumstat_core::fill::{fill_gaps, FillRange};
/// use forumstat_core::granularity::Granularity;
/// use forumstat_core::types::UsedTimeRecord;
///
/// let hour = 3_600_000;
/// let filled = fill_gaps(
///     vec![UsedTimeRecord::new(0, 10)],
///     Granularity::Hour,
///     &chrono_tz::UTC,
///     FillRange::between(0, 2 * hour),
///     |t, left| UsedTimeRecord::new(t, left.map_or(0, |r| r.seconds)),
/// )
/// .unwrap();
/// assert_eq!(filled.len(), 3);
/// assert!(filled.iter().all(|r| r.seconds == 10));
/// ```
pub fn fill_gaps<T, I, G>(
    records: I,
    granularity: Granularity,
    tz: &Tz,
    range: FillRange,
    mut generate: G,
) -> Result<Vec<T>>
where
    T: TimeSeriesRecord + Clone,
    I: IntoIterator<Item = T>,
    G: FnMut(i64, Option<&T>) -> T,
{
    let mut sorted: Vec<T> = records.into_iter().collect();
    if sorted.is_empty() && range.is_unspecified() {
        return Ok(Vec::new());
    }
    sorted.sort_by_key(|record| record.timestamp());

    let first = sorted.first().map(|r| r.timestamp());
    let last = sorted.last().map(|r| r.timestamp());
    let (start, end) = match (range.start, range.end) {
        (Some(start), Some(end)) => (start, end),
        (Some(start), None) => (start, last.unwrap_or(start)),
        (None, Some(end)) => (first.unwrap_or(end), end),
        (None, None) => match (first, last) {
            (Some(first), Some(last)) => (first, last),
            _ => return Ok(Vec::new()),
        },
    };

    let start = bucket_start(start, granularity, tz);
    let end = bucket_start(end, granularity, tz);
    if end < start {
        return Err(ForumstatError::InvalidRange { start, end });
    }

    let mut by_timestamp: HashMap<i64, usize> = HashMap::with_capacity(sorted.len());
    for (position, record) in sorted.iter().enumerate() {
        by_timestamp.insert(record.timestamp(), position);
    }

    let mut left = if sorted.is_empty() { None } else { Some(0) };
    let mut filled = Vec::new();
    for bucket in Buckets::new(start, end, granularity, *tz) {
        match by_timestamp.get(&bucket) {
            Some(&position) => {
                filled.push(sorted[position].clone());
                left = Some(position);
            }
            None => filled.push(generate(bucket, left.map(|position| &sorted[position]))),
        }
    }

    Ok(filled)
}
