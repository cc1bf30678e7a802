//! Read shapes consumed by charts
//!
//! [`BalanceQuery`] turns stored balance records into a per-bucket series, a
//! per-category breakdown, or a gap-free series. [`ActivityQuery`] does the
//! same for activity time, stitching compressed months and the live hourly
//! store together.

use crate::activity::ActivityTracker;
use crate::balance::BalanceStore;
use crate::category::UNKNOWN_CATEGORY;
use chrono::{Datelike, NaiveDate, Timelike};
use chrono_tz::Tz;
use forumstat_core::aggregate::{aggregate_by_key, aggregate_by_time};
use forumstat_core::error::{ForumstatError, Result};
use forumstat_core::fill::{FillRange, fill_gaps};
use forumstat_core::granularity::{Granularity, date_start, to_local};
use forumstat_core::types::{BalanceRecord, HourlyRecord, TimeSeriesRecord, UsedTimeRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Category of synthetic records produced by gap filling
pub const INTERPOLATED: &str = "interpolated";

/// Owner of synthetic records when no real record exists to copy it from
pub const UNKNOWN_USER: &str = "unknown";

/// Inclusive time window in epoch ms; `None` leaves that side open
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: Option<i64>,
    pub end: Option<i64>,
}

impl TimeWindow {
    pub fn new(start: Option<i64>, end: Option<i64>) -> Self {
        Self { start, end }
    }

    /// No restriction at all
    pub fn all() -> Self {
        Self::default()
    }

    pub fn contains(&self, timestamp: i64) -> bool {
        self.start.is_none_or(|start| timestamp >= start)
            && self.end.is_none_or(|end| timestamp <= end)
    }

    /// Keep the records inside the window
    pub fn filter<T: TimeSeriesRecord>(&self, records: Vec<T>) -> Vec<T> {
        if self.start.is_none() && self.end.is_none() {
            return records;
        }
        records
            .into_iter()
            .filter(|record| self.contains(record.timestamp()))
            .collect()
    }

    /// The window as gap-fill bounds
    pub fn fill_range(&self) -> FillRange {
        FillRange::new(self.start, self.end)
    }
}

/// Reduce one time bucket of balance records.
///
/// Deltas are summed; balance, category and owner come from the record with
/// the latest timestamp (the last one among equal timestamps). The result is
/// stamped with the bucket start.
pub fn combine_latest(bucket: i64, mut group: Vec<BalanceRecord>) -> BalanceRecord {
    let delta = group.iter().map(|record| record.delta).sum();
    group.sort_by_key(|record| record.timestamp);
    match group.pop() {
        Some(latest) => BalanceRecord {
            timestamp: bucket,
            kind: latest.kind,
            delta,
            balance: latest.balance,
            username: latest.username,
        },
        None => BalanceRecord::new(bucket, UNKNOWN_CATEGORY, 0.0, 0.0),
    }
}

/// Synthetic record for a bucket without balance changes
///
/// Carries the balance of `left` forward with a zero delta.
pub fn interpolate_balance(bucket: i64, left: Option<&BalanceRecord>) -> BalanceRecord {
    BalanceRecord {
        timestamp: bucket,
        kind: INTERPOLATED.to_string(),
        delta: 0.0,
        balance: left.map_or(0.0, |record| record.balance),
        username: Some(
            left.and_then(|record| record.username.clone())
                .unwrap_or_else(|| UNKNOWN_USER.to_string()),
        ),
    }
}

/// Balance read shapes over a [`BalanceStore`]
#[derive(Clone)]
pub struct BalanceQuery {
    store: BalanceStore,
}

impl BalanceQuery {
    pub fn new(store: BalanceStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &BalanceStore {
        &self.store
    }

    fn tz(&self) -> &Tz {
        self.store.timezone()
    }

    async fn records(&self, user: &str, window: TimeWindow) -> Result<Vec<BalanceRecord>> {
        let records = self.store.load_user_records(user).await?;
        Ok(window.filter(records))
    }

    /// One record per non-empty bucket, ascending
    pub async fn by_time(
        &self,
        user: &str,
        granularity: Granularity,
        window: TimeWindow,
    ) -> Result<Vec<BalanceRecord>> {
        let records = self.records(user, window).await?;
        let mut series = aggregate_by_time(records, granularity, self.tz(), combine_latest);
        series.sort_by_key(|record| record.timestamp);
        Ok(series)
    }

    /// Summed delta per category, most recently active category first
    ///
    /// Timestamp and balance carry no meaning here and are 0.
    pub async fn by_category(&self, user: &str, window: TimeWindow) -> Result<Vec<BalanceRecord>> {
        let records = self.records(user, window).await?;
        Ok(aggregate_by_key(
            records,
            |record| record.kind.clone(),
            |kind, group| BalanceRecord {
                timestamp: 0,
                delta: group.iter().map(|record| record.delta).sum(),
                balance: 0.0,
                username: group.into_iter().find_map(|record| record.username),
                kind,
            },
        ))
    }

    /// [`Self::by_time`] with every empty bucket interpolated
    ///
    /// The series spans the window where it is bounded and the data elsewhere.
    pub async fn filled(
        &self,
        user: &str,
        granularity: Granularity,
        window: TimeWindow,
    ) -> Result<Vec<BalanceRecord>> {
        let series = self.by_time(user, granularity, window).await?;
        fill_gaps(
            series,
            granularity,
            self.tz(),
            window.fill_range(),
            interpolate_balance,
        )
    }
}

/// Activity read shapes over an [`ActivityTracker`]
#[derive(Clone)]
pub struct ActivityQuery {
    tracker: ActivityTracker,
}

impl ActivityQuery {
    pub fn new(tracker: ActivityTracker) -> Self {
        Self { tracker }
    }

    fn tz(&self) -> &Tz {
        &self.tracker.config().tz
    }

    /// Hourly seconds of the current month, one record per hour
    pub async fn hourly(&self, user: &str, window: TimeWindow) -> Result<Vec<UsedTimeRecord>> {
        let records = window.filter(self.tracker.current_month_records(user).await?);
        fill_gaps(
            records,
            Granularity::Hour,
            self.tz(),
            window.fill_range(),
            |hour, _| UsedTimeRecord::new(hour, 0),
        )
    }

    /// Daily seconds of `year`, one record per day
    ///
    /// Compressed months and the live hourly store are merged. Open window
    /// sides default to the first and last day of the year.
    pub async fn daily(
        &self,
        user: &str,
        year: i32,
        window: TimeWindow,
    ) -> Result<Vec<UsedTimeRecord>> {
        let tz = self.tz();
        let (year_start, year_end) = year_bounds(year, tz)?;

        let months = self.tracker.year_months(user, year).await?;
        let compressed: HashSet<u32> = months.iter().map(|m| m.month).collect();
        let mut records: Vec<UsedTimeRecord> = months
            .into_iter()
            .flat_map(|month| month.daily_records)
            .collect();
        records.extend(
            self.tracker
                .current_month_records(user)
                .await?
                .into_iter()
                .filter(|r| live_in_year(r.timestamp, year, &compressed, tz)),
        );

        let per_day = aggregate_by_time(records, Granularity::Day, tz, |day, group| {
            UsedTimeRecord::new(day, group.iter().map(|r| r.seconds).sum())
        });
        let range = FillRange::between(
            window.start.unwrap_or(year_start),
            window.end.unwrap_or(year_end),
        );
        fill_gaps(
            per_day,
            Granularity::Day,
            tz,
            range,
            |day, _| UsedTimeRecord::new(day, 0),
        )
    }

    /// Seconds per hour of day across `year`, always 24 entries
    pub async fn hour_of_day(&self, user: &str, year: i32) -> Result<Vec<HourlyRecord>> {
        let tz = self.tz();
        let mut totals = [0u64; 24];

        let months = self.tracker.year_months(user, year).await?;
        let compressed: HashSet<u32> = months.iter().map(|m| m.month).collect();
        for month in months {
            for record in month.hourly_records {
                if let Some(slot) = totals.get_mut(record.hour as usize) {
                    *slot += record.seconds;
                }
            }
        }
        for record in self.tracker.current_month_records(user).await? {
            if live_in_year(record.timestamp, year, &compressed, tz)
                && let Some(local) = to_local(record.timestamp, tz)
            {
                totals[local.hour() as usize] += record.seconds;
            }
        }

        Ok(totals
            .into_iter()
            .zip(0u32..)
            .map(|(seconds, hour)| HourlyRecord { hour, seconds })
            .collect())
    }
}

/// Whether a live hourly record counts toward `year`: it lies in that year
/// and its month is not already in the year list
fn live_in_year(timestamp: i64, year: i32, compressed: &HashSet<u32>, tz: &Tz) -> bool {
    to_local(timestamp, tz)
        .is_some_and(|local| local.year() == year && !compressed.contains(&local.month0()))
}

/// Start of Jan 1 and start of Dec 31 of `year`
pub fn year_bounds(year: i32, tz: &Tz) -> Result<(i64, i64)> {
    let invalid = || ForumstatError::InvalidDate(format!("year {year} is out of range"));
    let first = NaiveDate::from_ymd_opt(year, 1, 1).ok_or_else(invalid)?;
    let last = NaiveDate::from_ymd_opt(year, 12, 31).ok_or_else(invalid)?;
    Ok((
        date_start(first, tz).ok_or_else(invalid)?,
        date_start(last, tz).ok_or_else(invalid)?,
    ))
}
