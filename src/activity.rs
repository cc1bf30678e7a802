//! Activity time tracking with monthly rollup
//!
//! Active seconds are kept at hour resolution for the current month only.
//! Once the wall clock has moved into a new month, every closed month is
//! compressed into a [`MonthAggData`] (seconds per hour of day and per
//! calendar day) appended to that year's list, and its hourly detail is
//! dropped.
//!
//! Per user the namespace holds:
//!
//! - `usedTime`: hourly records of the current month, ascending
//! - `usedTimeMonthStart`: start of the month the hourly store belongs to
//! - `usedTimeLastUpdate`: timestamp of the last accepted update
//! - `usedTimeYear:<year>`: compressed months of that year
//!
//! Compression writes the year lists first, then the trimmed hourly store,
//! then the month marker. A run interrupted in between is resumed by the next
//! one; months already present in a year list are not appended twice.

use crate::config::TrackerConfig;
use crate::keys::StorageKeys;
use chrono::{Datelike, Timelike};
use forumstat_core::aggregate::{aggregate_by_key, aggregate_by_time};
use forumstat_core::error::{ForumstatError, Result};
use forumstat_core::fill::{FillRange, fill_gaps};
use forumstat_core::granularity::{Granularity, bucket_start, next_bucket_start, to_local};
use forumstat_core::storage::{Storage, StorageExt};
use forumstat_core::types::{HourlyRecord, MonthAggData, UsedTimeRecord};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Result of [`ActivityTracker::update_month_time_record`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Too close to the previous accepted update; nothing was written
    Debounced,
    /// Seconds were added to an existing hour record
    Merged(UsedTimeRecord),
    /// A new hour record was inserted
    Inserted(UsedTimeRecord),
    /// The record belongs to a month that is already rolled up; nothing was
    /// written for it
    ClosedMonth,
}

/// Why a compression run did nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoStore,
    NoMonthMarker,
    NothingToCompress,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NoStore => write!(f, "no current-month store"),
            SkipReason::NoMonthMarker => write!(f, "no current-month marker"),
            SkipReason::NothingToCompress => write!(f, "nothing to compress"),
        }
    }
}

/// A compressed month, `month` 0-based
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MonthKey {
    pub year: i32,
    pub month: u32,
}

/// Result of [`ActivityTracker::compress`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompressOutcome {
    Compressed {
        /// Months appended to a year list
        months: Vec<MonthKey>,
        /// Months found already compressed by an earlier run
        already_present: Vec<MonthKey>,
        /// Hourly records folded into the months
        records: usize,
        /// Hourly records left in the current-month store
        kept: usize,
    },
    Skipped(SkipReason),
}

/// Records and rolls up activity time of users in one namespace
#[derive(Clone)]
pub struct ActivityTracker {
    storage: Arc<dyn Storage>,
    keys: StorageKeys,
    config: TrackerConfig,
}

impl ActivityTracker {
    pub fn new(storage: Arc<dyn Storage>, keys: StorageKeys, config: TrackerConfig) -> Self {
        Self {
            storage,
            keys,
            config,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Hourly records of the current month, ascending
    pub async fn current_month_records(&self, user: &str) -> Result<Vec<UsedTimeRecord>> {
        self.storage
            .get_or(&self.keys.used_time_month(user), Vec::new())
            .await
    }

    /// Compressed months of `year`, ordered by month
    pub async fn year_months(&self, user: &str, year: i32) -> Result<Vec<MonthAggData>> {
        self.storage
            .get_or(&self.keys.used_time_year(user, year), Vec::new())
            .await
    }

    /// Add `record.seconds` to the hour containing `record.timestamp`
    ///
    /// Updates closer than the configured minimum interval to the last
    /// accepted one are dropped without touching storage. When `now` lies in
    /// a later month than the hourly store, closed months are compressed
    /// first. Records older than the current month are rejected with
    /// [`UpdateOutcome::ClosedMonth`].
    pub async fn update_month_time_record(
        &self,
        user: &str,
        record: UsedTimeRecord,
        now: i64,
    ) -> Result<UpdateOutcome> {
        let tz = &self.config.tz;
        let last_update_key = self.keys.used_time_last_update(user);

        if let Some(last) = self.storage.get::<i64>(&last_update_key).await?
            && record.timestamp - last < self.config.min_update_interval_ms()
        {
            debug!(
                "Debounced activity update for {}: {}ms after the last one",
                user,
                record.timestamp - last
            );
            return Ok(UpdateOutcome::Debounced);
        }

        let marker_key = self.keys.used_time_month_start(user);
        let month_now = bucket_start(now, Granularity::Month, tz);
        let marker = match self.storage.get::<i64>(&marker_key).await? {
            None => {
                self.storage.set(&marker_key, &month_now).await?;
                month_now
            }
            Some(marker) if month_now > marker => {
                if let CompressOutcome::Skipped(_) = self.compress(user, now).await? {
                    self.storage.set(&marker_key, &month_now).await?;
                }
                month_now
            }
            Some(marker) => marker,
        };

        let hour = bucket_start(record.timestamp, Granularity::Hour, tz);
        if hour < marker {
            debug!(
                "Rejected activity update for {}: hour {} precedes the current month {}",
                user,
                hour,
                marker
            );
            return Ok(UpdateOutcome::ClosedMonth);
        }

        let store_key = self.keys.used_time_month(user);
        let mut store: Vec<UsedTimeRecord> = self.storage.get_or(&store_key, Vec::new()).await?;

        let outcome = match store.binary_search_by_key(&hour, |r| r.timestamp) {
            Ok(position) => {
                store[position].seconds += record.seconds;
                UpdateOutcome::Merged(store[position])
            }
            Err(position) => {
                let inserted = UsedTimeRecord::new(hour, record.seconds);
                store.insert(position, inserted);
                UpdateOutcome::Inserted(inserted)
            }
        };

        self.storage.set(&store_key, &store).await?;
        self.storage
            .set(&last_update_key, &record.timestamp)
            .await?;
        Ok(outcome)
    }

    /// Roll every month before the one containing `now` into its year list
    ///
    /// Missing state or an empty closed period is a logged no-op.
    pub async fn compress(&self, user: &str, now: i64) -> Result<CompressOutcome> {
        let tz = &self.config.tz;
        let store_key = self.keys.used_time_month(user);
        let marker_key = self.keys.used_time_month_start(user);

        let Some(store) = self.storage.get::<Vec<UsedTimeRecord>>(&store_key).await? else {
            debug!("Skipping compression for {}: {}", user, SkipReason::NoStore);
            return Ok(CompressOutcome::Skipped(SkipReason::NoStore));
        };
        if self.storage.get::<i64>(&marker_key).await?.is_none() {
            debug!("Skipping compression for {}: {}", user, SkipReason::NoMonthMarker);
            return Ok(CompressOutcome::Skipped(SkipReason::NoMonthMarker));
        }

        let boundary = bucket_start(now, Granularity::Month, tz);
        let (closed, kept): (Vec<_>, Vec<_>) =
            store.into_iter().partition(|r| r.timestamp < boundary);
        if closed.is_empty() {
            debug!("Skipping compression for {}: {}", user, SkipReason::NothingToCompress);
            return Ok(CompressOutcome::Skipped(SkipReason::NothingToCompress));
        }

        let record_count = closed.len();
        let mut per_year: BTreeMap<i32, Vec<MonthAggData>> = BTreeMap::new();
        for (month_start, records) in
            aggregate_by_time(closed, Granularity::Month, tz, |start, group| (start, group))
        {
            let local = to_local(month_start, tz).ok_or_else(|| {
                ForumstatError::InvalidDate(format!("month start {month_start} is out of range"))
            })?;
            let month = build_month_agg(month_start, records, &self.config)?;
            per_year.entry(local.year()).or_default().push(month);
        }

        let mut months = Vec::new();
        let mut already_present = Vec::new();
        for (year, compressed) in per_year {
            let key = self.keys.used_time_year(user, year);
            let mut list: Vec<MonthAggData> = self.storage.get_or(&key, Vec::new()).await?;
            let mut present: HashSet<u32> = list.iter().map(|m| m.month).collect();

            let before = list.len();
            for month in compressed {
                let month_key = MonthKey {
                    year,
                    month: month.month,
                };
                if present.insert(month.month) {
                    list.push(month);
                    months.push(month_key);
                } else {
                    debug!("Month {}-{} already compressed, skipping", year, month.month + 1);
                    already_present.push(month_key);
                }
            }

            if list.len() != before {
                list.sort_by_key(|m| m.month);
                self.storage.set(&key, &list).await?;
            }
        }

        let kept_count = kept.len();
        self.storage.set(&store_key, &kept).await?;
        self.storage.set(&marker_key, &boundary).await?;

        info!(
            "Compressed {} hourly records of {} into {} month(s), {} kept",
            record_count,
            user,
            months.len(),
            kept_count
        );
        Ok(CompressOutcome::Compressed {
            months,
            already_present,
            records: record_count,
            kept: kept_count,
        })
    }
}

/// Summarize the hourly records of the month starting at `month_start`
///
/// `hourly_records` always has 24 entries and `daily_records` one entry per
/// calendar day of the month, zero where nothing was recorded.
pub fn build_month_agg(
    month_start: i64,
    records: Vec<UsedTimeRecord>,
    config: &TrackerConfig,
) -> Result<MonthAggData> {
    let tz = &config.tz;
    let local_start = to_local(month_start, tz).ok_or_else(|| {
        ForumstatError::InvalidDate(format!("month start {month_start} is out of range"))
    })?;

    let mut hourly_records: Vec<HourlyRecord> = (0..24)
        .map(|hour| HourlyRecord { hour, seconds: 0 })
        .collect();
    let per_hour = aggregate_by_key(
        records.iter().copied(),
        |r| to_local(r.timestamp, tz).map_or(0, |local| local.hour()),
        |hour, group| (hour, group.iter().map(|r| r.seconds).sum::<u64>()),
    );
    for (hour, seconds) in per_hour {
        if let Some(slot) = hourly_records.get_mut(hour as usize) {
            slot.seconds += seconds;
        }
    }

    let per_day = aggregate_by_time(records, Granularity::Day, tz, |day, group| {
        UsedTimeRecord::new(day, group.iter().map(|r| r.seconds).sum())
    });
    let month_end = next_bucket_start(month_start, Granularity::Month, tz) - 1;
    let daily_records = fill_gaps(
        per_day,
        Granularity::Day,
        tz,
        FillRange::between(month_start, month_end),
        |day, _| UsedTimeRecord::new(day, 0),
    )?;

    Ok(MonthAggData {
        month: local_start.month0(),
        hourly_records,
        daily_records,
    })
}

/// Tracks which frames have started activity collection
///
/// Each frame initializes at most once until it is torn down.
#[derive(Debug, Default)]
pub struct CollectorLifecycle {
    frames: HashSet<String>,
}

impl CollectorLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `frame` initialized; `false` when it already was
    pub fn try_init(&mut self, frame: &str) -> bool {
        let fresh = self.frames.insert(frame.to_string());
        if fresh {
            debug!("Activity collection started in frame {}", frame);
        }
        fresh
    }

    pub fn is_initialized(&self, frame: &str) -> bool {
        self.frames.contains(frame)
    }

    /// Forget `frame`; `false` when it was not initialized
    pub fn teardown(&mut self, frame: &str) -> bool {
        self.frames.remove(frame)
    }

    pub fn active_frames(&self) -> usize {
        self.frames.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forumstat_storage::MemoryStorage;

    const HOUR: i64 = 3_600_000;
    // 2024-03-10T10:00:00Z
    const T0: i64 = 1_710_064_800_000;
    // 2024-04-02T00:00:00Z
    const APRIL: i64 = 1_712_016_000_000;

    fn tracker() -> (Arc<MemoryStorage>, ActivityTracker) {
        let storage = Arc::new(MemoryStorage::new());
        let tracker = ActivityTracker::new(
            storage.clone(),
            StorageKeys::new("fs"),
            TrackerConfig::default(),
        );
        (storage, tracker)
    }

    #[tokio::test]
    async fn test_same_hour_updates_accumulate() {
        let (_, tracker) = tracker();
        let first = tracker
            .update_month_time_record("alice", UsedTimeRecord::new(T0 + 5 * 60_000, 600), T0)
            .await
            .unwrap();
        let second = tracker
            .update_month_time_record("alice", UsedTimeRecord::new(T0 + 40 * 60_000, 300), T0)
            .await
            .unwrap();

        assert_eq!(first, UpdateOutcome::Inserted(UsedTimeRecord::new(T0, 600)));
        assert_eq!(second, UpdateOutcome::Merged(UsedTimeRecord::new(T0, 900)));
        assert_eq!(
            tracker.current_month_records("alice").await.unwrap(),
            vec![UsedTimeRecord::new(T0, 900)]
        );
    }

    #[tokio::test]
    async fn test_rapid_update_writes_nothing() {
        let (storage, tracker) = tracker();
        tracker
            .update_month_time_record("alice", UsedTimeRecord::new(T0, 60), T0)
            .await
            .unwrap();
        let writes = storage.write_count();

        let outcome = tracker
            .update_month_time_record("alice", UsedTimeRecord::new(T0 + 10_000, 60), T0)
            .await
            .unwrap();
        assert_eq!(outcome, UpdateOutcome::Debounced);
        assert_eq!(storage.write_count(), writes);
    }

    #[tokio::test]
    async fn test_store_stays_sorted() {
        let (storage, tracker) = tracker();
        storage
            .set(
                "fs:usedTime:alice",
                &vec![UsedTimeRecord::new(T0, 10), UsedTimeRecord::new(T0 + 3 * HOUR, 30)],
            )
            .await
            .unwrap();

        let outcome = tracker
            .update_month_time_record("alice", UsedTimeRecord::new(T0 + HOUR + 1, 20), T0)
            .await
            .unwrap();
        assert_eq!(outcome, UpdateOutcome::Inserted(UsedTimeRecord::new(T0 + HOUR, 20)));

        let timestamps: Vec<i64> = tracker
            .current_month_records("alice")
            .await
            .unwrap()
            .iter()
            .map(|r| r.timestamp)
            .collect();
        assert_eq!(timestamps, vec![T0, T0 + HOUR, T0 + 3 * HOUR]);
    }

    #[tokio::test]
    async fn test_compress_without_state_is_skipped() {
        let (storage, tracker) = tracker();
        assert_eq!(
            tracker.compress("alice", APRIL).await.unwrap(),
            CompressOutcome::Skipped(SkipReason::NoStore)
        );
        storage
            .set("fs:usedTime:alice", &Vec::<UsedTimeRecord>::new())
            .await
            .unwrap();
        assert_eq!(
            tracker.compress("alice", APRIL).await.unwrap(),
            CompressOutcome::Skipped(SkipReason::NoMonthMarker)
        );
    }

    #[tokio::test]
    async fn test_compress_rolls_up_closed_month() {
        let (storage, tracker) = tracker();
        for (offset, seconds) in [(0, 100), (HOUR, 200), (24 * HOUR, 300)] {
            tracker
                .update_month_time_record("alice", UsedTimeRecord::new(T0 + offset, seconds), T0)
                .await
                .unwrap();
        }

        let outcome = tracker.compress("alice", APRIL).await.unwrap();
        assert_eq!(
            outcome,
            CompressOutcome::Compressed {
                months: vec![MonthKey {
                    year: 2024,
                    month: 2
                }],
                already_present: vec![],
                records: 3,
                kept: 0,
            }
        );

        let months = tracker.year_months("alice", 2024).await.unwrap();
        assert_eq!(months.len(), 1);
        let march = &months[0];
        assert_eq!(march.daily_records.len(), 31);
        assert_eq!(march.hourly_records.len(), 24);
        assert_eq!(march.hourly_records[10].seconds, 400);
        assert_eq!(march.hourly_records[11].seconds, 200);
        assert_eq!(march.daily_records[9].seconds, 300);
        assert_eq!(march.daily_records[10].seconds, 300);
        assert_eq!(march.total_seconds(), 600);

        let marker: Option<i64> = storage.get("fs:usedTimeMonthStart:alice").await.unwrap();
        assert_eq!(marker, Some(bucket_start(APRIL, Granularity::Month, &chrono_tz::UTC)));
        assert!(tracker.current_month_records("alice").await.unwrap().is_empty());

        assert_eq!(
            tracker.compress("alice", APRIL).await.unwrap(),
            CompressOutcome::Skipped(SkipReason::NothingToCompress)
        );
    }

    #[tokio::test]
    async fn test_update_in_new_month_compresses_first() {
        let (_, tracker) = tracker();
        tracker
            .update_month_time_record("alice", UsedTimeRecord::new(T0, 100), T0)
            .await
            .unwrap();
        tracker
            .update_month_time_record("alice", UsedTimeRecord::new(APRIL, 50), APRIL)
            .await
            .unwrap();

        assert_eq!(tracker.year_months("alice", 2024).await.unwrap().len(), 1);
        assert_eq!(
            tracker.current_month_records("alice").await.unwrap(),
            vec![UsedTimeRecord::new(APRIL, 50)]
        );
    }

    #[tokio::test]
    async fn test_late_record_for_rolled_up_month_is_rejected() {
        let (storage, tracker) = tracker();
        // 2024-03-31T23:00:00Z and 2024-05-02T00:00:00Z
        let march_31 = 1_711_926_000_000;
        let may = 1_714_608_000_000;
        tracker
            .update_month_time_record("alice", UsedTimeRecord::new(T0, 100), T0)
            .await
            .unwrap();

        let outcome = tracker
            .update_month_time_record("alice", UsedTimeRecord::new(march_31, 500), APRIL)
            .await
            .unwrap();
        assert_eq!(outcome, UpdateOutcome::ClosedMonth);
        let records = tracker.current_month_records("alice").await.unwrap();
        assert!(records.is_empty());
        let last_update: Option<i64> = storage.get("fs:usedTimeLastUpdate:alice").await.unwrap();
        assert_eq!(last_update, Some(T0));

        // Every accepted second survives a later compression
        tracker.compress("alice", may).await.unwrap();
        let compressed: u64 = tracker
            .year_months("alice", 2024)
            .await
            .unwrap()
            .iter()
            .map(MonthAggData::total_seconds)
            .sum();
        let live: u64 = tracker
            .current_month_records("alice")
            .await
            .unwrap()
            .iter()
            .map(|r| r.seconds)
            .sum();
        assert_eq!(compressed + live, 100);
    }

    #[test]
    fn test_lifecycle_per_frame() {
        let mut lifecycle = CollectorLifecycle::new();
        assert!(lifecycle.try_init("top"));
        assert!(!lifecycle.try_init("top"));
        assert!(lifecycle.try_init("iframe-1"));
        assert_eq!(lifecycle.active_frames(), 2);

        assert!(lifecycle.teardown("top"));
        assert!(!lifecycle.is_initialized("top"));
        assert!(lifecycle.is_initialized("iframe-1"));
        assert!(lifecycle.try_init("top"));
    }
}
