//! Compact balance record codec
//!
//! Balance records are stored as `[timestamp, typeId, delta, balance]` tuples,
//! newest first, one key per user and calendar year. Category strings go
//! through the [`CategoryDictionary`]; a dictionary that gained entries is
//! always written before any record referencing the new ids.

use crate::category::{CategoryDictionary, UNKNOWN_CATEGORY};
use crate::keys::StorageKeys;
use chrono::Datelike;
use chrono_tz::Tz;
use forumstat_core::error::{ForumstatError, Result};
use forumstat_core::granularity::to_local;
use forumstat_core::storage::{Storage, StorageExt};
use forumstat_core::types::{BalanceRecord, CompactBalanceRecord};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of [`BalanceStore::merge_balance_records`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeStats {
    /// Records passed in
    pub received: usize,
    /// Records that were not stored yet
    pub inserted: usize,
    /// Records already present
    pub duplicates: usize,
    /// Years whose record key was rewritten
    pub years: Vec<i32>,
}

/// Reads and writes compact balance records of one namespace
#[derive(Clone)]
pub struct BalanceStore {
    storage: Arc<dyn Storage>,
    keys: StorageKeys,
    tz: Tz,
}

impl BalanceStore {
    pub fn new(storage: Arc<dyn Storage>, keys: StorageKeys, tz: Tz) -> Self {
        Self { storage, keys, tz }
    }

    pub fn keys(&self) -> &StorageKeys {
        &self.keys
    }

    /// Timezone used to assign records to calendar years
    pub fn timezone(&self) -> &Tz {
        &self.tz
    }

    /// Current category dictionary of the namespace
    pub async fn dictionary(&self) -> Result<CategoryDictionary> {
        CategoryDictionary::load(self.storage.as_ref(), &self.keys.balance_types()).await
    }

    /// Map records to tuples, persisting the dictionary first if it grew
    async fn encode(&self, records: &[BalanceRecord]) -> Result<Vec<CompactBalanceRecord>> {
        let mut dictionary = self.dictionary().await?;
        let compact: Vec<CompactBalanceRecord> = records
            .iter()
            .map(|record| {
                let (type_id, _) = dictionary.intern(&record.kind);
                CompactBalanceRecord(record.timestamp, type_id, record.delta, record.balance)
            })
            .collect();

        if dictionary.is_dirty() {
            dictionary
                .persist(self.storage.as_ref(), &self.keys.balance_types())
                .await?;
        }
        Ok(compact)
    }

    /// Encode `records` and replace whatever is stored under `key`
    ///
    /// # Errors
    ///
    /// A failed dictionary write aborts before the records are written.
    pub async fn set_balance_records(&self, key: &str, records: &[BalanceRecord]) -> Result<()> {
        let mut compact = self.encode(records).await?;
        sort_newest_first(&mut compact);
        debug!("Writing {} balance records to {}", compact.len(), key);
        self.storage.set(key, &compact).await
    }

    /// Decode the records stored under `keys`, newest first
    ///
    /// Missing keys contribute nothing; an empty key list reads nothing.
    pub async fn get_balance_records(
        &self,
        username: &str,
        keys: &[String],
    ) -> Result<Vec<BalanceRecord>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let dictionary = self.dictionary().await?;
        let mut unknown_ids = BTreeSet::new();
        let mut records = Vec::new();

        for key in keys {
            let compact: Vec<CompactBalanceRecord> = self.storage.get_or(key, Vec::new()).await?;
            records.extend(compact.into_iter().map(|tuple| {
                let kind = dictionary.value_of(tuple.type_id()).unwrap_or_else(|| {
                    unknown_ids.insert(tuple.type_id());
                    UNKNOWN_CATEGORY
                });
                BalanceRecord::new(tuple.timestamp(), kind, tuple.delta(), tuple.balance())
                    .with_username(username)
            }));
        }

        if !unknown_ids.is_empty() {
            warn!(
                "Category ids {:?} missing from the dictionary, decoded as '{}'",
                unknown_ids, UNKNOWN_CATEGORY
            );
        }

        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(records)
    }

    /// Years with stored balance records for `user`, ascending
    pub async fn balance_years(&self, user: &str) -> Result<Vec<i32>> {
        let mut years: Vec<i32> = self
            .storage
            .get_or(&self.keys.balance_years(user), Vec::new())
            .await?;
        years.sort_unstable();
        years.dedup();
        Ok(years)
    }

    /// Record keys of `user` in ascending year order
    pub async fn balance_keys(&self, user: &str) -> Result<Vec<String>> {
        Ok(self
            .balance_years(user)
            .await?
            .into_iter()
            .map(|year| self.keys.balance_records(user, year))
            .collect())
    }

    /// Every stored record of `user`, newest first
    pub async fn load_user_records(&self, user: &str) -> Result<Vec<BalanceRecord>> {
        let keys = self.balance_keys(user).await?;
        self.get_balance_records(user, &keys).await
    }

    /// Records of `user` in one calendar year, newest first
    pub async fn load_year_records(&self, user: &str, year: i32) -> Result<Vec<BalanceRecord>> {
        self.get_balance_records(user, &[self.keys.balance_records(user, year)])
            .await
    }

    /// Merge `records` into the per-year keys of `user`
    ///
    /// Tuples already stored (bit-identical) are skipped, so merging the same
    /// page twice changes nothing. Writes go dictionary, then year keys, then
    /// the year index.
    pub async fn merge_balance_records(
        &self,
        user: &str,
        records: Vec<BalanceRecord>,
    ) -> Result<MergeStats> {
        let mut stats = MergeStats {
            received: records.len(),
            ..MergeStats::default()
        };
        if records.is_empty() {
            return Ok(stats);
        }

        let compact = self.encode(&records).await?;
        let mut by_year: BTreeMap<i32, Vec<CompactBalanceRecord>> = BTreeMap::new();
        for tuple in compact {
            let year = to_local(tuple.timestamp(), &self.tz)
                .map(|local| local.year())
                .ok_or_else(|| {
                    ForumstatError::InvalidDate(format!(
                        "timestamp {} is out of range",
                        tuple.timestamp()
                    ))
                })?;
            by_year.entry(year).or_default().push(tuple);
        }

        for (year, incoming) in by_year {
            let key = self.keys.balance_records(user, year);
            let mut stored: Vec<CompactBalanceRecord> =
                self.storage.get_or(&key, Vec::new()).await?;
            let mut seen: HashSet<_> = stored.iter().map(CompactBalanceRecord::identity).collect();

            let before = stored.len();
            for tuple in incoming {
                if seen.insert(tuple.identity()) {
                    stored.push(tuple);
                } else {
                    stats.duplicates += 1;
                }
            }
            if stored.len() == before {
                continue;
            }

            stats.inserted += stored.len() - before;
            sort_newest_first(&mut stored);
            self.storage.set(&key, &stored).await?;
            stats.years.push(year);
        }

        if !stats.years.is_empty() {
            let mut years = self.balance_years(user).await?;
            let known = years.len();
            years.extend(stats.years.iter().copied());
            years.sort_unstable();
            years.dedup();
            if years.len() != known {
                self.storage
                    .set(&self.keys.balance_years(user), &years)
                    .await?;
            }
        }

        debug!(
            "Merged balance records for {}: {} new, {} duplicate",
            user, stats.inserted, stats.duplicates
        );
        Ok(stats)
    }
}

fn sort_newest_first(records: &mut [CompactBalanceRecord]) {
    records.sort_by(|a, b| b.timestamp().cmp(&a.timestamp()));
}
