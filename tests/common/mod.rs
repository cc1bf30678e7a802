//! Common test utilities and helpers for forumstat tests
//!
//! Builders for records and stores, plus storage and page-source doubles
//! that fail on demand.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use forumstat::{
    activity::ActivityTracker,
    balance::BalanceStore,
    config::{CrawlConfig, TrackerConfig},
    crawler::BalancePageSource,
    keys::StorageKeys,
};
use forumstat_core::error::{ForumstatError, Result};
use forumstat_core::storage::Storage;
use forumstat_core::types::{BalanceRecord, RawBalanceRecord};
use forumstat_storage::MemoryStorage;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const NAMESPACE: &str = "test";

/// Epoch ms of a UTC wall-clock time
pub fn utc_ms(year: i32, month: u32, day: u32, hour: u32, minute: u32, second: u32) -> i64 {
    Utc.with_ymd_and_hms(year, month, day, hour, minute, second)
        .single()
        .expect("valid UTC time")
        .timestamp_millis()
}

pub fn keys() -> StorageKeys {
    StorageKeys::new(NAMESPACE)
}

/// A balance store in UTC over fresh in-memory storage
pub fn memory_balance_store() -> (Arc<MemoryStorage>, BalanceStore) {
    let storage = Arc::new(MemoryStorage::new());
    let store = BalanceStore::new(storage.clone(), keys(), chrono_tz::UTC);
    (storage, store)
}

/// An activity tracker in UTC with the default 30s debounce
pub fn memory_tracker() -> (Arc<MemoryStorage>, ActivityTracker) {
    let storage = Arc::new(MemoryStorage::new());
    let tracker = ActivityTracker::new(storage.clone(), keys(), TrackerConfig::default());
    (storage, tracker)
}

/// Builder for balance records
pub struct BalanceRecordBuilder {
    timestamp: i64,
    kind: String,
    delta: f64,
    balance: f64,
    username: Option<String>,
}

impl BalanceRecordBuilder {
    pub fn new(timestamp: i64) -> Self {
        Self {
            timestamp,
            kind: "每日登录奖励".to_string(),
            delta: 10.0,
            balance: 100.0,
            username: None,
        }
    }

    pub fn kind(mut self, kind: &str) -> Self {
        self.kind = kind.to_string();
        self
    }

    pub fn delta(mut self, delta: f64) -> Self {
        self.delta = delta;
        self
    }

    pub fn balance(mut self, balance: f64) -> Self {
        self.balance = balance;
        self
    }

    pub fn user(mut self, username: &str) -> Self {
        self.username = Some(username.to_string());
        self
    }

    pub fn build(self) -> BalanceRecord {
        BalanceRecord {
            timestamp: self.timestamp,
            kind: self.kind,
            delta: self.delta,
            balance: self.balance,
            username: self.username,
        }
    }

    pub fn build_raw(self) -> RawBalanceRecord {
        RawBalanceRecord {
            timestamp: self.timestamp,
            kind: self.kind,
            delta: self.delta,
            balance: self.balance,
        }
    }
}

/// Storage whose writes to keys ending in `fail_suffix` fail
pub struct FailingStorage {
    inner: MemoryStorage,
    fail_suffix: String,
}

impl FailingStorage {
    pub fn failing_on(fail_suffix: &str) -> Self {
        Self {
            inner: MemoryStorage::new(),
            fail_suffix: fail_suffix.to_string(),
        }
    }

    pub fn inner(&self) -> &MemoryStorage {
        &self.inner
    }
}

#[async_trait]
impl Storage for FailingStorage {
    async fn get_raw(&self, key: &str) -> Result<Option<Value>> {
        self.inner.get_raw(key).await
    }

    async fn set_raw(&self, key: &str, value: Value) -> Result<()> {
        if key.ends_with(&self.fail_suffix) {
            return Err(ForumstatError::Storage {
                key: key.to_string(),
                reason: "quota exceeded".to_string(),
            });
        }
        self.inner.set_raw(key, value).await
    }

    async fn snapshot(&self) -> Result<BTreeMap<String, Value>> {
        self.inner.snapshot().await
    }
}

/// Shared per-page fetch counter
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<HashMap<u32, u32>>>);

impl CallLog {
    pub fn calls(&self, page: u32) -> u32 {
        self.0.lock().unwrap().get(&page).copied().unwrap_or(0)
    }

    fn record(&self, page: u32) -> u32 {
        let mut calls = self.0.lock().unwrap();
        let count = calls.entry(page).or_insert(0);
        *count += 1;
        *count
    }
}

/// In-memory pages that fail a configurable number of times per page
pub struct FlakyPageSource {
    pages: Vec<Vec<RawBalanceRecord>>,
    failures_per_page: HashMap<u32, u32>,
    calls: CallLog,
}

impl FlakyPageSource {
    pub fn new(pages: Vec<Vec<RawBalanceRecord>>) -> Self {
        Self {
            pages,
            failures_per_page: HashMap::new(),
            calls: CallLog::default(),
        }
    }

    /// Make the first `failures` fetches of `page` fail
    pub fn failing(mut self, page: u32, failures: u32) -> Self {
        self.failures_per_page.insert(page, failures);
        self
    }

    /// Handle that keeps counting after the source moves into a crawler
    pub fn call_log(&self) -> CallLog {
        self.calls.clone()
    }
}

#[async_trait]
impl BalancePageSource for FlakyPageSource {
    async fn page_count(&self) -> Result<u32> {
        Ok(self.pages.len() as u32)
    }

    async fn fetch_page(&self, page: u32) -> Result<Vec<RawBalanceRecord>> {
        let call = self.calls.record(page);
        let failures = self.failures_per_page.get(&page).copied().unwrap_or(0);
        if call <= failures {
            return Err(ForumstatError::PageFetch {
                page,
                reason: format!("connection reset (call {call})"),
            });
        }

        self.pages
            .get(page as usize - 1)
            .cloned()
            .ok_or_else(|| ForumstatError::PageFetch {
                page,
                reason: "no such page".to_string(),
            })
    }
}

/// Crawl settings without any sleeping
pub fn instant_crawl_config() -> CrawlConfig {
    CrawlConfig {
        page_delay: Duration::ZERO,
        max_attempts: 3,
        base_backoff: Duration::ZERO,
        stop_at_known_page: false,
    }
}
