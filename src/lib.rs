//! forumstat - Balance history, activity time and annual summaries for forum users
//!
//! This library provides functionality to:
//! - Store balance records compactly with a shared category dictionary
//! - Aggregate balance changes by time bucket or by category, with gap filling
//! - Track activity time per hour and roll closed months into yearly summaries
//! - Crawl paginated balance history with retry and merge it idempotently
//! - Build an annual summary and render everything as tables or JSON
//!
//! # Examples
//!
//! ```
//! use forumstat::{
//!     balance::BalanceStore,
//!     keys::StorageKeys,
//!     query::{BalanceQuery, TimeWindow},
//! };
//! use forumstat_core::{BalanceRecord, Granularity};
//! use forumstat_storage::MemoryStorage;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let store = BalanceStore::new(
//!     Arc::new(MemoryStorage::new()),
//!     StorageKeys::default(),
//!     chrono_tz::UTC,
//! );
//! store
//!     .merge_balance_records(
//!         "alice",
//!         vec![BalanceRecord::new(1_704_067_200_000, "初始资本", 100.0, 100.0)],
//!     )
//!     .await?;
//!
//! let query = BalanceQuery::new(store);
//! let daily = query.by_time("alice", Granularity::Day, TimeWindow::all()).await?;
//! assert_eq!(daily.len(), 1);
//! # forumstat::Result::Ok(())
//! # }).unwrap();
//! ```

pub mod activity;
pub mod balance;
pub mod category;
pub mod cli;
pub mod config;
pub mod crawler;
pub mod keys;
pub mod output;
pub mod query;
pub mod summary;

pub use forumstat_core::{error, granularity, types};

// Re-export commonly used types
pub use forumstat_core::{ForumstatError, Result};
pub use forumstat_core::{BalanceRecord, Granularity, UsedTimeRecord};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
