//! Paginated balance-history crawl
//!
//! A [`BalancePageSource`] knows how many pages of balance history a user has
//! and how to fetch one. The [`Crawler`] walks the pages in order with a fixed
//! delay between pages, retries failed fetches with exponential backoff, and
//! merges each page into a [`BalanceStore`] as soon as it arrives.
//!
//! The write path is idempotent, so a crawl that failed half-way is simply
//! run again.

use crate::balance::BalanceStore;
use crate::config::CrawlConfig;
use async_stream::try_stream;
use async_trait::async_trait;
use forumstat_core::error::{ForumstatError, Result};
use forumstat_core::types::{BalanceRecord, RawBalanceRecord};
use futures::stream::{Stream, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Upstream producer of raw balance records
#[async_trait]
pub trait BalancePageSource: Send + Sync {
    /// Number of pages, numbered from 1
    async fn page_count(&self) -> Result<u32>;

    /// Records on `page`, in page order
    async fn fetch_page(&self, page: u32) -> Result<Vec<RawBalanceRecord>>;
}

/// Totals of one [`Crawler::sync_into`] run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub pages: u32,
    pub received: usize,
    pub inserted: usize,
    pub duplicates: usize,
    /// The crawl stopped at a page that was already fully stored
    pub stopped_early: bool,
}

pub struct Crawler<S> {
    source: S,
    config: CrawlConfig,
    show_progress: bool,
}

impl<S: BalancePageSource> Crawler<S> {
    pub fn new(source: S, config: CrawlConfig) -> Self {
        Self {
            source,
            config,
            show_progress: false,
        }
    }

    /// Show a progress bar while syncing
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Fetch `page`, retrying with exponential backoff
    ///
    /// # Errors
    ///
    /// [`ForumstatError::CrawlExhausted`] carrying the last failure once
    /// every attempt failed.
    pub async fn fetch_with_retry(&self, page: u32) -> Result<Vec<RawBalanceRecord>> {
        let attempts = self.config.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            let backoff = self.config.backoff(attempt);
            if !backoff.is_zero() {
                tokio::time::sleep(backoff).await;
            }

            match self.source.fetch_page(page).await {
                Ok(records) => {
                    debug!("Fetched page {} ({} records)", page, records.len());
                    return Ok(records);
                }
                Err(e) => {
                    warn!(
                        "Fetching page {} failed (attempt {}/{}): {}",
                        page, attempt, attempts, e
                    );
                    last_error = Some(e);
                }
            }
        }

        let source = last_error.unwrap_or_else(|| ForumstatError::PageFetch {
            page,
            reason: "no attempt was made".to_string(),
        });
        Err(ForumstatError::CrawlExhausted {
            page,
            attempts,
            source: Box::new(source),
        })
    }

    /// Stream `(page, records)` for every page in order
    pub fn pages(&self) -> impl Stream<Item = Result<(u32, Vec<RawBalanceRecord>)>> + '_ {
        try_stream! {
            let count = self.source.page_count().await?;
            debug!("Crawling {} pages", count);
            for page in 1..=count {
                if page > 1 && !self.config.page_delay.is_zero() {
                    tokio::time::sleep(self.config.page_delay).await;
                }
                let records = self.fetch_with_retry(page).await?;
                yield (page, records);
            }
        }
    }

    /// Crawl every page of `user` and merge it into `store`
    pub async fn sync_into(&self, store: &BalanceStore, user: &str) -> Result<SyncReport> {
        let progress = if self.show_progress {
            let pb = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg} [{elapsed_precise}]")
            {
                pb.set_style(style);
            }
            pb.set_message(format!("Syncing balance history of {user}"));
            pb.enable_steady_tick(std::time::Duration::from_millis(100));
            Some(pb)
        } else {
            None
        };

        let mut report = SyncReport::default();
        let pages = self.pages();
        futures::pin_mut!(pages);

        while let Some(item) = pages.next().await {
            let (page, raw) = item?;
            let records: Vec<BalanceRecord> =
                raw.into_iter().map(|r| r.into_record(user)).collect();
            let stats = store.merge_balance_records(user, records).await?;

            report.pages += 1;
            report.received += stats.received;
            report.inserted += stats.inserted;
            report.duplicates += stats.duplicates;
            if let Some(pb) = &progress {
                pb.set_message(format!("Page {page}: {} new records", report.inserted));
            }

            if self.config.stop_at_known_page && stats.received > 0 && stats.inserted == 0 {
                info!("Page {} was already stored, stopping", page);
                report.stopped_early = true;
                break;
            }
        }

        if let Some(pb) = progress {
            pb.finish_and_clear();
        }
        info!(
            "Synced {} pages for {}: {} new, {} duplicate",
            report.pages, user, report.inserted, report.duplicates
        );
        Ok(report)
    }
}

/// Page source over a directory of `page-<n>.json` files
///
/// Each file holds a JSON array of raw records. Used to replay saved pages.
#[derive(Debug, Clone)]
pub struct DirectoryPageSource {
    dir: PathBuf,
}

impl DirectoryPageSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn page_path(&self, page: u32) -> PathBuf {
        self.dir.join(format!("page-{page}.json"))
    }
}

fn page_number(file_name: &str) -> Option<u32> {
    file_name
        .strip_prefix("page-")?
        .strip_suffix(".json")?
        .parse()
        .ok()
}

#[async_trait]
impl BalancePageSource for DirectoryPageSource {
    async fn page_count(&self) -> Result<u32> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut count = 0;
        while let Some(entry) = entries.next_entry().await? {
            if let Some(page) = entry.file_name().to_str().and_then(page_number) {
                count = count.max(page);
            }
        }
        Ok(count)
    }

    async fn fetch_page(&self, page: u32) -> Result<Vec<RawBalanceRecord>> {
        let path = self.page_path(page);
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| ForumstatError::PageFetch {
                page,
                reason: format!("{}: {e}", path.display()),
            })?;
        serde_json::from_str(&content).map_err(|e| ForumstatError::PageFetch {
            page,
            reason: format!("{}: {e}", path.display()),
        })
    }
}
