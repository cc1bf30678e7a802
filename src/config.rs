//! Runtime configuration
//!
//! There is no configuration file; the CLI fills these structs from flags and
//! environment variables.

use crate::keys::StorageKeys;
use chrono_tz::Tz;
use forumstat_core::timezone::TimezoneConfig;
use std::path::PathBuf;
use std::time::Duration;

/// Default minimum gap between accepted activity updates
pub const DEFAULT_MIN_UPDATE_INTERVAL: Duration = Duration::from_secs(30);

/// Settings of the activity rollup
#[derive(Debug, Clone, Copy)]
pub struct TrackerConfig {
    /// Updates closer than this to the previous accepted one are dropped
    pub min_update_interval: Duration,
    /// Timezone for hour, day and month boundaries
    pub tz: Tz,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            min_update_interval: DEFAULT_MIN_UPDATE_INTERVAL,
            tz: Tz::UTC,
        }
    }
}

impl TrackerConfig {
    pub fn with_timezone(mut self, tz: Tz) -> Self {
        self.tz = tz;
        self
    }

    pub fn with_min_update_interval(mut self, interval: Duration) -> Self {
        self.min_update_interval = interval;
        self
    }

    /// Debounce threshold in milliseconds
    pub fn min_update_interval_ms(&self) -> i64 {
        i64::try_from(self.min_update_interval.as_millis()).unwrap_or(i64::MAX)
    }
}

/// Settings of the paginated balance crawl
#[derive(Debug, Clone, Copy)]
pub struct CrawlConfig {
    /// Pause between two successful page fetches
    pub page_delay: Duration,
    /// Attempts per page before giving up, at least 1
    pub max_attempts: u32,
    /// Backoff before the second attempt; doubles after each failure
    pub base_backoff: Duration,
    /// Stop once a whole page turns out to be stored already
    pub stop_at_known_page: bool,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            page_delay: Duration::from_millis(1000),
            max_attempts: 3,
            base_backoff: Duration::from_millis(500),
            stop_at_known_page: false,
        }
    }
}

impl CrawlConfig {
    /// Delay before attempt `attempt` (1-based); zero for the first attempt
    pub fn backoff(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(attempt - 2).unwrap_or(u32::MAX);
        self.base_backoff.saturating_mul(factor)
    }
}

/// Everything a command needs to open storage and run
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_path: PathBuf,
    pub keys: StorageKeys,
    pub timezone: TimezoneConfig,
    pub tracker: TrackerConfig,
    pub crawl: CrawlConfig,
}
