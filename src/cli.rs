//! CLI interface for forumstat
//!
//! The binary stands in for the extension host: it writes activity and
//! balance data into a local JSON-file storage and prints the chart read
//! shapes as tables or JSON.
//!
//! # Example
//!
//! ```bash
//! # Import crawled balance records for alice
//! forumstat import --user alice --file records.json
//!
//! # Daily balance changes in March 2024, Shanghai time
//! forumstat --timezone Asia/Shanghai balance --user alice --granularity day \
//!     --since 2024-03-01 --until 2024-03-31 --by filled
//!
//! # Annual summary as JSON
//! forumstat --json summary --user alice --year 2024
//! ```

use crate::config::{AppConfig, CrawlConfig, TrackerConfig};
use crate::keys::{DEFAULT_NAMESPACE, StorageKeys};
use chrono::{DateTime, NaiveDate};
use chrono_tz::Tz;
use clap::{Args, Parser, Subcommand, ValueEnum};
use forumstat_core::error::{ForumstatError, Result};
use forumstat_core::granularity::{Granularity, date_start};
use forumstat_core::timezone::TimezoneConfig;
use std::path::PathBuf;
use std::time::Duration;

/// Balance history and activity statistics for forum users
#[derive(Parser, Debug, Clone)]
#[command(name = "forumstat")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Show debug output
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Only show warnings and errors
    #[arg(long, short = 'q', global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Storage file (default: <data dir>/forumstat/storage.json)
    #[arg(long, env = "FORUMSTAT_DATA", global = true)]
    pub data: Option<PathBuf>,

    /// Storage namespace shared by all keys
    #[arg(long, env = "FORUMSTAT_NAMESPACE", default_value = DEFAULT_NAMESPACE, global = true)]
    pub namespace: String,

    #[command(flatten)]
    pub timezone_args: TimezoneArgs,

    /// Minimum seconds between accepted activity updates
    #[arg(long, default_value = "30", global = true)]
    pub min_update_interval: u64,

    #[command(flatten)]
    pub crawl_args: CrawlArgs,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Timezone selection shared by every command
#[derive(Args, Debug, Clone, Default)]
pub struct TimezoneArgs {
    /// Timezone for bucketing and labels (e.g. "Asia/Shanghai", "UTC").
    /// If not specified, uses $FORUMSTAT_TIMEZONE, then the local timezone
    #[arg(long, short = 'z', global = true)]
    pub timezone: Option<String>,

    /// Use UTC (overrides --timezone)
    #[arg(long, global = true)]
    pub utc: bool,
}

/// Crawl pacing
#[derive(Args, Debug, Clone)]
pub struct CrawlArgs {
    /// Milliseconds to wait between pages
    #[arg(long, default_value = "1000", global = true)]
    pub page_delay_ms: u64,

    /// Attempts per page before the crawl fails
    #[arg(long, default_value = "3", global = true)]
    pub max_attempts: u32,

    /// Backoff before the first retry in milliseconds, doubled per retry
    #[arg(long, default_value = "500", global = true)]
    pub retry_backoff_ms: u64,
}

/// How `balance` groups records
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BalanceView {
    /// One row per non-empty bucket
    #[default]
    Time,
    /// Net change per category
    Category,
    /// One row per bucket, empty buckets interpolated
    Filled,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Merge a JSON array of raw balance records into storage
    Import {
        #[arg(long, short = 'u')]
        user: String,
        /// File with `[{"timestamp", "type", "delta", "balance"}, ...]`
        #[arg(long, short = 'f')]
        file: PathBuf,
    },

    /// Crawl saved balance pages (`page-<n>.json`) into storage
    Sync {
        #[arg(long, short = 'u')]
        user: String,
        /// Directory holding the pages
        #[arg(long)]
        pages_dir: PathBuf,
        /// Stop at the first page that is already fully stored
        #[arg(long)]
        incremental: bool,
    },

    /// Show balance history
    Balance {
        #[arg(long, short = 'u')]
        user: String,
        #[arg(long, value_enum, default_value_t = BalanceView::Time)]
        by: BalanceView,
        /// minute, hour, day, month or year
        #[arg(long, short = 'g', default_value = "day")]
        granularity: Granularity,
        #[command(flatten)]
        range: RangeArgs,
    },

    /// Record and inspect activity time
    Activity {
        #[command(subcommand)]
        command: ActivityCommand,
    },

    /// Annual summary of a user
    Summary {
        #[arg(long, short = 'u')]
        user: String,
        #[arg(long, short = 'y')]
        year: i32,
    },

    /// Storage usage per key kind
    Storage,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ActivityCommand {
    /// Add active seconds to the hour containing `--at` (default: now)
    Record {
        #[arg(long, short = 'u')]
        user: String,
        #[arg(long, short = 's')]
        seconds: u64,
        /// RFC 3339 timestamp of the activity
        #[arg(long)]
        at: Option<String>,
    },

    /// Roll closed months into their yearly summaries
    Compress {
        #[arg(long, short = 'u')]
        user: String,
    },

    /// Hourly activity of the current month
    Hourly {
        #[arg(long, short = 'u')]
        user: String,
        #[command(flatten)]
        range: RangeArgs,
    },

    /// Daily activity of a year
    Daily {
        #[arg(long, short = 'u')]
        user: String,
        #[arg(long, short = 'y')]
        year: i32,
        #[command(flatten)]
        range: RangeArgs,
    },

    /// Activity per hour of day across a year
    Hours {
        #[arg(long, short = 'u')]
        user: String,
        #[arg(long, short = 'y')]
        year: i32,
    },
}

/// Inclusive date range
#[derive(Args, Debug, Clone, Default)]
pub struct RangeArgs {
    /// Start date (YYYY-MM-DD or YYYY-MM)
    #[arg(long)]
    pub since: Option<String>,

    /// End date, inclusive (YYYY-MM-DD or YYYY-MM)
    #[arg(long)]
    pub until: Option<String>,
}

impl Cli {
    /// Resolve flags and environment into an [`AppConfig`]
    pub fn app_config(&self) -> Result<AppConfig> {
        let timezone = TimezoneConfig::resolve(
            self.timezone_args.timezone.as_deref(),
            self.timezone_args.utc,
        )?;
        let data_path = match &self.data {
            Some(path) => path.clone(),
            None => forumstat_storage::file::default_storage_path()?,
        };
        if self.namespace.is_empty() || self.namespace.contains(':') {
            return Err(ForumstatError::Config(format!(
                "namespace must be non-empty and contain no ':', got '{}'",
                self.namespace
            )));
        }

        Ok(AppConfig {
            data_path,
            keys: StorageKeys::new(self.namespace.clone()),
            timezone,
            tracker: TrackerConfig::default()
                .with_timezone(timezone.tz)
                .with_min_update_interval(Duration::from_secs(self.min_update_interval)),
            crawl: CrawlConfig {
                page_delay: Duration::from_millis(self.crawl_args.page_delay_ms),
                max_attempts: self.crawl_args.max_attempts,
                base_backoff: Duration::from_millis(self.crawl_args.retry_backoff_ms),
                stop_at_known_page: false,
            },
        })
    }
}

/// Parse a date filter in YYYY-MM-DD or YYYY-MM format
///
/// YYYY-MM resolves to the first day of the month.
pub fn parse_date_filter(date_str: &str) -> Result<NaiveDate> {
    if let Ok(date) = NaiveDate::parse_from_str(date_str, "%Y-%m-%d") {
        return Ok(date);
    }

    let parts: Vec<&str> = date_str.split('-').collect();
    if parts.len() == 2 {
        let year = parts[0]
            .parse::<i32>()
            .map_err(|_| ForumstatError::InvalidDate(format!("Invalid year in '{date_str}'")))?;
        let month = parts[1]
            .parse::<u32>()
            .map_err(|_| ForumstatError::InvalidDate(format!("Invalid month in '{date_str}'")))?;

        if !(1..=12).contains(&month) {
            return Err(ForumstatError::InvalidDate(format!(
                "Month must be between 1-12, got {month}"
            )));
        }

        NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or_else(|| ForumstatError::InvalidDate(format!("Invalid date: {date_str}")))
    } else {
        Err(ForumstatError::InvalidDate(format!(
            "Invalid date format '{date_str}'. Use YYYY-MM-DD or YYYY-MM"
        )))
    }
}

impl RangeArgs {
    /// Epoch-ms bounds in `tz`; `--until` covers its whole day
    pub fn to_bounds(&self, tz: &Tz) -> Result<(Option<i64>, Option<i64>)> {
        let start = match &self.since {
            Some(since) => Some(day_start(parse_date_filter(since)?, tz)?),
            None => None,
        };
        let end = match &self.until {
            Some(until) => {
                let date = parse_date_filter(until)?;
                let next = date.succ_opt().ok_or_else(|| {
                    ForumstatError::InvalidDate(format!("No day after {date}"))
                })?;
                Some(day_start(next, tz)? - 1)
            }
            None => None,
        };

        if let (Some(start), Some(end)) = (start, end)
            && end < start
        {
            return Err(ForumstatError::InvalidArgument(format!(
                "--until {} is before --since {}",
                self.until.as_deref().unwrap_or_default(),
                self.since.as_deref().unwrap_or_default()
            )));
        }
        Ok((start, end))
    }
}

fn day_start(date: NaiveDate, tz: &Tz) -> Result<i64> {
    date_start(date, tz)
        .ok_or_else(|| ForumstatError::InvalidDate(format!("{date} has no start in {tz}")))
}

/// Parse `--at`, defaulting to the current time
pub fn parse_instant(at: Option<&str>) -> Result<i64> {
    match at {
        None => Ok(chrono::Utc::now().timestamp_millis()),
        Some(text) => DateTime::parse_from_rfc3339(text)
            .map(|dt| dt.timestamp_millis())
            .map_err(|e| ForumstatError::InvalidDate(format!("'{text}': {e}"))),
    }
}
