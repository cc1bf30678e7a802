//! Output formatting for the CLI
//!
//! Two renderers of the query results:
//! - Table format for human-readable terminal output
//! - JSON format for machine-readable output and integration with other tools
//!
//! Both label buckets in the same timezone that was used to compute them.
//!
//! # Examples
//!
//! ```
//! use forumstat::output::get_formatter;
//! use forumstat_core::types::HourlyRecord;
//!
//! let hours: Vec<HourlyRecord> = (0..24).map(|hour| HourlyRecord { hour, seconds: 60 }).collect();
//! let table = get_formatter(false, chrono_tz::UTC);
//! assert!(table.format_hour_of_day(&hours).contains("23:00"));
//! ```

use crate::balance::MergeStats;
use crate::crawler::SyncReport;
use crate::summary::AnnualSummary;
use chrono_tz::Tz;
use colored::Colorize;
use forumstat_core::granularity::{Granularity, format_bucket};
use forumstat_core::storage::StorageUsage;
use forumstat_core::types::{BalanceRecord, HourlyRecord, UsedTimeRecord};
use prettytable::{Table, format, row};
use serde_json::{Value, json};

/// Renders query results
pub trait OutputFormatter {
    /// A balance series, one row per bucket
    fn format_balance_series(&self, data: &[BalanceRecord], granularity: Granularity) -> String;

    /// Net change per category
    fn format_categories(&self, data: &[BalanceRecord]) -> String;

    /// Activity seconds per bucket
    fn format_activity(&self, data: &[UsedTimeRecord], granularity: Granularity) -> String;

    /// Activity seconds per hour of day
    fn format_hour_of_day(&self, data: &[HourlyRecord]) -> String;

    fn format_summary(&self, summary: &AnnualSummary) -> String;

    fn format_storage_usage(&self, usage: &StorageUsage) -> String;

    fn format_merge(&self, stats: &MergeStats) -> String;

    fn format_sync(&self, report: &SyncReport) -> String;
}

/// Human-readable ASCII tables
pub struct TableFormatter {
    tz: Tz,
}

impl TableFormatter {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    fn new_table() -> Table {
        let mut table = Table::new();
        table.set_format(*format::consts::FORMAT_NO_LINESEP_WITH_TITLE);
        table
    }

    /// Format seconds as `1h 05m`, or `42s` below a minute
    fn format_duration(seconds: u64) -> String {
        if seconds < 60 {
            return format!("{seconds}s");
        }
        let hours = seconds / 3600;
        let minutes = (seconds % 3600) / 60;
        if hours == 0 {
            format!("{minutes}m")
        } else {
            format!("{hours}h {minutes:02}m")
        }
    }

    /// Signed amount, green for gains and red for losses
    fn format_delta(delta: f64) -> String {
        let text = format!("{delta:+.2}");
        if delta > 0.0 {
            text.green().to_string()
        } else if delta < 0.0 {
            text.red().to_string()
        } else {
            text
        }
    }

    fn format_bytes(bytes: usize) -> String {
        if bytes < 1024 {
            format!("{bytes} B")
        } else {
            format!("{:.1} KiB", bytes as f64 / 1024.0)
        }
    }
}

impl OutputFormatter for TableFormatter {
    fn format_balance_series(&self, data: &[BalanceRecord], granularity: Granularity) -> String {
        let mut table = Self::new_table();
        table.set_titles(row![b -> "Period", b -> "Change", b -> "Balance", b -> "Last Type"]);

        for record in data {
            table.add_row(row![
                format_bucket(record.timestamp, granularity, &self.tz),
                r -> Self::format_delta(record.delta),
                r -> format!("{:.2}", record.balance),
                record.kind
            ]);
        }

        let total: f64 = data.iter().map(|r| r.delta).sum();
        table.add_row(row![b -> "TOTAL", r -> Self::format_delta(total), "", ""]);
        table.to_string()
    }

    fn format_categories(&self, data: &[BalanceRecord]) -> String {
        let mut table = Self::new_table();
        table.set_titles(row![b -> "Category", b -> "Net Change"]);
        for record in data {
            table.add_row(row![record.kind, r -> Self::format_delta(record.delta)]);
        }
        table.to_string()
    }

    fn format_activity(&self, data: &[UsedTimeRecord], granularity: Granularity) -> String {
        let mut table = Self::new_table();
        table.set_titles(row![b -> "Period", b -> "Active"]);
        for record in data {
            table.add_row(row![
                format_bucket(record.timestamp, granularity, &self.tz),
                r -> Self::format_duration(record.seconds)
            ]);
        }
        let total: u64 = data.iter().map(|r| r.seconds).sum();
        table.add_row(row![b -> "TOTAL", r -> Self::format_duration(total)]);
        table.to_string()
    }

    fn format_hour_of_day(&self, data: &[HourlyRecord]) -> String {
        let mut table = Self::new_table();
        table.set_titles(row![b -> "Hour", b -> "Active"]);
        for record in data {
            table.add_row(row![
                format!("{:02}:00", record.hour),
                r -> Self::format_duration(record.seconds)
            ]);
        }
        table.to_string()
    }

    fn format_summary(&self, summary: &AnnualSummary) -> String {
        let activity = &summary.activity;
        let balance = &summary.balance;
        let mut output = format!(
            "{}\n\n",
            format!("{} in {}", summary.user, summary.year).bold()
        );

        output.push_str(&format!(
            "Active time: {} over {} days\n",
            Self::format_duration(activity.total_seconds),
            activity.active_days
        ));
        if let Some(day) = activity.busiest_day {
            output.push_str(&format!(
                "Busiest day: {} ({})\n",
                format_bucket(day.timestamp, Granularity::Day, &self.tz),
                Self::format_duration(day.seconds)
            ));
        }
        if let Some(hour) = activity.busiest_hour {
            output.push_str(&format!(
                "Busiest hour: {:02}:00 ({})\n",
                hour.hour,
                Self::format_duration(hour.seconds)
            ));
        }

        let mut months = Self::new_table();
        months.set_titles(row![b -> "Month", b -> "Active"]);
        for (month, seconds) in activity.monthly_seconds.iter().enumerate() {
            months.add_row(row![
                format!("{}-{:02}", summary.year, month + 1),
                r -> Self::format_duration(*seconds)
            ]);
        }
        output.push('\n');
        output.push_str(&months.to_string());

        output.push_str(&format!(
            "\nBalance: {} records, income {}, expense {}",
            balance.records,
            Self::format_delta(balance.income),
            Self::format_delta(-balance.expense)
        ));
        if let Some(closing) = balance.closing_balance {
            output.push_str(&format!(", closing {closing:.2}"));
        }
        output.push('\n');

        if !balance.top_categories.is_empty() {
            let mut categories = Self::new_table();
            categories.set_titles(row![b -> "Category", b -> "Net Change", b -> "Records"]);
            for category in &balance.top_categories {
                categories.add_row(row![
                    category.category,
                    r -> Self::format_delta(category.delta),
                    r -> category.count
                ]);
            }
            output.push_str(&categories.to_string());
        }

        output
    }

    fn format_storage_usage(&self, usage: &StorageUsage) -> String {
        let mut table = Self::new_table();
        table.set_titles(row![b -> "Kind", b -> "Keys", b -> "Size"]);
        for (kind, kind_usage) in &usage.by_kind {
            table.add_row(row![
                kind,
                r -> kind_usage.keys,
                r -> Self::format_bytes(kind_usage.bytes)
            ]);
        }
        table.add_row(row![
            b -> "TOTAL",
            r -> usage.total_keys,
            r -> Self::format_bytes(usage.total_bytes)
        ]);
        format!("Namespace: {}\n{}", usage.namespace, table)
    }

    fn format_merge(&self, stats: &MergeStats) -> String {
        format!(
            "Imported {} records: {} new, {} already stored",
            stats.received, stats.inserted, stats.duplicates
        )
    }

    fn format_sync(&self, report: &SyncReport) -> String {
        let mut line = format!(
            "Synced {} pages: {} new records, {} already stored",
            report.pages, report.inserted, report.duplicates
        );
        if report.stopped_early {
            line.push_str(" (stopped at a known page)");
        }
        line
    }
}

/// Machine-readable JSON
pub struct JsonFormatter {
    tz: Tz,
}

impl JsonFormatter {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    fn render(value: Value) -> String {
        serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string())
    }
}

impl OutputFormatter for JsonFormatter {
    fn format_balance_series(&self, data: &[BalanceRecord], granularity: Granularity) -> String {
        Self::render(json!({
            "granularity": granularity,
            "timezone": self.tz.name(),
            "series": data.iter().map(|r| json!({
                "period": format_bucket(r.timestamp, granularity, &self.tz),
                "timestamp": r.timestamp,
                "type": r.kind,
                "delta": r.delta,
                "balance": r.balance,
                "username": r.username,
            })).collect::<Vec<_>>(),
        }))
    }

    fn format_categories(&self, data: &[BalanceRecord]) -> String {
        Self::render(json!({
            "categories": data.iter().map(|r| json!({
                "type": r.kind,
                "delta": r.delta,
            })).collect::<Vec<_>>(),
        }))
    }

    fn format_activity(&self, data: &[UsedTimeRecord], granularity: Granularity) -> String {
        Self::render(json!({
            "granularity": granularity,
            "timezone": self.tz.name(),
            "series": data.iter().map(|r| json!({
                "period": format_bucket(r.timestamp, granularity, &self.tz),
                "timestamp": r.timestamp,
                "seconds": r.seconds,
            })).collect::<Vec<_>>(),
        }))
    }

    fn format_hour_of_day(&self, data: &[HourlyRecord]) -> String {
        Self::render(json!({ "hours": data }))
    }

    fn format_summary(&self, summary: &AnnualSummary) -> String {
        Self::render(json!({ "summary": summary, "timezone": self.tz.name() }))
    }

    fn format_storage_usage(&self, usage: &StorageUsage) -> String {
        Self::render(json!(usage))
    }

    fn format_merge(&self, stats: &MergeStats) -> String {
        Self::render(json!(stats))
    }

    fn format_sync(&self, report: &SyncReport) -> String {
        Self::render(json!(report))
    }
}

/// Get the appropriate formatter based on output preference
pub fn get_formatter(json: bool, tz: Tz) -> Box<dyn OutputFormatter> {
    if json {
        Box::new(JsonFormatter::new(tz))
    } else {
        Box::new(TableFormatter::new(tz))
    }
}
