//! Annual personalized summary
//!
//! Built from the same read shapes the charts use: the daily and hour-of-day
//! activity series and the year's balance records.

use crate::query::{ActivityQuery, BalanceQuery, TimeWindow};
use chrono::Datelike;
use forumstat_core::aggregate::aggregate_by_key;
use forumstat_core::error::Result;
use forumstat_core::granularity::to_local;
use forumstat_core::types::{HourlyRecord, UsedTimeRecord};
use serde::Serialize;
use tracing::debug;

/// Number of categories listed in [`BalanceSummary::top_categories`]
pub const TOP_CATEGORIES: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryTotal {
    pub category: String,
    pub delta: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivitySummary {
    pub total_seconds: u64,
    pub active_days: usize,
    /// Day with the most active seconds, earliest on ties
    pub busiest_day: Option<UsedTimeRecord>,
    /// Hour of day with the most active seconds, earliest on ties
    pub busiest_hour: Option<HourlyRecord>,
    /// Seconds per calendar month, January first
    pub monthly_seconds: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalanceSummary {
    pub records: usize,
    pub income: f64,
    /// Sum of negative deltas as a positive number
    pub expense: f64,
    /// Balance after the last change of the year
    pub closing_balance: Option<f64>,
    /// Categories with the largest absolute net change
    pub top_categories: Vec<CategoryTotal>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnualSummary {
    pub user: String,
    pub year: i32,
    pub activity: ActivitySummary,
    pub balance: BalanceSummary,
}

impl AnnualSummary {
    pub async fn build(
        balance: &BalanceQuery,
        activity: &ActivityQuery,
        user: &str,
        year: i32,
    ) -> Result<Self> {
        debug!("Building {} summary for {}", year, user);
        let tz = *balance.store().timezone();

        let daily = activity.daily(user, year, TimeWindow::all()).await?;
        let mut monthly_seconds = vec![0u64; 12];
        for (month, seconds) in aggregate_by_key(
            daily.iter().copied(),
            |day| to_local(day.timestamp, &tz).map_or(0, |local| local.month0()),
            |month, group| (month, group.iter().map(|d| d.seconds).sum::<u64>()),
        ) {
            if let Some(slot) = monthly_seconds.get_mut(month as usize) {
                *slot += seconds;
            }
        }

        let busiest_day = daily
            .iter()
            .filter(|day| day.seconds > 0)
            .fold(None::<UsedTimeRecord>, |best, day| match best {
                Some(best) if best.seconds >= day.seconds => Some(best),
                _ => Some(*day),
            });
        let busiest_hour = activity
            .hour_of_day(user, year)
            .await?
            .into_iter()
            .filter(|hour| hour.seconds > 0)
            .fold(None::<HourlyRecord>, |best, hour| match best {
                Some(best) if best.seconds >= hour.seconds => Some(best),
                _ => Some(hour),
            });

        let activity = ActivitySummary {
            total_seconds: daily.iter().map(|d| d.seconds).sum(),
            active_days: daily.iter().filter(|d| d.seconds > 0).count(),
            busiest_day,
            busiest_hour,
            monthly_seconds,
        };

        let records = balance.store().load_year_records(user, year).await?;
        let income = records.iter().map(|r| r.delta).filter(|d| *d > 0.0).sum();
        let expense = records
            .iter()
            .map(|r| r.delta)
            .filter(|d| *d < 0.0)
            .map(f64::abs)
            .sum();
        let closing_balance = records.first().map(|r| r.balance);
        let record_count = records.len();

        let mut top_categories = aggregate_by_key(
            records,
            |record| record.kind.clone(),
            |category, group| CategoryTotal {
                category,
                delta: group.iter().map(|r| r.delta).sum(),
                count: group.len(),
            },
        );
        top_categories.sort_by(|a, b| b.delta.abs().total_cmp(&a.delta.abs()));
        top_categories.truncate(TOP_CATEGORIES);

        Ok(Self {
            user: user.to_string(),
            year,
            activity,
            balance: BalanceSummary {
                records: record_count,
                income,
                expense,
                closing_balance,
                top_categories,
            },
        })
    }
}
