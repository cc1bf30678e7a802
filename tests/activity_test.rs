//! Integration tests for activity tracking, monthly rollup and the annual summary

mod common;

use common::{BalanceRecordBuilder, keys, memory_balance_store, memory_tracker, utc_ms};
use forumstat::{
    activity::{CompressOutcome, MonthKey, UpdateOutcome},
    query::{ActivityQuery, BalanceQuery, TimeWindow},
    summary::AnnualSummary,
};
use forumstat_core::storage::StorageExt;
use forumstat_core::types::{HourlyRecord, MonthAggData, UsedTimeRecord};

const USER: &str = "alice";

/// Records a March session, then crosses into April
async fn march_then_april() -> (
    std::sync::Arc<forumstat_storage::MemoryStorage>,
    forumstat::activity::ActivityTracker,
) {
    let (storage, tracker) = memory_tracker();
    let t0 = utc_ms(2024, 3, 10, 10, 0, 0);
    let updates = [
        (t0, 300, UpdateOutcome::Inserted(UsedTimeRecord::new(t0, 300))),
        (t0 + 10_000, 100, UpdateOutcome::Debounced),
        (t0 + 60_000, 100, UpdateOutcome::Merged(UsedTimeRecord::new(t0, 400))),
    ];
    for (at, seconds, expected) in updates {
        let outcome = tracker
            .update_month_time_record(USER, UsedTimeRecord::new(at, seconds), at)
            .await
            .unwrap();
        assert_eq!(outcome, expected);
    }

    let t1 = utc_ms(2024, 3, 11, 9, 30, 0);
    tracker
        .update_month_time_record(USER, UsedTimeRecord::new(t1, 200), t1)
        .await
        .unwrap();

    let april = utc_ms(2024, 4, 2, 8, 0, 0);
    let outcome = tracker
        .update_month_time_record(USER, UsedTimeRecord::new(april, 50), april)
        .await
        .unwrap();
    assert_eq!(outcome, UpdateOutcome::Inserted(UsedTimeRecord::new(april, 50)));

    (storage, tracker)
}

#[tokio::test]
async fn test_new_month_rolls_up_previous_one() {
    let (storage, tracker) = march_then_april().await;

    let months = tracker.year_months(USER, 2024).await.unwrap();
    assert_eq!(months.len(), 1);
    assert_eq!(months[0].month, 2);
    assert_eq!(months[0].total_seconds(), 600);
    assert_eq!(months[0].hourly_records[10].seconds, 400);
    assert_eq!(months[0].hourly_records[9].seconds, 200);
    assert_eq!(months[0].daily_records.len(), 31);

    assert_eq!(
        tracker.current_month_records(USER).await.unwrap(),
        vec![UsedTimeRecord::new(utc_ms(2024, 4, 2, 8, 0, 0), 50)]
    );
    let marker: Option<i64> = storage
        .get(&keys().used_time_month_start(USER))
        .await
        .unwrap();
    assert_eq!(marker, Some(utc_ms(2024, 4, 1, 0, 0, 0)));
}

#[tokio::test]
async fn test_compress_across_year_boundary() {
    let (storage, tracker) = memory_tracker();
    let k = keys();
    let late_december = utc_ms(2023, 12, 31, 23, 0, 0);
    let early_january = utc_ms(2024, 1, 2, 10, 0, 0);
    let february = utc_ms(2024, 2, 3, 12, 0, 0);
    storage
        .set(
            &k.used_time_month(USER),
            &vec![
                UsedTimeRecord::new(late_december, 600),
                UsedTimeRecord::new(early_january, 300),
                UsedTimeRecord::new(february, 60),
            ],
        )
        .await
        .unwrap();
    storage
        .set(&k.used_time_month_start(USER), &utc_ms(2023, 12, 1, 0, 0, 0))
        .await
        .unwrap();

    let outcome = tracker
        .compress(USER, utc_ms(2024, 2, 5, 0, 0, 0))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        CompressOutcome::Compressed {
            months: vec![
                MonthKey { year: 2023, month: 11 },
                MonthKey { year: 2024, month: 0 },
            ],
            already_present: vec![],
            records: 2,
            kept: 1,
        }
    );

    let december = tracker.year_months(USER, 2023).await.unwrap();
    assert_eq!(december[0].daily_records[30].seconds, 600);
    assert_eq!(december[0].hourly_records[23].seconds, 600);
    let january = tracker.year_months(USER, 2024).await.unwrap();
    assert_eq!(january[0].daily_records[1].seconds, 300);
    assert_eq!(
        tracker.current_month_records(USER).await.unwrap(),
        vec![UsedTimeRecord::new(february, 60)]
    );
}

#[tokio::test]
async fn test_interrupted_compression_resumes_without_duplicates() {
    let (storage, tracker) = memory_tracker();
    let k = keys();
    let march = utc_ms(2024, 3, 10, 10, 0, 0);
    let existing = MonthAggData {
        month: 2,
        hourly_records: vec![],
        daily_records: vec![UsedTimeRecord::new(march, 999)],
    };
    // The year list was written but the hourly store and marker were not
    storage
        .set(&k.used_time_year(USER, 2024), &vec![existing.clone()])
        .await
        .unwrap();
    storage
        .set(&k.used_time_month(USER), &vec![UsedTimeRecord::new(march, 300)])
        .await
        .unwrap();
    storage
        .set(&k.used_time_month_start(USER), &utc_ms(2024, 3, 1, 0, 0, 0))
        .await
        .unwrap();
    let writes_before = storage.write_count();

    let outcome = tracker
        .compress(USER, utc_ms(2024, 4, 1, 12, 0, 0))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        CompressOutcome::Compressed {
            months: vec![],
            already_present: vec![MonthKey { year: 2024, month: 2 }],
            records: 1,
            kept: 0,
        }
    );

    // Only the hourly store and the marker are rewritten
    assert_eq!(storage.write_count() - writes_before, 2);
    assert_eq!(tracker.year_months(USER, 2024).await.unwrap(), vec![existing]);
    assert!(tracker.current_month_records(USER).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_late_record_after_rollover_is_not_lost() {
    let (_, tracker) = memory_tracker();
    let march = utc_ms(2024, 3, 10, 10, 0, 0);
    tracker
        .update_month_time_record(USER, UsedTimeRecord::new(march, 100), march)
        .await
        .unwrap();

    let outcome = tracker
        .update_month_time_record(
            USER,
            UsedTimeRecord::new(utc_ms(2024, 3, 31, 23, 0, 0), 500),
            utc_ms(2024, 4, 1, 0, 30, 0),
        )
        .await
        .unwrap();
    assert_eq!(outcome, UpdateOutcome::ClosedMonth);

    tracker
        .compress(USER, utc_ms(2024, 5, 2, 0, 0, 0))
        .await
        .unwrap();
    let months = tracker.year_months(USER, 2024).await.unwrap();
    assert_eq!(months.len(), 1);
    assert_eq!(months[0].total_seconds(), 100);
    assert!(tracker.current_month_records(USER).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_month_in_both_stores_is_counted_once() {
    let (storage, tracker) = memory_tracker();
    let k = keys();
    let march = utc_ms(2024, 3, 10, 10, 0, 0);
    let mut daily_records: Vec<UsedTimeRecord> = (1..=31)
        .map(|day| UsedTimeRecord::new(utc_ms(2024, 3, day, 0, 0, 0), 0))
        .collect();
    daily_records[9].seconds = 300;
    let mut hourly_records: Vec<HourlyRecord> = (0..24)
        .map(|hour| HourlyRecord { hour, seconds: 0 })
        .collect();
    hourly_records[10].seconds = 300;
    // Compression wrote the year list but stopped before clearing the store
    storage
        .set(
            &k.used_time_year(USER, 2024),
            &vec![MonthAggData {
                month: 2,
                hourly_records,
                daily_records,
            }],
        )
        .await
        .unwrap();
    storage
        .set(&k.used_time_month(USER), &vec![UsedTimeRecord::new(march, 300)])
        .await
        .unwrap();

    let query = ActivityQuery::new(tracker);
    let daily = query.daily(USER, 2024, TimeWindow::all()).await.unwrap();
    assert_eq!(daily[69].seconds, 300);
    assert_eq!(daily.iter().map(|d| d.seconds).sum::<u64>(), 300);

    let hours = query.hour_of_day(USER, 2024).await.unwrap();
    assert_eq!(hours[10].seconds, 300);
    assert_eq!(hours.iter().map(|h| h.seconds).sum::<u64>(), 300);
}

#[tokio::test]
async fn test_daily_series_spans_the_year() {
    let (_, tracker) = march_then_april().await;
    let query = ActivityQuery::new(tracker);

    let daily = query.daily(USER, 2024, TimeWindow::all()).await.unwrap();
    assert_eq!(daily.len(), 366);
    assert_eq!(daily[0].timestamp, utc_ms(2024, 1, 1, 0, 0, 0));
    assert_eq!(daily[69].seconds, 400);
    assert_eq!(daily[70].seconds, 200);
    assert_eq!(daily[92].seconds, 50);
    assert_eq!(daily.iter().map(|d| d.seconds).sum::<u64>(), 650);

    let window = TimeWindow::new(
        Some(utc_ms(2024, 3, 9, 0, 0, 0)),
        Some(utc_ms(2024, 3, 12, 0, 0, 0)),
    );
    let seconds: Vec<u64> = query
        .daily(USER, 2024, window)
        .await
        .unwrap()
        .iter()
        .map(|d| d.seconds)
        .collect();
    assert_eq!(seconds, vec![0, 400, 200, 0]);
}

#[tokio::test]
async fn test_hour_of_day_merges_compressed_and_live() {
    let (_, tracker) = march_then_april().await;
    let hours = ActivityQuery::new(tracker)
        .hour_of_day(USER, 2024)
        .await
        .unwrap();

    assert_eq!(hours.len(), 24);
    assert_eq!(hours[8].seconds, 50);
    assert_eq!(hours[9].seconds, 200);
    assert_eq!(hours[10].seconds, 400);
    assert_eq!(hours.iter().map(|h| h.seconds).sum::<u64>(), 650);
}

#[tokio::test]
async fn test_hourly_covers_the_live_month() {
    let (_, tracker) = march_then_april().await;
    let query = ActivityQuery::new(tracker);

    let window = TimeWindow::new(
        Some(utc_ms(2024, 4, 2, 6, 0, 0)),
        Some(utc_ms(2024, 4, 2, 9, 0, 0)),
    );
    let seconds: Vec<u64> = query
        .hourly(USER, window)
        .await
        .unwrap()
        .iter()
        .map(|h| h.seconds)
        .collect();
    assert_eq!(seconds, vec![0, 0, 50, 0]);
}

#[tokio::test]
async fn test_annual_summary() {
    let (_, tracker) = march_then_april().await;
    let (_, store) = memory_balance_store();
    store
        .merge_balance_records(
            USER,
            vec![
                BalanceRecordBuilder::new(utc_ms(2023, 12, 1, 0, 0, 0))
                    .delta(1.0)
                    .balance(1.0)
                    .build(),
                BalanceRecordBuilder::new(utc_ms(2024, 1, 1, 0, 0, 0))
                    .kind("初始资本")
                    .delta(100.0)
                    .balance(100.0)
                    .build(),
                BalanceRecordBuilder::new(utc_ms(2024, 2, 1, 0, 0, 0))
                    .kind("创建回复")
                    .delta(-5.0)
                    .balance(95.0)
                    .build(),
                BalanceRecordBuilder::new(utc_ms(2024, 2, 2, 0, 0, 0))
                    .kind("创建回复")
                    .delta(-5.0)
                    .balance(90.0)
                    .build(),
                BalanceRecordBuilder::new(utc_ms(2024, 3, 1, 0, 0, 0))
                    .kind("收到谢意")
                    .delta(10.0)
                    .balance(100.0)
                    .build(),
            ],
        )
        .await
        .unwrap();

    let summary = AnnualSummary::build(
        &BalanceQuery::new(store),
        &ActivityQuery::new(tracker),
        USER,
        2024,
    )
    .await
    .unwrap();

    let activity = &summary.activity;
    assert_eq!(activity.total_seconds, 650);
    assert_eq!(activity.active_days, 3);
    assert_eq!(
        activity.busiest_day,
        Some(UsedTimeRecord::new(utc_ms(2024, 3, 10, 0, 0, 0), 400))
    );
    assert_eq!(activity.busiest_hour.map(|h| h.hour), Some(10));
    assert_eq!(activity.monthly_seconds.len(), 12);
    assert_eq!(activity.monthly_seconds[2], 600);
    assert_eq!(activity.monthly_seconds[3], 50);

    let balance = &summary.balance;
    assert_eq!(balance.records, 4);
    assert_eq!(balance.income, 110.0);
    assert_eq!(balance.expense, 10.0);
    assert_eq!(balance.closing_balance, Some(100.0));
    let top: Vec<(&str, usize)> = balance
        .top_categories
        .iter()
        .map(|c| (c.category.as_str(), c.count))
        .collect();
    assert_eq!(top, vec![("初始资本", 1), ("收到谢意", 1), ("创建回复", 2)]);
}

#[tokio::test]
async fn test_summary_of_empty_year() {
    let (_, tracker) = memory_tracker();
    let (_, store) = memory_balance_store();
    let summary = AnnualSummary::build(
        &BalanceQuery::new(store),
        &ActivityQuery::new(tracker),
        USER,
        2022,
    )
    .await
    .unwrap();

    assert_eq!(summary.activity.total_seconds, 0);
    assert_eq!(summary.activity.busiest_day, None);
    assert_eq!(summary.activity.busiest_hour, None);
    assert_eq!(summary.balance.records, 0);
    assert_eq!(summary.balance.closing_balance, None);
    assert!(summary.balance.top_categories.is_empty());
}
