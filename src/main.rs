//! forumstat - Balance history and activity statistics for forum users

use forumstat::{
    activity::{ActivityTracker, CompressOutcome, UpdateOutcome},
    balance::BalanceStore,
    cli::{ActivityCommand, BalanceView, Cli, Command, parse_instant},
    crawler::{Crawler, DirectoryPageSource},
    error::Result,
    output::get_formatter,
    query::{ActivityQuery, BalanceQuery, TimeWindow},
    summary::AnnualSummary,
};
use clap::Parser;
use forumstat_core::granularity::Granularity;
use forumstat_core::storage::{Storage, storage_usage};
use forumstat_core::types::{RawBalanceRecord, UsedTimeRecord};
use forumstat_storage::JsonFileStorage;
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // The --quiet flag overrides RUST_LOG
    let filter = if cli.quiet {
        tracing_subscriber::EnvFilter::new("warn")
    } else if cli.verbose {
        tracing_subscriber::EnvFilter::new(
            "forumstat=debug,forumstat_core=debug,forumstat_storage=debug",
        )
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("forumstat=info"))
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let is_tty = is_terminal::is_terminal(std::io::stdout());
    if !is_tty {
        colored::control::set_override(false);
    }

    let config = cli.app_config()?;
    info!("Using timezone: {}", config.timezone.describe());
    info!("Using storage: {}", config.data_path.display());

    let tz = config.timezone.tz;
    let storage: Arc<dyn Storage> = Arc::new(JsonFileStorage::open(&config.data_path).await?);
    let store = BalanceStore::new(storage.clone(), config.keys.clone(), tz);
    let tracker = ActivityTracker::new(storage.clone(), config.keys.clone(), config.tracker);
    let formatter = get_formatter(cli.json, tz);

    match cli.command {
        Command::Import { user, file } => {
            info!("Importing balance records for {} from {}", user, file.display());
            let content = tokio::fs::read_to_string(&file).await?;
            let raw: Vec<RawBalanceRecord> = serde_json::from_str(&content)?;
            let records = raw.into_iter().map(|r| r.into_record(&user)).collect();
            let stats = store.merge_balance_records(&user, records).await?;
            println!("{}", formatter.format_merge(&stats));
        }
        Command::Sync {
            user,
            pages_dir,
            incremental,
        } => {
            let mut crawl = config.crawl;
            crawl.stop_at_known_page = incremental;
            let crawler = Crawler::new(DirectoryPageSource::new(pages_dir), crawl)
                .with_progress(!cli.json && is_tty);
            let report = crawler.sync_into(&store, &user).await?;
            println!("{}", formatter.format_sync(&report));
        }
        Command::Balance {
            user,
            by,
            granularity,
            range,
        } => {
            let (start, end) = range.to_bounds(&tz)?;
            let window = TimeWindow::new(start, end);
            let query = BalanceQuery::new(store);
            let output = match by {
                BalanceView::Time => {
                    let series = query.by_time(&user, granularity, window).await?;
                    formatter.format_balance_series(&series, granularity)
                }
                BalanceView::Filled => {
                    let series = query.filled(&user, granularity, window).await?;
                    formatter.format_balance_series(&series, granularity)
                }
                BalanceView::Category => {
                    let totals = query.by_category(&user, window).await?;
                    formatter.format_categories(&totals)
                }
            };
            println!("{output}");
        }
        Command::Activity { command } => match command {
            ActivityCommand::Record { user, seconds, at } => {
                let now = parse_instant(None)?;
                let at = parse_instant(at.as_deref())?;
                let outcome = tracker
                    .update_month_time_record(&user, UsedTimeRecord::new(at, seconds), now)
                    .await?;
                let (status, record) = match outcome {
                    UpdateOutcome::Debounced => ("debounced", None),
                    UpdateOutcome::Merged(record) => ("merged", Some(record)),
                    UpdateOutcome::Inserted(record) => ("inserted", Some(record)),
                    UpdateOutcome::ClosedMonth => ("closed-month", None),
                };
                if cli.json {
                    println!("{}", json!({ "status": status, "record": record }));
                } else {
                    match record {
                        Some(record) => println!(
                            "{status}: {}s in the hour starting {}",
                            record.seconds,
                            forumstat_core::granularity::format_bucket(
                                record.timestamp,
                                Granularity::Hour,
                                &tz
                            )
                        ),
                        None if status == "debounced" => {
                            println!("{status}: too soon after the previous update")
                        }
                        None => println!("{status}: that month is already compressed"),
                    }
                }
            }
            ActivityCommand::Compress { user } => {
                let now = parse_instant(None)?;
                match tracker.compress(&user, now).await? {
                    CompressOutcome::Compressed {
                        months,
                        already_present,
                        records,
                        kept,
                    } => {
                        if cli.json {
                            println!(
                                "{}",
                                json!({
                                    "status": "compressed",
                                    "months": months,
                                    "already_present": already_present,
                                    "records": records,
                                    "kept": kept,
                                })
                            );
                        } else {
                            println!(
                                "Compressed {records} hourly records into {} month(s), {kept} kept",
                                months.len()
                            );
                        }
                    }
                    CompressOutcome::Skipped(reason) => {
                        if cli.json {
                            println!(
                                "{}",
                                json!({ "status": "skipped", "reason": reason.to_string() })
                            );
                        } else {
                            println!("Nothing compressed: {reason}");
                        }
                    }
                }
            }
            ActivityCommand::Hourly { user, range } => {
                let (start, end) = range.to_bounds(&tz)?;
                let series = ActivityQuery::new(tracker)
                    .hourly(&user, TimeWindow::new(start, end))
                    .await?;
                println!("{}", formatter.format_activity(&series, Granularity::Hour));
            }
            ActivityCommand::Daily { user, year, range } => {
                let (start, end) = range.to_bounds(&tz)?;
                let series = ActivityQuery::new(tracker)
                    .daily(&user, year, TimeWindow::new(start, end))
                    .await?;
                println!("{}", formatter.format_activity(&series, Granularity::Day));
            }
            ActivityCommand::Hours { user, year } => {
                let hours = ActivityQuery::new(tracker).hour_of_day(&user, year).await?;
                println!("{}", formatter.format_hour_of_day(&hours));
            }
        },
        Command::Summary { user, year } => {
            let summary = AnnualSummary::build(
                &BalanceQuery::new(store),
                &ActivityQuery::new(tracker),
                &user,
                year,
            )
            .await?;
            println!("{}", formatter.format_summary(&summary));
        }
        Command::Storage => {
            let usage = storage_usage(storage.as_ref(), config.keys.namespace()).await?;
            println!("{}", formatter.format_storage_usage(&usage));
        }
    }

    Ok(())
}
