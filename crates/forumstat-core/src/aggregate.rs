//! Generic grouping and reduction of records
//!
//! Both functions group records and hand each group to a combiner. The engine
//! only guarantees grouping:
//!
//! - every record lands in exactly one group;
//! - groups appear in the order their key was first seen, not sorted;
//! - records inside a group keep their original relative order.
//!
//! Anything else is the combiner's contract. In particular a combiner that
//! wants the "latest" record of a group must sort the group by timestamp
//! itself, because input order is not guaranteed to be time order.
//!
//! # Examples
//!
//! ```
//! use forumstat_core::aggregate::aggregate_by_key;
//!
//! let words = vec!["apple", "avocado", "banana", "blueberry", "cherry"];
//! let counts = aggregate_by_key(
//!     words,
//!     |w| w.chars().next().unwrap(),
//!     |letter, group| (letter, group.len()),
//! );
//! assert_eq!(counts, vec![('a', 2), ('b', 2), ('c', 1)]);
//! ```

use crate::granularity::{Granularity, bucket_start};
use crate::types::TimeSeriesRecord;
use chrono_tz::Tz;
use std::collections::HashMap;
use std::hash::Hash;

/// Group `records` by `key_fn` and reduce each group with `combine`.
///
/// `combine(key, group)` is called exactly once per distinct key, in
/// first-occurrence order. Empty input yields an empty result without calling
/// `combine`.
pub fn aggregate_by_key<T, K, R, I, F, C>(records: I, mut key_fn: F, mut combine: C) -> Vec<R>
where
    I: IntoIterator<Item = T>,
    K: Eq + Hash + Clone,
    F: FnMut(&T) -> K,
    C: FnMut(K, Vec<T>) -> R,
{
    let mut index: HashMap<K, usize> = HashMap::new();
    let mut groups: Vec<(K, Vec<T>)> = Vec::new();

    for record in records {
        let key = key_fn(&record);
        match index.get(&key) {
            Some(&slot) => groups[slot].1.push(record),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push((key, vec![record]));
            }
        }
    }

    groups
        .into_iter()
        .map(|(key, group)| combine(key, group))
        .collect()
}

/// Group records by the start of their time bucket.
///
/// Equivalent to [`aggregate_by_key`] with `bucket_start(record.timestamp())`
/// as the key; the combiner receives the bucket start.
///
/// ```
/// use forumstat_core::aggregate::aggregate_by_time;
/// use forumstat_core::granularity::Granularity;
/// use forumstat_core::types::UsedTimeRecord;
///
/// let records = vec![
///     UsedTimeRecord::new(15_000, 10),
///     UsedTimeRecord::new(45_000, 20),
///     UsedTimeRecord::new(70_000, 30),
/// ];
/// let per_minute = aggregate_by_time(records, Granularity::Minute, &chrono_tz::UTC, |t, g| {
///     UsedTimeRecord::new(t, g.iter().map(|r| r.seconds).sum())
/// });
/// assert_eq!(per_minute, vec![UsedTimeRecord::new(0, 30), UsedTimeRecord::new(60_000, 30)]);
/// ```
pub fn aggregate_by_time<T, R, I, C>(
    records: I,
    granularity: Granularity,
    tz: &Tz,
    combine: C,
) -> Vec<R>
where
    T: TimeSeriesRecord,
    I: IntoIterator<Item = T>,
    C: FnMut(i64, Vec<T>) -> R,
{
    aggregate_by_key(
        records,
        |record| bucket_start(record.timestamp(), granularity, tz),
        combine,
    )
}
