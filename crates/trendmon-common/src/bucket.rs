//! Bucket arithmetic for the two aggregation granularities.
//!
//! All functions are pure. "Now" is always passed in by the caller so that
//! the same inputs give the same bucket across restarts.

use crate::types::Granularity;
use chrono::{DateTime, Duration, Utc};

/// Returns the start of the UTC minute or hour containing `ts`.
///
/// Timestamps before the epoch floor downwards, so every instant inside a
/// calendar-aligned unit maps to the same bucket.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use trendmon_common::bucket::bucket_floor;
/// use trendmon_common::types::Granularity;
///
/// let ts = Utc.with_ymd_and_hms(2024, 3, 1, 10, 42, 17).unwrap();
/// let hour = bucket_floor(ts, Granularity::Hour);
/// assert_eq!(hour, Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap());
/// ```
pub fn bucket_floor(ts: DateTime<Utc>, granularity: Granularity) -> DateTime<Utc> {
    let unit = granularity.unit_millis();
    let floored = ts.timestamp_millis().div_euclid(unit) * unit;
    DateTime::from_timestamp_millis(floored).unwrap_or(ts)
}

/// Returns `now` minus `n` units of `granularity`.
///
/// Used both for retention cutoffs and for trend window boundaries.
pub fn lookback(now: DateTime<Utc>, n: i64, granularity: Granularity) -> DateTime<Utc> {
    let span = Duration::milliseconds(n.saturating_mul(granularity.unit_millis()));
    now.checked_sub_signed(span).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Cutoff below which buckets of `granularity` are expired, for a horizon of
/// `retention_units` units.
pub fn retention_cutoff(
    now: DateTime<Utc>,
    retention_units: i64,
    granularity: Granularity,
) -> DateTime<Utc> {
    lookback(now, retention_units, granularity)
}
