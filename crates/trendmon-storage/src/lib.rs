//! Persistence layer for historic metric aggregates.
//!
//! The default implementation ([`engine::SqliteAggregateStore`]) keeps every
//! bucket in a single SQLite database with WAL mode, one row per
//! (name, identifier, granularity, bucket timestamp).

pub mod engine;
pub mod error;


use chrono::{DateTime, Utc};
use error::Result;
use trendmon_common::types::{AggregateKey, Granularity, HistoricAggregate, MetricAverage};

/// Store of historic aggregates consumed by the tendency engine.
///
/// Implementations must be safe to share across threads (`Send + Sync`)
/// because ingestion batches and trend queries may run concurrently. The
/// store is the single source of truth: callers never cache what it returns.
pub trait AggregateStore: Send + Sync {
    /// Point lookup by identity.
    fn find_by_identity(&self, key: &AggregateKey) -> Result<Option<HistoricAggregate>>;

    /// Aggregates of one series and granularity whose bucket starts strictly
    /// before `cutoff`, oldest first.
    fn find_older_than(
        &self,
        name: &str,
        identifier: &str,
        granularity: Granularity,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<HistoricAggregate>>;

    /// Deletes the given aggregates by identity. Returns the number of rows
    /// removed.
    fn delete_all(&self, aggregates: &[HistoricAggregate]) -> Result<usize>;

    /// Inserts or replaces the aggregate with the same identity.
    fn save(&self, aggregate: &HistoricAggregate) -> Result<()>;

    /// Average bucket value per metric name across `views`, for buckets of
    /// `granularity` starting at or after `since`. Metrics without buckets in
    /// the window are absent from the result.
    fn statistical_average(
        &self,
        views: &[String],
        metric_names: &[String],
        granularity: Granularity,
        since: DateTime<Utc>,
    ) -> Result<Vec<MetricAverage>>;

    /// Total number of stored aggregates.
    fn count(&self) -> Result<u64>;
}
