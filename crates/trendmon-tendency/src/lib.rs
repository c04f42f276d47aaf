//! Tendency engine: rolling per-bucket aggregates and trend drift.
//!
//! [`aggregator::TendencyAggregator`] folds incoming samples into minute and
//! hour buckets and prunes buckets past their retention horizon.
//! [`trend::TrendCalculator`] compares window averages of those buckets to
//! report how a metric is drifting.

pub mod aggregator;
pub mod locks;
pub mod trend;


use trendmon_common::SampleError;
use trendmon_storage::error::StorageError;

/// Errors surfaced by the tendency engine.
#[derive(Debug, thiserror::Error)]
pub enum TendencyError {
    /// The store cannot be reached. Never isolated per sample: it aborts the
    /// current call and is left to the caller to retry.
    #[error("Tendency: store unavailable: {0}")]
    StoreUnavailable(#[source] StorageError),

    /// A store failure scoped to a single record.
    #[error("Tendency: storage error: {0}")]
    Storage(#[source] StorageError),

    /// The sample could not be classified or merged.
    #[error("Tendency: {0}")]
    Sample(#[from] SampleError),
}

impl TendencyError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, TendencyError::StoreUnavailable(_))
    }
}

impl From<StorageError> for TendencyError {
    fn from(err: StorageError) -> Self {
        if err.is_unavailable() {
            TendencyError::StoreUnavailable(err)
        } else {
            TendencyError::Storage(err)
        }
    }
}
