use crate::locks::KeyLocks;
use crate::TendencyError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use trendmon_common::bucket::retention_cutoff;
use trendmon_common::clock::Clock;
use trendmon_common::types::{AggregateKey, Granularity, HistoricAggregate, RawSample, Sample};
use trendmon_storage::AggregateStore;

/// How long buckets of each granularity are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub minute_retention_minutes: i64,
    pub hour_retention_days: i64,
}

impl RetentionPolicy {
    /// Horizon expressed in units of `granularity`.
    pub fn units(&self, granularity: Granularity) -> i64 {
        match granularity {
            Granularity::Minute => self.minute_retention_minutes,
            Granularity::Hour => self.hour_retention_days.saturating_mul(24),
        }
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            minute_retention_minutes: Granularity::Minute.default_retention_units(),
            hour_retention_days: Granularity::Hour.default_retention_units() / 24,
        }
    }
}

/// Outcome of one ingestion call.
///
/// `prune_failed` counts retention passes that failed after the sample was
/// already merged; those samples still count as processed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub processed: usize,
    pub failed: usize,
    pub prune_failed: usize,
}

/// Folds samples into minute and hour buckets.
///
/// Every merge re-reads the bucket from the store; nothing is cached between
/// calls. Read-merge-write of one bucket is serialised through [`KeyLocks`],
/// so the aggregator can be shared across threads.
pub struct TendencyAggregator {
    store: Arc<dyn AggregateStore>,
    clock: Arc<dyn Clock>,
    retention: RetentionPolicy,
    locks: KeyLocks<AggregateKey>,
}

impl TendencyAggregator {
    pub fn new(store: Arc<dyn AggregateStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            retention: RetentionPolicy::default(),
            locks: KeyLocks::new(),
        }
    }

    pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    pub fn retention(&self) -> RetentionPolicy {
        self.retention
    }

    /// Ingests a batch of samples.
    ///
    /// A sample that fails is logged and counted in
    /// [`IngestReport::failed`]; the rest of the batch still goes through.
    /// Only an unreachable store aborts the call.
    pub fn ingest(&self, samples: &[Sample]) -> Result<IngestReport, TendencyError> {
        let mut report = IngestReport::default();
        for sample in samples {
            match self.ingest_one(sample) {
                Ok(prune_failed) => {
                    report.processed += 1;
                    report.prune_failed += prune_failed;
                }
                Err(e) if e.is_unavailable() => return Err(e),
                Err(e) => {
                    tracing::error!(
                        metric = %sample.name,
                        identifier = %sample.identifier,
                        error = %e,
                        "Error while processing metric"
                    );
                    report.failed += 1;
                }
            }
        }
        tracing::info!(
            processed = report.processed,
            failed = report.failed,
            prune_failed = report.prune_failed,
            "Ingested sample batch"
        );
        Ok(report)
    }

    /// Like [`ingest`](Self::ingest), for samples still in wire form.
    /// Samples that do not classify are counted as failed.
    pub fn ingest_raw(&self, raw: Vec<RawSample>) -> Result<IngestReport, TendencyError> {
        let mut rejected = 0usize;
        let mut samples = Vec::with_capacity(raw.len());
        for r in raw {
            let name = r.name.clone();
            match Sample::try_from(r) {
                Ok(sample) => samples.push(sample),
                Err(e) => {
                    tracing::error!(metric = %name, error = %e, "Rejected malformed sample");
                    rejected += 1;
                }
            }
        }
        let mut report = self.ingest(&samples)?;
        report.failed += rejected;
        Ok(report)
    }

    /// Merges `sample` into both granularities, then prunes each series.
    /// Returns the number of prune passes that failed.
    fn ingest_one(&self, sample: &Sample) -> Result<usize, TendencyError> {
        for granularity in Granularity::ALL {
            self.add_to_period(sample, granularity)?;
        }
        let mut prune_failed = 0;
        for granularity in Granularity::ALL {
            match self.prune_expired(&sample.name, &sample.identifier, granularity) {
                Ok(_) => {}
                Err(e) if e.is_unavailable() => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        metric = %sample.name,
                        identifier = %sample.identifier,
                        granularity = %granularity,
                        error = %e,
                        "Failed to remove expired periods"
                    );
                    prune_failed += 1;
                }
            }
        }
        Ok(prune_failed)
    }

    fn add_to_period(
        &self,
        sample: &Sample,
        granularity: Granularity,
    ) -> Result<HistoricAggregate, TendencyError> {
        let key = AggregateKey::for_sample(sample, granularity);
        self.locks.with_lock(&key, || -> Result<HistoricAggregate, TendencyError> {
            let mut aggregate = match self.store.find_by_identity(&key)? {
                Some(existing) => existing,
                None => {
                    tracing::debug!(
                        metric = %key.name,
                        identifier = %key.identifier,
                        granularity = %granularity,
                        bucket = %key.bucket_timestamp,
                        "Creating new historic period"
                    );
                    HistoricAggregate::seed(sample, granularity)
                }
            };
            aggregate.merge(&sample.kind)?;
            self.store.save(&aggregate)?;
            Ok(aggregate)
        })
    }

    /// Returns the aggregate of the period containing `timestamp`, if any.
    pub fn aggregate_for_period(
        &self,
        name: &str,
        identifier: &str,
        granularity: Granularity,
        timestamp: DateTime<Utc>,
    ) -> Result<Option<HistoricAggregate>, TendencyError> {
        let key = AggregateKey::for_period(name, identifier, granularity, timestamp);
        Ok(self.store.find_by_identity(&key)?)
    }

    /// Deletes every period of the series whose bucket starts before `cutoff`.
    /// Returns the number of periods removed.
    pub fn remove_expired_periods(
        &self,
        name: &str,
        identifier: &str,
        granularity: Granularity,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, TendencyError> {
        tracing::debug!(
            metric = name,
            identifier,
            granularity = %granularity,
            cutoff = %cutoff,
            "Removing extra periods"
        );
        let expired = self
            .store
            .find_older_than(name, identifier, granularity, cutoff)?;
        if expired.is_empty() {
            return Ok(0);
        }
        let removed = self.store.delete_all(&expired)?;
        tracing::info!(
            metric = name,
            identifier,
            granularity = %granularity,
            removed,
            "Removed expired periods"
        );
        Ok(removed)
    }

    /// Applies the retention horizon of `granularity`, measured from now.
    pub fn prune_expired(
        &self,
        name: &str,
        identifier: &str,
        granularity: Granularity,
    ) -> Result<usize, TendencyError> {
        let cutoff = retention_cutoff(
            self.clock.now(),
            self.retention.units(granularity),
            granularity,
        );
        self.remove_expired_periods(name, identifier, granularity, cutoff)
    }
}
