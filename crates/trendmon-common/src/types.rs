use crate::bucket::bucket_floor;
use crate::error::SampleError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU64;

/// Aggregation time unit. Each granularity keeps its own retention horizon.
///
/// # Examples
///
/// ```
/// use trendmon_common::types::Granularity;
///
/// let g: Granularity = "hour".parse().unwrap();
/// assert_eq!(g, Granularity::Hour);
/// assert_eq!(g.to_string(), "hour");
/// assert_eq!(Granularity::Minute.default_retention_units(), 150);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Minute,
    Hour,
}

impl Granularity {
    pub const ALL: [Granularity; 2] = [Granularity::Minute, Granularity::Hour];

    /// Length of one unit in milliseconds.
    pub fn unit_millis(self) -> i64 {
        match self {
            Granularity::Minute => 60_000,
            Granularity::Hour => 3_600_000,
        }
    }

    /// Default retention horizon in units of this granularity:
    /// 150 minutes, or 90 days expressed in hours.
    pub fn default_retention_units(self) -> i64 {
        match self {
            Granularity::Minute => 150,
            Granularity::Hour => 90 * 24,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Granularity::Minute => "minute",
            Granularity::Hour => "hour",
        }
    }
}

impl std::fmt::Display for Granularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "minute" | "minutes" => Ok(Granularity::Minute),
            "hour" | "hours" => Ok(Granularity::Hour),
            _ => Err(format!("unknown granularity: {s}")),
        }
    }
}

/// What a sample contributes to its bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SampleKind {
    /// A single discrete event. Its value, if any, is added to the bucket.
    Event { value: Option<f64> },
    /// A pre-aggregated batch, folded into the bucket's weighted average.
    Batch { value: f64, sample_size: NonZeroU64 },
}

/// One incoming metric sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub name: String,
    pub identifier: String,
    /// Analytic view the metric belongs to.
    pub view_id: String,
    pub timestamp: DateTime<Utc>,
    pub kind: SampleKind,
}

impl Sample {
    pub fn event(
        name: impl Into<String>,
        identifier: impl Into<String>,
        view_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        value: Option<f64>,
    ) -> Self {
        Self {
            name: name.into(),
            identifier: identifier.into(),
            view_id: view_id.into(),
            timestamp,
            kind: SampleKind::Event { value },
        }
    }

    pub fn batch(
        name: impl Into<String>,
        identifier: impl Into<String>,
        view_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        value: f64,
        sample_size: NonZeroU64,
    ) -> Self {
        Self {
            name: name.into(),
            identifier: identifier.into(),
            view_id: view_id.into(),
            timestamp,
            kind: SampleKind::Batch { value, sample_size },
        }
    }
}

/// Wire form of a sample, as posted by collectors.
///
/// `sampleSize` absent or zero means a single discrete event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSample {
    pub name: String,
    pub identifier: String,
    #[serde(default)]
    pub view_id: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub sample_size: Option<u64>,
}

impl TryFrom<RawSample> for Sample {
    type Error = SampleError;

    fn try_from(raw: RawSample) -> Result<Self, Self::Error> {
        let timestamp = DateTime::from_timestamp_millis(raw.timestamp).ok_or_else(|| {
            SampleError::InvalidTimestamp {
                name: raw.name.clone(),
                millis: raw.timestamp,
            }
        })?;

        if let Some(value) = raw.value.filter(|v| !v.is_finite()) {
            return Err(SampleError::NonFiniteValue {
                name: raw.name,
                value,
            });
        }

        let kind = match raw.sample_size.and_then(NonZeroU64::new) {
            Some(sample_size) => {
                let value = raw.value.ok_or_else(|| SampleError::MissingBatchValue {
                    name: raw.name.clone(),
                    sample_size: sample_size.get(),
                })?;
                SampleKind::Batch { value, sample_size }
            }
            None => SampleKind::Event { value: raw.value },
        };

        Ok(Sample {
            name: raw.name,
            identifier: raw.identifier,
            view_id: raw.view_id,
            timestamp,
            kind,
        })
    }
}

/// Identity of a historic aggregate. At most one aggregate exists per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AggregateKey {
    pub name: String,
    pub identifier: String,
    pub granularity: Granularity,
    pub bucket_timestamp: DateTime<Utc>,
}

impl AggregateKey {
    /// Key of the bucket `sample` lands in at `granularity`.
    pub fn for_sample(sample: &Sample, granularity: Granularity) -> Self {
        Self {
            name: sample.name.clone(),
            identifier: sample.identifier.clone(),
            granularity,
            bucket_timestamp: bucket_floor(sample.timestamp, granularity),
        }
    }

    /// Key of the period containing `timestamp`.
    pub fn for_period(
        name: impl Into<String>,
        identifier: impl Into<String>,
        granularity: Granularity,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            name: name.into(),
            identifier: identifier.into(),
            granularity,
            bucket_timestamp: bucket_floor(timestamp, granularity),
        }
    }
}

/// Persisted running aggregate for one bucket.
///
/// `value` is a weighted average while batches are merged in, or a running
/// sum of discrete event values; `sample_size` stays 0 in sum-only mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricAggregate {
    pub name: String,
    pub identifier: String,
    pub view_id: String,
    pub granularity: Granularity,
    pub bucket_timestamp: DateTime<Utc>,
    pub value: f64,
    pub sample_size: u64,
}

impl HistoricAggregate {
    /// Empty aggregate for the bucket `sample` falls into.
    pub fn seed(sample: &Sample, granularity: Granularity) -> Self {
        Self {
            name: sample.name.clone(),
            identifier: sample.identifier.clone(),
            view_id: sample.view_id.clone(),
            granularity,
            bucket_timestamp: bucket_floor(sample.timestamp, granularity),
            value: 0.0,
            sample_size: 0,
        }
    }

    pub fn key(&self) -> AggregateKey {
        AggregateKey {
            name: self.name.clone(),
            identifier: self.identifier.clone(),
            granularity: self.granularity,
            bucket_timestamp: self.bucket_timestamp,
        }
    }

    /// Folds one sample into the aggregate.
    ///
    /// Batches update the weighted average, `(V*N + v*k) / (N + k)`, and add
    /// `k` to the sample size. Events add their value to the running sum and
    /// leave the sample size alone; an event without a value is a no-op.
    /// The aggregate is left untouched when an error is returned.
    pub fn merge(&mut self, kind: &SampleKind) -> Result<(), SampleError> {
        let (value, sample_size) = match *kind {
            SampleKind::Batch { value, sample_size } => {
                let k = sample_size.get();
                let total = self
                    .sample_size
                    .checked_add(k)
                    .ok_or_else(|| self.degenerate())?;
                let weighted = (self.value * self.sample_size as f64 + value * k as f64)
                    / total as f64;
                (weighted, total)
            }
            SampleKind::Event { value: Some(value) } => (self.value + value, self.sample_size),
            SampleKind::Event { value: None } => return Ok(()),
        };

        if !value.is_finite() {
            return Err(self.degenerate());
        }
        self.value = value;
        self.sample_size = sample_size;
        Ok(())
    }

    fn degenerate(&self) -> SampleError {
        SampleError::DegenerateMerge {
            name: self.name.clone(),
        }
    }
}

/// Grouped average of one metric over a time window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricAverage {
    pub name: String,
    pub value: f64,
}

/// Drift of recent averages against older baselines, in percent.
///
/// A leg is `None` when its drift is undefined (zero baseline or no recent
/// data).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendResult {
    pub long_term_tendency: Option<f64>,
    pub short_term_tendency: Option<f64>,
}
