use crate::TendencyError;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use trendmon_common::bucket::lookback;
use trendmon_common::clock::Clock;
use trendmon_common::types::{Granularity, TrendResult};
use trendmon_storage::AggregateStore;

/// Look-back windows compared by the trend calculator.
///
/// Both legs measure drift against the same baseline: the average of hour
/// buckets over the last `long_lookback_hours`. The long-term leg's recent
/// value is the hour-bucket average over the last `short_lookback_hours`.
/// The short-term leg's recent value is the minute-bucket average over the
/// last `recent_lookback_minutes`; with no minute window it falls back to the
/// `short_lookback_hours` average.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrendWindows {
    pub long_lookback_hours: i64,
    pub short_lookback_hours: i64,
    pub recent_lookback_minutes: Option<i64>,
}

impl Default for TrendWindows {
    fn default() -> Self {
        Self {
            long_lookback_hours: 720,
            short_lookback_hours: 96,
            recent_lookback_minutes: Some(150),
        }
    }
}

/// Percentage drift of `recent` relative to `baseline`.
///
/// Returns `None` when the drift is undefined: no recent value, or a zero or
/// non-finite baseline.
///
/// # Examples
///
/// ```
/// use trendmon_tendency::trend::percentage_drift;
///
/// assert_eq!(percentage_drift(100.0, Some(110.0)), Some(10.0));
/// assert_eq!(percentage_drift(0.0, Some(5.0)), None);
/// assert_eq!(percentage_drift(10.0, None), None);
/// ```
pub fn percentage_drift(baseline: f64, recent: Option<f64>) -> Option<f64> {
    let recent = recent?;
    if baseline == 0.0 || !baseline.is_finite() {
        return None;
    }
    let drift = ((recent - baseline) / baseline) * 100.0;
    drift.is_finite().then_some(drift)
}

/// Derives per-metric tendencies from stored aggregates.
pub struct TrendCalculator {
    store: Arc<dyn AggregateStore>,
    clock: Arc<dyn Clock>,
    windows: TrendWindows,
}

impl TrendCalculator {
    pub fn new(store: Arc<dyn AggregateStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            windows: TrendWindows::default(),
        }
    }

    pub fn with_windows(mut self, windows: TrendWindows) -> Self {
        self.windows = windows;
        self
    }

    /// Computes the tendency of each metric across `views`.
    ///
    /// Returns `Ok(None)` when no view is given. Metrics are keyed by name and
    /// only those with data in the long window appear. A leg whose drift is
    /// undefined is `None` without affecting other metrics.
    pub fn compute_tendencies(
        &self,
        views: &[String],
        metric_names: &[String],
    ) -> Result<Option<BTreeMap<String, TrendResult>>, TendencyError> {
        if views.is_empty() {
            return Ok(None);
        }

        let w = self.windows;
        let now = self.clock.now();
        let long = self.window_average(
            views,
            metric_names,
            Granularity::Hour,
            lookback(now, w.long_lookback_hours, Granularity::Hour),
        )?;
        let short = self.window_average(
            views,
            metric_names,
            Granularity::Hour,
            lookback(now, w.short_lookback_hours, Granularity::Hour),
        )?;
        let recent = match w.recent_lookback_minutes {
            Some(minutes) => Some(self.window_average(
                views,
                metric_names,
                Granularity::Minute,
                lookback(now, minutes, Granularity::Minute),
            )?),
            None => None,
        };

        let tendencies: BTreeMap<String, TrendResult> = long
            .into_iter()
            .map(|(name, baseline)| {
                let short_avg = short.get(&name).copied();
                let recent_avg = match &recent {
                    Some(minutes) => minutes.get(&name).copied(),
                    None => short_avg,
                };
                let result = TrendResult {
                    long_term_tendency: percentage_drift(baseline, short_avg),
                    short_term_tendency: percentage_drift(baseline, recent_avg),
                };
                (name, result)
            })
            .collect();

        tracing::debug!(
            views = views.len(),
            metrics = tendencies.len(),
            "Computed tendencies"
        );
        Ok(Some(tendencies))
    }

    fn window_average(
        &self,
        views: &[String],
        metric_names: &[String],
        granularity: Granularity,
        since: DateTime<Utc>,
    ) -> Result<HashMap<String, f64>, TendencyError> {
        let rows = self
            .store
            .statistical_average(views, metric_names, granularity, since)?;
        Ok(rows.into_iter().map(|r| (r.name, r.value)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drift_of_ten_percent() {
        assert_eq!(percentage_drift(100.0, Some(110.0)), Some(10.0));
    }

    #[test]
    fn negative_drift() {
        assert_eq!(percentage_drift(200.0, Some(150.0)), Some(-25.0));
    }

    #[test]
    fn undefined_drift_is_none() {
        assert_eq!(percentage_drift(0.0, Some(1.0)), None);
        assert_eq!(percentage_drift(f64::NAN, Some(1.0)), None);
        assert_eq!(percentage_drift(1.0, None), None);
        assert_eq!(percentage_drift(f64::MIN_POSITIVE, Some(f64::MAX)), None);
    }
}
