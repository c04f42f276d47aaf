use crate::state::AppState;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use trendmon_common::types::{Granularity, HistoricAggregate, RawSample, TrendResult};
use trendmon_tendency::aggregator::IngestReport;

/// Reads a JSON array of raw samples from `path` and ingests it.
pub fn ingest_file(state: &AppState, path: &Path) -> Result<IngestReport> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read samples file '{}'", path.display()))?;
    let raw: Vec<RawSample> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse samples file '{}'", path.display()))?;
    tracing::info!(path = %path.display(), count = raw.len(), "Loaded samples");
    Ok(state.aggregator.ingest_raw(raw)?)
}

/// Splits a comma separated argument, dropping empty entries.
pub fn parse_list(arg: &str) -> Vec<String> {
    arg.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn tendencies(
    state: &AppState,
    views: &[String],
    metric_names: &[String],
) -> Result<Option<BTreeMap<String, TrendResult>>> {
    Ok(state.trends.compute_tendencies(views, metric_names)?)
}

pub fn parse_granularity(arg: &str) -> Result<Granularity> {
    arg.parse::<Granularity>().map_err(|e| anyhow::anyhow!(e))
}

pub fn parse_timestamp_ms(arg: &str) -> Result<DateTime<Utc>> {
    let millis: i64 = arg
        .parse()
        .with_context(|| format!("Invalid timestamp '{arg}'"))?;
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| anyhow::anyhow!("Timestamp out of range: {millis}"))
}

pub fn period(
    state: &AppState,
    name: &str,
    identifier: &str,
    granularity: Granularity,
    timestamp: DateTime<Utc>,
) -> Result<Option<HistoricAggregate>> {
    Ok(state
        .aggregator
        .aggregate_for_period(name, identifier, granularity, timestamp)?)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PruneReport {
    pub name: String,
    pub identifier: String,
    pub granularity: Granularity,
    pub removed: usize,
}

pub fn prune(
    state: &AppState,
    name: &str,
    identifier: &str,
    granularity: Granularity,
) -> Result<PruneReport> {
    let removed = state.aggregator.prune_expired(name, identifier, granularity)?;
    Ok(PruneReport {
        name: name.to_string(),
        identifier: identifier.to_string(),
        granularity,
        removed,
    })
}
