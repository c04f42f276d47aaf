use crate::config::ServerConfig;
use anyhow::Result;
use std::sync::Arc;
use trendmon_common::clock::{Clock, SystemClock};
use trendmon_storage::engine::SqliteAggregateStore;
use trendmon_storage::AggregateStore;
use trendmon_tendency::aggregator::TendencyAggregator;
use trendmon_tendency::trend::TrendCalculator;

/// Components shared by every command.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn AggregateStore>,
    pub aggregator: Arc<TendencyAggregator>,
    pub trends: Arc<TrendCalculator>,
}

impl AppState {
    /// Opens the configured SQLite store and wires the engine to the system
    /// clock.
    pub fn open(config: &ServerConfig) -> Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store: Arc<dyn AggregateStore> = Arc::new(
            SqliteAggregateStore::open(&config.database_path())?.with_clock(clock.clone()),
        );
        Ok(Self::with_store(config, store, clock))
    }

    pub fn with_store(
        config: &ServerConfig,
        store: Arc<dyn AggregateStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let aggregator = TendencyAggregator::new(store.clone(), clock.clone())
            .with_retention((&config.retention).into());
        let trends = TrendCalculator::new(store.clone(), clock).with_windows((&config.trend).into());
        Self {
            store,
            aggregator: Arc::new(aggregator),
            trends: Arc::new(trends),
        }
    }
}
