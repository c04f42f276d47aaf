use crate::error::{Result, StorageError};
use crate::AggregateStore;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use trendmon_common::clock::{Clock, SystemClock};
use trendmon_common::types::{AggregateKey, Granularity, HistoricAggregate, MetricAverage};

const AGGREGATES_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS historic_aggregates (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    identifier TEXT NOT NULL,
    view_id TEXT NOT NULL DEFAULT '',
    granularity TEXT NOT NULL,
    bucket_ts INTEGER NOT NULL,
    value REAL NOT NULL,
    sample_size INTEGER NOT NULL DEFAULT 0,
    updated_at INTEGER NOT NULL,
    UNIQUE (name, identifier, granularity, bucket_ts)
);
CREATE INDEX IF NOT EXISTS idx_historic_view_metric_time
    ON historic_aggregates(view_id, name, granularity, bucket_ts);
";

const SELECT_COLUMNS: &str =
    "SELECT name, identifier, view_id, granularity, bucket_ts, value, sample_size FROM historic_aggregates";

pub struct SqliteAggregateStore {
    conn: Mutex<Connection>,
    clock: Arc<dyn Clock>,
}

impl SqliteAggregateStore {
    /// Opens (creating if needed) the database file at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let unavailable = |reason: String| StorageError::Unavailable {
            path: path.display().to_string(),
            reason,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| unavailable(e.to_string()))?;
        }
        let conn = Connection::open(path).map_err(|e| unavailable(e.to_string()))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(AGGREGATES_SCHEMA)?;
        tracing::info!(path = %path.display(), "Opened aggregate store");
        Ok(Self {
            conn: Mutex::new(conn),
            clock: Arc::new(SystemClock),
        })
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| StorageError::Unavailable {
            path: ":memory:".to_string(),
            reason: e.to_string(),
        })?;
        conn.execute_batch(AGGREGATES_SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            clock: Arc::new(SystemClock),
        })
    }

    /// Clock used to stamp `updated_at` on every save.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// When the aggregate with identity `key` was last saved.
    pub fn last_updated(&self, key: &AggregateKey) -> Result<Option<DateTime<Utc>>> {
        let conn = self.lock_connection();
        let millis: Option<i64> = conn
            .query_row(
                "SELECT updated_at FROM historic_aggregates
                 WHERE name = ?1 AND identifier = ?2 AND granularity = ?3 AND bucket_ts = ?4",
                rusqlite::params![
                    &key.name,
                    &key.identifier,
                    key.granularity.as_str(),
                    key.bucket_timestamp.timestamp_millis(),
                ],
                |row| row.get(0),
            )
            .optional()?;
        millis
            .map(|ms| {
                DateTime::from_timestamp_millis(ms)
                    .ok_or(StorageError::InvalidTimestamp { millis: ms })
            })
            .transpose()
    }

    /// Lock the connection, recovering from a poisoned Mutex if necessary.
    fn lock_connection(&self) -> MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Raw column values of one `historic_aggregates` row.
type AggregateRow = (String, String, String, String, i64, f64, i64);

fn read_row(row: &Row<'_>) -> rusqlite::Result<AggregateRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn into_aggregate(row: AggregateRow) -> Result<HistoricAggregate> {
    let (name, identifier, view_id, granularity, bucket_ms, value, sample_size) = row;
    let granularity: Granularity = granularity
        .parse()
        .map_err(|_| StorageError::InvalidGranularity { value: granularity })?;
    let bucket_timestamp = DateTime::from_timestamp_millis(bucket_ms)
        .ok_or(StorageError::InvalidTimestamp { millis: bucket_ms })?;
    let sample_size = u64::try_from(sample_size).map_err(|_| StorageError::OutOfRange {
        column: "sample_size",
    })?;
    Ok(HistoricAggregate {
        name,
        identifier,
        view_id,
        granularity,
        bucket_timestamp,
        value,
        sample_size,
    })
}

impl AggregateStore for SqliteAggregateStore {
    fn find_by_identity(&self, key: &AggregateKey) -> Result<Option<HistoricAggregate>> {
        let conn = self.lock_connection();
        let mut stmt = conn.prepare_cached(&format!(
            "{SELECT_COLUMNS} WHERE name = ?1 AND identifier = ?2 AND granularity = ?3 AND bucket_ts = ?4"
        ))?;
        let row = stmt
            .query_row(
                rusqlite::params![
                    &key.name,
                    &key.identifier,
                    key.granularity.as_str(),
                    key.bucket_timestamp.timestamp_millis(),
                ],
                read_row,
            )
            .optional()?;
        row.map(into_aggregate).transpose()
    }

    fn find_older_than(
        &self,
        name: &str,
        identifier: &str,
        granularity: Granularity,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<HistoricAggregate>> {
        let conn = self.lock_connection();
        let mut stmt = conn.prepare_cached(&format!(
            "{SELECT_COLUMNS} WHERE name = ?1 AND identifier = ?2 AND granularity = ?3 AND bucket_ts < ?4
             ORDER BY bucket_ts ASC"
        ))?;
        let rows = stmt.query_map(
            rusqlite::params![name, identifier, granularity.as_str(), cutoff.timestamp_millis()],
            read_row,
        )?;
        let mut results = Vec::new();
        for row in rows {
            results.push(into_aggregate(row?)?);
        }
        Ok(results)
    }

    fn delete_all(&self, aggregates: &[HistoricAggregate]) -> Result<usize> {
        if aggregates.is_empty() {
            return Ok(0);
        }
        let conn = self.lock_connection();
        let tx = conn.unchecked_transaction()?;
        let mut removed = 0usize;
        {
            let mut stmt = tx.prepare_cached(
                "DELETE FROM historic_aggregates
                 WHERE name = ?1 AND identifier = ?2 AND granularity = ?3 AND bucket_ts = ?4",
            )?;
            for agg in aggregates {
                removed += stmt.execute(rusqlite::params![
                    &agg.name,
                    &agg.identifier,
                    agg.granularity.as_str(),
                    agg.bucket_timestamp.timestamp_millis(),
                ])?;
            }
        }
        tx.commit()?;
        tracing::debug!(removed, "Deleted historic aggregates");
        Ok(removed)
    }

    fn save(&self, aggregate: &HistoricAggregate) -> Result<()> {
        let sample_size = i64::try_from(aggregate.sample_size).map_err(|_| {
            StorageError::OutOfRange {
                column: "sample_size",
            }
        })?;
        let conn = self.lock_connection();
        let mut stmt = conn.prepare_cached(
            "INSERT INTO historic_aggregates
                (name, identifier, view_id, granularity, bucket_ts, value, sample_size, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT (name, identifier, granularity, bucket_ts) DO UPDATE SET
                view_id = excluded.view_id,
                value = excluded.value,
                sample_size = excluded.sample_size,
                updated_at = excluded.updated_at",
        )?;
        stmt.execute(rusqlite::params![
            &aggregate.name,
            &aggregate.identifier,
            &aggregate.view_id,
            aggregate.granularity.as_str(),
            aggregate.bucket_timestamp.timestamp_millis(),
            aggregate.value,
            sample_size,
            self.clock.now().timestamp_millis(),
        ])?;
        Ok(())
    }

    fn statistical_average(
        &self,
        views: &[String],
        metric_names: &[String],
        granularity: Granularity,
        since: DateTime<Utc>,
    ) -> Result<Vec<MetricAverage>> {
        if views.is_empty() || metric_names.is_empty() {
            return Ok(Vec::new());
        }

        let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = vec![
            Box::new(granularity.as_str()),
            Box::new(since.timestamp_millis()),
        ];
        let view_marks = placeholders(&mut params, views);
        let name_marks = placeholders(&mut params, metric_names);
        let sql = format!(
            "SELECT name, AVG(value) FROM historic_aggregates
             WHERE granularity = ?1 AND bucket_ts >= ?2
               AND view_id IN ({view_marks}) AND name IN ({name_marks})
             GROUP BY name ORDER BY name"
        );

        let conn = self.lock_connection();
        let mut stmt = conn.prepare(&sql)?;
        let param_refs: Vec<&dyn rusqlite::types::ToSql> =
            params.iter().map(|p| p.as_ref()).collect();
        let rows = stmt.query_map(param_refs.as_slice(), |row| {
            Ok(MetricAverage {
                name: row.get(0)?,
                value: row.get(1)?,
            })
        })?;
        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    fn count(&self) -> Result<u64> {
        let conn = self.lock_connection();
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM historic_aggregates", [], |row| row.get(0))?;
        u64::try_from(count).map_err(|_| StorageError::OutOfRange { column: "count" })
    }
}

/// Appends `values` to `params` and returns the matching `?N` list.
fn placeholders(params: &mut Vec<Box<dyn rusqlite::types::ToSql>>, values: &[String]) -> String {
    let mut marks = Vec::with_capacity(values.len());
    for value in values {
        params.push(Box::new(value.clone()));
        marks.push(format!("?{}", params.len()));
    }
    marks.join(", ")
}
