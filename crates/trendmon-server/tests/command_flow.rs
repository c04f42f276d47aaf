use chrono::{DateTime, Duration, TimeZone, Utc};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;
use trendmon_common::clock::FixedClock;
use trendmon_common::types::{Granularity, HistoricAggregate};
use trendmon_server::commands;
use trendmon_server::config::ServerConfig;
use trendmon_server::state::AppState;
use trendmon_storage::engine::SqliteAggregateStore;
use trendmon_storage::AggregateStore;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 4, 10, 12, 0, 0).unwrap()
}

struct Harness {
    dir: TempDir,
    clock: Arc<FixedClock>,
    state: AppState,
}

fn setup() -> Harness {
    let dir = TempDir::new().unwrap();
    let config = ServerConfig {
        data_dir: dir.path().to_string_lossy().into_owned(),
        ..ServerConfig::default()
    };
    let clock = Arc::new(FixedClock::new(now()));
    let store = Arc::new(
        SqliteAggregateStore::open(&config.database_path())
            .unwrap()
            .with_clock(clock.clone()),
    );
    let state = AppState::with_store(&config, store, clock.clone());
    Harness { dir, clock, state }
}

fn hour_bucket(view: &str, bucket: DateTime<Utc>, value: f64) -> HistoricAggregate {
    HistoricAggregate {
        name: "velocity".into(),
        identifier: "teamA".into(),
        view_id: view.into(),
        granularity: Granularity::Hour,
        bucket_timestamp: bucket,
        value,
        sample_size: 1,
    }
}

fn write_samples(dir: &TempDir, json: String) -> std::path::PathBuf {
    let path = dir.path().join("samples.json");
    fs::write(&path, json).unwrap();
    path
}

#[test]
fn ingest_file_counts_malformed_samples_as_failed() {
    let h = setup();
    let at = (now() - Duration::minutes(10)).timestamp_millis();
    let path = write_samples(
        &h.dir,
        format!(
            r#"[
                {{"name": "lead_time", "identifier": "teamA", "viewId": "v1", "timestamp": {at}, "value": 16.0, "sampleSize": 5}},
                {{"name": "deploys", "identifier": "teamA", "viewId": "v1", "timestamp": {at}, "value": 3.0}},
                {{"name": "lead_time", "identifier": "teamA", "viewId": "v1", "timestamp": {at}, "sampleSize": 3}}
            ]"#
        ),
    );

    let report = commands::ingest_file(&h.state, &path).unwrap();
    assert_eq!(report.processed, 2);
    assert_eq!(report.failed, 1);

    let ts = commands::parse_timestamp_ms(&at.to_string()).unwrap();
    let minute = commands::period(&h.state, "lead_time", "teamA", Granularity::Minute, ts)
        .unwrap()
        .unwrap();
    assert_eq!(minute.value, 16.0);
    assert_eq!(minute.sample_size, 5);
    assert_eq!(
        minute.bucket_timestamp,
        Utc.with_ymd_and_hms(2024, 4, 10, 11, 50, 0).unwrap()
    );

    let hour = commands::period(&h.state, "deploys", "teamA", Granularity::Hour, ts)
        .unwrap()
        .unwrap();
    assert_eq!(hour.value, 3.0);
    assert_eq!(hour.sample_size, 0);

    // two metrics, each in a minute and an hour bucket
    assert_eq!(h.state.store.count().unwrap(), 4);
}

#[test]
fn ingest_file_rejects_unparseable_json() {
    let h = setup();
    let path = write_samples(&h.dir, "{not json".to_string());
    let err = commands::ingest_file(&h.state, &path).unwrap_err();
    assert!(err.to_string().contains("Failed to parse samples file"));
}

#[test]
fn period_without_data_is_none() {
    let h = setup();
    let found =
        commands::period(&h.state, "lead_time", "teamA", Granularity::Hour, now()).unwrap();
    assert!(found.is_none());
}

#[test]
fn tendencies_over_stored_buckets() {
    let h = setup();
    let store = &h.state.store;
    store
        .save(&hour_bucket("v1", now() - Duration::days(10), 60.0))
        .unwrap();
    store
        .save(&hour_bucket("v1", now() - Duration::days(1), 100.0))
        .unwrap();
    store
        .save(&HistoricAggregate {
            granularity: Granularity::Minute,
            bucket_timestamp: now() - Duration::minutes(5),
            value: 150.0,
            ..hour_bucket("v1", now(), 0.0)
        })
        .unwrap();
    store
        .save(&HistoricAggregate {
            identifier: "teamB".into(),
            ..hour_bucket("other", now() - Duration::days(1), 1_000.0)
        })
        .unwrap();

    let views = commands::parse_list("v1");
    let metrics = commands::parse_list("velocity,unknown");
    let result = commands::tendencies(&h.state, &views, &metrics)
        .unwrap()
        .unwrap();

    assert_eq!(result.len(), 1);
    let velocity = result["velocity"];
    assert_eq!(velocity.long_term_tendency, Some(25.0));
    assert_eq!(velocity.short_term_tendency, Some(87.5));
}

#[test]
fn tendencies_without_views_is_none() {
    let h = setup();
    let result =
        commands::tendencies(&h.state, &[], &commands::parse_list("velocity")).unwrap();
    assert!(result.is_none());
}

#[test]
fn prune_removes_minute_buckets_past_retention() {
    let h = setup();
    let at = (now() - Duration::minutes(10)).timestamp_millis();
    let path = write_samples(
        &h.dir,
        format!(
            r#"[{{"name": "lead_time", "identifier": "teamA", "timestamp": {at}, "value": 4.0, "sampleSize": 2}}]"#
        ),
    );
    commands::ingest_file(&h.state, &path).unwrap();

    h.clock.advance(Duration::hours(4));

    let minute = commands::prune(&h.state, "lead_time", "teamA", Granularity::Minute).unwrap();
    assert_eq!(minute.removed, 1);
    assert_eq!(minute.granularity, Granularity::Minute);

    let hour = commands::prune(&h.state, "lead_time", "teamA", Granularity::Hour).unwrap();
    assert_eq!(hour.removed, 0);
    assert_eq!(h.state.store.count().unwrap(), 1);
}
