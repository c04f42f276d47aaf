use std::fs;
use tempfile::TempDir;
use trendmon_server::config::ServerConfig;
use trendmon_tendency::aggregator::RetentionPolicy;
use trendmon_tendency::trend::TrendWindows;

fn write_config(dir: &TempDir, content: &str) -> String {
    let path = dir.path().join("server.toml");
    fs::write(&path, content).unwrap();
    path.to_string_lossy().into_owned()
}

#[test]
fn empty_file_uses_defaults() {
    let dir = TempDir::new().unwrap();
    let config = ServerConfig::load(&write_config(&dir, "")).unwrap();

    assert_eq!(config.data_dir, "data");
    assert_eq!(config.database_file, "trendmon.db");
    assert_eq!(config.retention.minute_retention_minutes, 150);
    assert_eq!(config.retention.hour_retention_days, 90);
    assert_eq!(config.trend.long_lookback_hours, 720);
    assert_eq!(config.trend.short_lookback_hours, 96);
    assert_eq!(config.trend.recent_lookback_minutes, 150);
    assert_eq!(
        RetentionPolicy::from(&config.retention),
        RetentionPolicy::default()
    );
    assert_eq!(TrendWindows::from(&config.trend), TrendWindows::default());
}

#[test]
fn partial_sections_keep_remaining_defaults() {
    let dir = TempDir::new().unwrap();
    let config = ServerConfig::load(&write_config(
        &dir,
        r#"
data_dir = "/var/lib/trendmon"

[retention]
hour_retention_days = 30

[trend]
recent_lookback_minutes = 60
"#,
    ))
    .unwrap();

    assert_eq!(
        config.database_path(),
        std::path::PathBuf::from("/var/lib/trendmon/trendmon.db")
    );
    assert_eq!(config.retention.minute_retention_minutes, 150);
    assert_eq!(config.retention.hour_retention_days, 30);
    assert_eq!(config.trend.long_lookback_hours, 720);
    assert_eq!(config.trend.recent_lookback_minutes, 60);
}

#[test]
fn shipped_config_parses() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../config/server.toml");
    let config = ServerConfig::load(path).unwrap();
    assert_eq!(config.retention.minute_retention_minutes, 150);
    assert_eq!(config.trend.short_lookback_hours, 96);
}

#[test]
fn non_positive_window_is_rejected() {
    let dir = TempDir::new().unwrap();
    let err = ServerConfig::load(&write_config(&dir, "[trend]\nshort_lookback_hours = 0\n"))
        .unwrap_err();
    assert!(err.to_string().contains("trend.short_lookback_hours"));
}

#[test]
fn zero_minute_window_turns_it_off() {
    let dir = TempDir::new().unwrap();
    let config =
        ServerConfig::load(&write_config(&dir, "[trend]\nrecent_lookback_minutes = 0\n")).unwrap();
    assert_eq!(TrendWindows::from(&config.trend).recent_lookback_minutes, None);

    let err = ServerConfig::load(&write_config(&dir, "[trend]\nrecent_lookback_minutes = -5\n"))
        .unwrap_err();
    assert!(err.to_string().contains("trend.recent_lookback_minutes"));
}

#[test]
fn malformed_toml_is_an_error() {
    let dir = TempDir::new().unwrap();
    assert!(ServerConfig::load(&write_config(&dir, "data_dir = [")).is_err());
}

#[test]
fn missing_file_is_an_error() {
    let err = ServerConfig::load("/nonexistent/trendmon.toml").unwrap_err();
    assert!(err.to_string().contains("Failed to read config"));
}
