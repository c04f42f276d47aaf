use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use trendmon_tendency::aggregator::RetentionPolicy;
use trendmon_tendency::trend::TrendWindows;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_database_file")]
    pub database_file: String,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub trend: TrendConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            database_file: default_database_file(),
            retention: RetentionConfig::default(),
            trend: TrendConfig::default(),
        }
    }
}

/// Bucket retention horizons, independent per granularity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    #[serde(default = "default_minute_retention_minutes")]
    pub minute_retention_minutes: i64,
    #[serde(default = "default_hour_retention_days")]
    pub hour_retention_days: i64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            minute_retention_minutes: default_minute_retention_minutes(),
            hour_retention_days: default_hour_retention_days(),
        }
    }
}

impl From<&RetentionConfig> for RetentionPolicy {
    fn from(c: &RetentionConfig) -> Self {
        RetentionPolicy {
            minute_retention_minutes: c.minute_retention_minutes,
            hour_retention_days: c.hour_retention_days,
        }
    }
}

/// Look-back windows used for tendencies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendConfig {
    /// Baseline of the long-term tendency (30 days).
    #[serde(default = "default_long_lookback_hours")]
    pub long_lookback_hours: i64,
    /// Recent window of the long-term tendency (4 days).
    #[serde(default = "default_short_lookback_hours")]
    pub short_lookback_hours: i64,
    /// Recent window of the short-term tendency, over minute buckets.
    /// 0 turns it off and the short-term leg reuses `short_lookback_hours`.
    #[serde(default = "default_recent_lookback_minutes")]
    pub recent_lookback_minutes: i64,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            long_lookback_hours: default_long_lookback_hours(),
            short_lookback_hours: default_short_lookback_hours(),
            recent_lookback_minutes: default_recent_lookback_minutes(),
        }
    }
}

impl From<&TrendConfig> for TrendWindows {
    fn from(c: &TrendConfig) -> Self {
        TrendWindows {
            long_lookback_hours: c.long_lookback_hours,
            short_lookback_hours: c.short_lookback_hours,
            recent_lookback_minutes: (c.recent_lookback_minutes > 0)
                .then_some(c.recent_lookback_minutes),
        }
    }
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_database_file() -> String {
    "trendmon.db".to_string()
}

fn default_minute_retention_minutes() -> i64 {
    150
}

fn default_hour_retention_days() -> i64 {
    90
}

fn default_long_lookback_hours() -> i64 {
    720
}

fn default_short_lookback_hours() -> i64 {
    96
}

fn default_recent_lookback_minutes() -> i64 {
    150
}

impl ServerConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config '{}': {}", path, e))?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects non-positive horizons and windows. The minute window may be 0.
    pub fn validate(&self) -> anyhow::Result<()> {
        let checks = [
            ("retention.minute_retention_minutes", self.retention.minute_retention_minutes),
            ("retention.hour_retention_days", self.retention.hour_retention_days),
            ("trend.long_lookback_hours", self.trend.long_lookback_hours),
            ("trend.short_lookback_hours", self.trend.short_lookback_hours),
        ];
        for (key, value) in checks {
            if value <= 0 {
                anyhow::bail!("{key} must be positive, got {value}");
            }
        }
        if self.trend.recent_lookback_minutes < 0 {
            anyhow::bail!(
                "trend.recent_lookback_minutes must not be negative, got {}",
                self.trend.recent_lookback_minutes
            );
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join(&self.database_file)
    }
}
