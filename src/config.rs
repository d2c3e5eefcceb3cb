use crate::error::{MonitorError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

const DEFAULT_THROTTLE_INTERVAL_MS: u64 = 75;
const DEFAULT_SIGNAL_DEBOUNCE_MS: u64 = 50;
const DEFAULT_PIPELINE_TICK_MS: u64 = 10;
const DEFAULT_PIPELINE_BATCH_SIZE: usize = 10;
const DEFAULT_TREND_WINDOW: usize = 100;
const DEFAULT_ANOMALY_THRESHOLD: f64 = 3.0;
const DEFAULT_TREND_THRESHOLD: f64 = 0.05;
const DEFAULT_MAX_TREND_POINTS: usize = 10_000;
const DEFAULT_TREND_SAMPLE_INTERVAL_MS: u64 = 1000;
const DEFAULT_SNAPSHOT_INTERVAL_MS: u64 = 60_000;
const DEFAULT_HISTORY_RETENTION_HOURS: u64 = 24;
const DEFAULT_FAULT_HISTORY_CAPACITY: usize = 10_000;
const DEFAULT_FAULT_SCORE_PENALTY: f64 = 5.0;

/// Tunables for every timer, window and capacity in the engine.
///
/// Missing fields in a JSON file fall back to the defaults below, so a
/// config file only needs to name what it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Minimum spacing between system-wide recompute passes.
    pub throttle_interval_ms: u64,
    /// Minimum spacing between per-unit health notifications.
    pub signal_debounce_ms: u64,
    pub pipeline_tick_ms: u64,
    /// Items drained from the ingestion queue per tick.
    pub pipeline_batch_size: usize,
    pub trend_window: usize,
    pub anomaly_threshold: f64,
    /// Slope magnitude (units per second) below which a trend is stable.
    pub trend_threshold: f64,
    pub max_trend_points: usize,
    pub trend_sample_interval_ms: u64,
    pub snapshot_interval_ms: u64,
    pub history_retention_hours: u64,
    pub fault_history_capacity: usize,
    /// Flat score deduction per active fault.
    pub fault_score_penalty: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            throttle_interval_ms: DEFAULT_THROTTLE_INTERVAL_MS,
            signal_debounce_ms: DEFAULT_SIGNAL_DEBOUNCE_MS,
            pipeline_tick_ms: DEFAULT_PIPELINE_TICK_MS,
            pipeline_batch_size: DEFAULT_PIPELINE_BATCH_SIZE,
            trend_window: DEFAULT_TREND_WINDOW,
            anomaly_threshold: DEFAULT_ANOMALY_THRESHOLD,
            trend_threshold: DEFAULT_TREND_THRESHOLD,
            max_trend_points: DEFAULT_MAX_TREND_POINTS,
            trend_sample_interval_ms: DEFAULT_TREND_SAMPLE_INTERVAL_MS,
            snapshot_interval_ms: DEFAULT_SNAPSHOT_INTERVAL_MS,
            history_retention_hours: DEFAULT_HISTORY_RETENTION_HOURS,
            fault_history_capacity: DEFAULT_FAULT_HISTORY_CAPACITY,
            fault_score_penalty: DEFAULT_FAULT_SCORE_PENALTY,
        }
    }
}

impl MonitorConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        if self.throttle_interval_ms == 0 {
            return Err(MonitorError::InvalidConfig("throttle_interval_ms must be positive".into()));
        }
        if self.pipeline_tick_ms == 0 {
            return Err(MonitorError::InvalidConfig("pipeline_tick_ms must be positive".into()));
        }
        if self.pipeline_batch_size == 0 || self.pipeline_batch_size > crate::pipeline::MAX_BATCH_SIZE {
            return Err(MonitorError::InvalidConfig(format!(
                "pipeline_batch_size must be within 1..={}",
                crate::pipeline::MAX_BATCH_SIZE
            )));
        }
        if self.trend_window < 3 {
            return Err(MonitorError::InvalidConfig("trend_window must hold at least 3 points".into()));
        }
        if self.max_trend_points < self.trend_window {
            return Err(MonitorError::InvalidConfig("max_trend_points must cover trend_window".into()));
        }
        if !(self.anomaly_threshold.is_finite() && self.anomaly_threshold > 0.0) {
            return Err(MonitorError::InvalidConfig("anomaly_threshold must be positive".into()));
        }
        if !(self.trend_threshold.is_finite() && self.trend_threshold >= 0.0) {
            return Err(MonitorError::InvalidConfig("trend_threshold must be non-negative".into()));
        }
        if self.snapshot_interval_ms == 0 || self.fault_history_capacity == 0 {
            return Err(MonitorError::InvalidConfig("snapshot interval and fault history capacity must be positive".into()));
        }
        Ok(())
    }

    pub fn history_retention_ms(&self) -> u64 {
        self.history_retention_hours.saturating_mul(3_600_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = MonitorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pipeline_batch_size, 10);
        assert_eq!(config.history_retention_ms(), 86_400_000);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = MonitorConfig::from_json_str(r#"{"throttle_interval_ms": 100}"#).unwrap();
        assert_eq!(config.throttle_interval_ms, 100);
        assert_eq!(config.trend_window, 100);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(MonitorConfig::from_json_str(r#"{"pipeline_batch_size": 0}"#).is_err());
        assert!(MonitorConfig::from_json_str(r#"{"trend_window": 2}"#).is_err());
        assert!(MonitorConfig::from_json_str("not json").is_err());
    }
}
