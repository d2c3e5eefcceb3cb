//! Sliding-window trend and anomaly analysis.
//!
//! Each (unit, parameter) series is a bounded deque of timestamped samples.
//! Trends come from an ordinary least-squares fit over the trailing window;
//! anomalies are z-scores against the whole retained series.

use crate::config::MonitorConfig;
use crate::events::MonitorEvent;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use tracing::debug;

const MIN_TREND_POINTS: usize = 3;
const MIN_ANOMALY_POINTS: usize = 10;
/// Residual scatter around the fitted line, relative to the mean, above
/// which a series is volatile.
const VOLATILITY_CV: f64 = 0.2;
/// Means closer to zero than this make the relative scatter meaningless;
/// such series are never classed volatile.
const NEAR_ZERO_MEAN: f64 = 1e-6;
const ANOMALY_SCORE_SCALE: f64 = 5.0;
const PREDICTION_HORIZON_MS: f64 = 10_000.0;
const MIN_CROSSING_SLOPE: f64 = 1e-10;
const MS_PER_SECOND: f64 = 1000.0;
const MS_PER_HOUR: u64 = 3_600_000;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub timestamp: u64,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrendDirection {
    Stable,
    Increasing,
    Decreasing,
    Volatile,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendResult {
    pub direction: TrendDirection,
    /// Units per second.
    pub slope: f64,
    pub r_squared: f64,
    pub current_value: f64,
    /// Fitted value ten seconds past the newest sample.
    pub predicted_value: f64,
    /// |z| of the current value over the window, scaled into [0, 1].
    pub anomaly_score: f64,
    pub sample_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub parameter: String,
    pub value: f64,
    pub expected: f64,
    pub z_score: f64,
}

/// Least-squares line, with x centred on the window's mean timestamp so
/// epoch-scale millisecond values do not swamp the sums.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Regression {
    slope_per_ms: f64,
    x_mean: f64,
    y_mean: f64,
    r_squared: f64,
    /// Root-mean-square distance of the samples from the line.
    residual_rms: f64,
}

impl Regression {
    fn fit<'a>(points: impl Iterator<Item = &'a DataPoint> + Clone) -> Self {
        let n = points.clone().count() as f64;
        let x_mean = points.clone().map(|p| p.timestamp as f64).sum::<f64>() / n;
        let y_mean = points.clone().map(|p| p.value).sum::<f64>() / n;

        let (mut sxx, mut sxy) = (0.0, 0.0);
        for p in points.clone() {
            let dx = p.timestamp as f64 - x_mean;
            sxx += dx * dx;
            sxy += dx * (p.value - y_mean);
        }

        if sxx.abs() < f64::EPSILON {
            let ss_tot = points.map(|p| (p.value - y_mean).powi(2)).sum::<f64>();
            return Self {
                slope_per_ms: 0.0,
                x_mean,
                y_mean,
                r_squared: 0.0,
                residual_rms: (ss_tot / n).sqrt(),
            };
        }

        let slope_per_ms = sxy / sxx;
        let (mut ss_res, mut ss_tot) = (0.0, 0.0);
        for p in points {
            let predicted = y_mean + slope_per_ms * (p.timestamp as f64 - x_mean);
            ss_res += (p.value - predicted).powi(2);
            ss_tot += (p.value - y_mean).powi(2);
        }
        let r_squared = if ss_tot > 0.0 { 1.0 - ss_res / ss_tot } else { 0.0 };

        Self {
            slope_per_ms,
            x_mean,
            y_mean,
            r_squared,
            residual_rms: (ss_res / n).sqrt(),
        }
    }

    fn value_at(&self, timestamp: f64) -> f64 {
        self.y_mean + self.slope_per_ms * (timestamp - self.x_mean)
    }

    fn time_at(&self, value: f64) -> f64 {
        self.x_mean + (value - self.y_mean) / self.slope_per_ms
    }
}

fn mean_and_std<'a>(values: impl Iterator<Item = &'a DataPoint> + Clone) -> (f64, f64) {
    let n = values.clone().count();
    if n == 0 {
        return (0.0, 0.0);
    }
    let mean = values.clone().map(|p| p.value).sum::<f64>() / n as f64;
    let variance = values.map(|p| (p.value - mean).powi(2)).sum::<f64>() / n as f64;
    (mean, variance.sqrt())
}

fn z_score(value: f64, mean: f64, std_dev: f64) -> f64 {
    if std_dev < f64::EPSILON {
        0.0
    } else {
        (value - mean) / std_dev
    }
}

#[derive(Debug)]
pub struct TrendAnalyzer {
    series: BTreeMap<String, BTreeMap<String, VecDeque<DataPoint>>>,
    window_size: usize,
    max_points: usize,
    anomaly_threshold: f64,
    trend_threshold: f64,
    events: Vec<MonitorEvent>,
}

impl TrendAnalyzer {
    pub fn new(config: &MonitorConfig) -> Self {
        Self {
            series: BTreeMap::new(),
            window_size: config.trend_window.max(MIN_TREND_POINTS),
            max_points: config.max_trend_points.max(1),
            anomaly_threshold: config.anomaly_threshold,
            trend_threshold: config.trend_threshold,
            events: Vec::new(),
        }
    }

    /// Appends a sample, first checking it against the retained series.
    /// Non-finite values are ignored.
    pub fn add_data_point(&mut self, unit_id: &str, parameter: &str, value: f64, timestamp: u64) {
        if !value.is_finite() {
            return;
        }

        if let Some(anomaly) = self.check_anomaly(unit_id, parameter, value) {
            debug!(unit_id, parameter, value, expected = anomaly.expected, z = anomaly.z_score, "Anomaly detected");
            self.events.push(MonitorEvent::AnomalyDetected {
                unit_id: unit_id.to_string(),
                parameter: parameter.to_string(),
                value,
                expected: anomaly.expected,
            });
        }

        let series = self
            .series
            .entry(unit_id.to_string())
            .or_default()
            .entry(parameter.to_string())
            .or_default();
        series.push_back(DataPoint { timestamp, value });
        while series.len() > self.max_points {
            series.pop_front();
        }
    }

    pub fn add_data_points(&mut self, unit_id: &str, values: &[(String, f64)], timestamp: u64) {
        for (parameter, value) in values {
            self.add_data_point(unit_id, parameter, *value, timestamp);
        }
    }

    fn series(&self, unit_id: &str, parameter: &str) -> Option<&VecDeque<DataPoint>> {
        self.series.get(unit_id)?.get(parameter)
    }

    fn window<'a>(&self, data: &'a VecDeque<DataPoint>) -> impl Iterator<Item = &'a DataPoint> + Clone + 'a {
        let start = data.len().saturating_sub(self.window_size);
        data.range(start..)
    }

    /// `None` until the series holds at least three samples.
    pub fn analyze_trend(&self, unit_id: &str, parameter: &str) -> Option<TrendResult> {
        let data = self.series(unit_id, parameter)?;
        let newest = data.back()?;
        if data.len() < MIN_TREND_POINTS {
            return None;
        }

        let window = self.window(data);
        let fit = Regression::fit(window.clone());
        let slope = fit.slope_per_ms * MS_PER_SECOND;
        let (mean, std_dev) = mean_and_std(window.clone());

        // Scatter is measured around the fitted line so a clean ramp stays a trend.
        let cv = if mean.abs() < NEAR_ZERO_MEAN { 0.0 } else { fit.residual_rms / mean.abs() };
        let direction = if cv > VOLATILITY_CV {
            TrendDirection::Volatile
        } else if slope.abs() < self.trend_threshold {
            TrendDirection::Stable
        } else if slope > 0.0 {
            TrendDirection::Increasing
        } else {
            TrendDirection::Decreasing
        };

        let predicted_value = fit.value_at(newest.timestamp as f64 + PREDICTION_HORIZON_MS);
        let anomaly_score = (z_score(newest.value, mean, std_dev).abs() / ANOMALY_SCORE_SCALE).clamp(0.0, 1.0);

        Some(TrendResult {
            direction,
            slope,
            r_squared: fit.r_squared,
            current_value: newest.value,
            predicted_value,
            anomaly_score,
            sample_count: window.count(),
        })
    }

    /// Trend for every parameter of a unit that has enough samples.
    pub fn analyze_trends(&self, unit_id: &str) -> BTreeMap<String, TrendResult> {
        let Some(parameters) = self.series.get(unit_id) else {
            return BTreeMap::new();
        };
        parameters
            .keys()
            .filter_map(|p| self.analyze_trend(unit_id, p).map(|t| (p.clone(), t)))
            .collect()
    }

    /// Fitted value `seconds_ahead` past the newest sample. With fewer than
    /// three samples this is the newest value, or 0 with no data.
    pub fn predict_value(&self, unit_id: &str, parameter: &str, seconds_ahead: f64) -> f64 {
        let Some(data) = self.series(unit_id, parameter) else {
            return 0.0;
        };
        let Some(newest) = data.back() else {
            return 0.0;
        };
        if data.len() < MIN_TREND_POINTS {
            return newest.value;
        }
        let fit = Regression::fit(self.window(data));
        let target = newest.timestamp as f64 + seconds_ahead * MS_PER_SECOND;
        fit.value_at(target)
    }

    /// Earliest future timestamp (ms) at which the fitted line reaches
    /// `threshold`.
    pub fn predict_threshold_crossing(&self, unit_id: &str, parameter: &str, threshold: f64) -> Option<u64> {
        let data = self.series(unit_id, parameter)?;
        let newest = data.back()?;
        if data.len() < MIN_TREND_POINTS {
            return None;
        }
        let fit = Regression::fit(self.window(data));
        if fit.slope_per_ms.abs() < MIN_CROSSING_SLOPE {
            return None;
        }
        let crossing = fit.time_at(threshold);
        let in_future = crossing > newest.timestamp as f64;
        in_future.then(|| crossing.round() as u64)
    }

    fn check_anomaly(&self, unit_id: &str, parameter: &str, value: f64) -> Option<Anomaly> {
        let data = self.series(unit_id, parameter)?;
        if data.len() < MIN_ANOMALY_POINTS {
            return None;
        }
        let (mean, std_dev) = mean_and_std(data.iter());
        let z = z_score(value, mean, std_dev);
        (z.abs() > self.anomaly_threshold).then(|| Anomaly {
            parameter: parameter.to_string(),
            value,
            expected: mean,
            z_score: z,
        })
    }

    /// Needs at least ten retained samples; otherwise nothing is anomalous.
    pub fn is_anomaly(&self, unit_id: &str, parameter: &str, value: f64) -> bool {
        self.check_anomaly(unit_id, parameter, value).is_some()
    }

    /// Checks the newest sample of each parameter against its series.
    pub fn detect_anomalies(&self, unit_id: &str) -> Vec<Anomaly> {
        let Some(parameters) = self.series.get(unit_id) else {
            return Vec::new();
        };
        parameters
            .iter()
            .filter(|(_, data)| data.len() >= MIN_ANOMALY_POINTS)
            .filter_map(|(parameter, data)| {
                let newest = data.back()?;
                let (mean, std_dev) = mean_and_std(data.iter());
                let z = z_score(newest.value, mean, std_dev);
                (z.abs() > self.anomaly_threshold).then(|| Anomaly {
                    parameter: parameter.clone(),
                    value: newest.value,
                    expected: mean,
                    z_score: z,
                })
            })
            .collect()
    }

    /// Newest `max_points` samples, oldest first.
    pub fn data_points(&self, unit_id: &str, parameter: &str, max_points: usize) -> Vec<DataPoint> {
        let Some(data) = self.series(unit_id, parameter) else {
            return Vec::new();
        };
        let start = data.len().saturating_sub(max_points);
        data.range(start..).copied().collect()
    }

    /// `points` evenly spaced samples of the fitted line across the retained
    /// time span.
    pub fn trend_line(&self, unit_id: &str, parameter: &str, points: usize) -> Vec<DataPoint> {
        let Some(data) = self.series(unit_id, parameter) else {
            return Vec::new();
        };
        let (Some(first), Some(last)) = (data.front(), data.back()) else {
            return Vec::new();
        };
        if data.len() < MIN_TREND_POINTS || points < 2 {
            return Vec::new();
        }

        let fit = Regression::fit(self.window(data));
        let step = last.timestamp.saturating_sub(first.timestamp) / (points as u64 - 1);
        (0..points as u64)
            .map(|i| {
                let timestamp = first.timestamp + i * step;
                let value = fit.value_at(timestamp as f64);
                DataPoint { timestamp, value }
            })
            .collect()
    }

    pub fn parameters(&self, unit_id: &str) -> Vec<String> {
        self.series
            .get(unit_id)
            .map(|p| p.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn point_count(&self, unit_id: &str, parameter: &str) -> usize {
        self.series(unit_id, parameter).map_or(0, VecDeque::len)
    }

    pub fn clear_data(&mut self, unit_id: &str) {
        self.series.remove(unit_id);
    }

    pub fn clear_all_data(&mut self) {
        self.series.clear();
    }

    /// Drops samples older than `max_age_hours` before `now`.
    pub fn prune_old_data(&mut self, max_age_hours: u64, now: u64) {
        let cutoff = now.saturating_sub(max_age_hours.saturating_mul(MS_PER_HOUR));
        for parameters in self.series.values_mut() {
            for data in parameters.values_mut() {
                while data.front().is_some_and(|p| p.timestamp < cutoff) {
                    data.pop_front();
                }
            }
            parameters.retain(|_, data| !data.is_empty());
        }
        self.series.retain(|_, parameters| !parameters.is_empty());
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn set_window_size(&mut self, samples: usize) {
        self.window_size = samples.max(MIN_TREND_POINTS);
    }

    pub fn anomaly_threshold(&self) -> f64 {
        self.anomaly_threshold
    }

    pub fn set_anomaly_threshold(&mut self, threshold: f64) {
        self.anomaly_threshold = threshold;
    }

    pub fn set_trend_threshold(&mut self, threshold: f64) {
        self.trend_threshold = threshold;
    }

    pub fn drain_events(&mut self) -> Vec<MonitorEvent> {
        std::mem::take(&mut self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer() -> TrendAnalyzer {
        TrendAnalyzer::new(&MonitorConfig::default())
    }

    #[test]
    fn test_linear_series_is_increasing() {
        let mut trends = analyzer();
        let start = 1_700_000_000_000u64;
        for s in 0..30u64 {
            trends.add_data_point("TX-001", "temperature", 10.0 + 0.5 * s as f64, start + s * 1000);
        }
        let result = trends.analyze_trend("TX-001", "temperature").unwrap();
        // The raw spread is far above 20% of the mean; only scatter around the line counts.
        assert_eq!(result.direction, TrendDirection::Increasing);
        assert!((result.slope - 0.5).abs() < 1e-6);
        assert!((result.r_squared - 1.0).abs() < 1e-9);
        assert!((result.predicted_value - (10.0 + 0.5 * 39.0)).abs() < 1e-6);
    }

    #[test]
    fn test_flat_noise_is_stable() {
        let mut trends = analyzer();
        for i in 0..50u64 {
            let noise = if i % 2 == 0 { 0.3 } else { -0.3 };
            trends.add_data_point("RX-001", "gain", 30.0 + noise, i * 1000);
        }
        let result = trends.analyze_trend("RX-001", "gain").unwrap();
        assert_eq!(result.direction, TrendDirection::Stable);
    }

    #[test]
    fn test_volatility_overrides_slope() {
        let mut trends = analyzer();
        for i in 0..20u64 {
            let value = if i % 2 == 0 { 10.0 } else { 40.0 };
            trends.add_data_point("NET-001", "latency", value, i * 1000);
        }
        assert_eq!(
            trends.analyze_trend("NET-001", "latency").unwrap().direction,
            TrendDirection::Volatile
        );
    }

    #[test]
    fn test_near_zero_mean_is_not_volatile() {
        let mut trends = analyzer();
        for i in 0..20u64 {
            let value = if i % 2 == 0 { 0.01 } else { -0.01 };
            trends.add_data_point("ANT-001", "positionError", value, i * 1000);
        }
        assert_ne!(
            trends.analyze_trend("ANT-001", "positionError").unwrap().direction,
            TrendDirection::Volatile
        );
    }

    #[test]
    fn test_anomaly_requires_ten_points() {
        let mut trends = analyzer();
        let samples = [48.0, 52.0, 49.0, 51.0, 47.0, 53.0, 50.0, 50.0, 48.0, 52.0];
        for (i, v) in samples.iter().take(9).enumerate() {
            trends.add_data_point("PSU-001", "inputVoltage", *v, i as u64 * 1000);
        }
        assert!(!trends.is_anomaly("PSU-001", "inputVoltage", 65.0));

        trends.add_data_point("PSU-001", "inputVoltage", samples[9], 9000);
        assert!(trends.is_anomaly("PSU-001", "inputVoltage", 65.0));
        assert!(!trends.is_anomaly("PSU-001", "inputVoltage", 51.0));
    }

    #[test]
    fn test_anomaly_event_on_insert() {
        let mut trends = analyzer();
        for i in 0..10u64 {
            let v = if i % 2 == 0 { 49.0 } else { 51.0 };
            trends.add_data_point("COOL-001", "coolantTemp", v, i * 1000);
        }
        assert!(trends.drain_events().is_empty());
        trends.add_data_point("COOL-001", "coolantTemp", 70.0, 10_000);
        let events = trends.drain_events();
        assert!(matches!(
            events.as_slice(),
            [MonitorEvent::AnomalyDetected { value, expected, .. }] if (*value - 70.0).abs() < 1e-9 && (*expected - 50.0).abs() < 1e-9
        ));
    }

    #[test]
    fn test_prediction_with_sparse_data() {
        let mut trends = analyzer();
        assert!(trends.predict_value("TX-001", "vswr", 10.0).abs() < f64::EPSILON);
        trends.add_data_point("TX-001", "vswr", 1.3, 0);
        assert!((trends.predict_value("TX-001", "vswr", 10.0) - 1.3).abs() < f64::EPSILON);
        assert!(trends.analyze_trend("TX-001", "vswr").is_none());
    }

    #[test]
    fn test_threshold_crossing_prediction() {
        let mut trends = analyzer();
        for s in 0..10u64 {
            trends.add_data_point("COOL-001", "coolantTemp", 30.0 + s as f64, s * 1000);
        }
        // 30 + s reaches 45 at s = 15.
        assert_eq!(trends.predict_threshold_crossing("COOL-001", "coolantTemp", 45.0), Some(15_000));
        assert_eq!(trends.predict_threshold_crossing("COOL-001", "coolantTemp", 20.0), None);
    }

    #[test]
    fn test_series_bounded_and_pruned() {
        let config = MonitorConfig {
            trend_window: 5,
            max_trend_points: 8,
            ..MonitorConfig::default()
        };
        let mut trends = TrendAnalyzer::new(&config);
        for i in 0..20u64 {
            trends.add_data_point("DP-001", "cpuLoad", 40.0, i * MS_PER_HOUR);
        }
        assert_eq!(trends.point_count("DP-001", "cpuLoad"), 8);
        assert_eq!(trends.data_points("DP-001", "cpuLoad", 3).len(), 3);

        trends.prune_old_data(2, 19 * MS_PER_HOUR);
        assert_eq!(trends.point_count("DP-001", "cpuLoad"), 3);
        trends.prune_old_data(0, 100 * MS_PER_HOUR);
        assert!(trends.parameters("DP-001").is_empty());
    }
}
