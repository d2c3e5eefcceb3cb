use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single telemetry reading. Units report a mix of analog values,
/// discrete flags and mode strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TelemetryValue {
    Flag(bool),
    Number(f64),
    Text(String),
}

impl TelemetryValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            TelemetryValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            TelemetryValue::Flag(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            TelemetryValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl From<f64> for TelemetryValue {
    fn from(value: f64) -> Self {
        TelemetryValue::Number(value)
    }
}

impl From<bool> for TelemetryValue {
    fn from(value: bool) -> Self {
        TelemetryValue::Flag(value)
    }
}

impl From<&str> for TelemetryValue {
    fn from(value: &str) -> Self {
        TelemetryValue::Text(value.to_string())
    }
}

/// Parameter name to value, as carried by one telemetry update.
pub type TelemetryFrame = BTreeMap<String, TelemetryValue>;

/// Result of writing a value, checked in the same order as the
/// threshold bands nest: critical bands win over warning bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThresholdCrossing {
    None,
    CriticalLow,
    CriticalHigh,
    WarningLow,
    WarningHigh,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryParameter {
    pub name: String,
    pub display_name: String,
    pub unit: String,
    pub value: TelemetryValue,
    pub nominal: Option<f64>,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub warning_low: Option<f64>,
    pub warning_high: Option<f64>,
    pub critical_low: Option<f64>,
    pub critical_high: Option<f64>,
    pub timestamp: u64,
    pub is_valid: bool,
}

impl TelemetryParameter {
    /// Analog parameter starting at its nominal value.
    pub fn numeric(name: &str, display_name: &str, unit: &str, nominal: f64, min: f64, max: f64) -> Self {
        Self {
            name: name.to_string(),
            display_name: display_name.to_string(),
            unit: unit.to_string(),
            value: TelemetryValue::Number(nominal),
            nominal: Some(nominal),
            min_value: Some(min),
            max_value: Some(max),
            warning_low: None,
            warning_high: None,
            critical_low: None,
            critical_high: None,
            timestamp: 0,
            is_valid: true,
        }
    }

    pub fn flag(name: &str, display_name: &str, initial: bool) -> Self {
        Self::untyped(name, display_name, TelemetryValue::Flag(initial))
    }

    pub fn text(name: &str, display_name: &str, initial: &str) -> Self {
        Self::untyped(name, display_name, TelemetryValue::Text(initial.to_string()))
    }

    fn untyped(name: &str, display_name: &str, value: TelemetryValue) -> Self {
        Self {
            name: name.to_string(),
            display_name: display_name.to_string(),
            unit: String::new(),
            value,
            nominal: None,
            min_value: None,
            max_value: None,
            warning_low: None,
            warning_high: None,
            critical_low: None,
            critical_high: None,
            timestamp: 0,
            is_valid: true,
        }
    }

    #[must_use]
    pub fn warn_low(mut self, threshold: f64) -> Self {
        self.warning_low = Some(threshold);
        self
    }

    #[must_use]
    pub fn warn_high(mut self, threshold: f64) -> Self {
        self.warning_high = Some(threshold);
        self
    }

    #[must_use]
    pub fn crit_low(mut self, threshold: f64) -> Self {
        self.critical_low = Some(threshold);
        self
    }

    #[must_use]
    pub fn crit_high(mut self, threshold: f64) -> Self {
        self.critical_high = Some(threshold);
        self
    }

    #[must_use]
    pub fn with_value(mut self, value: impl Into<TelemetryValue>) -> Self {
        self.value = value.into();
        self.validate();
        self
    }

    pub fn is_numeric(&self) -> bool {
        self.min_value.is_some() || self.max_value.is_some() || self.nominal.is_some()
    }

    pub fn numeric_value(&self) -> Option<f64> {
        self.value.as_number()
    }

    pub fn has_thresholds(&self) -> bool {
        self.warning_low.is_some()
            || self.warning_high.is_some()
            || self.critical_low.is_some()
            || self.critical_high.is_some()
    }

    pub fn is_critical(&self) -> bool {
        let Some(v) = self.numeric_value() else {
            return false;
        };
        self.critical_low.is_some_and(|t| v <= t) || self.critical_high.is_some_and(|t| v >= t)
    }

    /// Warning band only; a critical reading is not also a warning.
    pub fn is_warning(&self) -> bool {
        let Some(v) = self.numeric_value() else {
            return false;
        };
        let warning = self.warning_low.is_some_and(|t| v <= t) || self.warning_high.is_some_and(|t| v >= t);
        warning && !self.is_critical()
    }

    pub fn is_within_limits(&self) -> bool {
        let Some(v) = self.numeric_value() else {
            return true;
        };
        !(self.min_value.is_some_and(|min| v < min) || self.max_value.is_some_and(|max| v > max))
    }

    /// Recomputes the validity flag from the physical bounds.
    pub fn validate(&mut self) -> bool {
        self.is_valid = self.is_within_limits();
        self.is_valid
    }

    pub fn set_value(&mut self, value: TelemetryValue, timestamp: u64) -> ThresholdCrossing {
        self.value = value;
        self.timestamp = timestamp;
        self.validate();
        self.crossing()
    }

    /// Limits are inclusive, matching the unit health policies.
    pub fn crossing(&self) -> ThresholdCrossing {
        let Some(v) = self.numeric_value() else {
            return ThresholdCrossing::None;
        };
        if self.critical_low.is_some_and(|t| v <= t) {
            ThresholdCrossing::CriticalLow
        } else if self.critical_high.is_some_and(|t| v >= t) {
            ThresholdCrossing::CriticalHigh
        } else if self.warning_low.is_some_and(|t| v <= t) {
            ThresholdCrossing::WarningLow
        } else if self.warning_high.is_some_and(|t| v >= t) {
            ThresholdCrossing::WarningHigh
        } else {
            ThresholdCrossing::None
        }
    }
}

/// Per-unit registry of named telemetry parameters.
///
/// Only parameters declared in the unit's catalogue are stored; writes to
/// unknown names are ignored so a noisy source cannot grow the registry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelemetryStore {
    parameters: BTreeMap<String, TelemetryParameter>,
    last_update: u64,
}

impl TelemetryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parameters(parameters: impl IntoIterator<Item = TelemetryParameter>) -> Self {
        let mut store = Self::new();
        for parameter in parameters {
            store.add_parameter(parameter);
        }
        store
    }

    pub fn add_parameter(&mut self, mut parameter: TelemetryParameter) {
        parameter.validate();
        self.parameters.insert(parameter.name.clone(), parameter);
    }

    pub fn remove_parameter(&mut self, name: &str) -> bool {
        self.parameters.remove(name).is_some()
    }

    pub fn has_parameter(&self, name: &str) -> bool {
        self.parameters.contains_key(name)
    }

    pub fn parameter(&self, name: &str) -> Option<&TelemetryParameter> {
        self.parameters.get(name)
    }

    pub fn parameters(&self) -> impl Iterator<Item = &TelemetryParameter> {
        self.parameters.values()
    }

    pub fn parameter_names(&self) -> Vec<String> {
        self.parameters.keys().cloned().collect()
    }

    pub fn value(&self, name: &str) -> Option<&TelemetryValue> {
        self.parameters.get(name).map(|p| &p.value)
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        self.value(name).and_then(TelemetryValue::as_number)
    }

    pub fn flag(&self, name: &str) -> Option<bool> {
        self.value(name).and_then(TelemetryValue::as_flag)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.value(name).and_then(TelemetryValue::as_text)
    }

    /// Writes one value. Returns `None` when the parameter is not registered.
    pub fn set_value(&mut self, name: &str, value: TelemetryValue, timestamp: u64) -> Option<ThresholdCrossing> {
        let parameter = self.parameters.get_mut(name)?;
        let crossing = parameter.set_value(value, timestamp);
        self.last_update = timestamp;
        Some(crossing)
    }

    /// Writes every known value from `frame`, returning the threshold
    /// crossings observed along the way.
    pub fn apply(&mut self, frame: &TelemetryFrame, timestamp: u64) -> Vec<(String, ThresholdCrossing)> {
        let mut crossings = Vec::new();
        for (name, value) in frame {
            if let Some(crossing) = self.set_value(name, value.clone(), timestamp) {
                if crossing != ThresholdCrossing::None {
                    crossings.push((name.clone(), crossing));
                }
            }
        }
        self.last_update = timestamp;
        crossings
    }

    pub fn is_warning(&self, name: &str) -> bool {
        self.parameters.get(name).is_some_and(TelemetryParameter::is_warning)
    }

    pub fn is_critical(&self, name: &str) -> bool {
        self.parameters.get(name).is_some_and(TelemetryParameter::is_critical)
    }

    /// Unknown parameters are treated as within limits.
    pub fn is_within_limits(&self, name: &str) -> bool {
        self.parameters.get(name).map_or(true, TelemetryParameter::is_within_limits)
    }

    pub fn snapshot(&self) -> TelemetryFrame {
        self.parameters
            .iter()
            .map(|(name, p)| (name.clone(), p.value.clone()))
            .collect()
    }

    pub fn numeric_values(&self) -> Vec<(String, f64)> {
        self.parameters
            .iter()
            .filter_map(|(name, p)| p.numeric_value().map(|v| (name.clone(), v)))
            .collect()
    }

    pub fn last_update(&self) -> u64 {
        self.last_update
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temperature() -> TelemetryParameter {
        TelemetryParameter::numeric("temperature", "Temperature", "C", 45.0, 0.0, 100.0)
            .warn_high(60.0)
            .crit_high(80.0)
    }

    #[test]
    fn test_threshold_crossings() {
        let mut param = temperature();
        assert_eq!(param.set_value(50.0.into(), 1), ThresholdCrossing::None);
        assert_eq!(param.set_value(65.0.into(), 2), ThresholdCrossing::WarningHigh);
        assert!(param.is_warning());
        assert_eq!(param.set_value(85.0.into(), 3), ThresholdCrossing::CriticalHigh);
        assert!(param.is_critical());
        assert!(!param.is_warning());
        assert_eq!(param.timestamp, 3);
    }

    #[test]
    fn test_limits_are_inclusive() {
        let mut param = temperature();
        assert_eq!(param.set_value(60.0.into(), 1), ThresholdCrossing::WarningHigh);
        assert_eq!(param.set_value(80.0.into(), 2), ThresholdCrossing::CriticalHigh);

        let mut voltage = TelemetryParameter::numeric("inputVoltage", "Input Voltage", "V", 220.0, 0.0, 300.0)
            .warn_low(200.0)
            .crit_low(180.0);
        assert_eq!(voltage.set_value(180.0.into(), 3), ThresholdCrossing::CriticalLow);
        assert!(voltage.is_critical());
        assert_eq!(voltage.set_value(200.0.into(), 4), ThresholdCrossing::WarningLow);
    }

    #[test]
    fn test_validity_tracks_bounds() {
        let mut param = temperature();
        param.set_value(120.0.into(), 1);
        assert!(!param.is_valid);
        param.set_value(20.0.into(), 2);
        assert!(param.is_valid);
    }

    #[test]
    fn test_store_ignores_unknown_parameters() {
        let mut store = TelemetryStore::from_parameters([temperature()]);
        assert_eq!(store.set_value("pressure", 3.0.into(), 1), None);
        assert!(!store.has_parameter("pressure"));

        let mut frame = TelemetryFrame::new();
        frame.insert("temperature".into(), 90.0.into());
        frame.insert("pressure".into(), 1.0.into());
        let crossings = store.apply(&frame, 5);
        assert_eq!(crossings, vec![("temperature".to_string(), ThresholdCrossing::CriticalHigh)]);
        assert_eq!(store.number("temperature"), Some(90.0));
        assert_eq!(store.last_update(), 5);
    }

    #[test]
    fn test_mixed_value_types() {
        let store = TelemetryStore::from_parameters([
            TelemetryParameter::flag("linkUp", "Link Up", true),
            TelemetryParameter::text("mode", "Mode", "AUTO"),
        ]);
        assert_eq!(store.flag("linkUp"), Some(true));
        assert_eq!(store.text("mode"), Some("AUTO"));
        assert_eq!(store.number("mode"), None);
        assert!(store.is_within_limits("mode"));
    }

    #[test]
    fn test_untagged_value_serialization() {
        let frame: TelemetryFrame =
            serde_json::from_str(r#"{"a": 1.5, "b": true, "c": "GPS"}"#).unwrap();
        assert_eq!(frame["a"], TelemetryValue::Number(1.5));
        assert_eq!(frame["b"], TelemetryValue::Flag(true));
        assert_eq!(frame["c"], TelemetryValue::Text("GPS".into()));
    }
}
