//! Telemetry ingestion: validate, sanitize, score, detect faults.
//!
//! Producers enqueue raw JSON objects through [`SubmitHandle`]; the pipeline
//! drains at most one batch per tick so a flood of submissions cannot
//! starve the rest of the engine. Items for one unit keep their submission
//! order.

use crate::error::ValidationError;
use crate::events::MonitorEvent;
use crate::fault::{FaultRecord, FaultRegistry, FaultSeverity};
use crate::health::HealthState;
use crate::subsystems::UnitKind;
use crate::telemetry::{TelemetryFrame, TelemetryValue};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use static_assertions::const_assert;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

pub const MAX_BATCH_SIZE: usize = 64;
pub const MAX_QUEUE_DEPTH: usize = 10_000;

const_assert!(MAX_BATCH_SIZE <= MAX_QUEUE_DEPTH);

const SENTINELS: [&str; 7] = ["nan", "inf", "+inf", "-inf", "infinity", "+infinity", "-infinity"];

const CRITICAL_PENALTY: f64 = 30.0;
const WARNING_BASE_PENALTY: f64 = 10.0;
const WARNING_SPAN_PENALTY: f64 = 20.0;
const MAX_SCORE: f64 = 100.0;

/// Raw, untyped telemetry as it arrives from a producer.
pub type RawTelemetry = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryItem {
    pub unit_id: String,
    pub data: RawTelemetry,
    pub submitted_at: u64,
}

/// Field rules applied to one unit type's telemetry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationSchema {
    pub required: BTreeSet<String>,
    pub numeric: BTreeSet<String>,
    /// Fields that carry flags or mode strings and are never coerced.
    pub literal: BTreeSet<String>,
    pub ranges: BTreeMap<String, (f64, f64)>,
}

impl ValidationSchema {
    /// Schema derived from a unit catalogue. No field is required by default.
    pub fn for_kind(kind: UnitKind) -> Self {
        let mut schema = Self::default();
        for parameter in kind.policy().parameters() {
            if parameter.is_numeric() {
                if let (Some(min), Some(max)) = (parameter.min_value, parameter.max_value) {
                    schema.ranges.insert(parameter.name.clone(), (min, max));
                }
                schema.numeric.insert(parameter.name);
            } else {
                schema.literal.insert(parameter.name);
            }
        }
        schema
    }

    #[must_use]
    pub fn with_required<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required.extend(fields.into_iter().map(Into::into));
        self
    }
}

/// Outcome of validation plus sanitization.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedTelemetry {
    pub frame: TelemetryFrame,
    /// Values outside their physical range; reported, not rejected.
    pub warnings: Vec<String>,
}

fn is_sentinel(text: &str) -> bool {
    let lowered = text.trim().to_ascii_lowercase();
    SENTINELS.contains(&lowered.as_str())
}

pub fn validate(data: &RawTelemetry, schema: &ValidationSchema) -> Result<ValidatedTelemetry, ValidationError> {
    if data.is_empty() {
        return Err(ValidationError::Empty);
    }
    if let Some(missing) = schema.required.iter().find(|field| !data.contains_key(field.as_str())) {
        return Err(ValidationError::MissingField(missing.clone()));
    }

    let mut frame = TelemetryFrame::new();
    let mut warnings = Vec::new();

    for (field, value) in data {
        let numeric_field = schema.numeric.contains(field);
        let sanitized = match value {
            Value::Number(number) => {
                let v = number
                    .as_f64()
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| ValidationError::NonFinite(field.clone()))?;
                TelemetryValue::Number(v)
            }
            Value::String(text) => {
                if is_sentinel(text) {
                    return Err(ValidationError::Sentinel {
                        field: field.clone(),
                        value: text.clone(),
                    });
                }
                match text.trim().parse::<f64>() {
                    Ok(v) if !v.is_finite() => return Err(ValidationError::NonFinite(field.clone())),
                    Ok(v) if !schema.literal.contains(field) => TelemetryValue::Number(v),
                    _ if numeric_field => {
                        return Err(ValidationError::TypeMismatch {
                            field: field.clone(),
                            expected: "number",
                        })
                    }
                    _ => TelemetryValue::Text(text.clone()),
                }
            }
            Value::Bool(flag) if !numeric_field => TelemetryValue::Flag(*flag),
            Value::Bool(_) => {
                return Err(ValidationError::TypeMismatch {
                    field: field.clone(),
                    expected: "number",
                })
            }
            Value::Null | Value::Array(_) | Value::Object(_) => {
                return Err(ValidationError::TypeMismatch {
                    field: field.clone(),
                    expected: "scalar",
                })
            }
        };

        if let (Some(v), Some((min, max))) = (sanitized.as_number(), schema.ranges.get(field)) {
            if v < *min || v > *max {
                warnings.push(format!("{field} value {v} outside range [{min}, {max}]"));
            }
        }
        frame.insert(field.clone(), sanitized);
    }

    Ok(ValidatedTelemetry { frame, warnings })
}

/// Warning/critical bounds for one parameter. Comparisons are strict.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ThresholdRule {
    pub warning_low: Option<f64>,
    pub warning_high: Option<f64>,
    pub critical_low: Option<f64>,
    pub critical_high: Option<f64>,
}

impl ThresholdRule {
    pub fn high(warning: f64, critical: f64) -> Self {
        Self {
            warning_high: Some(warning),
            critical_high: Some(critical),
            ..Self::default()
        }
    }

    pub fn low(warning: f64, critical: f64) -> Self {
        Self {
            warning_low: Some(warning),
            critical_low: Some(critical),
            ..Self::default()
        }
    }

    /// Breach of `value`, high side first, plus its score penalty.
    pub fn evaluate(&self, value: f64) -> (Option<Breach>, f64) {
        if self.critical_high.is_some_and(|ch| value > ch) {
            return (Some(Breach::CriticalHigh), CRITICAL_PENALTY);
        }
        if self.critical_low.is_some_and(|cl| value < cl) {
            return (Some(Breach::CriticalLow), CRITICAL_PENALTY);
        }
        if let Some(wh) = self.warning_high.filter(|wh| value > *wh) {
            let width = self.critical_high.map_or(0.0, |ch| ch - wh);
            return (Some(Breach::WarningHigh), band_penalty(value - wh, width));
        }
        if let Some(wl) = self.warning_low.filter(|wl| value < *wl) {
            let width = self.critical_low.map_or(0.0, |cl| wl - cl);
            return (Some(Breach::WarningLow), band_penalty(wl - value, width));
        }
        (None, 0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Breach {
    CriticalHigh,
    CriticalLow,
    WarningHigh,
    WarningLow,
}

impl Breach {
    pub fn is_critical(self) -> bool {
        matches!(self, Breach::CriticalHigh | Breach::CriticalLow)
    }
}

fn band_penalty(excess: f64, width: f64) -> f64 {
    let ratio = if width > 0.0 { (excess / width).clamp(0.0, 1.0) } else { 1.0 };
    WARNING_BASE_PENALTY + WARNING_SPAN_PENALTY * ratio
}

/// Parameter name to threshold rule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThresholdTable {
    rules: BTreeMap<String, ThresholdRule>,
}

impl ThresholdTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Used for units without a table of their own.
    pub fn default_table() -> Self {
        Self::new().with_rule("temperature", ThresholdRule::high(60.0, 80.0))
    }

    /// Table built from a unit catalogue's warning/critical limits.
    pub fn from_catalogue(kind: UnitKind) -> Self {
        let mut table = Self::new();
        for parameter in kind.policy().parameters().into_iter().filter(|p| p.has_thresholds()) {
            let rule = ThresholdRule {
                warning_low: parameter.warning_low,
                warning_high: parameter.warning_high,
                critical_low: parameter.critical_low,
                critical_high: parameter.critical_high,
            };
            table.rules.insert(parameter.name, rule);
        }
        table
    }

    #[must_use]
    pub fn with_rule(mut self, parameter: &str, rule: ThresholdRule) -> Self {
        self.rules.insert(parameter.to_string(), rule);
        self
    }

    pub fn rule(&self, parameter: &str) -> Option<&ThresholdRule> {
        self.rules.get(parameter)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Scoring {
    pub state: HealthState,
    pub score: f64,
    pub breaches: Vec<(String, Breach)>,
}

/// Scores a frame against a threshold table: Fail on any critical breach,
/// Degraded on any warning breach, otherwise OK.
pub fn score_frame(frame: &TelemetryFrame, table: &ThresholdTable) -> Scoring {
    let mut score = MAX_SCORE;
    let mut breaches = Vec::new();
    for (name, value) in frame {
        let (Some(rule), Some(v)) = (table.rule(name), value.as_number()) else {
            continue;
        };
        let (breach, penalty) = rule.evaluate(v);
        score -= penalty;
        if let Some(breach) = breach {
            breaches.push((name.clone(), breach));
        }
    }

    let state = if breaches.iter().any(|(_, b)| b.is_critical()) {
        HealthState::Fail
    } else if breaches.is_empty() {
        HealthState::Ok
    } else {
        HealthState::Degraded
    };

    Scoring {
        state,
        score: score.clamp(0.0, MAX_SCORE),
        breaches,
    }
}

pub fn high_fault_code(parameter: &str) -> String {
    format!("{}-HIGH", parameter.to_uppercase())
}

pub fn low_fault_code(parameter: &str) -> String {
    format!("{}-LOW", parameter.to_uppercase())
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedItem {
    pub unit_id: String,
    pub frame: TelemetryFrame,
    pub state: HealthState,
    pub score: f64,
    pub raised: Vec<String>,
    pub cleared: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct PipelineStats {
    pub queued: usize,
    pub processed: u64,
    pub errors: u64,
    /// Oldest items evicted because the queue was full.
    pub dropped: u64,
    pub range_warnings: u64,
    pub running: bool,
    pub last_error: Option<String>,
}

#[derive(Debug, Default)]
struct IngestQueue {
    items: VecDeque<TelemetryItem>,
    dropped: u64,
}

/// Cloneable producer side of the pipeline queue.
#[derive(Debug, Clone, Default)]
pub struct SubmitHandle {
    queue: Arc<Mutex<IngestQueue>>,
}

impl SubmitHandle {
    pub fn submit(&self, unit_id: &str, data: RawTelemetry, now: u64) {
        let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        if queue.items.len() >= MAX_QUEUE_DEPTH {
            queue.items.pop_front();
            queue.dropped += 1;
        }
        queue.items.push_back(TelemetryItem {
            unit_id: unit_id.to_string(),
            data,
            submitted_at: now,
        });
    }

    pub fn len(&self) -> usize {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner).items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn take_batch(&self, limit: usize) -> heapless::Vec<TelemetryItem, MAX_BATCH_SIZE> {
        let mut batch = heapless::Vec::new();
        let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        while batch.len() < limit.min(MAX_BATCH_SIZE) {
            let Some(item) = queue.items.pop_front() else {
                break;
            };
            if let Err(item) = batch.push(item) {
                queue.items.push_front(item);
                break;
            }
        }
        batch
    }

    fn dropped(&self) -> u64 {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner).dropped
    }

    fn clear(&self) {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner).items.clear();
    }
}

#[derive(Debug)]
pub struct DataPipeline {
    handle: SubmitHandle,
    schemas: BTreeMap<String, ValidationSchema>,
    tables: BTreeMap<String, ThresholdTable>,
    default_table: ThresholdTable,
    batch_size: usize,
    tick_ms: u64,
    next_tick: Option<u64>,
    running: bool,
    stats: PipelineStats,
    events: Vec<MonitorEvent>,
}

impl DataPipeline {
    pub fn new(batch_size: usize, tick_ms: u64) -> Self {
        Self {
            handle: SubmitHandle::default(),
            schemas: BTreeMap::new(),
            tables: BTreeMap::new(),
            default_table: ThresholdTable::default_table(),
            batch_size: batch_size.clamp(1, MAX_BATCH_SIZE),
            tick_ms,
            next_tick: None,
            running: false,
            stats: PipelineStats::default(),
            events: Vec::new(),
        }
    }

    pub fn handle(&self) -> SubmitHandle {
        self.handle.clone()
    }

    pub fn register_unit(&mut self, unit_id: &str, kind: UnitKind) {
        self.schemas.insert(unit_id.to_string(), ValidationSchema::for_kind(kind));
    }

    pub fn set_schema(&mut self, unit_id: &str, schema: ValidationSchema) {
        self.schemas.insert(unit_id.to_string(), schema);
    }

    pub fn set_thresholds(&mut self, unit_id: &str, table: ThresholdTable) {
        self.tables.insert(unit_id.to_string(), table);
    }

    pub fn thresholds(&self, unit_id: &str) -> &ThresholdTable {
        self.tables.get(unit_id).unwrap_or(&self.default_table)
    }

    pub fn submit(&self, unit_id: &str, data: RawTelemetry, now: u64) {
        self.handle.submit(unit_id, data, now);
    }

    pub fn start(&mut self, now: u64) {
        self.running = true;
        self.next_tick = Some(now);
        debug!(tick_ms = self.tick_ms, batch_size = self.batch_size, "Pipeline started");
    }

    /// Cancels the drain timer. Queued items stay queued.
    pub fn stop(&mut self) {
        self.running = false;
        self.next_tick = None;
        debug!("Pipeline stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Drains one batch when the tick is due.
    pub fn tick(&mut self, registry: &mut FaultRegistry, now: u64) -> Vec<ProcessedItem> {
        match self.next_tick {
            Some(due) if self.running && now >= due => {
                self.next_tick = Some(now.saturating_add(self.tick_ms));
                self.process_batch(registry, now)
            }
            _ => Vec::new(),
        }
    }

    /// Processes up to one batch immediately.
    pub fn process_batch(&mut self, registry: &mut FaultRegistry, now: u64) -> Vec<ProcessedItem> {
        let batch = self.handle.take_batch(self.batch_size);

        // NASA Rule 5: Safety assertion for per-tick work bound
        debug_assert!(
            batch.len() <= self.batch_size,
            "Batch of {} exceeds configured size {}",
            batch.len(),
            self.batch_size
        );

        let mut processed = Vec::with_capacity(batch.len());
        for item in batch {
            match self.process_item(&item, registry, now) {
                Ok(result) => processed.push(result),
                Err(error) => {
                    warn!(unit_id = %item.unit_id, %error, "Telemetry rejected");
                    self.stats.errors += 1;
                    self.stats.last_error = Some(error.to_string());
                    self.events.push(MonitorEvent::ValidationFailed {
                        unit_id: item.unit_id.clone(),
                        error: error.to_string(),
                    });
                }
            }
        }
        processed
    }

    /// Runs one item through validate, sanitize, score and fault detection.
    pub fn process_item(
        &mut self,
        item: &TelemetryItem,
        registry: &mut FaultRegistry,
        now: u64,
    ) -> Result<ProcessedItem, ValidationError> {
        let validated = match self.schemas.get(&item.unit_id) {
            Some(schema) => validate(&item.data, schema)?,
            None => validate(&item.data, &ValidationSchema::default())?,
        };
        for warning in &validated.warnings {
            debug!(unit_id = %item.unit_id, %warning, "Range warning");
        }
        self.stats.range_warnings += validated.warnings.len() as u64;

        let table = self.tables.get(&item.unit_id).unwrap_or(&self.default_table);
        let scoring = score_frame(&validated.frame, table);
        let (raised, cleared) = detect_faults(&item.unit_id, &validated.frame, &scoring, table, registry, now);

        self.stats.processed += 1;
        self.events.push(MonitorEvent::DataProcessed {
            unit_id: item.unit_id.clone(),
            state: scoring.state,
            score: scoring.score,
        });

        Ok(ProcessedItem {
            unit_id: item.unit_id.clone(),
            frame: validated.frame,
            state: scoring.state,
            score: scoring.score,
            raised,
            cleared,
            warnings: validated.warnings,
        })
    }

    pub fn clear_queue(&mut self) {
        self.handle.clear();
    }

    pub fn get_stats(&self) -> PipelineStats {
        PipelineStats {
            queued: self.handle.len(),
            dropped: self.handle.dropped(),
            running: self.running,
            ..self.stats.clone()
        }
    }

    pub fn drain_events(&mut self) -> Vec<MonitorEvent> {
        std::mem::take(&mut self.events)
    }
}

/// Raises a Critical fault per critically breached parameter and clears
/// the parameter's faults once it is back inside its critical band.
fn detect_faults(
    unit_id: &str,
    frame: &TelemetryFrame,
    scoring: &Scoring,
    table: &ThresholdTable,
    registry: &mut FaultRegistry,
    now: u64,
) -> (Vec<String>, Vec<String>) {
    let mut raised = Vec::new();
    let mut cleared = Vec::new();

    for (name, value) in frame {
        if table.rule(name).is_none() || value.as_number().is_none() {
            continue;
        }
        let breach = scoring
            .breaches
            .iter()
            .find(|(param, _)| param == name)
            .map(|(_, b)| *b)
            .filter(|b| b.is_critical());

        let (high, low) = (high_fault_code(name), low_fault_code(name));
        let active_code = match breach {
            Some(Breach::CriticalHigh) => Some(&high),
            Some(Breach::CriticalLow) => Some(&low),
            _ => None,
        };

        for code in [&high, &low] {
            if Some(code) == active_code {
                let direction = if code == &high { "high" } else { "low" };
                let description = format!("{name} critically {direction}");
                let record = FaultRecord::new(unit_id, code, &description, FaultSeverity::Critical, now)
                    .with_metadata("source", "pipeline")
                    .with_metadata("parameter", name);
                if registry.register(record) {
                    raised.push(code.clone());
                }
            } else if registry.clear(unit_id, code, now) {
                cleared.push(code.clone());
            }
        }
    }

    (raised, cleared)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> RawTelemetry {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_sanitize_coerces_numeric_strings() {
        let schema = ValidationSchema::for_kind(UnitKind::Transmitter);
        let result = validate(&raw(json!({"temperature": " 42.5", "txMode": "STANDBY", "hvEnabled": true})), &schema).unwrap();
        assert_eq!(result.frame["temperature"], TelemetryValue::Number(42.5));
        assert_eq!(result.frame["txMode"], TelemetryValue::Text("STANDBY".into()));
        assert_eq!(result.frame["hvEnabled"], TelemetryValue::Flag(true));
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_sentinels_and_types_rejected() {
        let schema = ValidationSchema::for_kind(UnitKind::Transmitter);
        assert!(matches!(
            validate(&raw(json!({"temperature": "NaN"})), &schema),
            Err(ValidationError::Sentinel { .. })
        ));
        assert!(matches!(
            validate(&raw(json!({"temperature": "-Infinity"})), &schema),
            Err(ValidationError::Sentinel { .. })
        ));
        assert!(matches!(
            validate(&raw(json!({"temperature": "hot"})), &schema),
            Err(ValidationError::TypeMismatch { expected: "number", .. })
        ));
        assert!(matches!(
            validate(&raw(json!({"temperature": [1, 2]})), &schema),
            Err(ValidationError::TypeMismatch { expected: "scalar", .. })
        ));
        assert_eq!(validate(&RawTelemetry::new(), &schema), Err(ValidationError::Empty));
    }

    #[test]
    fn test_required_fields_and_range_warnings() {
        let schema = ValidationSchema::for_kind(UnitKind::PowerSupply).with_required(["inputVoltage"]);
        assert_eq!(
            validate(&raw(json!({"current": 10})), &schema),
            Err(ValidationError::MissingField("inputVoltage".into()))
        );
        let result = validate(&raw(json!({"inputVoltage": 320})), &schema).unwrap();
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_threshold_scoring_is_strict_and_linear() {
        let table = ThresholdTable::default_table();
        let mut frame = TelemetryFrame::new();

        frame.insert("temperature".into(), 60.0.into());
        let scoring = score_frame(&frame, &table);
        assert_eq!(scoring.state, HealthState::Ok);

        frame.insert("temperature".into(), 70.0.into());
        let scoring = score_frame(&frame, &table);
        assert_eq!(scoring.state, HealthState::Degraded);
        assert!((scoring.score - 80.0).abs() < 1e-9);

        frame.insert("temperature".into(), 81.0.into());
        let scoring = score_frame(&frame, &table);
        assert_eq!(scoring.state, HealthState::Fail);
        assert!((scoring.score - 70.0).abs() < 1e-9);
    }

    #[test]
    fn test_batch_limit_per_tick() {
        let mut pipeline = DataPipeline::new(10, 10);
        let mut registry = FaultRegistry::new();
        for i in 0..25 {
            pipeline.submit("TX-001", raw(json!({"temperature": 40 + i})), 0);
        }
        assert!(pipeline.tick(&mut registry, 0).is_empty());

        pipeline.start(0);
        assert_eq!(pipeline.tick(&mut registry, 0).len(), 10);
        assert!(pipeline.tick(&mut registry, 5).is_empty());
        assert_eq!(pipeline.tick(&mut registry, 10).len(), 10);
        assert_eq!(pipeline.get_stats().queued, 5);
    }

    #[test]
    fn test_faults_raised_and_cleared() {
        let mut pipeline = DataPipeline::new(10, 10);
        let mut registry = FaultRegistry::new();
        pipeline.start(0);

        pipeline.submit("COOL-001", raw(json!({"temperature": 95})), 0);
        let items = pipeline.tick(&mut registry, 0);
        assert_eq!(items[0].raised, vec!["TEMPERATURE-HIGH".to_string()]);
        assert!(registry.has_fault("COOL-001", "TEMPERATURE-HIGH"));

        pipeline.submit("COOL-001", raw(json!({"temperature": 30})), 10);
        let items = pipeline.tick(&mut registry, 10);
        assert_eq!(items[0].cleared, vec!["TEMPERATURE-HIGH".to_string()]);
        assert_eq!(registry.total_active(), 0);
    }

    #[test]
    fn test_validation_failure_does_not_block_queue() {
        let mut pipeline = DataPipeline::new(10, 10);
        let mut registry = FaultRegistry::new();
        pipeline.register_unit("TX-001", UnitKind::Transmitter);
        pipeline.submit("TX-001", raw(json!({"temperature": "Infinity"})), 0);
        pipeline.submit("TX-001", raw(json!({"temperature": 50})), 0);

        let items = pipeline.process_batch(&mut registry, 0);
        assert_eq!(items.len(), 1);
        let stats = pipeline.get_stats();
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.processed, 1);
        assert!(pipeline
            .drain_events()
            .iter()
            .any(|e| matches!(e, MonitorEvent::ValidationFailed { .. })));
    }
}
