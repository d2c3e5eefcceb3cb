use crate::fault::FaultSeverity;
use crate::health::HealthState;
use serde::{Deserialize, Serialize};

/// Push notifications produced by the engine. Components queue these in
/// their own outbox; the monitor drains and forwards them in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MonitorEvent {
    StateTransition {
        unit_id: String,
        old: HealthState,
        new: HealthState,
        timestamp: u64,
    },
    /// Debounced; at most one per unit per debounce window.
    HealthChanged {
        unit_id: String,
        state: HealthState,
        score: f64,
    },
    /// Debounced like `HealthChanged`.
    TelemetryChanged {
        unit_id: String,
    },
    FaultRegistered {
        unit_id: String,
        code: String,
        severity: FaultSeverity,
    },
    FaultCleared {
        unit_id: String,
        code: String,
    },
    CriticalFault {
        unit_id: String,
        code: String,
    },
    FaultInjected {
        unit_id: String,
        code: String,
    },
    ScenarioStarted {
        name: String,
    },
    AnomalyDetected {
        unit_id: String,
        parameter: String,
        value: f64,
        expected: f64,
    },
    SystemHealthChanged {
        state: HealthState,
        score: f64,
    },
    DataProcessed {
        unit_id: String,
        state: HealthState,
        score: f64,
    },
    ValidationFailed {
        unit_id: String,
        error: String,
    },
    OutageStarted {
        unit_id: String,
        timestamp: u64,
    },
    OutageEnded {
        unit_id: String,
        duration_ms: u64,
    },
}

impl MonitorEvent {
    pub fn unit_id(&self) -> Option<&str> {
        match self {
            MonitorEvent::StateTransition { unit_id, .. }
            | MonitorEvent::HealthChanged { unit_id, .. }
            | MonitorEvent::TelemetryChanged { unit_id }
            | MonitorEvent::FaultRegistered { unit_id, .. }
            | MonitorEvent::FaultCleared { unit_id, .. }
            | MonitorEvent::CriticalFault { unit_id, .. }
            | MonitorEvent::FaultInjected { unit_id, .. }
            | MonitorEvent::AnomalyDetected { unit_id, .. }
            | MonitorEvent::DataProcessed { unit_id, .. }
            | MonitorEvent::ValidationFailed { unit_id, .. }
            | MonitorEvent::OutageStarted { unit_id, .. }
            | MonitorEvent::OutageEnded { unit_id, .. } => Some(unit_id),
            MonitorEvent::ScenarioStarted { .. } | MonitorEvent::SystemHealthChanged { .. } => None,
        }
    }
}
