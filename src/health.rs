//! Per-unit health state machine.
//!
//! [`HealthEngine`] owns every registered unit's telemetry and latest
//! [`HealthSnapshot`]. A recompute runs the unit's fault checks against the
//! shared [`FaultRegistry`], then resolves state, score and status text from
//! the unit policy's assessment plus the unit's active faults.
//!
//! Recomputation is guarded by an explicit [`ComputePhase`]: a request for
//! a unit that is already computing is folded into a single pending flag
//! and served by exactly one extra pass once the current one completes.

use crate::config::MonitorConfig;
use crate::error::{MonitorError, Result};
use crate::events::MonitorEvent;
use crate::fault::{FaultRecord, FaultRegistry, FaultSeverity};
use crate::scheduler::Debouncer;
use crate::subsystems::{Assessment, Condition, UnitKind, UnitPolicy};
use crate::telemetry::{TelemetryFrame, TelemetryStore, ThresholdCrossing};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

/// Score changes at or below this are treated as noise.
pub const SCORE_NOISE_FLOOR: f64 = 0.1;
const MAX_SCORE: f64 = 100.0;
/// One pass plus the single coalesced re-run.
const MAX_COMPUTE_PASSES: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum HealthState {
    #[serde(rename = "OK")]
    Ok,
    Degraded,
    Fail,
    Unknown,
}

impl HealthState {
    pub fn as_str(self) -> &'static str {
        match self {
            HealthState::Ok => "OK",
            HealthState::Degraded => "DEGRADED",
            HealthState::Fail => "FAIL",
            HealthState::Unknown => "UNKNOWN",
        }
    }

    /// OK and Degraded count as available time.
    pub fn is_up(self) -> bool {
        matches!(self, HealthState::Ok | HealthState::Degraded)
    }
}

impl core::fmt::Display for HealthState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub unit_id: String,
    pub kind: UnitKind,
    pub state: HealthState,
    pub score: f64,
    pub timestamp: u64,
    pub telemetry: TelemetryFrame,
    pub active_faults: Vec<FaultRecord>,
    pub status_message: String,
    pub enabled: bool,
}

/// Reentrancy guard for one unit's recompute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComputePhase {
    Idle,
    Computing,
    ComputingWithPending,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HealthEngineStats {
    pub total_recomputes: u64,
    /// Includes coalesced re-runs.
    pub total_passes: u64,
    pub state_transitions: u64,
    pub faults_raised: u64,
    pub faults_cleared: u64,
}

#[derive(Debug)]
struct UnitHealth {
    kind: UnitKind,
    enabled: bool,
    telemetry: TelemetryStore,
    /// Parameters written since the last recompute; only their fault checks run.
    touched: BTreeSet<String>,
    snapshot: HealthSnapshot,
    phase: ComputePhase,
    health_signal: Debouncer,
    telemetry_signal: Debouncer,
    update_count: u64,
}

impl UnitHealth {
    fn new(unit_id: &str, kind: UnitKind, debounce_ms: u64, fault_penalty: f64) -> Self {
        let policy = kind.policy();
        let telemetry = policy.catalogue();
        let snapshot = evaluate(unit_id, kind, true, &telemetry, Vec::new(), fault_penalty, 0);
        Self {
            kind,
            enabled: true,
            telemetry,
            touched: BTreeSet::new(),
            snapshot,
            phase: ComputePhase::Idle,
            health_signal: Debouncer::new(debounce_ms),
            telemetry_signal: Debouncer::new(debounce_ms),
            update_count: 0,
        }
    }
}

fn fault_condition(severity: FaultSeverity) -> Condition {
    match severity {
        FaultSeverity::Info => Condition::Nominal,
        FaultSeverity::Warning => Condition::Warning,
        FaultSeverity::Critical | FaultSeverity::Fatal => Condition::Critical,
    }
}

/// Pure state/score/status resolution for one unit.
fn evaluate(
    unit_id: &str,
    kind: UnitKind,
    enabled: bool,
    telemetry: &TelemetryStore,
    active_faults: Vec<FaultRecord>,
    fault_penalty: f64,
    now: u64,
) -> HealthSnapshot {
    if !enabled {
        return HealthSnapshot {
            unit_id: unit_id.to_string(),
            kind,
            state: HealthState::Unknown,
            score: 0.0,
            timestamp: now,
            telemetry: telemetry.snapshot(),
            active_faults,
            status_message: kind.disabled_message().to_string(),
            enabled,
        };
    }

    let policy = kind.policy();
    let assessment: Assessment = policy.assess(telemetry);
    let worst_fault = active_faults.iter().max_by_key(|f| f.severity);
    let fault_level = worst_fault.map_or(Condition::Nominal, |f| fault_condition(f.severity));
    let condition = assessment.condition().max(fault_level);

    let state = match condition {
        Condition::Critical => HealthState::Fail,
        Condition::Warning => HealthState::Degraded,
        Condition::Nominal => HealthState::Ok,
    };

    let fault_deduction = fault_penalty * active_faults.len() as f64;
    let score = (MAX_SCORE - assessment.penalty() - fault_deduction).clamp(0.0, MAX_SCORE);

    let status_message = match (assessment.condition_message(), worst_fault) {
        (Some(message), _) if fault_level <= assessment.condition() => message.to_string(),
        (_, Some(fault)) => fault.description.clone(),
        (Some(message), None) => message.to_string(),
        (None, None) => policy.nominal_status(telemetry),
    };

    // NASA Rule 5: Safety assertion for score bounds
    debug_assert!((0.0..=MAX_SCORE).contains(&score), "Health score {score} out of range");

    HealthSnapshot {
        unit_id: unit_id.to_string(),
        kind,
        state,
        score,
        timestamp: now,
        telemetry: telemetry.snapshot(),
        active_faults,
        status_message,
        enabled,
    }
}

/// Swaps in a freshly evaluated snapshot and emits the transition and
/// debounced change notifications it implies.
fn install_snapshot(
    unit_id: &str,
    unit: &mut UnitHealth,
    snapshot: HealthSnapshot,
    events: &mut Vec<MonitorEvent>,
    stats: &mut HealthEngineStats,
    now: u64,
) {
    let previous = std::mem::replace(&mut unit.snapshot, snapshot);
    let current = &unit.snapshot;

    let state_changed = previous.state != current.state;
    if state_changed {
        stats.state_transitions += 1;
        if current.state == HealthState::Fail {
            warn!(unit_id, old = %previous.state, new = %current.state, status = %current.status_message, "Unit failed");
        } else {
            info!(unit_id, old = %previous.state, new = %current.state, "Unit state changed");
        }
        events.push(MonitorEvent::StateTransition {
            unit_id: unit_id.to_string(),
            old: previous.state,
            new: current.state,
            timestamp: now,
        });
    }

    let score_changed = (previous.score - current.score).abs() > SCORE_NOISE_FLOOR;
    if (state_changed || score_changed) && unit.health_signal.signal(now) {
        events.push(MonitorEvent::HealthChanged {
            unit_id: unit_id.to_string(),
            state: current.state,
            score: current.score,
        });
    }
}

/// Registry of units and their health state machines.
#[derive(Debug)]
pub struct HealthEngine {
    units: BTreeMap<String, UnitHealth>,
    fault_penalty: f64,
    debounce_ms: u64,
    events: Vec<MonitorEvent>,
    stats: HealthEngineStats,
}

impl HealthEngine {
    pub fn new(config: &MonitorConfig) -> Self {
        Self {
            units: BTreeMap::new(),
            fault_penalty: config.fault_score_penalty,
            debounce_ms: config.signal_debounce_ms,
            events: Vec::new(),
            stats: HealthEngineStats::default(),
        }
    }

    pub fn register_unit(&mut self, unit_id: &str, kind: UnitKind) -> Result<()> {
        if self.units.contains_key(unit_id) {
            return Err(MonitorError::DuplicateUnit(unit_id.to_string()));
        }
        let unit = UnitHealth::new(unit_id, kind, self.debounce_ms, self.fault_penalty);
        self.units.insert(unit_id.to_string(), unit);
        info!(unit_id, kind = kind.display_name(), "Unit registered");
        Ok(())
    }

    /// Registers one unit of every kind under its default id.
    pub fn register_defaults(&mut self) -> Result<()> {
        for kind in UnitKind::ALL {
            self.register_unit(kind.default_id(), kind)?;
        }
        Ok(())
    }

    pub fn unregister_unit(&mut self, unit_id: &str) -> bool {
        self.units.remove(unit_id).is_some()
    }

    pub fn contains(&self, unit_id: &str) -> bool {
        self.units.contains_key(unit_id)
    }

    pub fn unit_ids(&self) -> Vec<String> {
        self.units.keys().cloned().collect()
    }

    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    pub fn kind(&self, unit_id: &str) -> Option<UnitKind> {
        self.units.get(unit_id).map(|u| u.kind)
    }

    pub fn telemetry(&self, unit_id: &str) -> Option<&TelemetryStore> {
        self.units.get(unit_id).map(|u| &u.telemetry)
    }

    pub fn is_enabled(&self, unit_id: &str) -> Option<bool> {
        self.units.get(unit_id).map(|u| u.enabled)
    }

    pub fn phase(&self, unit_id: &str) -> Option<ComputePhase> {
        self.units.get(unit_id).map(|u| u.phase)
    }

    /// Writes a telemetry frame into the unit's store. Health is not
    /// recomputed here; the caller schedules that.
    pub fn apply_telemetry(
        &mut self,
        unit_id: &str,
        frame: &TelemetryFrame,
        now: u64,
    ) -> Result<Vec<(String, ThresholdCrossing)>> {
        let unit = self
            .units
            .get_mut(unit_id)
            .ok_or_else(|| MonitorError::UnknownUnit(unit_id.to_string()))?;

        let crossings = unit.telemetry.apply(frame, now);
        unit.touched
            .extend(frame.keys().filter(|name| unit.telemetry.has_parameter(name)).cloned());
        unit.update_count += 1;

        if unit.telemetry_signal.signal(now) {
            self.events.push(MonitorEvent::TelemetryChanged {
                unit_id: unit_id.to_string(),
            });
        }
        for (name, crossing) in &crossings {
            debug!(unit_id, parameter = %name, ?crossing, "Threshold crossed");
        }
        Ok(crossings)
    }

    /// Asks for a recompute of a unit that may be mid-computation. Returns
    /// `true` when the unit is idle and the caller should run it now.
    pub fn request_recompute(&mut self, unit_id: &str) -> bool {
        let Some(unit) = self.units.get_mut(unit_id) else {
            return false;
        };
        match unit.phase {
            ComputePhase::Idle => true,
            ComputePhase::Computing | ComputePhase::ComputingWithPending => {
                unit.phase = ComputePhase::ComputingWithPending;
                false
            }
        }
    }

    /// Recomputes one unit. Unknown ids yield `None`.
    pub fn recompute(&mut self, unit_id: &str, registry: &mut FaultRegistry, now: u64) -> Option<HealthSnapshot> {
        if !self.request_recompute(unit_id) {
            return self.units.get(unit_id).map(|u| u.snapshot.clone());
        }
        self.stats.total_recomputes += 1;

        let mut passes = 0;
        loop {
            passes += 1;
            self.set_phase(unit_id, ComputePhase::Computing);
            self.compute_pass(unit_id, registry, now);

            let pending = self.phase(unit_id) == Some(ComputePhase::ComputingWithPending);
            if !pending || passes >= MAX_COMPUTE_PASSES {
                break;
            }
        }

        // NASA Rule 5: Safety assertion for bounded re-runs
        debug_assert!(passes <= MAX_COMPUTE_PASSES, "Recompute ran {passes} passes");

        self.set_phase(unit_id, ComputePhase::Idle);
        self.stats.total_passes += u64::from(passes);
        self.units.get(unit_id).map(|u| u.snapshot.clone())
    }

    pub fn recompute_all(&mut self, registry: &mut FaultRegistry, now: u64) {
        for unit_id in self.unit_ids() {
            self.recompute(&unit_id, registry, now);
        }
    }

    fn set_phase(&mut self, unit_id: &str, phase: ComputePhase) {
        if let Some(unit) = self.units.get_mut(unit_id) {
            unit.phase = phase;
        }
    }

    fn compute_pass(&mut self, unit_id: &str, registry: &mut FaultRegistry, now: u64) {
        let Some(unit) = self.units.get_mut(unit_id) else {
            return;
        };

        let mut fault_set_changed = false;
        if unit.enabled && !unit.touched.is_empty() {
            let checks = unit.kind.policy().fault_checks(&unit.telemetry);
            for check in checks.iter().filter(|c| unit.touched.contains(c.trigger)) {
                let present = registry.has_fault(unit_id, check.code);
                // Injected faults are owned by the injector; only threshold faults clear here.
                let owned = registry
                    .fault(unit_id, check.code)
                    .is_some_and(|f| f.metadata.get("source").map(String::as_str) == Some("threshold"));
                if check.active && !present {
                    let record = FaultRecord::new(unit_id, check.code, check.description, check.severity, now)
                        .with_metadata("source", "threshold")
                        .with_metadata("parameter", check.trigger);
                    if registry.register(record) {
                        self.stats.faults_raised += 1;
                        fault_set_changed = true;
                    }
                } else if !check.active && owned && registry.clear(unit_id, check.code, now) {
                    self.stats.faults_cleared += 1;
                    fault_set_changed = true;
                }
            }
            unit.touched.clear();
        }

        let faults = registry.active_faults(Some(unit_id));
        let snapshot = evaluate(unit_id, unit.kind, unit.enabled, &unit.telemetry, faults, self.fault_penalty, now);
        install_snapshot(unit_id, unit, snapshot, &mut self.events, &mut self.stats, now);

        // Faults raised or cleared above change this unit's own inputs.
        if fault_set_changed {
            self.request_recompute(unit_id);
        }
    }

    /// Emits notifications held back by the debounce windows.
    pub fn flush_debounced(&mut self, now: u64) {
        for (unit_id, unit) in &mut self.units {
            if unit.health_signal.poll(now) {
                self.events.push(MonitorEvent::HealthChanged {
                    unit_id: unit_id.clone(),
                    state: unit.snapshot.state,
                    score: unit.snapshot.score,
                });
            }
            if unit.telemetry_signal.poll(now) {
                self.events.push(MonitorEvent::TelemetryChanged {
                    unit_id: unit_id.clone(),
                });
            }
        }
    }

    pub fn cancel_timers(&mut self) {
        for unit in self.units.values_mut() {
            unit.health_signal.cancel();
            unit.telemetry_signal.cancel();
        }
    }

    /// Flips the enable flag and re-evaluates the snapshot against the
    /// faults it already carries, so readers never see a stale state.
    pub fn set_enabled(&mut self, unit_id: &str, enabled: bool, now: u64) -> Result<()> {
        let unit = self
            .units
            .get_mut(unit_id)
            .ok_or_else(|| MonitorError::UnknownUnit(unit_id.to_string()))?;
        if unit.enabled == enabled {
            return Ok(());
        }
        info!(unit_id, enabled, "Unit enable changed");
        unit.enabled = enabled;
        let faults = unit.snapshot.active_faults.clone();
        let snapshot = evaluate(unit_id, unit.kind, enabled, &unit.telemetry, faults, self.fault_penalty, now);
        install_snapshot(unit_id, unit, snapshot, &mut self.events, &mut self.stats, now);
        Ok(())
    }

    /// Restores the unit's telemetry to its catalogue. Every parameter is
    /// marked touched so stale threshold faults clear on the next pass.
    pub fn reset_unit(&mut self, unit_id: &str) -> Result<()> {
        let unit = self
            .units
            .get_mut(unit_id)
            .ok_or_else(|| MonitorError::UnknownUnit(unit_id.to_string()))?;
        unit.telemetry = unit.kind.policy().catalogue();
        unit.touched = unit.telemetry.parameter_names().into_iter().collect();
        unit.update_count = 0;
        info!(unit_id, "Unit reset");
        Ok(())
    }

    pub fn snapshot(&self, unit_id: &str) -> Option<&HealthSnapshot> {
        self.units.get(unit_id).map(|u| &u.snapshot)
    }

    pub fn snapshots(&self) -> impl Iterator<Item = &HealthSnapshot> {
        self.units.values().map(|u| &u.snapshot)
    }

    pub fn state(&self, unit_id: &str) -> Option<HealthState> {
        self.snapshot(unit_id).map(|s| s.state)
    }

    pub fn score(&self, unit_id: &str) -> Option<f64> {
        self.snapshot(unit_id).map(|s| s.score)
    }

    pub fn update_count(&self, unit_id: &str) -> Option<u64> {
        self.units.get(unit_id).map(|u| u.update_count)
    }

    pub fn drain_events(&mut self) -> Vec<MonitorEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn get_stats(&self) -> &HealthEngineStats {
        &self.stats
    }
}
