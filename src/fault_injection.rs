use crate::error::{MonitorError, Result};
use crate::events::MonitorEvent;
use crate::fault::{FaultRecord, FaultRegistry, FaultSeverity};
use crate::scheduler::TaskQueue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Injections and recoveries may be scheduled up to a day out.
const INJECTION_HORIZON_MS: u64 = 24 * 3_600_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaultInjection {
    pub unit_id: String,
    pub code: String,
    pub severity: FaultSeverity,
    /// 0 means permanent.
    pub duration_ms: u64,
    pub delay_ms: u64,
    pub auto_recover: bool,
}

impl FaultInjection {
    /// Permanent, immediate Warning fault.
    pub fn new(unit_id: &str, code: &str) -> Self {
        Self {
            unit_id: unit_id.to_string(),
            code: code.to_string(),
            severity: FaultSeverity::Warning,
            duration_ms: 0,
            delay_ms: 0,
            auto_recover: false,
        }
    }

    #[must_use]
    pub fn severity(mut self, severity: FaultSeverity) -> Self {
        self.severity = severity;
        self
    }

    /// Clears itself after `duration_ms`.
    #[must_use]
    pub fn recovering_after(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self.auto_recover = duration_ms > 0;
        self
    }

    #[must_use]
    pub fn delayed(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    fn key(&self) -> String {
        fault_key(&self.unit_id, &self.code)
    }
}

fn fault_key(unit_id: &str, code: &str) -> String {
    format!("{unit_id}:{code}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scenario {
    TransmitterOverheat,
    PowerFailure,
    #[serde(rename = "GPSLoss")]
    GpsLoss,
    NetworkDegradation,
    CascadingFailure,
}

impl Scenario {
    pub const ALL: [Scenario; 5] = [
        Scenario::TransmitterOverheat,
        Scenario::PowerFailure,
        Scenario::GpsLoss,
        Scenario::NetworkDegradation,
        Scenario::CascadingFailure,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Scenario::TransmitterOverheat => "TransmitterOverheat",
            Scenario::PowerFailure => "PowerFailure",
            Scenario::GpsLoss => "GPSLoss",
            Scenario::NetworkDegradation => "NetworkDegradation",
            Scenario::CascadingFailure => "CascadingFailure",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.name() == name)
    }

    pub fn injections(self) -> Vec<FaultInjection> {
        match self {
            Scenario::TransmitterOverheat => vec![FaultInjection::new("TX-001", "overtemp")
                .severity(FaultSeverity::Critical)
                .recovering_after(30_000)],
            Scenario::PowerFailure => {
                vec![FaultInjection::new("PSU-001", "input-low").severity(FaultSeverity::Critical)]
            }
            Scenario::GpsLoss => vec![FaultInjection::new("TIME-001", "gps-unlock")
                .severity(FaultSeverity::Critical)
                .recovering_after(60_000)],
            Scenario::NetworkDegradation => vec![FaultInjection::new("NET-001", "packet-loss")],
            Scenario::CascadingFailure => vec![
                FaultInjection::new("TX-001", "vswr-high"),
                FaultInjection::new("COOL-001", "coolant-temp-high").delayed(5_000),
                FaultInjection::new("SP-001", "cpu-overload").delayed(10_000),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum InjectorTask {
    Inject(FaultInjection),
    Recover { unit_id: String, code: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FaultInjectionStats {
    pub total_faults_injected: u32,
    pub scheduled_injections: u32,
    pub auto_recovered_faults: u32,
    pub manual_cleared_faults: u32,
    pub scenarios_run: u32,
    pub current_active_faults: usize,
}

/// Test-and-demo fault source. Injected faults land in the shared
/// [`FaultRegistry`] tagged `source=injected`; delayed injections and
/// auto-recovery run off a delayed-task queue polled by the owner.
#[derive(Debug)]
pub struct FaultInjector {
    active: BTreeMap<String, FaultInjection>,
    queue: TaskQueue<InjectorTask>,
    stats: FaultInjectionStats,
    events: Vec<MonitorEvent>,
}

impl FaultInjector {
    pub fn new() -> Self {
        let mut queue = TaskQueue::new();
        queue.set_horizon_ms(INJECTION_HORIZON_MS);
        Self {
            active: BTreeMap::new(),
            queue,
            stats: FaultInjectionStats::default(),
            events: Vec::new(),
        }
    }

    /// Injects now, or queues the injection when it carries a delay.
    /// Returns `Ok(true)` when a fault was applied immediately.
    pub fn inject(&mut self, injection: FaultInjection, registry: &mut FaultRegistry, now: u64) -> Result<bool> {
        if injection.delay_ms > 0 {
            let at = now.saturating_add(injection.delay_ms);
            debug!(unit_id = %injection.unit_id, code = %injection.code, at, "Injection scheduled");
            self.queue
                .schedule(InjectorTask::Inject(injection), at, now)
                .map_err(MonitorError::Scheduling)?;
            self.stats.scheduled_injections += 1;
            return Ok(false);
        }
        self.apply(injection, registry, now)
    }

    fn apply(&mut self, injection: FaultInjection, registry: &mut FaultRegistry, now: u64) -> Result<bool> {
        let key = injection.key();
        if self.active.contains_key(&key) {
            return Ok(false);
        }

        if injection.auto_recover && injection.duration_ms > 0 {
            let recover = InjectorTask::Recover {
                unit_id: injection.unit_id.clone(),
                code: injection.code.clone(),
            };
            self.queue
                .schedule(recover, now.saturating_add(injection.duration_ms), now)
                .map_err(MonitorError::Scheduling)?;
        }

        let record = FaultRecord::new(
            &injection.unit_id,
            &injection.code,
            &format!("Injected fault: {}", injection.code),
            injection.severity,
            now,
        )
        .with_metadata("source", "injected");
        if !registry.register(record) {
            // Already raised by a threshold check; the injector takes it over
            // so in-range telemetry cannot clear it behind our back.
            registry.tag(&injection.unit_id, &injection.code, "source", "injected");
            debug!(unit_id = %injection.unit_id, code = %injection.code, "Injection took over active fault");
        }

        info!(unit_id = %injection.unit_id, code = %injection.code, severity = %injection.severity, "Fault injected");
        self.events.push(MonitorEvent::FaultInjected {
            unit_id: injection.unit_id.clone(),
            code: injection.code.clone(),
        });
        self.active.insert(key, injection);
        self.stats.total_faults_injected += 1;
        self.stats.current_active_faults = self.active.len();
        Ok(true)
    }

    /// Runs due delayed injections and recoveries. Returns the units whose
    /// fault set changed.
    pub fn poll(&mut self, registry: &mut FaultRegistry, now: u64) -> Vec<String> {
        let mut touched = Vec::new();
        for task in self.queue.ready(now) {
            match task {
                InjectorTask::Inject(injection) => {
                    let unit_id = injection.unit_id.clone();
                    match self.apply(injection, registry, now) {
                        Ok(true) => touched.push(unit_id),
                        Ok(false) => {}
                        Err(e) => warn!(unit_id = %unit_id, error = %e, "Delayed injection dropped"),
                    }
                }
                InjectorTask::Recover { unit_id, code } => {
                    if self.remove(&unit_id, &code, registry, now) {
                        debug!(unit_id = %unit_id, code = %code, "Injected fault auto-recovered");
                        self.stats.auto_recovered_faults += 1;
                        touched.push(unit_id);
                    }
                }
            }
        }
        touched.sort_unstable();
        touched.dedup();
        touched
    }

    fn remove(&mut self, unit_id: &str, code: &str, registry: &mut FaultRegistry, now: u64) -> bool {
        let key = fault_key(unit_id, code);
        if self.active.remove(&key).is_none() {
            return false;
        }
        self.queue.cancel_where(
            |t| matches!(t, InjectorTask::Recover { unit_id: u, code: c } if u == unit_id && c == code),
        );
        registry.clear(unit_id, code, now);
        self.stats.current_active_faults = self.active.len();
        true
    }

    pub fn clear(&mut self, unit_id: &str, code: &str, registry: &mut FaultRegistry, now: u64) -> bool {
        let removed = self.remove(unit_id, code, registry, now);
        if removed {
            self.stats.manual_cleared_faults += 1;
        }
        removed
    }

    pub fn clear_unit(&mut self, unit_id: &str, registry: &mut FaultRegistry, now: u64) -> usize {
        let codes: Vec<String> = self
            .active
            .values()
            .filter(|f| f.unit_id == unit_id)
            .map(|f| f.code.clone())
            .collect();
        codes
            .iter()
            .filter(|code| self.clear(unit_id, code, registry, now))
            .count()
    }

    /// Clears every injected fault and drops all queued work, including
    /// injections that have not fired yet.
    pub fn clear_all(&mut self, registry: &mut FaultRegistry, now: u64) -> usize {
        let cleared = self.active.len();
        for injection in std::mem::take(&mut self.active).into_values() {
            registry.clear(&injection.unit_id, &injection.code, now);
        }
        self.queue.clear_all();
        self.stats.manual_cleared_faults += cleared as u32;
        self.stats.current_active_faults = 0;
        cleared
    }

    /// Drops queued injections and recoveries; active faults stay.
    pub fn cancel_pending(&mut self) {
        self.queue.clear_all();
    }

    pub fn run_scenario(&mut self, scenario: Scenario, registry: &mut FaultRegistry, now: u64) -> Result<Vec<String>> {
        info!(scenario = scenario.name(), "Scenario started");
        self.events.push(MonitorEvent::ScenarioStarted {
            name: scenario.name().to_string(),
        });
        self.stats.scenarios_run += 1;

        let mut applied = Vec::new();
        for injection in scenario.injections() {
            let unit_id = injection.unit_id.clone();
            if self.inject(injection, registry, now)? {
                applied.push(unit_id);
            }
        }
        Ok(applied)
    }

    pub fn run_scenario_by_name(&mut self, name: &str, registry: &mut FaultRegistry, now: u64) -> Result<Vec<String>> {
        let scenario = Scenario::from_name(name).ok_or_else(|| MonitorError::UnknownScenario(name.to_string()))?;
        self.run_scenario(scenario, registry, now)
    }

    pub fn available_scenarios(&self) -> Vec<&'static str> {
        Scenario::ALL.iter().map(|s| s.name()).collect()
    }

    pub fn has_fault(&self, unit_id: &str, code: &str) -> bool {
        self.active.contains_key(&fault_key(unit_id, code))
    }

    pub fn injected_faults(&self) -> Vec<FaultInjection> {
        self.active.values().cloned().collect()
    }

    pub fn injected_count(&self) -> usize {
        self.active.len()
    }

    pub fn is_active(&self) -> bool {
        !self.active.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }

    pub fn get_stats(&self) -> &FaultInjectionStats {
        &self.stats
    }

    pub fn drain_events(&mut self) -> Vec<MonitorEvent> {
        std::mem::take(&mut self.events)
    }
}

impl Default for FaultInjector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inject_is_deduplicated() {
        let mut injector = FaultInjector::new();
        let mut registry = FaultRegistry::new();
        assert!(injector.inject(FaultInjection::new("RX-001", "gain-low"), &mut registry, 0).unwrap());
        assert!(!injector.inject(FaultInjection::new("RX-001", "gain-low"), &mut registry, 5).unwrap());

        assert_eq!(injector.injected_count(), 1);
        let record = registry.fault("RX-001", "gain-low").unwrap();
        assert_eq!(record.severity, FaultSeverity::Warning);
        assert_eq!(record.description, "Injected fault: gain-low");
        assert_eq!(record.metadata.get("source").map(String::as_str), Some("injected"));
    }

    #[test]
    fn test_inject_takes_over_detected_fault() {
        let mut injector = FaultInjector::new();
        let mut registry = FaultRegistry::new();
        registry.register(
            FaultRecord::new("TX-001", "overtemp", "Transmitter overtemperature", FaultSeverity::Critical, 0)
                .with_metadata("source", "threshold"),
        );

        assert!(injector.inject(FaultInjection::new("TX-001", "overtemp"), &mut registry, 10).unwrap());
        assert_eq!(injector.injected_count(), 1);
        let record = registry.fault("TX-001", "overtemp").unwrap();
        assert_eq!(record.metadata.get("source").map(String::as_str), Some("injected"));
        assert_eq!(record.timestamp, 0);

        assert!(injector.clear("TX-001", "overtemp", &mut registry, 20));
        assert!(!registry.has_fault("TX-001", "overtemp"));
    }

    #[test]
    fn test_auto_recovery() {
        let mut injector = FaultInjector::new();
        let mut registry = FaultRegistry::new();
        let injection = FaultInjection::new("TX-001", "overtemp")
            .severity(FaultSeverity::Critical)
            .recovering_after(30_000);
        injector.inject(injection, &mut registry, 1_000).unwrap();

        assert!(injector.poll(&mut registry, 30_000).is_empty());
        assert!(registry.has_fault("TX-001", "overtemp"));

        assert_eq!(injector.poll(&mut registry, 31_000), vec!["TX-001".to_string()]);
        assert!(!registry.has_fault("TX-001", "overtemp"));
        assert_eq!(injector.get_stats().auto_recovered_faults, 1);
    }

    #[test]
    fn test_manual_clear_cancels_recovery() {
        let mut injector = FaultInjector::new();
        let mut registry = FaultRegistry::new();
        injector
            .inject(FaultInjection::new("TIME-001", "gps-unlock").recovering_after(60_000), &mut registry, 0)
            .unwrap();
        assert_eq!(injector.pending_count(), 1);
        assert!(injector.clear("TIME-001", "gps-unlock", &mut registry, 10));
        assert_eq!(injector.pending_count(), 0);
        assert!(!injector.clear("TIME-001", "gps-unlock", &mut registry, 20));
    }

    #[test]
    fn test_cascading_scenario_is_staggered() {
        let mut injector = FaultInjector::new();
        let mut registry = FaultRegistry::new();
        let applied = injector
            .run_scenario_by_name("CascadingFailure", &mut registry, 0)
            .unwrap();
        assert_eq!(applied, vec!["TX-001".to_string()]);
        assert_eq!(injector.pending_count(), 2);

        assert_eq!(injector.poll(&mut registry, 5_000), vec!["COOL-001".to_string()]);
        assert_eq!(injector.poll(&mut registry, 10_000), vec!["SP-001".to_string()]);
        assert_eq!(registry.total_active(), 3);
        assert!(injector
            .drain_events()
            .contains(&MonitorEvent::ScenarioStarted {
                name: "CascadingFailure".to_string()
            }));
    }

    #[test]
    fn test_unknown_scenario() {
        let mut injector = FaultInjector::new();
        let mut registry = FaultRegistry::new();
        assert!(matches!(
            injector.run_scenario_by_name("Meltdown", &mut registry, 0),
            Err(MonitorError::UnknownScenario(_))
        ));
    }

    #[test]
    fn test_clear_unit_and_all() {
        let mut injector = FaultInjector::new();
        let mut registry = FaultRegistry::new();
        for code in ["cpu-overload", "memory-exhausted"] {
            injector.inject(FaultInjection::new("DP-001", code), &mut registry, 0).unwrap();
        }
        injector.inject(FaultInjection::new("NET-001", "link-down"), &mut registry, 0).unwrap();
        injector.inject(FaultInjection::new("SP-001", "fpga-error").delayed(500), &mut registry, 0).unwrap();

        assert_eq!(injector.clear_unit("DP-001", &mut registry, 1), 2);
        assert_eq!(injector.clear_all(&mut registry, 2), 1);
        assert_eq!(injector.pending_count(), 0);
        assert_eq!(registry.total_active(), 0);
    }
}
