use crate::events::MonitorEvent;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_HISTORY_CAPACITY: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FaultSeverity {
    Info,
    Warning,
    Critical,
    Fatal,
}

impl FaultSeverity {
    /// Critical and Fatal faults take a unit down.
    pub fn is_critical(self) -> bool {
        matches!(self, FaultSeverity::Critical | FaultSeverity::Fatal)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FaultSeverity::Info => "INFO",
            FaultSeverity::Warning => "WARNING",
            FaultSeverity::Critical => "CRITICAL",
            FaultSeverity::Fatal => "FATAL",
        }
    }
}

impl core::fmt::Display for FaultSeverity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaultRecord {
    pub code: String,
    pub description: String,
    pub severity: FaultSeverity,
    pub unit_id: String,
    pub timestamp: u64,
    pub end_time: Option<u64>,
    pub duration_ms: Option<u64>,
    pub active: bool,
    pub metadata: BTreeMap<String, String>,
}

impl FaultRecord {
    pub fn new(unit_id: &str, code: &str, description: &str, severity: FaultSeverity, timestamp: u64) -> Self {
        Self {
            code: code.to_string(),
            description: description.to_string(),
            severity,
            unit_id: unit_id.to_string(),
            timestamp,
            end_time: None,
            duration_ms: None,
            active: true,
            metadata: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    fn close(&mut self, end_time: u64) {
        self.active = false;
        let end_time = end_time.max(self.timestamp);
        self.end_time = Some(end_time);
        self.duration_ms = Some(end_time - self.timestamp);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct FaultKey {
    unit_id: String,
    code: String,
}

impl FaultKey {
    fn new(unit_id: &str, code: &str) -> Self {
        Self {
            unit_id: unit_id.to_string(),
            code: code.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct FaultStatistics {
    pub total_active: usize,
    pub critical_count: usize,
    pub warning_count: usize,
    pub info_count: usize,
    pub history_count: usize,
    /// Registrations per unit since start.
    pub unit_counts: BTreeMap<String, u32>,
}

/// System-wide ledger of active faults plus a bounded history of
/// cleared ones.
#[derive(Debug)]
pub struct FaultRegistry {
    active: BTreeMap<FaultKey, FaultRecord>,
    history: VecDeque<FaultRecord>,
    history_capacity: usize,
    unit_fault_counts: BTreeMap<String, u32>,
    unit_last_fault: BTreeMap<String, u64>,
    events: Vec<MonitorEvent>,
}

impl FaultRegistry {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    pub fn with_capacity(history_capacity: usize) -> Self {
        Self {
            active: BTreeMap::new(),
            history: VecDeque::new(),
            history_capacity: history_capacity.max(1),
            unit_fault_counts: BTreeMap::new(),
            unit_last_fault: BTreeMap::new(),
            events: Vec::new(),
        }
    }

    /// Registers a fault. Returns `false` without touching anything when the
    /// same (unit, code) pair is already active.
    pub fn register(&mut self, fault: FaultRecord) -> bool {
        let key = FaultKey::new(&fault.unit_id, &fault.code);
        if self.active.contains_key(&key) {
            return false;
        }

        *self.unit_fault_counts.entry(fault.unit_id.clone()).or_insert(0) += 1;
        self.unit_last_fault.insert(fault.unit_id.clone(), fault.timestamp);

        self.events.push(MonitorEvent::FaultRegistered {
            unit_id: fault.unit_id.clone(),
            code: fault.code.clone(),
            severity: fault.severity,
        });
        if fault.severity.is_critical() {
            warn!(unit = %fault.unit_id, code = %fault.code, severity = %fault.severity, "critical fault registered");
            self.events.push(MonitorEvent::CriticalFault {
                unit_id: fault.unit_id.clone(),
                code: fault.code.clone(),
            });
        } else {
            debug!(unit = %fault.unit_id, code = %fault.code, severity = %fault.severity, "fault registered");
        }

        let mut fault = fault;
        fault.active = true;
        self.active.insert(key, fault);
        true
    }

    /// Clears one active fault and moves it to history.
    pub fn clear(&mut self, unit_id: &str, code: &str, now: u64) -> bool {
        match self.active.remove(&FaultKey::new(unit_id, code)) {
            Some(fault) => {
                self.retire(fault, now);
                true
            }
            None => false,
        }
    }

    /// Clears every active fault of `unit_id`, or of all units with `None`.
    pub fn clear_all(&mut self, unit_id: Option<&str>, now: u64) -> usize {
        let keys: Vec<FaultKey> = self
            .active
            .keys()
            .filter(|k| unit_id.map_or(true, |id| k.unit_id == id))
            .cloned()
            .collect();

        for key in &keys {
            if let Some(fault) = self.active.remove(key) {
                self.retire(fault, now);
            }
        }
        keys.len()
    }

    fn retire(&mut self, mut fault: FaultRecord, now: u64) {
        fault.close(now);
        debug!(unit = %fault.unit_id, code = %fault.code, duration_ms = ?fault.duration_ms, "fault cleared");
        self.events.push(MonitorEvent::FaultCleared {
            unit_id: fault.unit_id.clone(),
            code: fault.code.clone(),
        });

        if self.history.len() >= self.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(fault);

        // NASA Rule 5: Safety assertion for history bound
        debug_assert!(
            self.history.len() <= self.history_capacity,
            "Fault history length {} exceeds capacity {}",
            self.history.len(),
            self.history_capacity
        );
    }

    pub fn active_faults(&self, unit_id: Option<&str>) -> Vec<FaultRecord> {
        self.active_iter(unit_id).cloned().collect()
    }

    pub fn active_iter<'a>(&'a self, unit_id: Option<&'a str>) -> impl Iterator<Item = &'a FaultRecord> + 'a {
        self.active
            .values()
            .filter(move |f| unit_id.map_or(true, |id| f.unit_id == id))
    }

    /// Cleared faults, newest first.
    pub fn history(&self, unit_id: Option<&str>, limit: usize) -> Vec<FaultRecord> {
        self.history
            .iter()
            .rev()
            .filter(|f| unit_id.map_or(true, |id| f.unit_id == id))
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn has_fault(&self, unit_id: &str, code: &str) -> bool {
        self.active.contains_key(&FaultKey::new(unit_id, code))
    }

    pub fn fault(&self, unit_id: &str, code: &str) -> Option<&FaultRecord> {
        self.active.get(&FaultKey::new(unit_id, code))
    }

    /// Sets a metadata entry on an active fault. Returns `false` when no
    /// such fault is active.
    pub fn tag(&mut self, unit_id: &str, code: &str, key: &str, value: &str) -> bool {
        match self.active.get_mut(&FaultKey::new(unit_id, code)) {
            Some(fault) => {
                fault.metadata.insert(key.to_string(), value.to_string());
                true
            }
            None => false,
        }
    }

    pub fn total_active(&self) -> usize {
        self.active.len()
    }

    pub fn fault_count(&self, unit_id: &str) -> usize {
        self.active_iter(Some(unit_id)).count()
    }

    pub fn count_by_severity(&self, severity: FaultSeverity) -> usize {
        self.active.values().filter(|f| f.severity == severity).count()
    }

    pub fn critical_count(&self) -> usize {
        self.active.values().filter(|f| f.severity.is_critical()).count()
    }

    pub fn last_fault_time(&self, unit_id: &str) -> Option<u64> {
        self.unit_last_fault.get(unit_id).copied()
    }

    pub fn statistics(&self) -> FaultStatistics {
        FaultStatistics {
            total_active: self.active.len(),
            critical_count: self.critical_count(),
            warning_count: self.count_by_severity(FaultSeverity::Warning),
            info_count: self.count_by_severity(FaultSeverity::Info),
            history_count: self.history.len(),
            unit_counts: self.unit_fault_counts.clone(),
        }
    }

    /// Mean time between failures from the unit's fault history:
    /// span between the first and last fault divided by (count - 1).
    pub fn estimate_mtbf(&self, unit_id: &str) -> Option<Duration> {
        let mut count: u64 = 0;
        let mut first = u64::MAX;
        let mut last = 0;
        for fault in self.history.iter().filter(|f| f.unit_id == unit_id) {
            count += 1;
            first = first.min(fault.timestamp);
            last = last.max(fault.timestamp);
        }

        if count < 2 || last <= first {
            return None;
        }
        Some(Duration::from_millis((last - first) / (count - 1)))
    }

    pub fn mtbf_report(&self) -> BTreeMap<String, Duration> {
        let mut units: Vec<&str> = self.history.iter().map(|f| f.unit_id.as_str()).collect();
        units.sort_unstable();
        units.dedup();
        units
            .into_iter()
            .filter_map(|id| self.estimate_mtbf(id).map(|mtbf| (id.to_string(), mtbf)))
            .collect()
    }

    pub fn drain_events(&mut self) -> Vec<MonitorEvent> {
        std::mem::take(&mut self.events)
    }
}

impl Default for FaultRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fault(unit: &str, code: &str, severity: FaultSeverity, ts: u64) -> FaultRecord {
        FaultRecord::new(unit, code, "test fault", severity, ts)
    }

    #[test]
    fn test_register_is_idempotent() {
        let mut registry = FaultRegistry::new();
        assert!(registry.register(fault("TX-001", "overtemp", FaultSeverity::Critical, 100)));
        assert!(!registry.register(fault("TX-001", "overtemp", FaultSeverity::Critical, 200)));
        assert_eq!(registry.total_active(), 1);
        assert_eq!(registry.fault("TX-001", "overtemp").unwrap().timestamp, 100);
    }

    #[test]
    fn test_clear_moves_to_history() {
        let mut registry = FaultRegistry::new();
        registry.register(fault("RX-001", "gain-low", FaultSeverity::Warning, 1000));
        assert!(registry.clear("RX-001", "gain-low", 4000));
        assert!(!registry.clear("RX-001", "gain-low", 5000));

        let history = registry.history(Some("RX-001"), 10);
        assert_eq!(history.len(), 1);
        assert!(!history[0].active);
        assert_eq!(history[0].end_time, Some(4000));
        assert_eq!(history[0].duration_ms, Some(3000));
    }

    #[test]
    fn test_history_evicts_oldest() {
        let mut registry = FaultRegistry::with_capacity(3);
        for i in 0..5 {
            let code = format!("F{i}");
            registry.register(fault("NET-001", &code, FaultSeverity::Info, i));
            registry.clear("NET-001", &code, i + 1);
        }
        let history = registry.history(None, 10);
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].code, "F4");
        assert_eq!(history[2].code, "F2");
    }

    #[test]
    fn test_critical_events() {
        let mut registry = FaultRegistry::new();
        registry.register(fault("PSU-001", "input-low", FaultSeverity::Critical, 1));
        registry.register(fault("PSU-001", "battery-low", FaultSeverity::Warning, 2));
        let events = registry.drain_events();
        assert_eq!(events.len(), 3);
        assert!(matches!(&events[1], MonitorEvent::CriticalFault { code, .. } if code == "input-low"));
        assert!(registry.drain_events().is_empty());
    }

    #[test]
    fn test_mtbf_requires_two_faults() {
        let mut registry = FaultRegistry::new();
        registry.register(fault("SP-001", "cpu-overload", FaultSeverity::Warning, 0));
        registry.clear("SP-001", "cpu-overload", 10);
        assert_eq!(registry.estimate_mtbf("SP-001"), None);

        registry.register(fault("SP-001", "cpu-overload", FaultSeverity::Warning, 3_600_000));
        registry.clear("SP-001", "cpu-overload", 3_600_010);
        registry.register(fault("SP-001", "cpu-overload", FaultSeverity::Warning, 7_200_000));
        registry.clear("SP-001", "cpu-overload", 7_200_010);
        assert_eq!(registry.estimate_mtbf("SP-001"), Some(Duration::from_secs(3600)));
        assert_eq!(registry.mtbf_report().len(), 1);
    }

    #[test]
    fn test_statistics() {
        let mut registry = FaultRegistry::new();
        registry.register(fault("TX-001", "a", FaultSeverity::Fatal, 1));
        registry.register(fault("TX-001", "b", FaultSeverity::Warning, 1));
        registry.register(fault("RX-001", "c", FaultSeverity::Info, 1));
        let stats = registry.statistics();
        assert_eq!(stats.total_active, 3);
        assert_eq!(stats.critical_count, 1);
        assert_eq!(stats.warning_count, 1);
        assert_eq!(stats.info_count, 1);
        assert_eq!(stats.unit_counts["TX-001"], 2);

        assert_eq!(registry.clear_all(Some("TX-001"), 5), 2);
        assert_eq!(registry.total_active(), 1);
        assert_eq!(registry.clear_all(None, 6), 1);
        assert_eq!(registry.history_len(), 3);
    }
}
