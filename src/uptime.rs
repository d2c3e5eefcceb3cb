use crate::events::MonitorEvent;
use crate::health::HealthState;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use tracing::{debug, info};

pub const DEFAULT_SNAPSHOT_INTERVAL_MS: u64 = 60_000;
pub const DEFAULT_RETENTION_MS: u64 = 24 * MS_PER_HOUR;
const MS_PER_HOUR: u64 = 3_600_000;
const FULL_AVAILABILITY: f64 = 100.0;

fn percent(up_ms: u64, down_ms: u64) -> f64 {
    let total = up_ms.saturating_add(down_ms);
    if total == 0 {
        FULL_AVAILABILITY
    } else {
        up_ms as f64 / total as f64 * 100.0
    }
}

fn hours(ms: u64) -> f64 {
    ms as f64 / MS_PER_HOUR as f64
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UptimeRecord {
    pub unit_id: String,
    pub registered_at: u64,
    pub uptime_ms: u64,
    pub downtime_ms: u64,
    pub current_state: HealthState,
    /// Time of the last state change, or registration.
    pub last_change: u64,
    /// Time up to which uptime/downtime have been attributed.
    pub attributed_until: u64,
    pub transition_count: u32,
    pub outage_count: u32,
    pub outage_started: Option<u64>,
}

impl UptimeRecord {
    fn new(unit_id: &str, now: u64) -> Self {
        Self {
            unit_id: unit_id.to_string(),
            registered_at: now,
            uptime_ms: 0,
            downtime_ms: 0,
            current_state: HealthState::Unknown,
            last_change: now,
            attributed_until: now,
            transition_count: 0,
            outage_count: 0,
            outage_started: None,
        }
    }

    /// Attributes time since `attributed_until` to the current state.
    /// Unknown time is dropped.
    fn attribute(&mut self, now: u64) {
        let elapsed = now.saturating_sub(self.attributed_until);
        match self.current_state {
            HealthState::Ok | HealthState::Degraded => self.uptime_ms += elapsed,
            HealthState::Fail => self.downtime_ms += elapsed,
            HealthState::Unknown => {}
        }
        self.attributed_until = self.attributed_until.max(now);
    }

    pub fn availability(&self) -> f64 {
        percent(self.uptime_ms, self.downtime_ms)
    }

    pub fn uptime_hours(&self) -> f64 {
        hours(self.uptime_ms)
    }

    pub fn downtime_hours(&self) -> f64 {
        hours(self.downtime_ms)
    }

    fn clear_totals(&mut self, now: u64) {
        self.uptime_ms = 0;
        self.downtime_ms = 0;
        self.registered_at = now;
        self.attributed_until = now;
        self.transition_count = 0;
        self.outage_count = 0;
        self.outage_started = (self.current_state == HealthState::Fail).then_some(now);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailabilitySnapshot {
    pub timestamp: u64,
    pub system_availability: f64,
    pub unit_availability: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AvailabilityPoint {
    pub timestamp: u64,
    pub availability: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitUptime {
    pub uptime_hours: f64,
    pub downtime_hours: f64,
    pub availability: f64,
    pub transition_count: u32,
    pub current_state: HealthState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UptimeSummary {
    /// Mean per-unit uptime.
    pub system_uptime_hours: f64,
    pub system_availability: f64,
    pub tracking_started: u64,
    pub unit_count: usize,
    pub units: BTreeMap<String, UnitUptime>,
}

/// Turns each unit's state-over-time into cumulative uptime and downtime.
#[derive(Debug)]
pub struct UptimeTracker {
    records: BTreeMap<String, UptimeRecord>,
    history: VecDeque<AvailabilitySnapshot>,
    snapshot_interval_ms: u64,
    retention_ms: u64,
    last_snapshot: Option<u64>,
    tracking_started: u64,
    events: Vec<MonitorEvent>,
}

impl UptimeTracker {
    pub fn new(snapshot_interval_ms: u64, retention_ms: u64) -> Self {
        Self {
            records: BTreeMap::new(),
            history: VecDeque::new(),
            snapshot_interval_ms: snapshot_interval_ms.max(1),
            retention_ms,
            last_snapshot: None,
            tracking_started: 0,
            events: Vec::new(),
        }
    }

    /// New units start Unknown and accrue nothing until their first state.
    pub fn register_unit(&mut self, unit_id: &str, now: u64) -> bool {
        if self.records.contains_key(unit_id) {
            return false;
        }
        if self.records.is_empty() && self.history.is_empty() {
            self.tracking_started = now;
        }
        self.records.insert(unit_id.to_string(), UptimeRecord::new(unit_id, now));
        debug!(unit_id, "Uptime tracking started");
        true
    }

    pub fn unregister_unit(&mut self, unit_id: &str) -> bool {
        self.records.remove(unit_id).is_some()
    }

    pub fn contains(&self, unit_id: &str) -> bool {
        self.records.contains_key(unit_id)
    }

    /// Records a state change. Unregistered units are registered on first
    /// sight. Returns `true` when the state actually changed.
    pub fn update_state(&mut self, unit_id: &str, state: HealthState, now: u64) -> bool {
        if !self.records.contains_key(unit_id) {
            self.register_unit(unit_id, now);
        }
        let Some(record) = self.records.get_mut(unit_id) else {
            return false;
        };
        if record.current_state == state {
            return false;
        }

        record.attribute(now);
        let old = record.current_state;
        record.current_state = state;
        record.last_change = now;
        record.transition_count += 1;

        if old == HealthState::Fail {
            let started = record.outage_started.take().unwrap_or(record.registered_at);
            let duration_ms = now.saturating_sub(started);
            info!(unit_id, duration_ms, "Outage ended");
            self.events.push(MonitorEvent::OutageEnded {
                unit_id: unit_id.to_string(),
                duration_ms,
            });
        }
        if state == HealthState::Fail {
            record.outage_started = Some(now);
            record.outage_count += 1;
            info!(unit_id, "Outage started");
            self.events.push(MonitorEvent::OutageStarted {
                unit_id: unit_id.to_string(),
                timestamp: now,
            });
        }
        true
    }

    /// Books downtime that happened outside tracked state changes.
    pub fn record_outage(&mut self, unit_id: &str, duration_ms: u64) -> bool {
        let Some(record) = self.records.get_mut(unit_id) else {
            return false;
        };
        record.downtime_ms = record.downtime_ms.saturating_add(duration_ms);
        true
    }

    /// Brings every unit's totals up to `now` without a state change.
    pub fn accrue(&mut self, now: u64) {
        for record in self.records.values_mut() {
            record.attribute(now);
        }
    }

    pub fn record(&self, unit_id: &str) -> Option<&UptimeRecord> {
        self.records.get(unit_id)
    }

    /// Percent; unknown units and units with no attributed time read 100.
    pub fn availability(&self, unit_id: &str) -> f64 {
        self.records.get(unit_id).map_or(FULL_AVAILABILITY, UptimeRecord::availability)
    }

    pub fn uptime_hours(&self, unit_id: &str) -> f64 {
        self.records.get(unit_id).map_or(0.0, UptimeRecord::uptime_hours)
    }

    pub fn downtime_ms(&self, unit_id: &str) -> u64 {
        self.records.get(unit_id).map_or(0, |r| r.downtime_ms)
    }

    pub fn transition_count(&self, unit_id: &str) -> u32 {
        self.records.get(unit_id).map_or(0, |r| r.transition_count)
    }

    pub fn system_availability(&self) -> f64 {
        let (up, down) = self
            .records
            .values()
            .fold((0u64, 0u64), |(up, down), r| (up + r.uptime_ms, down + r.downtime_ms));
        percent(up, down)
    }

    pub fn system_uptime_hours(&self) -> f64 {
        if self.records.is_empty() {
            return 0.0;
        }
        let total: u64 = self.records.values().map(|r| r.uptime_ms).sum();
        hours(total) / self.records.len() as f64
    }

    /// Takes an availability snapshot when the interval has elapsed, then
    /// prunes history older than the retention window.
    pub fn snapshot_if_due(&mut self, now: u64) -> bool {
        let due = self
            .last_snapshot
            .map_or(true, |last| now.saturating_sub(last) >= self.snapshot_interval_ms);
        if !due {
            return false;
        }

        self.history.push_back(AvailabilitySnapshot {
            timestamp: now,
            system_availability: self.system_availability(),
            unit_availability: self
                .records
                .iter()
                .map(|(id, r)| (id.clone(), r.availability()))
                .collect(),
        });
        self.last_snapshot = Some(now);

        let cutoff = now.saturating_sub(self.retention_ms);
        while self.history.front().is_some_and(|s| s.timestamp < cutoff) {
            self.history.pop_front();
        }
        true
    }

    pub fn uptime_history(&self, unit_id: &str, hours: u64, now: u64) -> Vec<AvailabilityPoint> {
        let cutoff = now.saturating_sub(hours.saturating_mul(MS_PER_HOUR));
        self.history
            .iter()
            .filter(|s| s.timestamp >= cutoff)
            .filter_map(|s| {
                s.unit_availability.get(unit_id).map(|a| AvailabilityPoint {
                    timestamp: s.timestamp,
                    availability: *a,
                })
            })
            .collect()
    }

    pub fn availability_history(&self, hours: u64, now: u64) -> Vec<AvailabilityPoint> {
        let cutoff = now.saturating_sub(hours.saturating_mul(MS_PER_HOUR));
        self.history
            .iter()
            .filter(|s| s.timestamp >= cutoff)
            .map(|s| AvailabilityPoint {
                timestamp: s.timestamp,
                availability: s.system_availability,
            })
            .collect()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Accrues to `now` first so the figures are current.
    pub fn summary(&mut self, now: u64) -> UptimeSummary {
        self.accrue(now);
        UptimeSummary {
            system_uptime_hours: self.system_uptime_hours(),
            system_availability: self.system_availability(),
            tracking_started: self.tracking_started,
            unit_count: self.records.len(),
            units: self
                .records
                .iter()
                .map(|(id, r)| {
                    (
                        id.clone(),
                        UnitUptime {
                            uptime_hours: r.uptime_hours(),
                            downtime_hours: r.downtime_hours(),
                            availability: r.availability(),
                            transition_count: r.transition_count,
                            current_state: r.current_state,
                        },
                    )
                })
                .collect(),
        }
    }

    /// Zeroes every unit's totals and drops history. Current states are kept.
    pub fn reset(&mut self, now: u64) {
        for record in self.records.values_mut() {
            record.clear_totals(now);
        }
        self.history.clear();
        self.last_snapshot = None;
        self.tracking_started = now;
        info!("Uptime statistics reset");
    }

    pub fn reset_unit(&mut self, unit_id: &str, now: u64) -> bool {
        let Some(record) = self.records.get_mut(unit_id) else {
            return false;
        };
        record.clear_totals(now);
        true
    }

    pub fn drain_events(&mut self) -> Vec<MonitorEvent> {
        std::mem::take(&mut self.events)
    }
}

impl Default for UptimeTracker {
    fn default() -> Self {
        Self::new(DEFAULT_SNAPSHOT_INTERVAL_MS, DEFAULT_RETENTION_MS)
    }
}
