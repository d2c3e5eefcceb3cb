//! Read-only rollups over the engine, fault registry and uptime tracker.

use crate::fault::FaultRegistry;
use crate::health::{HealthEngine, HealthState};
use crate::uptime::UptimeTracker;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const MS_PER_MINUTE: f64 = 60_000.0;
const MS_PER_HOUR: f64 = 3_600_000.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemHealthSummary {
    pub state: HealthState,
    /// Mean score over enabled units.
    pub average_score: f64,
    pub total_units: usize,
    pub healthy_units: usize,
    pub degraded_units: usize,
    pub failed_units: usize,
    pub active_faults: usize,
    pub critical_faults: usize,
    pub availability: f64,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitAnalytics {
    pub unit_id: String,
    pub state: HealthState,
    pub score: f64,
    pub availability: f64,
    pub uptime_hours: f64,
    /// Hours; `None` with fewer than two historical faults.
    pub mtbf_hours: Option<f64>,
    /// Downtime minutes per historical fault.
    pub mttr_minutes: f64,
    pub fault_count: usize,
    pub active_faults: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultOccurrence {
    pub code: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitRank {
    pub unit_id: String,
    pub score: f64,
    pub state: HealthState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct FaultSummary {
    pub total_faults: usize,
    pub active_faults: usize,
    pub resolved_faults: usize,
    pub average_resolution_ms: u64,
}

pub fn system_health_summary(
    engine: &HealthEngine,
    registry: &FaultRegistry,
    uptime: &UptimeTracker,
    now: u64,
) -> SystemHealthSummary {
    let mut summary = SystemHealthSummary {
        state: HealthState::Unknown,
        average_score: 0.0,
        total_units: engine.unit_count(),
        healthy_units: 0,
        degraded_units: 0,
        failed_units: 0,
        active_faults: registry.total_active(),
        critical_faults: registry.critical_count(),
        availability: uptime.system_availability(),
        timestamp: now,
    };

    let mut enabled = 0usize;
    let mut score_sum = 0.0;
    for snapshot in engine.snapshots().filter(|s| s.enabled) {
        enabled += 1;
        score_sum += snapshot.score;
        match snapshot.state {
            HealthState::Ok => summary.healthy_units += 1,
            HealthState::Degraded => summary.degraded_units += 1,
            HealthState::Fail => summary.failed_units += 1,
            HealthState::Unknown => {}
        }
    }

    if enabled > 0 {
        let mean = score_sum / enabled as f64;
        summary.average_score = mean;
        summary.state = if summary.failed_units > 0 {
            HealthState::Fail
        } else if summary.degraded_units > 0 {
            HealthState::Degraded
        } else {
            HealthState::Ok
        };
    }
    summary
}

pub fn unit_analytics(
    unit_id: &str,
    engine: &HealthEngine,
    registry: &FaultRegistry,
    uptime: &UptimeTracker,
) -> Option<UnitAnalytics> {
    let snapshot = engine.snapshot(unit_id)?;
    let fault_count = registry.history(Some(unit_id), usize::MAX).len();

    let mttr_minutes = if fault_count == 0 {
        0.0
    } else {
        uptime.downtime_ms(unit_id) as f64 / MS_PER_MINUTE / fault_count as f64
    };

    let mtbf_hours = registry
        .estimate_mtbf(unit_id)
        .map(|d| d.as_millis() as f64 / MS_PER_HOUR);

    Some(UnitAnalytics {
        unit_id: unit_id.to_string(),
        state: snapshot.state,
        score: snapshot.score,
        availability: uptime.availability(unit_id),
        uptime_hours: uptime.uptime_hours(unit_id),
        mtbf_hours,
        mttr_minutes,
        fault_count,
        active_faults: registry.fault_count(unit_id),
    })
}

/// Most frequent fault codes across active and historical faults, ties
/// broken by code.
pub fn top_faults(registry: &FaultRegistry, count: usize) -> Vec<FaultOccurrence> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    let history = registry.history(None, usize::MAX);
    let active = registry.active_faults(None);
    for fault in history.iter().chain(active.iter()) {
        *counts.entry(fault.code.as_str()).or_default() += 1;
    }

    let mut ranked: Vec<FaultOccurrence> = counts
        .into_iter()
        .map(|(code, count)| FaultOccurrence {
            code: code.to_string(),
            count,
        })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.code.cmp(&b.code)));
    ranked.truncate(count);
    ranked
}

/// Units ordered by descending score.
pub fn unit_ranking(engine: &HealthEngine) -> Vec<UnitRank> {
    let mut ranked: Vec<UnitRank> = engine
        .snapshots()
        .map(|s| UnitRank {
            unit_id: s.unit_id.clone(),
            score: s.score,
            state: s.state,
        })
        .collect();
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.unit_id.cmp(&b.unit_id)));
    ranked
}

pub fn fault_summary(registry: &FaultRegistry) -> FaultSummary {
    let history = registry.history(None, usize::MAX);
    let resolved_faults = history.len();
    let total_resolution: u64 = history.iter().filter_map(|f| f.duration_ms).sum();
    FaultSummary {
        total_faults: resolved_faults + registry.total_active(),
        active_faults: registry.total_active(),
        resolved_faults,
        average_resolution_ms: if resolved_faults == 0 {
            0
        } else {
            total_resolution / resolved_faults as u64
        },
    }
}
