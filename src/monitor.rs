//! Top-level facade wiring the engine components together.
//!
//! [`HealthMonitor`] is single-threaded and clock-injected: every call that
//! depends on time takes `now` in milliseconds, and all timer-driven work
//! happens inside [`HealthMonitor::tick`]. Ticking drives, in order, the
//! ingestion drain, delayed fault injections, the throttled recompute pass,
//! debounced notifications, uptime accrual and trend sampling.

use crate::analytics::{self, FaultOccurrence, FaultSummary, SystemHealthSummary, UnitAnalytics, UnitRank};
use crate::config::MonitorConfig;
use crate::error::{MonitorError, Result};
use crate::events::MonitorEvent;
use crate::fault::{FaultRecord, FaultRegistry, FaultStatistics};
use crate::fault_injection::{FaultInjection, FaultInjectionStats, FaultInjector};
use crate::health::{HealthEngine, HealthEngineStats, HealthSnapshot, HealthState, SCORE_NOISE_FLOOR};
use crate::pipeline::{DataPipeline, PipelineStats, RawTelemetry, SubmitHandle};
use crate::scheduler::{SchedulerStats, UpdateScheduler};
use crate::subsystems::UnitKind;
use crate::trend::{TrendAnalyzer, TrendResult};
use crate::uptime::UptimeTracker;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

const MS_PER_HOUR: u64 = 3_600_000;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MonitorState {
    pub running: bool,
    pub started_at: Option<u64>,
    pub tick_count: u64,
    pub last_tick: Option<u64>,
    pub recompute_passes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorStats {
    pub state: MonitorState,
    pub pipeline: PipelineStats,
    pub scheduler: SchedulerStats,
    pub engine: HealthEngineStats,
    pub injection: FaultInjectionStats,
    pub faults: FaultStatistics,
}

#[derive(Debug)]
pub struct HealthMonitor {
    config: MonitorConfig,
    engine: HealthEngine,
    registry: FaultRegistry,
    pipeline: DataPipeline,
    trends: TrendAnalyzer,
    uptime: UptimeTracker,
    scheduler: UpdateScheduler,
    injector: FaultInjector,

    state: MonitorState,
    published: Option<(HealthState, f64)>,
    last_trend_sample: Option<u64>,
    last_trend_prune: u64,
    events: Vec<MonitorEvent>,
}

impl HealthMonitor {
    pub fn new(config: MonitorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            engine: HealthEngine::new(&config),
            registry: FaultRegistry::with_capacity(config.fault_history_capacity),
            pipeline: DataPipeline::new(config.pipeline_batch_size, config.pipeline_tick_ms),
            trends: TrendAnalyzer::new(&config),
            uptime: UptimeTracker::new(config.snapshot_interval_ms, config.history_retention_ms()),
            scheduler: UpdateScheduler::new(config.throttle_interval_ms),
            injector: FaultInjector::new(),
            state: MonitorState::default(),
            published: None,
            last_trend_sample: None,
            last_trend_prune: 0,
            events: Vec::new(),
            config,
        })
    }

    /// Monitor with the ten standard radar units registered.
    pub fn with_default_units(config: MonitorConfig, now: u64) -> Result<Self> {
        let mut monitor = Self::new(config)?;
        for kind in UnitKind::ALL {
            monitor.register_unit(kind.default_id(), kind, now)?;
        }
        Ok(monitor)
    }

    pub fn register_unit(&mut self, unit_id: &str, kind: UnitKind, now: u64) -> Result<()> {
        self.engine.register_unit(unit_id, kind)?;
        self.pipeline.register_unit(unit_id, kind);
        self.uptime.register_unit(unit_id, now);
        if let Some(state) = self.engine.state(unit_id) {
            self.uptime.update_state(unit_id, state, now);
        }
        info!(unit_id, kind = kind.display_name(), "Unit registered");
        Ok(())
    }

    pub fn unregister_unit(&mut self, unit_id: &str, now: u64) -> bool {
        if !self.engine.unregister_unit(unit_id) {
            return false;
        }
        self.injector.clear_unit(unit_id, &mut self.registry, now);
        self.registry.clear_all(Some(unit_id), now);
        self.uptime.unregister_unit(unit_id);
        self.trends.clear_data(unit_id);
        self.collect_events();
        true
    }

    pub fn unit_ids(&self) -> Vec<String> {
        self.engine.unit_ids()
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn start(&mut self, now: u64) {
        if self.state.running {
            return;
        }
        self.state.running = true;
        self.state.started_at = Some(now);
        self.pipeline.start(now);
        if self.scheduler.resume(now) {
            debug!("Recompute re-armed for units dirtied before stop");
        }
        info!(units = self.engine.unit_count(), "Health monitor started");
    }

    /// Cancels every pending timer. State stays as of the last completed
    /// pass; queued telemetry and dirty units wait for the next start.
    pub fn stop(&mut self) {
        if !self.state.running {
            return;
        }
        self.state.running = false;
        self.pipeline.stop();
        self.scheduler.suspend();
        self.engine.cancel_timers();
        self.injector.cancel_pending();
        info!("Health monitor stopped");
    }

    pub fn is_running(&self) -> bool {
        self.state.running
    }

    /// Producer handle for telemetry sources on other tasks.
    pub fn submit_handle(&self) -> SubmitHandle {
        self.pipeline.handle()
    }

    pub fn submit_telemetry(&mut self, unit_id: &str, data: RawTelemetry, now: u64) -> Result<()> {
        if !self.engine.contains(unit_id) {
            return Err(MonitorError::UnknownUnit(unit_id.to_string()));
        }
        self.pipeline.submit(unit_id, data, now);
        Ok(())
    }

    /// Queues `{unit_id: {parameter: value, ...}, ...}`. Unknown units and
    /// non-object entries are skipped; returns how many were queued.
    pub fn submit_batch(&mut self, batch: RawTelemetry, now: u64) -> usize {
        let mut queued = 0;
        for (unit_id, data) in batch {
            match data {
                Value::Object(data) if self.engine.contains(&unit_id) => {
                    self.pipeline.submit(&unit_id, data, now);
                    queued += 1;
                }
                Value::Object(_) => warn!(unit_id = %unit_id, "Batch entry for unknown unit skipped"),
                _ => {
                    warn!(unit_id = %unit_id, "Batch entry is not an object");
                    self.events.push(MonitorEvent::ValidationFailed {
                        unit_id,
                        error: "telemetry entry is not an object".to_string(),
                    });
                }
            }
        }
        queued
    }

    pub fn inject_fault(&mut self, injection: FaultInjection, now: u64) -> Result<bool> {
        if !self.engine.contains(&injection.unit_id) {
            return Err(MonitorError::UnknownUnit(injection.unit_id));
        }
        let unit_id = injection.unit_id.clone();
        let applied = self.injector.inject(injection, &mut self.registry, now)?;
        if applied {
            self.scheduler.schedule_recompute(&unit_id, now);
        }
        self.collect_events();
        Ok(applied)
    }

    /// Clears an injected or detected fault.
    pub fn clear_fault(&mut self, unit_id: &str, code: &str, now: u64) -> bool {
        let cleared = self.injector.clear(unit_id, code, &mut self.registry, now)
            || self.registry.clear(unit_id, code, now);
        if cleared {
            self.scheduler.schedule_recompute(unit_id, now);
        }
        self.collect_events();
        cleared
    }

    pub fn clear_all_faults(&mut self, unit_id: Option<&str>, now: u64) -> usize {
        let mut units: Vec<String> = self.registry.active_iter(unit_id).map(|f| f.unit_id.clone()).collect();
        units.dedup();

        let injected = match unit_id {
            Some(id) => self.injector.clear_unit(id, &mut self.registry, now),
            None => self.injector.clear_all(&mut self.registry, now),
        };
        let detected = self.registry.clear_all(unit_id, now);
        for id in &units {
            self.scheduler.schedule_recompute(id, now);
        }
        self.collect_events();
        injected + detected
    }

    pub fn run_scenario(&mut self, name: &str, now: u64) -> Result<()> {
        let applied = self.injector.run_scenario_by_name(name, &mut self.registry, now)?;
        for unit_id in &applied {
            self.scheduler.schedule_recompute(unit_id, now);
        }
        self.collect_events();
        Ok(())
    }

    pub fn available_scenarios(&self) -> Vec<&'static str> {
        self.injector.available_scenarios()
    }

    pub fn set_unit_enabled(&mut self, unit_id: &str, enabled: bool, now: u64) -> Result<()> {
        self.engine.set_enabled(unit_id, enabled, now)?;
        self.scheduler.schedule_recompute(unit_id, now);
        Ok(())
    }

    /// Restores catalogue telemetry and drops the unit's injected faults.
    pub fn reset_unit(&mut self, unit_id: &str, now: u64) -> Result<()> {
        self.engine.reset_unit(unit_id)?;
        self.injector.clear_unit(unit_id, &mut self.registry, now);
        self.scheduler.schedule_recompute(unit_id, now);
        self.collect_events();
        Ok(())
    }

    /// One cooperative step. Does nothing while stopped.
    pub fn tick(&mut self, now: u64) {
        if !self.state.running {
            return;
        }
        self.state.tick_count += 1;
        self.state.last_tick = Some(now);

        for item in self.pipeline.tick(&mut self.registry, now) {
            if let Err(e) = self.engine.apply_telemetry(&item.unit_id, &item.frame, now) {
                warn!(unit_id = %item.unit_id, error = %e, "Processed telemetry not applied");
                continue;
            }
            self.scheduler.schedule_recompute(&item.unit_id, now);
        }

        for unit_id in self.injector.poll(&mut self.registry, now) {
            self.scheduler.schedule_recompute(&unit_id, now);
        }

        if let Some(pass) = self.scheduler.poll(now) {
            self.run_pass(&pass.units, pass.full, now);
        }

        self.engine.flush_debounced(now);

        self.uptime.accrue(now);
        self.uptime.snapshot_if_due(now);

        self.sample_trends(now);
        self.collect_events();
    }

    fn run_pass(&mut self, units: &[String], full: bool, now: u64) {
        let units = if full { self.engine.unit_ids() } else { units.to_vec() };
        debug!(units = units.len(), full, "Recompute pass");
        for unit_id in &units {
            if let Some(snapshot) = self.engine.recompute(unit_id, &mut self.registry, now) {
                self.uptime.update_state(unit_id, snapshot.state, now);
            }
        }
        self.state.recompute_passes += 1;
        self.publish_system_health(now);
    }

    fn publish_system_health(&mut self, now: u64) {
        let summary = analytics::system_health_summary(&self.engine, &self.registry, &self.uptime, now);
        let changed = self.published.map_or(true, |(state, score)| {
            state != summary.state || (score - summary.average_score).abs() > SCORE_NOISE_FLOOR
        });
        if changed {
            debug!(state = %summary.state, score = summary.average_score, "System health changed");
            self.published = Some((summary.state, summary.average_score));
            self.events.push(MonitorEvent::SystemHealthChanged {
                state: summary.state,
                score: summary.average_score,
            });
        }
    }

    fn sample_trends(&mut self, now: u64) {
        let due = self
            .last_trend_sample
            .map_or(true, |last| now.saturating_sub(last) >= self.config.trend_sample_interval_ms);
        if !due {
            return;
        }
        self.last_trend_sample = Some(now);

        for unit_id in self.engine.unit_ids() {
            if self.engine.is_enabled(&unit_id) != Some(true) {
                continue;
            }
            if let Some(telemetry) = self.engine.telemetry(&unit_id) {
                let values = telemetry.numeric_values();
                self.trends.add_data_points(&unit_id, &values, now);
            }
        }

        if now.saturating_sub(self.last_trend_prune) >= MS_PER_HOUR {
            self.last_trend_prune = now;
            self.trends.prune_old_data(self.config.history_retention_hours, now);
        }
    }

    fn collect_events(&mut self) {
        self.events.extend(self.pipeline.drain_events());
        self.events.extend(self.injector.drain_events());
        self.events.extend(self.registry.drain_events());
        self.events.extend(self.engine.drain_events());
        self.events.extend(self.uptime.drain_events());
        self.events.extend(self.trends.drain_events());
    }

    pub fn drain_events(&mut self) -> Vec<MonitorEvent> {
        self.collect_events();
        std::mem::take(&mut self.events)
    }

    pub fn health_snapshot(&self, unit_id: &str) -> Option<&HealthSnapshot> {
        self.engine.snapshot(unit_id)
    }

    pub fn health_snapshots(&self) -> Vec<HealthSnapshot> {
        self.engine.snapshots().cloned().collect()
    }

    pub fn active_faults(&self, unit_id: Option<&str>) -> Vec<FaultRecord> {
        self.registry.active_faults(unit_id)
    }

    pub fn fault_history(&self, unit_id: Option<&str>, limit: usize) -> Vec<FaultRecord> {
        self.registry.history(unit_id, limit)
    }

    pub fn trend_result(&self, unit_id: &str, parameter: &str) -> Option<TrendResult> {
        self.trends.analyze_trend(unit_id, parameter)
    }

    pub fn trends(&self) -> &TrendAnalyzer {
        &self.trends
    }

    /// Unit availability, or system availability for `None`.
    pub fn availability(&self, unit_id: Option<&str>) -> f64 {
        match unit_id {
            Some(id) => self.uptime.availability(id),
            None => self.uptime.system_availability(),
        }
    }

    pub fn uptime(&self) -> &UptimeTracker {
        &self.uptime
    }

    pub fn system_health_summary(&self, now: u64) -> SystemHealthSummary {
        analytics::system_health_summary(&self.engine, &self.registry, &self.uptime, now)
    }

    pub fn unit_analytics(&self, unit_id: &str) -> Option<UnitAnalytics> {
        analytics::unit_analytics(unit_id, &self.engine, &self.registry, &self.uptime)
    }

    pub fn top_faults(&self, count: usize) -> Vec<FaultOccurrence> {
        analytics::top_faults(&self.registry, count)
    }

    pub fn unit_ranking(&self) -> Vec<UnitRank> {
        analytics::unit_ranking(&self.engine)
    }

    pub fn fault_summary(&self) -> FaultSummary {
        analytics::fault_summary(&self.registry)
    }

    pub fn get_stats(&self) -> MonitorStats {
        MonitorStats {
            state: self.state.clone(),
            pipeline: self.pipeline.get_stats(),
            scheduler: self.scheduler.get_stats().clone(),
            engine: self.engine.get_stats().clone(),
            injection: self.injector.get_stats().clone(),
            faults: self.registry.statistics(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::TelemetryValue;
    use serde_json::json;

    fn raw(value: Value) -> RawTelemetry {
        match value {
            Value::Object(map) => map,
            _ => panic!("telemetry must be an object"),
        }
    }

    fn running_monitor() -> HealthMonitor {
        let mut monitor = HealthMonitor::with_default_units(MonitorConfig::default(), 0).unwrap();
        monitor.start(0);
        monitor
    }

    #[test]
    fn test_stopped_monitor_does_not_tick() {
        let mut monitor = HealthMonitor::with_default_units(MonitorConfig::default(), 0).unwrap();
        monitor
            .submit_telemetry("PSU-001", raw(json!({"inputVoltage": 170.0})), 0)
            .unwrap();
        monitor.tick(1000);
        assert_eq!(monitor.health_snapshot("PSU-001").unwrap().state, HealthState::Ok);
        assert_eq!(monitor.get_stats().pipeline.queued, 1);
    }

    #[test]
    fn test_unknown_unit_rejected() {
        let mut monitor = running_monitor();
        assert!(matches!(
            monitor.submit_telemetry("XX-001", RawTelemetry::new(), 0),
            Err(MonitorError::UnknownUnit(_))
        ));
        assert!(monitor.inject_fault(FaultInjection::new("XX-001", "overtemp"), 0).is_err());
        assert!(monitor.health_snapshot("XX-001").is_none());
        assert!(monitor.trend_result("XX-001", "temperature").is_none());
    }

    #[test]
    fn test_batch_skips_bad_entries() {
        let mut monitor = running_monitor();
        let batch = raw(json!({
            "TX-001": {"temperature": 45.0},
            "XX-001": {"temperature": 45.0},
            "RX-001": 12,
        }));
        assert_eq!(monitor.submit_batch(batch, 0), 1);
        assert!(monitor
            .drain_events()
            .iter()
            .any(|e| matches!(e, MonitorEvent::ValidationFailed { unit_id, .. } if unit_id == "RX-001")));
    }

    #[test]
    fn test_injected_fault_survives_in_range_telemetry() {
        let mut monitor = running_monitor();
        monitor
            .inject_fault(FaultInjection::new("TX-001", "overtemp").severity(crate::fault::FaultSeverity::Critical), 0)
            .unwrap();
        monitor
            .submit_telemetry("TX-001", raw(json!({"temperature": 40.0})), 0)
            .unwrap();
        for now in (0..=200).step_by(10) {
            monitor.tick(now);
        }
        let snapshot = monitor.health_snapshot("TX-001").unwrap();
        assert_eq!(snapshot.state, HealthState::Fail);

        assert!(monitor.clear_fault("TX-001", "overtemp", 200));
        for now in (210..=400).step_by(10) {
            monitor.tick(now);
        }
        assert_eq!(monitor.health_snapshot("TX-001").unwrap().state, HealthState::Ok);
    }

    #[test]
    fn test_update_pending_at_stop_lands_after_restart() {
        let mut monitor = running_monitor();
        monitor
            .submit_telemetry("PSU-001", raw(json!({"inputVoltage": 170.0})), 0)
            .unwrap();
        monitor.tick(0);
        assert!(monitor.get_stats().scheduler.currently_dirty > 0);

        monitor.stop();
        monitor.start(20);
        for now in (20..=5_000).step_by(10) {
            monitor.tick(now);
        }
        let snapshot = monitor.health_snapshot("PSU-001").unwrap();
        assert_eq!(snapshot.state, HealthState::Fail);
        assert_eq!(snapshot.telemetry.get("inputVoltage"), Some(&TelemetryValue::Number(170.0)));
    }

    #[test]
    fn test_trend_sampling_interval() {
        let mut monitor = running_monitor();
        for now in (0..5_000).step_by(10) {
            monitor.tick(now);
        }
        assert_eq!(monitor.trends().point_count("COOL-001", "coolantTemp"), 5);
    }
}
