use super::{reading, Assessment, FaultCheck, FaultChecks, Limits, Penalty, UnitKind, UnitPolicy};
use crate::fault::FaultSeverity;
use crate::telemetry::{TelemetryParameter, TelemetryStore};

const CPU_LOAD: Limits = Limits::new(75.0, 90.0);
const MEMORY: Limits = Limits::new(70.0, 85.0);
const TRACK_QUALITY: Limits = Limits::new(80.0, 60.0);
const PROCESSING_LATENCY: Limits = Limits::new(100.0, 500.0);
/// Track table occupancy, percent of `maxTracks`.
const TRACK_LOAD: Limits = Limits::new(80.0, 95.0);

const LOAD_PENALTY: Penalty = Penalty::new(12.0, 25.0);
const TRACK_LOAD_PENALTY: Penalty = Penalty::new(10.0, 20.0);

/// Track processor and plot extractor.
#[derive(Debug, Clone, Copy, Default)]
pub struct DataProcessor;

fn track_load_percent(telemetry: &TelemetryStore) -> Option<f64> {
    let max = reading(telemetry, "maxTracks");
    (max > 0.0).then(|| reading(telemetry, "activeTracks") / max * 100.0)
}

impl UnitPolicy for DataProcessor {
    fn kind(&self) -> UnitKind {
        UnitKind::DataProcessor
    }

    fn description(&self) -> &'static str {
        "Track and plot data processor"
    }

    fn parameters(&self) -> Vec<TelemetryParameter> {
        vec![
            TelemetryParameter::numeric("cpuLoad", "CPU Load", "%", 45.0, 0.0, 100.0)
                .warn_high(CPU_LOAD.warning)
                .crit_high(CPU_LOAD.critical),
            TelemetryParameter::numeric("memoryUsage", "Memory Usage", "%", 35.0, 0.0, 100.0)
                .warn_high(MEMORY.warning)
                .crit_high(MEMORY.critical),
            TelemetryParameter::numeric("activeTracks", "Active Tracks", "", 50.0, 0.0, 500.0),
            TelemetryParameter::numeric("maxTracks", "Max Tracks", "", 500.0, 0.0, 10_000.0),
            TelemetryParameter::numeric("trackQuality", "Track Quality", "%", 95.0, 0.0, 100.0)
                .warn_low(TRACK_QUALITY.warning)
                .crit_low(TRACK_QUALITY.critical),
            TelemetryParameter::numeric("processingLatency", "Processing Latency", "ms", 50.0, 0.0, 1000.0)
                .warn_high(PROCESSING_LATENCY.warning)
                .crit_high(PROCESSING_LATENCY.critical),
            TelemetryParameter::numeric("updateRate", "Update Rate", "Hz", 10.0, 0.0, 100.0),
            TelemetryParameter::numeric("droppedDetections", "Dropped Detections", "", 0.0, 0.0, 100_000.0),
        ]
    }

    fn assess(&self, telemetry: &TelemetryStore) -> Assessment {
        let mut assessment = Assessment::new();
        assessment.rising(
            reading(telemetry, "cpuLoad"),
            CPU_LOAD,
            LOAD_PENALTY,
            "CRITICAL: CPU overload",
            "WARNING: High CPU load",
        );
        assessment.rising(
            reading(telemetry, "memoryUsage"),
            MEMORY,
            LOAD_PENALTY,
            "CRITICAL: Memory exhausted",
            "WARNING: High memory usage",
        );
        assessment.rising(
            reading(telemetry, "processingLatency"),
            PROCESSING_LATENCY,
            LOAD_PENALTY,
            "CRITICAL: Processing latency excessive",
            "WARNING: Processing latency elevated",
        );
        if let Some(load) = track_load_percent(telemetry) {
            assessment.rising(
                load,
                TRACK_LOAD,
                TRACK_LOAD_PENALTY,
                "CRITICAL: Track capacity exceeded",
                "WARNING: High track load",
            );
        }
        assessment
    }

    fn nominal_status(&self, telemetry: &TelemetryStore) -> String {
        format!(
            "Tracking {:.0}/{:.0} targets, Quality: {:.0}%",
            reading(telemetry, "activeTracks"),
            reading(telemetry, "maxTracks"),
            reading(telemetry, "trackQuality")
        )
    }

    fn fault_checks(&self, telemetry: &TelemetryStore) -> FaultChecks {
        let mut checks = FaultChecks::new();
        checks.push(FaultCheck::new(
            "cpuLoad",
            "cpu-overload",
            "CPU overload",
            FaultSeverity::Critical,
            reading(telemetry, "cpuLoad") >= CPU_LOAD.critical,
        ));
        checks.push(FaultCheck::new(
            "memoryUsage",
            "memory-exhausted",
            "Memory exhausted",
            FaultSeverity::Critical,
            reading(telemetry, "memoryUsage") >= MEMORY.critical,
        ));
        checks.push(FaultCheck::new(
            "activeTracks",
            "track-overflow",
            "Track capacity exceeded",
            FaultSeverity::Critical,
            track_load_percent(telemetry).is_some_and(|load| load >= TRACK_LOAD.critical),
        ));
        checks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subsystems::Condition;

    #[test]
    fn test_track_load_thresholds() {
        let mut store = DataProcessor.catalogue();
        store.set_value("activeTracks", 425.0.into(), 1);
        let assessment = DataProcessor.assess(&store);
        assert_eq!(assessment.condition(), Condition::Warning);
        assert_eq!(assessment.condition_message(), Some("WARNING: High track load"));

        store.set_value("activeTracks", 490.0.into(), 2);
        assert_eq!(DataProcessor.assess(&store).condition(), Condition::Critical);
        assert!(DataProcessor.fault_checks(&store).iter().any(|c| c.code == "track-overflow" && c.active));
    }

    #[test]
    fn test_zero_capacity_skips_track_check() {
        let mut store = DataProcessor.catalogue();
        store.set_value("maxTracks", 0.0.into(), 1);
        assert_eq!(DataProcessor.assess(&store).condition(), Condition::Nominal);
        assert!(DataProcessor.fault_checks(&store).iter().all(|c| !c.active));
    }
}
