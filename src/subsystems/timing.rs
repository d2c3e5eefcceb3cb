use super::{reading, switch, Assessment, FaultCheck, FaultChecks, Limits, Penalty, UnitKind, UnitPolicy};
use crate::fault::FaultSeverity;
use crate::telemetry::{TelemetryParameter, TelemetryStore};

const SATELLITES: Limits = Limits::new(6.0, 4.0);
const TIME_ACCURACY_NS: Limits = Limits::new(100.0, 1000.0);
const OCXO_STABILITY_PPB: Limits = Limits::new(10.0, 100.0);
const TEMPERATURE: Limits = Limits::new(50.0, 60.0);
const DOP: Limits = Limits::new(5.0, 10.0);

const SATELLITE_PENALTY: Penalty = Penalty::new(12.0, 25.0);
const ACCURACY_PENALTY: Penalty = Penalty::new(12.0, 25.0);
const OCXO_PENALTY: Penalty = Penalty::new(10.0, 20.0);
const GPS_UNLOCK_PENALTY: f64 = 30.0;
const PPS_INVALID_PENALTY: f64 = 20.0;

/// GPS-disciplined time and frequency reference.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimingSync;

impl UnitPolicy for TimingSync {
    fn kind(&self) -> UnitKind {
        UnitKind::TimingSync
    }

    fn description(&self) -> &'static str {
        "GPS-disciplined timing reference"
    }

    fn parameters(&self) -> Vec<TelemetryParameter> {
        vec![
            TelemetryParameter::flag("gpsLocked", "GPS Locked", true),
            TelemetryParameter::numeric("satelliteCount", "Satellites", "", 12.0, 0.0, 24.0)
                .warn_low(SATELLITES.warning)
                .crit_low(SATELLITES.critical),
            TelemetryParameter::numeric("timeAccuracy", "Time Accuracy", "ns", 20.0, 0.0, 10_000.0)
                .warn_high(TIME_ACCURACY_NS.warning)
                .crit_high(TIME_ACCURACY_NS.critical),
            TelemetryParameter::numeric("ocxoFrequency", "OCXO Frequency", "MHz", 10.0, 9.999_99, 10.000_01),
            TelemetryParameter::numeric("ocxoStability", "OCXO Stability", "ppb", 1.0, 0.0, 1000.0)
                .warn_high(OCXO_STABILITY_PPB.warning)
                .crit_high(OCXO_STABILITY_PPB.critical),
            TelemetryParameter::numeric("temperature", "Temperature", "°C", 40.0, 0.0, 80.0)
                .warn_high(TEMPERATURE.warning)
                .crit_high(TEMPERATURE.critical),
            TelemetryParameter::text("syncSource", "Sync Source", "GPS"),
            TelemetryParameter::numeric("ppsJitter", "PPS Jitter", "ns", 5.0, 0.0, 1000.0),
            TelemetryParameter::flag("ppsValid", "PPS Valid", true),
            TelemetryParameter::numeric("dop", "DOP", "", 1.0, 0.0, 20.0)
                .warn_high(DOP.warning)
                .crit_high(DOP.critical),
        ]
    }

    fn assess(&self, telemetry: &TelemetryStore) -> Assessment {
        let mut assessment = Assessment::new();
        let satellites = reading(telemetry, "satelliteCount");

        assessment.critical_if(!switch(telemetry, "gpsLocked", true), GPS_UNLOCK_PENALTY, "CRITICAL: GPS unlocked");
        assessment.critical_if(!switch(telemetry, "ppsValid", true), PPS_INVALID_PENALTY, "CRITICAL: PPS invalid");
        assessment.falling(
            satellites,
            SATELLITES,
            SATELLITE_PENALTY,
            &format!("CRITICAL: Low satellites ({satellites:.0})"),
            &format!("WARNING: Low satellites ({satellites:.0})"),
        );
        assessment.rising(
            reading(telemetry, "timeAccuracy"),
            TIME_ACCURACY_NS,
            ACCURACY_PENALTY,
            "CRITICAL: Time accuracy degraded",
            "WARNING: Time accuracy reduced",
        );
        assessment.rising(
            reading(telemetry, "ocxoStability"),
            OCXO_STABILITY_PPB,
            OCXO_PENALTY,
            "CRITICAL: OCXO drift",
            "WARNING: OCXO stability degraded",
        );
        // Temperature moves the state but carries no score penalty.
        assessment.rising(
            reading(telemetry, "temperature"),
            TEMPERATURE,
            Penalty::NONE,
            "CRITICAL: Timing overtemperature",
            "WARNING: Elevated temperature",
        );
        assessment
    }

    fn nominal_status(&self, telemetry: &TelemetryStore) -> String {
        format!(
            "{} - {:.0} sats, Accuracy: {:.0} ns",
            telemetry.text("syncSource").unwrap_or("GPS"),
            reading(telemetry, "satelliteCount"),
            reading(telemetry, "timeAccuracy")
        )
    }

    fn fault_checks(&self, telemetry: &TelemetryStore) -> FaultChecks {
        let mut checks = FaultChecks::new();
        checks.push(FaultCheck::new(
            "gpsLocked",
            "gps-unlock",
            "GPS lock lost",
            FaultSeverity::Critical,
            !switch(telemetry, "gpsLocked", true),
        ));
        checks.push(FaultCheck::new(
            "satelliteCount",
            "low-satellites",
            "Insufficient satellites",
            FaultSeverity::Warning,
            reading(telemetry, "satelliteCount") <= SATELLITES.critical,
        ));
        checks.push(FaultCheck::new(
            "ppsValid",
            "pps-invalid",
            "PPS signal invalid",
            FaultSeverity::Critical,
            !switch(telemetry, "ppsValid", true),
        ));
        checks.push(FaultCheck::new(
            "ocxoStability",
            "ocxo-drift",
            "OCXO frequency drift",
            FaultSeverity::Warning,
            reading(telemetry, "ocxoStability") >= OCXO_STABILITY_PPB.critical,
        ));
        checks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subsystems::Condition;

    #[test]
    fn test_gps_unlock() {
        let mut store = TimingSync.catalogue();
        store.set_value("gpsLocked", false.into(), 1);
        let assessment = TimingSync.assess(&store);
        assert_eq!(assessment.condition(), Condition::Critical);
        assert_eq!(assessment.condition_message(), Some("CRITICAL: GPS unlocked"));
        assert!(TimingSync.fault_checks(&store).iter().any(|c| c.code == "gps-unlock" && c.active));
    }

    #[test]
    fn test_low_satellite_message_carries_count() {
        let mut store = TimingSync.catalogue();
        store.set_value("satelliteCount", 5.0.into(), 1);
        assert_eq!(TimingSync.assess(&store).condition_message(), Some("WARNING: Low satellites (5)"));
    }

    #[test]
    fn test_temperature_affects_state_only() {
        let mut store = TimingSync.catalogue();
        store.set_value("temperature", 62.0.into(), 1);
        let assessment = TimingSync.assess(&store);
        assert_eq!(assessment.condition(), Condition::Critical);
        assert!(assessment.penalty().abs() < 1e-9);
    }
}
