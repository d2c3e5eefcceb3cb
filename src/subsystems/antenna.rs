use super::{reading, switch, Assessment, FaultCheck, FaultChecks, Limits, Penalty, UnitKind, UnitPolicy};
use crate::fault::FaultSeverity;
use crate::telemetry::{TelemetryParameter, TelemetryStore};

const MOTOR_CURRENT: Limits = Limits::new(8.0, 12.0);
const MOTOR_TEMPERATURE: Limits = Limits::new(65.0, 85.0);
const POSITION_ERROR: Limits = Limits::new(0.5, 1.0);

const MOTOR_CURRENT_PENALTY: Penalty = Penalty::new(15.0, 35.0);
const MOTOR_TEMPERATURE_PENALTY: Penalty = Penalty::new(15.0, 30.0);
const POSITION_ERROR_PENALTY: Penalty = Penalty::new(10.0, 25.0);
const LIMIT_SWITCH_PENALTY: f64 = 10.0;

/// Azimuth/elevation pedestal and its drive motors.
#[derive(Debug, Clone, Copy, Default)]
pub struct AntennaServo;

impl UnitPolicy for AntennaServo {
    fn kind(&self) -> UnitKind {
        UnitKind::AntennaServo
    }

    fn description(&self) -> &'static str {
        "Antenna pedestal servo"
    }

    fn parameters(&self) -> Vec<TelemetryParameter> {
        vec![
            TelemetryParameter::numeric("azimuth", "Azimuth", "°", 0.0, 0.0, 360.0),
            TelemetryParameter::numeric("elevation", "Elevation", "°", 0.0, -5.0, 90.0),
            TelemetryParameter::numeric("rotationRate", "Rotation Rate", "°/s", 30.0, 0.0, 60.0),
            TelemetryParameter::numeric("motorCurrent", "Motor Current", "A", 5.0, 0.0, 20.0)
                .warn_high(MOTOR_CURRENT.warning)
                .crit_high(MOTOR_CURRENT.critical),
            TelemetryParameter::numeric("motorTemperature", "Motor Temperature", "°C", 45.0, 0.0, 120.0)
                .warn_high(MOTOR_TEMPERATURE.warning)
                .crit_high(MOTOR_TEMPERATURE.critical),
            TelemetryParameter::numeric("positionError", "Position Error", "°", 0.1, 0.0, 10.0)
                .warn_high(POSITION_ERROR.warning)
                .crit_high(POSITION_ERROR.critical),
            TelemetryParameter::text("scanMode", "Scan Mode", "SEARCH"),
            TelemetryParameter::flag("azLimitReached", "Azimuth Limit", false),
            TelemetryParameter::flag("elLimitReached", "Elevation Limit", false),
        ]
    }

    fn assess(&self, telemetry: &TelemetryStore) -> Assessment {
        let mut assessment = Assessment::new();
        assessment.rising(
            reading(telemetry, "motorCurrent"),
            MOTOR_CURRENT,
            MOTOR_CURRENT_PENALTY,
            "CRITICAL: Motor overcurrent",
            "WARNING: High motor current",
        );
        assessment.rising(
            reading(telemetry, "motorTemperature"),
            MOTOR_TEMPERATURE,
            MOTOR_TEMPERATURE_PENALTY,
            "CRITICAL: Motor overheating",
            "WARNING: Elevated motor temperature",
        );
        assessment.rising(
            reading(telemetry, "positionError"),
            POSITION_ERROR,
            POSITION_ERROR_PENALTY,
            "CRITICAL: Position servo error",
            "WARNING: Position error elevated",
        );
        assessment.degraded_if(
            switch(telemetry, "azLimitReached", false),
            LIMIT_SWITCH_PENALTY,
            "WARNING: Azimuth limit reached",
        );
        assessment.degraded_if(
            switch(telemetry, "elLimitReached", false),
            LIMIT_SWITCH_PENALTY,
            "WARNING: Elevation limit reached",
        );
        assessment
    }

    fn nominal_status(&self, telemetry: &TelemetryStore) -> String {
        format!(
            "{} - Az: {:.1}°, El: {:.1}°",
            telemetry.text("scanMode").unwrap_or("SEARCH"),
            reading(telemetry, "azimuth"),
            reading(telemetry, "elevation")
        )
    }

    fn fault_checks(&self, telemetry: &TelemetryStore) -> FaultChecks {
        let mut checks = FaultChecks::new();
        checks.push(FaultCheck::new(
            "motorCurrent",
            "motor-overcurrent",
            "Motor overcurrent",
            FaultSeverity::Critical,
            reading(telemetry, "motorCurrent") >= MOTOR_CURRENT.critical,
        ));
        checks.push(FaultCheck::new(
            "motorTemperature",
            "motor-overtemp",
            "Motor overtemperature",
            FaultSeverity::Critical,
            reading(telemetry, "motorTemperature") >= MOTOR_TEMPERATURE.critical,
        ));
        checks.push(FaultCheck::new(
            "positionError",
            "servo-error",
            "Position servo error",
            FaultSeverity::Critical,
            reading(telemetry, "positionError") >= POSITION_ERROR.critical,
        ));
        checks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subsystems::Condition;

    #[test]
    fn test_limit_switch_is_soft_degradation() {
        let mut store = AntennaServo.catalogue();
        store.set_value("azLimitReached", true.into(), 1);
        let assessment = AntennaServo.assess(&store);
        assert_eq!(assessment.condition(), Condition::Warning);
        assert!((assessment.penalty() - LIMIT_SWITCH_PENALTY).abs() < 1e-9);
        assert_eq!(assessment.condition_message(), Some("WARNING: Azimuth limit reached"));
    }

    #[test]
    fn test_nominal_status_uses_scan_mode() {
        let mut store = AntennaServo.catalogue();
        store.set_value("scanMode", "TRACK".into(), 1);
        store.set_value("azimuth", 123.4.into(), 1);
        assert_eq!(AntennaServo.nominal_status(&store), "TRACK - Az: 123.4°, El: 0.0°");
    }
}
