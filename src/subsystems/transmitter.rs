use super::{reading, switch, Assessment, FaultCheck, FaultChecks, Limits, Penalty, UnitKind, UnitPolicy};
use crate::fault::FaultSeverity;
use crate::telemetry::{TelemetryParameter, TelemetryStore};

const TEMPERATURE: Limits = Limits::new(60.0, 80.0);
const VSWR: Limits = Limits::new(1.5, 2.0);
const RF_POWER: Limits = Limits::new(80.0, 50.0);
const DUTY_CYCLE: Limits = Limits::new(20.0, 30.0);
const HV_LOW: Limits = Limits::new(22.5, 20.0);
const HV_HIGH: Limits = Limits::new(27.5, 30.0);

const TEMPERATURE_PENALTY: Penalty = Penalty::new(20.0, 40.0);
const VSWR_PENALTY: Penalty = Penalty::new(15.0, 30.0);
const RF_POWER_PENALTY: Penalty = Penalty::new(15.0, 30.0);

/// High-power pulsed transmitter. RF output and HV checks only apply while
/// high voltage is enabled; with HV off the unit reports standby.
#[derive(Debug, Clone, Copy, Default)]
pub struct Transmitter;

impl UnitPolicy for Transmitter {
    fn kind(&self) -> UnitKind {
        UnitKind::Transmitter
    }

    fn description(&self) -> &'static str {
        "High-power pulsed transmitter"
    }

    fn parameters(&self) -> Vec<TelemetryParameter> {
        vec![
            TelemetryParameter::numeric("rfPower", "RF Output Power", "kW", 100.0, 0.0, 150.0)
                .warn_low(RF_POWER.warning)
                .crit_low(RF_POWER.critical),
            TelemetryParameter::numeric("vswr", "VSWR", "", 1.2, 1.0, 5.0)
                .warn_high(VSWR.warning)
                .crit_high(VSWR.critical),
            TelemetryParameter::numeric("temperature", "Temperature", "°C", 45.0, 0.0, 100.0)
                .warn_high(TEMPERATURE.warning)
                .crit_high(TEMPERATURE.critical),
            TelemetryParameter::numeric("dutyCycle", "Duty Cycle", "%", 10.0, 0.0, 100.0)
                .warn_high(DUTY_CYCLE.warning)
                .crit_high(DUTY_CYCLE.critical),
            TelemetryParameter::numeric("hvVoltage", "HV Voltage", "kV", 25.0, 0.0, 35.0)
                .warn_low(HV_LOW.warning)
                .crit_low(HV_LOW.critical)
                .warn_high(HV_HIGH.warning)
                .crit_high(HV_HIGH.critical),
            TelemetryParameter::flag("hvEnabled", "HV Enabled", true),
            TelemetryParameter::text("txMode", "TX Mode", "NORMAL"),
            TelemetryParameter::numeric("pulseWidth", "Pulse Width", "µs", 10.0, 1.0, 100.0),
            TelemetryParameter::numeric("prf", "PRF", "Hz", 1000.0, 100.0, 5000.0),
        ]
    }

    fn assess(&self, telemetry: &TelemetryStore) -> Assessment {
        let mut assessment = Assessment::new();
        let hv_enabled = switch(telemetry, "hvEnabled", true);

        assessment.rising(
            reading(telemetry, "temperature"),
            TEMPERATURE,
            TEMPERATURE_PENALTY,
            "CRITICAL: Over temperature",
            "WARNING: Elevated temperature",
        );
        assessment.rising(
            reading(telemetry, "vswr"),
            VSWR,
            VSWR_PENALTY,
            "CRITICAL: High VSWR - Check antenna",
            "WARNING: VSWR above normal",
        );

        if hv_enabled {
            assessment.falling(
                reading(telemetry, "rfPower"),
                RF_POWER,
                RF_POWER_PENALTY,
                "CRITICAL: Low RF output",
                "WARNING: RF power below nominal",
            );
            let hv = reading(telemetry, "hvVoltage");
            assessment.falling(hv, HV_LOW, Penalty::NONE, "CRITICAL: HV supply low", "WARNING: HV supply low");
            assessment.rising(hv, HV_HIGH, Penalty::NONE, "CRITICAL: HV supply high", "WARNING: HV supply high");
        } else if assessment.condition_message().is_none() {
            assessment.set_status("HV off - Standby mode");
        }

        assessment
    }

    fn fault_checks(&self, telemetry: &TelemetryStore) -> FaultChecks {
        let hv_enabled = switch(telemetry, "hvEnabled", true);
        let mut checks = FaultChecks::new();
        checks.push(FaultCheck::new(
            "vswr",
            "vswr-high",
            "High VSWR detected",
            FaultSeverity::Critical,
            reading(telemetry, "vswr") >= VSWR.critical,
        ));
        checks.push(FaultCheck::new(
            "temperature",
            "overtemp",
            "Transmitter overtemperature",
            FaultSeverity::Critical,
            reading(telemetry, "temperature") >= TEMPERATURE.critical,
        ));
        checks.push(FaultCheck::new(
            "rfPower",
            "rf-power-low",
            "Low RF output power",
            FaultSeverity::Critical,
            hv_enabled && reading(telemetry, "rfPower") <= RF_POWER.critical,
        ));
        checks
    }

    fn nominal_status(&self, telemetry: &TelemetryStore) -> String {
        format!(
            "Transmitting - {:.1} kW @ {:.0} Hz PRF",
            reading(telemetry, "rfPower"),
            reading(telemetry, "prf")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subsystems::Condition;

    #[test]
    fn test_high_vswr_is_critical() {
        let mut store = Transmitter.catalogue();
        store.set_value("vswr", 2.3.into(), 1);
        let assessment = Transmitter.assess(&store);
        assert_eq!(assessment.condition(), Condition::Critical);
        assert_eq!(assessment.condition_message(), Some("CRITICAL: High VSWR - Check antenna"));
        assert!(Transmitter.fault_checks(&store).iter().any(|c| c.code == "vswr-high" && c.active));
    }

    #[test]
    fn test_hv_off_reports_standby() {
        let mut store = Transmitter.catalogue();
        store.set_value("hvEnabled", false.into(), 1);
        store.set_value("rfPower", 0.0.into(), 1);
        let assessment = Transmitter.assess(&store);
        assert_eq!(assessment.condition(), Condition::Nominal);
        assert_eq!(assessment.condition_message(), Some("HV off - Standby mode"));
        assert!(Transmitter.fault_checks(&store).iter().all(|c| !c.active));
    }

    #[test]
    fn test_nominal_status_text() {
        let store = Transmitter.catalogue();
        assert_eq!(Transmitter.nominal_status(&store), "Transmitting - 100.0 kW @ 1000 Hz PRF");
    }
}
