use super::{reading, switch, Assessment, FaultCheck, FaultChecks, Limits, Penalty, UnitKind, UnitPolicy};
use crate::fault::FaultSeverity;
use crate::telemetry::{TelemetryParameter, TelemetryStore};

const PHASE_LOCK: Limits = Limits::new(0.8, 0.5);
const LO_LEVEL: Limits = Limits::new(5.0, 0.0);
const TEMPERATURE: Limits = Limits::new(55.0, 70.0);
const PHASE_ERROR: Limits = Limits::new(5.0, 15.0);
const AMPLITUDE_ERROR: Limits = Limits::new(1.0, 3.0);

const PHASE_LOCK_PENALTY: Penalty = Penalty::new(20.0, 40.0);
const TEMPERATURE_PENALTY: Penalty = Penalty::new(15.0, 30.0);
const TR_SWITCH_PENALTY: f64 = 30.0;

#[derive(Debug, Clone, Copy, Default)]
pub struct RfFrontEnd;

impl UnitPolicy for RfFrontEnd {
    fn kind(&self) -> UnitKind {
        UnitKind::RfFrontEnd
    }

    fn description(&self) -> &'static str {
        "RF front-end, synthesizer and T/R switching"
    }

    fn parameters(&self) -> Vec<TelemetryParameter> {
        vec![
            TelemetryParameter::numeric("frequency", "Frequency", "GHz", 9.5, 9.0, 10.0),
            TelemetryParameter::numeric("phaseLock", "Phase Lock", "", 1.0, 0.0, 1.0)
                .warn_low(PHASE_LOCK.warning)
                .crit_low(PHASE_LOCK.critical),
            TelemetryParameter::numeric("ifLevel", "IF Level", "dBm", -10.0, -40.0, 10.0),
            TelemetryParameter::numeric("loLevel", "LO Level", "dBm", 10.0, -10.0, 20.0)
                .warn_low(LO_LEVEL.warning)
                .crit_low(LO_LEVEL.critical),
            TelemetryParameter::numeric("temperature", "Temperature", "°C", 40.0, 0.0, 100.0)
                .warn_high(TEMPERATURE.warning)
                .crit_high(TEMPERATURE.critical),
            TelemetryParameter::flag("trSwitchOk", "T/R Switch OK", true),
            TelemetryParameter::numeric("phaseError", "Phase Error", "°", 1.0, 0.0, 180.0)
                .warn_high(PHASE_ERROR.warning)
                .crit_high(PHASE_ERROR.critical),
            TelemetryParameter::numeric("amplitudeError", "Amplitude Error", "dB", 0.5, 0.0, 10.0)
                .warn_high(AMPLITUDE_ERROR.warning)
                .crit_high(AMPLITUDE_ERROR.critical),
        ]
    }

    fn assess(&self, telemetry: &TelemetryStore) -> Assessment {
        let mut assessment = Assessment::new();
        assessment.falling(
            reading(telemetry, "phaseLock"),
            PHASE_LOCK,
            PHASE_LOCK_PENALTY,
            "CRITICAL: PLL unlocked",
            "WARNING: PLL marginal",
        );
        assessment.critical_if(
            !switch(telemetry, "trSwitchOk", true),
            TR_SWITCH_PENALTY,
            "CRITICAL: T/R switch failure",
        );
        assessment.rising(
            reading(telemetry, "temperature"),
            TEMPERATURE,
            TEMPERATURE_PENALTY,
            "CRITICAL: Overtemperature",
            "WARNING: Elevated temperature",
        );
        assessment
    }

    fn nominal_status(&self, telemetry: &TelemetryStore) -> String {
        format!(
            "Locked - {:.3} GHz, Phase error: {:.1}°",
            reading(telemetry, "frequency"),
            reading(telemetry, "phaseError")
        )
    }

    fn fault_checks(&self, telemetry: &TelemetryStore) -> FaultChecks {
        let mut checks = FaultChecks::new();
        checks.push(FaultCheck::new(
            "phaseLock",
            "pll-unlock",
            "PLL unlocked",
            FaultSeverity::Critical,
            reading(telemetry, "phaseLock") <= PHASE_LOCK.critical,
        ));
        checks.push(FaultCheck::new(
            "trSwitchOk",
            "tr-switch-fail",
            "T/R switch failure",
            FaultSeverity::Critical,
            !switch(telemetry, "trSwitchOk", true),
        ));
        checks.push(FaultCheck::new(
            "temperature",
            "overtemp",
            "RF overtemperature",
            FaultSeverity::Critical,
            reading(telemetry, "temperature") >= TEMPERATURE.critical,
        ));
        checks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subsystems::Condition;

    #[test]
    fn test_tr_switch_failure_is_critical() {
        let mut store = RfFrontEnd.catalogue();
        store.set_value("trSwitchOk", false.into(), 1);
        let assessment = RfFrontEnd.assess(&store);
        assert_eq!(assessment.condition(), Condition::Critical);
        assert_eq!(assessment.condition_message(), Some("CRITICAL: T/R switch failure"));
        assert!((assessment.penalty() - TR_SWITCH_PENALTY).abs() < 1e-9);
    }

    #[test]
    fn test_marginal_lock() {
        let mut store = RfFrontEnd.catalogue();
        store.set_value("phaseLock", 0.65.into(), 1);
        let assessment = RfFrontEnd.assess(&store);
        assert_eq!(assessment.condition(), Condition::Warning);
        assert_eq!(assessment.condition_message(), Some("WARNING: PLL marginal"));
        assert!((assessment.penalty() - 10.0).abs() < 1e-9);
    }
}
