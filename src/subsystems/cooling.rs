use super::{reading, Assessment, FaultCheck, FaultChecks, Limits, Penalty, UnitKind, UnitPolicy};
use crate::fault::FaultSeverity;
use crate::telemetry::{TelemetryParameter, TelemetryStore};

const NOMINAL_FLOW_LPM: f64 = 20.0;

const COOLANT_TEMP: Limits = Limits::new(45.0, 55.0);
const COOLANT_FLOW: Limits = Limits::new(14.0, 10.0);
/// Flow as a percentage of nominal.
const FLOW_PERCENT: Limits = Limits::new(70.0, 50.0);
const AMBIENT_TEMP: Limits = Limits::new(40.0, 50.0);
const EFFICIENCY: Limits = Limits::new(70.0, 50.0);

const COOLANT_PENALTY: Penalty = Penalty::new(15.0, 35.0);
const FLOW_PENALTY: Penalty = Penalty::new(15.0, 30.0);
const AMBIENT_PENALTY: Penalty = Penalty::new(10.0, 20.0);
const EFFICIENCY_PENALTY: Penalty = Penalty::new(8.0, 15.0);

#[derive(Debug, Clone, Copy, Default)]
pub struct Cooling;

impl UnitPolicy for Cooling {
    fn kind(&self) -> UnitKind {
        UnitKind::Cooling
    }

    fn description(&self) -> &'static str {
        "Liquid cooling loop"
    }

    fn parameters(&self) -> Vec<TelemetryParameter> {
        vec![
            TelemetryParameter::numeric("coolantTemp", "Coolant Temperature", "°C", 25.0, 0.0, 80.0)
                .warn_high(COOLANT_TEMP.warning)
                .crit_high(COOLANT_TEMP.critical),
            TelemetryParameter::numeric("coolantFlow", "Coolant Flow", "L/min", NOMINAL_FLOW_LPM, 0.0, 50.0)
                .warn_low(COOLANT_FLOW.warning)
                .crit_low(COOLANT_FLOW.critical),
            TelemetryParameter::numeric("ambientTemp", "Ambient Temperature", "°C", 25.0, -20.0, 60.0)
                .warn_high(AMBIENT_TEMP.warning)
                .crit_high(AMBIENT_TEMP.critical),
            TelemetryParameter::numeric("fanSpeed", "Fan Speed", "%", 50.0, 0.0, 100.0),
            TelemetryParameter::numeric("heatLoad", "Heat Load", "kW", 5.0, 0.0, 20.0),
            TelemetryParameter::numeric("efficiency", "Efficiency", "%", 90.0, 0.0, 100.0)
                .warn_low(EFFICIENCY.warning)
                .crit_low(EFFICIENCY.critical),
            TelemetryParameter::text("coolingMode", "Cooling Mode", "AUTO"),
            TelemetryParameter::numeric("compressorPressure", "Compressor Pressure", "bar", 15.0, 0.0, 30.0),
            TelemetryParameter::flag("compressorRunning", "Compressor Running", true),
        ]
    }

    fn assess(&self, telemetry: &TelemetryStore) -> Assessment {
        let mut assessment = Assessment::new();
        assessment.rising(
            reading(telemetry, "coolantTemp"),
            COOLANT_TEMP,
            COOLANT_PENALTY,
            "CRITICAL: Coolant overtemperature",
            "WARNING: Elevated coolant temperature",
        );
        let flow_percent = reading(telemetry, "coolantFlow") / NOMINAL_FLOW_LPM * 100.0;
        assessment.falling(
            flow_percent,
            FLOW_PERCENT,
            FLOW_PENALTY,
            "CRITICAL: Low coolant flow",
            "WARNING: Reduced coolant flow",
        );
        assessment.rising(
            reading(telemetry, "ambientTemp"),
            AMBIENT_TEMP,
            AMBIENT_PENALTY,
            "CRITICAL: Ambient temperature too high",
            "WARNING: High ambient temperature",
        );
        assessment.falling(
            reading(telemetry, "efficiency"),
            EFFICIENCY,
            EFFICIENCY_PENALTY,
            "CRITICAL: Cooling efficiency lost",
            "WARNING: Cooling efficiency degraded",
        );
        assessment
    }

    fn nominal_status(&self, telemetry: &TelemetryStore) -> String {
        format!(
            "{} Mode - Coolant: {:.1}°C, Flow: {:.1} L/min",
            telemetry.text("coolingMode").unwrap_or("AUTO"),
            reading(telemetry, "coolantTemp"),
            reading(telemetry, "coolantFlow")
        )
    }

    fn fault_checks(&self, telemetry: &TelemetryStore) -> FaultChecks {
        let mut checks = FaultChecks::new();
        checks.push(FaultCheck::new(
            "coolantTemp",
            "coolant-temp-high",
            "Coolant overtemperature",
            FaultSeverity::Critical,
            reading(telemetry, "coolantTemp") >= COOLANT_TEMP.critical,
        ));
        checks.push(FaultCheck::new(
            "coolantFlow",
            "flow-low",
            "Low coolant flow",
            FaultSeverity::Critical,
            reading(telemetry, "coolantFlow") <= COOLANT_FLOW.critical,
        ));
        checks.push(FaultCheck::new(
            "efficiency",
            "efficiency-low",
            "Cooling efficiency degraded",
            FaultSeverity::Warning,
            reading(telemetry, "efficiency") <= EFFICIENCY.critical,
        ));
        checks
    }
}
