use super::{reading, switch, Assessment, FaultCheck, FaultChecks, Limits, Penalty, UnitKind, UnitPolicy};
use crate::fault::FaultSeverity;
use crate::telemetry::{TelemetryParameter, TelemetryStore};

const NOMINAL_INPUT_VAC: f64 = 220.0;
const NOMINAL_OUTPUT_VDC: f64 = 48.0;

const INPUT_LOW: Limits = Limits::new(200.0, 180.0);
const INPUT_HIGH: Limits = Limits::new(250.0, 270.0);
const OUTPUT_LOW: Limits = Limits::new(45.0, 42.0);
const OUTPUT_HIGH: Limits = Limits::new(52.0, 55.0);
const CURRENT: Limits = Limits::new(75.0, 90.0);
const TEMPERATURE: Limits = Limits::new(50.0, 65.0);
const BATTERY: Limits = Limits::new(30.0, 10.0);
const EFFICIENCY: Limits = Limits::new(85.0, 75.0);

const INPUT_PENALTY: Penalty = Penalty::new(15.0, 35.0);
const TEMPERATURE_PENALTY: Penalty = Penalty::new(15.0, 30.0);
const BATTERY_PENALTY: Penalty = Penalty::new(15.0, 25.0);
const ON_BATTERY_PENALTY: f64 = 10.0;

/// Prime power conditioning with battery backup.
///
/// Input voltage is judged against both a low and a high band. Battery
/// level only matters once the unit has switched to battery.
#[derive(Debug, Clone, Copy, Default)]
pub struct PowerSupply;

impl UnitPolicy for PowerSupply {
    fn kind(&self) -> UnitKind {
        UnitKind::PowerSupply
    }

    fn description(&self) -> &'static str {
        "Prime power supply and UPS"
    }

    fn parameters(&self) -> Vec<TelemetryParameter> {
        vec![
            TelemetryParameter::numeric("inputVoltage", "Input Voltage", "VAC", NOMINAL_INPUT_VAC, 0.0, 300.0)
                .warn_low(INPUT_LOW.warning)
                .crit_low(INPUT_LOW.critical)
                .warn_high(INPUT_HIGH.warning)
                .crit_high(INPUT_HIGH.critical),
            TelemetryParameter::numeric("outputVoltage", "Output Voltage", "VDC", NOMINAL_OUTPUT_VDC, 0.0, 60.0)
                .warn_low(OUTPUT_LOW.warning)
                .crit_low(OUTPUT_LOW.critical)
                .warn_high(OUTPUT_HIGH.warning)
                .crit_high(OUTPUT_HIGH.critical),
            TelemetryParameter::numeric("current", "Current", "A", 50.0, 0.0, 100.0)
                .warn_high(CURRENT.warning)
                .crit_high(CURRENT.critical),
            TelemetryParameter::numeric("power", "Power", "kW", 2.4, 0.0, 10.0),
            TelemetryParameter::numeric("temperature", "Temperature", "°C", 35.0, 0.0, 100.0)
                .warn_high(TEMPERATURE.warning)
                .crit_high(TEMPERATURE.critical),
            TelemetryParameter::numeric("batteryLevel", "Battery Level", "%", 100.0, 0.0, 100.0)
                .warn_low(BATTERY.warning)
                .crit_low(BATTERY.critical),
            TelemetryParameter::flag("onBattery", "On Battery", false),
            TelemetryParameter::numeric("efficiency", "Efficiency", "%", 95.0, 0.0, 100.0)
                .warn_low(EFFICIENCY.warning)
                .crit_low(EFFICIENCY.critical),
            TelemetryParameter::numeric("powerFactor", "Power Factor", "", 0.98, 0.0, 1.0),
            TelemetryParameter::text("psuMode", "PSU Mode", "NORMAL"),
        ]
    }

    fn assess(&self, telemetry: &TelemetryStore) -> Assessment {
        let mut assessment = Assessment::new();
        let input = reading(telemetry, "inputVoltage");
        assessment.falling(
            input,
            INPUT_LOW,
            INPUT_PENALTY,
            "CRITICAL: Input voltage low",
            "WARNING: Input voltage low",
        );
        assessment.rising(
            input,
            INPUT_HIGH,
            INPUT_PENALTY,
            "CRITICAL: Input voltage high",
            "WARNING: Input voltage high",
        );

        if switch(telemetry, "onBattery", false) {
            let level = reading(telemetry, "batteryLevel");
            assessment.falling(
                level,
                BATTERY,
                BATTERY_PENALTY,
                &format!("CRITICAL: Battery low ({level:.0}%)"),
                "",
            );
            assessment.degraded_if(
                true,
                ON_BATTERY_PENALTY,
                &format!("Running on battery - {level:.0}% remaining"),
            );
        }

        assessment.rising(
            reading(telemetry, "temperature"),
            TEMPERATURE,
            TEMPERATURE_PENALTY,
            "CRITICAL: PSU overtemperature",
            "WARNING: Elevated temperature",
        );
        assessment
    }

    fn nominal_status(&self, telemetry: &TelemetryStore) -> String {
        format!(
            "Normal - {:.1} kW @ {:.0}% efficiency",
            reading(telemetry, "power"),
            reading(telemetry, "efficiency")
        )
    }

    fn fault_checks(&self, telemetry: &TelemetryStore) -> FaultChecks {
        let input = reading(telemetry, "inputVoltage");
        let on_battery = switch(telemetry, "onBattery", false);
        let mut checks = FaultChecks::new();
        checks.push(FaultCheck::new(
            "inputVoltage",
            "input-low",
            "Input voltage low",
            FaultSeverity::Critical,
            input <= INPUT_LOW.critical,
        ));
        checks.push(FaultCheck::new(
            "inputVoltage",
            "input-high",
            "Input voltage high",
            FaultSeverity::Critical,
            input >= INPUT_HIGH.critical,
        ));
        checks.push(FaultCheck::new(
            "batteryLevel",
            "battery-low",
            "Battery critically low",
            FaultSeverity::Critical,
            on_battery && reading(telemetry, "batteryLevel") <= BATTERY.critical,
        ));
        checks.push(FaultCheck::new(
            "temperature",
            "overtemp",
            "PSU overtemperature",
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
    fn test_low_input_voltage() {
        let mut store = PowerSupply.catalogue();
        store.set_value("inputVoltage", 170.0.into(), 1);
        let assessment = PowerSupply.assess(&store);
        assert_eq!(assessment.condition(), Condition::Critical);
        assert!((assessment.penalty() - 35.0).abs() < 1e-9);
        assert_eq!(assessment.condition_message(), Some("CRITICAL: Input voltage low"));

        let active: Vec<_> = PowerSupply
            .fault_checks(&store)
            .into_iter()
            .filter(|c| c.active)
            .map(|c| c.code)
            .collect();
        assert_eq!(active, vec!["input-low"]);
    }

    #[test]
    fn test_battery_operation() {
        let mut store = PowerSupply.catalogue();
        store.set_value("onBattery", true.into(), 1);
        store.set_value("batteryLevel", 64.0.into(), 1);
        let assessment = PowerSupply.assess(&store);
        assert_eq!(assessment.condition(), Condition::Warning);
        assert_eq!(assessment.condition_message(), Some("Running on battery - 64% remaining"));

        store.set_value("batteryLevel", 8.0.into(), 2);
        let assessment = PowerSupply.assess(&store);
        assert_eq!(assessment.condition(), Condition::Critical);
        assert_eq!(assessment.condition_message(), Some("CRITICAL: Battery low (8%)"));
        assert!((assessment.penalty() - 35.0).abs() < 1e-9);
    }

    #[test]
    fn test_battery_level_ignored_on_mains() {
        let mut store = PowerSupply.catalogue();
        store.set_value("batteryLevel", 5.0.into(), 1);
        assert_eq!(PowerSupply.assess(&store).condition(), Condition::Nominal);
        assert!(PowerSupply.fault_checks(&store).iter().all(|c| !c.active));
    }
}
