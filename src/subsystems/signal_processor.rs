use super::{reading, switch, Assessment, FaultCheck, FaultChecks, Limits, Penalty, UnitKind, UnitPolicy};
use crate::fault::FaultSeverity;
use crate::telemetry::{TelemetryParameter, TelemetryStore};

const CPU_LOAD: Limits = Limits::new(80.0, 95.0);
const MEMORY: Limits = Limits::new(75.0, 90.0);
const THROUGHPUT: Limits = Limits::new(80.0, 50.0);
const TEMPERATURE: Limits = Limits::new(70.0, 85.0);
const LATENCY: Limits = Limits::new(10.0, 50.0);
const DSP_UTILIZATION: Limits = Limits::new(85.0, 95.0);

const LOAD_PENALTY: Penalty = Penalty::new(12.0, 25.0);
const LATENCY_PENALTY: Penalty = Penalty::new(10.0, 20.0);
const FPGA_PENALTY: f64 = 30.0;

#[derive(Debug, Clone, Copy, Default)]
pub struct SignalProcessor;

impl UnitPolicy for SignalProcessor {
    fn kind(&self) -> UnitKind {
        UnitKind::SignalProcessor
    }

    fn description(&self) -> &'static str {
        "FPGA/DSP signal processor"
    }

    fn parameters(&self) -> Vec<TelemetryParameter> {
        vec![
            TelemetryParameter::numeric("cpuLoad", "CPU Load", "%", 50.0, 0.0, 100.0)
                .warn_high(CPU_LOAD.warning)
                .crit_high(CPU_LOAD.critical),
            TelemetryParameter::numeric("memoryUsage", "Memory Usage", "%", 40.0, 0.0, 100.0)
                .warn_high(MEMORY.warning)
                .crit_high(MEMORY.critical),
            TelemetryParameter::numeric("throughput", "Throughput", "MSPS", 100.0, 0.0, 200.0)
                .warn_low(THROUGHPUT.warning)
                .crit_low(THROUGHPUT.critical),
            TelemetryParameter::numeric("temperature", "Temperature", "°C", 55.0, 0.0, 100.0)
                .warn_high(TEMPERATURE.warning)
                .crit_high(TEMPERATURE.critical),
            TelemetryParameter::numeric("latency", "Latency", "ms", 5.0, 0.0, 100.0)
                .warn_high(LATENCY.warning)
                .crit_high(LATENCY.critical),
            TelemetryParameter::numeric("droppedPackets", "Dropped Packets", "", 0.0, 0.0, 10_000.0),
            TelemetryParameter::flag("fpgaHealthy", "FPGA Healthy", true),
            TelemetryParameter::numeric("dspUtilization", "DSP Utilization", "%", 60.0, 0.0, 100.0)
                .warn_high(DSP_UTILIZATION.warning)
                .crit_high(DSP_UTILIZATION.critical),
        ]
    }

    fn assess(&self, telemetry: &TelemetryStore) -> Assessment {
        let mut assessment = Assessment::new();
        assessment.critical_if(!switch(telemetry, "fpgaHealthy", true), FPGA_PENALTY, "CRITICAL: FPGA error");
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
            reading(telemetry, "temperature"),
            TEMPERATURE,
            LOAD_PENALTY,
            "CRITICAL: Processor overtemperature",
            "WARNING: Elevated temperature",
        );
        assessment.rising(
            reading(telemetry, "latency"),
            LATENCY,
            LATENCY_PENALTY,
            "CRITICAL: Processing latency excessive",
            "WARNING: Processing latency elevated",
        );
        assessment
    }

    fn nominal_status(&self, telemetry: &TelemetryStore) -> String {
        format!(
            "Processing - {:.0} MSPS, Lat: {:.1}ms",
            reading(telemetry, "throughput"),
            reading(telemetry, "latency")
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
            "fpgaHealthy",
            "fpga-error",
            "FPGA error",
            FaultSeverity::Fatal,
            !switch(telemetry, "fpgaHealthy", true),
        ));
        checks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subsystems::Condition;

    #[test]
    fn test_fpga_error_is_fatal_fault() {
        let mut store = SignalProcessor.catalogue();
        store.set_value("fpgaHealthy", false.into(), 1);
        assert_eq!(SignalProcessor.assess(&store).condition(), Condition::Critical);
        let fpga = SignalProcessor
            .fault_checks(&store)
            .into_iter()
            .find(|c| c.code == "fpga-error")
            .unwrap();
        assert!(fpga.active);
        assert_eq!(fpga.severity, FaultSeverity::Fatal);
    }

    #[test]
    fn test_fpga_message_precedes_cpu() {
        let mut store = SignalProcessor.catalogue();
        store.set_value("cpuLoad", 99.0.into(), 1);
        store.set_value("fpgaHealthy", false.into(), 1);
        assert_eq!(SignalProcessor.assess(&store).condition_message(), Some("CRITICAL: FPGA error"));
    }
}
