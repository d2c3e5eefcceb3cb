use super::{reading, Assessment, FaultCheck, FaultChecks, Limits, Penalty, UnitKind, UnitPolicy};
use crate::fault::FaultSeverity;
use crate::telemetry::{TelemetryParameter, TelemetryStore};

const NOISE_FIGURE: Limits = Limits::new(4.0, 6.0);
const GAIN: Limits = Limits::new(25.0, 20.0);
const TEMPERATURE: Limits = Limits::new(55.0, 70.0);

const NOISE_FIGURE_PENALTY: Penalty = Penalty::new(15.0, 35.0);
const GAIN_PENALTY: Penalty = Penalty::new(15.0, 35.0);
const TEMPERATURE_PENALTY: Penalty = Penalty::new(15.0, 30.0);

#[derive(Debug, Clone, Copy, Default)]
pub struct Receiver;

impl UnitPolicy for Receiver {
    fn kind(&self) -> UnitKind {
        UnitKind::Receiver
    }

    fn description(&self) -> &'static str {
        "Low-noise receiver chain"
    }

    fn parameters(&self) -> Vec<TelemetryParameter> {
        vec![
            TelemetryParameter::numeric("noiseFigure", "Noise Figure", "dB", 2.5, 0.0, 15.0)
                .warn_high(NOISE_FIGURE.warning)
                .crit_high(NOISE_FIGURE.critical),
            TelemetryParameter::numeric("gain", "Gain", "dB", 30.0, 0.0, 50.0)
                .warn_low(GAIN.warning)
                .crit_low(GAIN.critical),
            TelemetryParameter::numeric("agcLevel", "AGC Level", "dB", 0.0, -30.0, 30.0),
            TelemetryParameter::numeric("temperature", "Temperature", "°C", 35.0, 0.0, 100.0)
                .warn_high(TEMPERATURE.warning)
                .crit_high(TEMPERATURE.critical),
            TelemetryParameter::numeric("signalLevel", "Signal Level", "dBm", -60.0, -120.0, 0.0),
            TelemetryParameter::flag("lnaEnabled", "LNA Enabled", true),
            TelemetryParameter::numeric("dynamicRange", "Dynamic Range", "dB", 80.0, 0.0, 120.0),
            TelemetryParameter::numeric("sensitivity", "Sensitivity", "dBm", -110.0, -130.0, -50.0),
        ]
    }

    fn assess(&self, telemetry: &TelemetryStore) -> Assessment {
        let mut assessment = Assessment::new();
        assessment.rising(
            reading(telemetry, "noiseFigure"),
            NOISE_FIGURE,
            NOISE_FIGURE_PENALTY,
            "CRITICAL: High noise figure",
            "WARNING: Elevated noise figure",
        );
        assessment.falling(
            reading(telemetry, "gain"),
            GAIN,
            GAIN_PENALTY,
            "CRITICAL: Low gain - LNA failure",
            "WARNING: Reduced gain",
        );
        assessment.rising(
            reading(telemetry, "temperature"),
            TEMPERATURE,
            TEMPERATURE_PENALTY,
            "CRITICAL: Receiver overtemperature",
            "WARNING: Elevated temperature",
        );
        assessment
    }

    fn nominal_status(&self, telemetry: &TelemetryStore) -> String {
        format!(
            "Receiving - NF: {:.1} dB, Gain: {:.1} dB",
            reading(telemetry, "noiseFigure"),
            reading(telemetry, "gain")
        )
    }

    fn fault_checks(&self, telemetry: &TelemetryStore) -> FaultChecks {
        let mut checks = FaultChecks::new();
        checks.push(FaultCheck::new(
            "noiseFigure",
            "noise-figure-high",
            "High noise figure",
            FaultSeverity::Critical,
            reading(telemetry, "noiseFigure") >= NOISE_FIGURE.critical,
        ));
        checks.push(FaultCheck::new(
            "gain",
            "gain-low",
            "Low receiver gain",
            FaultSeverity::Critical,
            reading(telemetry, "gain") <= GAIN.critical,
        ));
        checks.push(FaultCheck::new(
            "temperature",
            "overtemp",
            "Receiver overtemperature",
            FaultSeverity::Critical,
            reading(telemetry, "temperature") >= TEMPERATURE.critical,
        ));
        checks
    }
}
