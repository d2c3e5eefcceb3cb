//! Unit catalogue and per-unit health policies.
//!
//! Every radar unit type implements [`UnitPolicy`]: it declares its
//! telemetry catalogue, turns the current telemetry into an [`Assessment`]
//! (condition, score penalty, status text) and lists the fault checks its
//! readings drive. The health engine combines the assessment with the
//! unit's active faults.

pub mod antenna;
pub mod cooling;
pub mod data_processor;
pub mod network;
pub mod power;
pub mod receiver;
pub mod rf_frontend;
pub mod signal_processor;
pub mod timing;
pub mod transmitter;

pub use antenna::AntennaServo;
pub use cooling::Cooling;
pub use data_processor::DataProcessor;
pub use network::NetworkInterface;
pub use power::PowerSupply;
pub use receiver::Receiver;
pub use rf_frontend::RfFrontEnd;
pub use signal_processor::SignalProcessor;
pub use timing::TimingSync;
pub use transmitter::Transmitter;

use crate::fault::FaultSeverity;
use crate::telemetry::{TelemetryParameter, TelemetryStore};
use arrayvec::ArrayVec;
use serde::{Deserialize, Serialize};

pub const MAX_UNITS: usize = 16;
pub const MAX_FAULT_CHECKS: usize = 8;

pub type FaultChecks = ArrayVec<FaultCheck, MAX_FAULT_CHECKS>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum UnitKind {
    Transmitter,
    Receiver,
    AntennaServo,
    RfFrontEnd,
    SignalProcessor,
    DataProcessor,
    PowerSupply,
    Cooling,
    TimingSync,
    NetworkInterface,
}

impl UnitKind {
    pub const ALL: [UnitKind; 10] = [
        UnitKind::Transmitter,
        UnitKind::Receiver,
        UnitKind::AntennaServo,
        UnitKind::RfFrontEnd,
        UnitKind::SignalProcessor,
        UnitKind::DataProcessor,
        UnitKind::PowerSupply,
        UnitKind::Cooling,
        UnitKind::TimingSync,
        UnitKind::NetworkInterface,
    ];

    pub fn default_id(self) -> &'static str {
        match self {
            UnitKind::Transmitter => "TX-001",
            UnitKind::Receiver => "RX-001",
            UnitKind::AntennaServo => "ANT-001",
            UnitKind::RfFrontEnd => "RF-001",
            UnitKind::SignalProcessor => "SP-001",
            UnitKind::DataProcessor => "DP-001",
            UnitKind::PowerSupply => "PSU-001",
            UnitKind::Cooling => "COOL-001",
            UnitKind::TimingSync => "TIME-001",
            UnitKind::NetworkInterface => "NET-001",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            UnitKind::Transmitter => "Transmitter",
            UnitKind::Receiver => "Receiver",
            UnitKind::AntennaServo => "Antenna Servo",
            UnitKind::RfFrontEnd => "RF Front-End",
            UnitKind::SignalProcessor => "Signal Processor",
            UnitKind::DataProcessor => "Data Processor",
            UnitKind::PowerSupply => "Power Supply",
            UnitKind::Cooling => "Cooling System",
            UnitKind::TimingSync => "Timing System",
            UnitKind::NetworkInterface => "Network Interface",
        }
    }

    pub fn disabled_message(self) -> &'static str {
        match self {
            UnitKind::Transmitter => "Transmitter disabled",
            UnitKind::Receiver => "Receiver disabled",
            UnitKind::AntennaServo => "Antenna servo disabled",
            UnitKind::RfFrontEnd => "RF Front-End disabled",
            UnitKind::SignalProcessor => "Signal Processor disabled",
            UnitKind::DataProcessor => "Data Processor disabled",
            UnitKind::PowerSupply => "Power Supply disabled",
            UnitKind::Cooling => "Cooling System disabled",
            UnitKind::TimingSync => "Timing System disabled",
            UnitKind::NetworkInterface => "Network Interface disabled",
        }
    }

    pub fn policy(self) -> &'static dyn UnitPolicy {
        match self {
            UnitKind::Transmitter => &Transmitter,
            UnitKind::Receiver => &Receiver,
            UnitKind::AntennaServo => &AntennaServo,
            UnitKind::RfFrontEnd => &RfFrontEnd,
            UnitKind::SignalProcessor => &SignalProcessor,
            UnitKind::DataProcessor => &DataProcessor,
            UnitKind::PowerSupply => &PowerSupply,
            UnitKind::Cooling => &Cooling,
            UnitKind::TimingSync => &TimingSync,
            UnitKind::NetworkInterface => &NetworkInterface,
        }
    }

    /// Resolves a kind from a unit id prefix such as `PSU-002`.
    pub fn from_unit_id(unit_id: &str) -> Option<Self> {
        let prefix = unit_id.split('-').next()?;
        Self::ALL
            .into_iter()
            .find(|kind| kind.default_id().split('-').next() == Some(prefix))
    }
}

/// Severity of the worst condition a unit's readings describe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Condition {
    Nominal,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Limits {
    pub warning: f64,
    pub critical: f64,
}

impl Limits {
    pub const fn new(warning: f64, critical: f64) -> Self {
        Self { warning, critical }
    }
}

/// Score deduction: scales up to `linear` across the warning band and
/// jumps to `ceiling` once the critical limit is reached.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Penalty {
    pub linear: f64,
    pub ceiling: f64,
}

impl Penalty {
    pub const NONE: Penalty = Penalty::new(0.0, 0.0);

    pub const fn new(linear: f64, ceiling: f64) -> Self {
        Self { linear, ceiling }
    }
}

/// Accumulates one unit's threshold evaluation.
///
/// Status text follows the first critical message recorded, then the first
/// warning message, then the caller's nominal text. An explicit status set
/// with [`Assessment::set_status`] wins over all of them.
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    condition: Condition,
    penalty: f64,
    critical_message: Option<String>,
    warning_message: Option<String>,
    status_override: Option<String>,
}

impl Assessment {
    pub fn new() -> Self {
        Self {
            condition: Condition::Nominal,
            penalty: 0.0,
            critical_message: None,
            warning_message: None,
            status_override: None,
        }
    }

    /// Reading that is unhealthy when high (`>=` comparisons).
    pub fn rising(&mut self, value: f64, limits: Limits, penalty: Penalty, critical: &str, warning: &str) -> Condition {
        if value >= limits.critical {
            self.raise_critical(penalty.ceiling, critical);
            Condition::Critical
        } else if value >= limits.warning {
            let ratio = band_ratio(value - limits.warning, limits.critical - limits.warning);
            self.raise_warning(penalty.linear * ratio, warning);
            Condition::Warning
        } else {
            Condition::Nominal
        }
    }

    /// Reading that is unhealthy when low (`<=` comparisons).
    pub fn falling(&mut self, value: f64, limits: Limits, penalty: Penalty, critical: &str, warning: &str) -> Condition {
        if value <= limits.critical {
            self.raise_critical(penalty.ceiling, critical);
            Condition::Critical
        } else if value <= limits.warning {
            let ratio = band_ratio(limits.warning - value, limits.warning - limits.critical);
            self.raise_warning(penalty.linear * ratio, warning);
            Condition::Warning
        } else {
            Condition::Nominal
        }
    }

    pub fn critical_if(&mut self, failed: bool, penalty: f64, message: &str) {
        if failed {
            self.raise_critical(penalty, message);
        }
    }

    /// Unit-specific soft condition (limit reached, backup power, ...).
    pub fn degraded_if(&mut self, degraded: bool, penalty: f64, message: &str) {
        if degraded {
            self.raise_warning(penalty, message);
        }
    }

    pub fn set_status(&mut self, message: impl Into<String>) {
        self.status_override = Some(message.into());
    }

    fn raise_critical(&mut self, penalty: f64, message: &str) {
        self.condition = Condition::Critical;
        self.penalty += penalty;
        if self.critical_message.is_none() && !message.is_empty() {
            self.critical_message = Some(message.to_string());
        }
    }

    fn raise_warning(&mut self, penalty: f64, message: &str) {
        self.condition = self.condition.max(Condition::Warning);
        self.penalty += penalty;
        if self.warning_message.is_none() && !message.is_empty() {
            self.warning_message = Some(message.to_string());
        }
    }

    pub fn condition(&self) -> Condition {
        self.condition
    }

    pub fn penalty(&self) -> f64 {
        self.penalty
    }

    /// Message describing a threshold condition, if any was recorded.
    pub fn condition_message(&self) -> Option<&str> {
        self.status_override
            .as_deref()
            .or(self.critical_message.as_deref())
            .or(self.warning_message.as_deref())
    }
}

impl Default for Assessment {
    fn default() -> Self {
        Self::new()
    }
}

fn band_ratio(offset: f64, width: f64) -> f64 {
    if width.abs() < f64::EPSILON {
        return 1.0;
    }
    (offset / width).clamp(0.0, 1.0)
}

/// One fault a unit raises or clears based on a single trigger parameter.
/// Checks only run when the trigger was part of the latest update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultCheck {
    pub trigger: &'static str,
    pub code: &'static str,
    pub description: &'static str,
    pub severity: FaultSeverity,
    pub active: bool,
}

impl FaultCheck {
    pub const fn new(
        trigger: &'static str,
        code: &'static str,
        description: &'static str,
        severity: FaultSeverity,
        active: bool,
    ) -> Self {
        Self {
            trigger,
            code,
            description,
            severity,
            active,
        }
    }
}

pub trait UnitPolicy: Sync {
    fn kind(&self) -> UnitKind;
    fn description(&self) -> &'static str;
    /// Initial telemetry catalogue, values at nominal.
    fn parameters(&self) -> Vec<TelemetryParameter>;
    fn assess(&self, telemetry: &TelemetryStore) -> Assessment;
    /// Status text when no condition or fault applies.
    fn nominal_status(&self, telemetry: &TelemetryStore) -> String;
    fn fault_checks(&self, telemetry: &TelemetryStore) -> FaultChecks;

    fn catalogue(&self) -> TelemetryStore {
        TelemetryStore::from_parameters(self.parameters())
    }
}

/// Reads a numeric parameter, falling back to the catalogue nominal.
pub(crate) fn reading(telemetry: &TelemetryStore, name: &str) -> f64 {
    telemetry
        .number(name)
        .or_else(|| telemetry.parameter(name).and_then(|p| p.nominal))
        .unwrap_or(0.0)
}

pub(crate) fn switch(telemetry: &TelemetryStore, name: &str, default: bool) -> bool {
    telemetry.flag(name).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rising_penalty_is_linear_in_warning_band() {
        let mut assessment = Assessment::new();
        let condition = assessment.rising(70.0, Limits::new(60.0, 80.0), Penalty::new(20.0, 40.0), "crit", "warn");
        assert_eq!(condition, Condition::Warning);
        assert!((assessment.penalty() - 10.0).abs() < 1e-9);
        assert_eq!(assessment.condition_message(), Some("warn"));
    }

    #[test]
    fn test_falling_hits_ceiling_at_critical() {
        let mut assessment = Assessment::new();
        assessment.falling(180.0, Limits::new(200.0, 180.0), Penalty::new(15.0, 35.0), "crit", "warn");
        assert_eq!(assessment.condition(), Condition::Critical);
        assert!((assessment.penalty() - 35.0).abs() < 1e-9);
    }

    #[test]
    fn test_critical_message_wins_over_warning() {
        let mut assessment = Assessment::new();
        assessment.degraded_if(true, 10.0, "soft");
        assessment.critical_if(true, 30.0, "hard");
        assert_eq!(assessment.condition(), Condition::Critical);
        assert_eq!(assessment.condition_message(), Some("hard"));
        assessment.set_status("override");
        assert_eq!(assessment.condition_message(), Some("override"));
    }

    #[test]
    fn test_unit_kind_lookup() {
        assert_eq!(UnitKind::from_unit_id("PSU-001"), Some(UnitKind::PowerSupply));
        assert_eq!(UnitKind::from_unit_id("TIME-007"), Some(UnitKind::TimingSync));
        assert_eq!(UnitKind::from_unit_id("XYZ-001"), None);
        for kind in UnitKind::ALL {
            assert_eq!(kind.policy().kind(), kind);
            assert!(!kind.policy().parameters().is_empty());
        }
    }

    #[test]
    fn test_nominal_catalogues_assess_clean() {
        for kind in UnitKind::ALL {
            let policy = kind.policy();
            let store = policy.catalogue();
            let assessment = policy.assess(&store);
            assert_eq!(assessment.condition(), Condition::Nominal, "{kind:?} not nominal at catalogue values");
            assert!(policy.fault_checks(&store).iter().all(|c| !c.active), "{kind:?} raises faults at nominal");
        }
    }
}
