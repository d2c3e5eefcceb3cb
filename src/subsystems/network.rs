use super::{reading, switch, Assessment, FaultCheck, FaultChecks, Limits, Penalty, UnitKind, UnitPolicy};
use crate::fault::FaultSeverity;
use crate::telemetry::{TelemetryParameter, TelemetryStore};

const UTILIZATION: Limits = Limits::new(80.0, 95.0);
const PACKET_LOSS: Limits = Limits::new(0.1, 1.0);
const LATENCY_MS: Limits = Limits::new(50.0, 200.0);

const LOSS_PENALTY: Penalty = Penalty::new(15.0, 35.0);
const LATENCY_PENALTY: Penalty = Penalty::new(15.0, 30.0);
const UTILIZATION_PENALTY: Penalty = Penalty::new(12.0, 25.0);
/// A down link zeroes the score outright.
const LINK_DOWN_PENALTY: f64 = 100.0;

/// Data link to the command and control network.
#[derive(Debug, Clone, Copy, Default)]
pub struct NetworkInterface;

impl UnitPolicy for NetworkInterface {
    fn kind(&self) -> UnitKind {
        UnitKind::NetworkInterface
    }

    fn description(&self) -> &'static str {
        "C2 network interface"
    }

    fn parameters(&self) -> Vec<TelemetryParameter> {
        vec![
            TelemetryParameter::flag("linkUp", "Link Up", true),
            TelemetryParameter::numeric("bandwidth", "Bandwidth", "Mbps", 1000.0, 0.0, 10_000.0),
            TelemetryParameter::numeric("utilization", "Utilization", "%", 30.0, 0.0, 100.0)
                .warn_high(UTILIZATION.warning)
                .crit_high(UTILIZATION.critical),
            TelemetryParameter::numeric("packetLoss", "Packet Loss", "%", 0.0, 0.0, 100.0)
                .warn_high(PACKET_LOSS.warning)
                .crit_high(PACKET_LOSS.critical),
            TelemetryParameter::numeric("latency", "Latency", "ms", 5.0, 0.0, 1000.0)
                .warn_high(LATENCY_MS.warning)
                .crit_high(LATENCY_MS.critical),
            TelemetryParameter::numeric("errorCount", "Error Count", "", 0.0, 0.0, 100_000.0),
            TelemetryParameter::text("connectionStatus", "Connection Status", "CONNECTED"),
            TelemetryParameter::numeric("txRate", "TX Rate", "Mbps", 100.0, 0.0, 10_000.0),
            TelemetryParameter::numeric("rxRate", "RX Rate", "Mbps", 150.0, 0.0, 10_000.0),
            TelemetryParameter::numeric("activeConnections", "Active Connections", "", 5.0, 0.0, 100.0),
        ]
    }

    fn assess(&self, telemetry: &TelemetryStore) -> Assessment {
        let mut assessment = Assessment::new();
        if !switch(telemetry, "linkUp", true) {
            assessment.critical_if(true, LINK_DOWN_PENALTY, "CRITICAL: Link down");
            return assessment;
        }

        let loss = reading(telemetry, "packetLoss");
        let latency = reading(telemetry, "latency");
        assessment.rising(
            loss,
            PACKET_LOSS,
            LOSS_PENALTY,
            &format!("CRITICAL: High packet loss ({loss:.2}%)"),
            &format!("WARNING: Packet loss ({loss:.2}%)"),
        );
        assessment.rising(
            latency,
            LATENCY_MS,
            LATENCY_PENALTY,
            &format!("CRITICAL: High latency ({latency:.0} ms)"),
            &format!("WARNING: Elevated latency ({latency:.0} ms)"),
        );
        assessment.rising(
            reading(telemetry, "utilization"),
            UTILIZATION,
            UTILIZATION_PENALTY,
            "CRITICAL: Link saturated",
            "WARNING: High link utilization",
        );
        assessment.degraded_if(
            telemetry.text("connectionStatus") == Some("DEGRADED"),
            0.0,
            "WARNING: Connection degraded",
        );
        assessment
    }

    fn nominal_status(&self, telemetry: &TelemetryStore) -> String {
        format!(
            "Connected - {:.0} Mbps, Latency: {:.1} ms",
            reading(telemetry, "bandwidth"),
            reading(telemetry, "latency")
        )
    }

    fn fault_checks(&self, telemetry: &TelemetryStore) -> FaultChecks {
        let mut checks = FaultChecks::new();
        checks.push(FaultCheck::new(
            "linkUp",
            "link-down",
            "Network link down",
            FaultSeverity::Critical,
            !switch(telemetry, "linkUp", true),
        ));
        checks.push(FaultCheck::new(
            "packetLoss",
            "packet-loss",
            "High packet loss",
            FaultSeverity::Critical,
            reading(telemetry, "packetLoss") >= PACKET_LOSS.critical,
        ));
        checks.push(FaultCheck::new(
            "latency",
            "high-latency",
            "High network latency",
            FaultSeverity::Warning,
            reading(telemetry, "latency") >= LATENCY_MS.critical,
        ));
        checks.push(FaultCheck::new(
            "connectionStatus",
            "c2-disconnect",
            "C2 system disconnected",
            FaultSeverity::Critical,
            telemetry.text("connectionStatus") == Some("DISCONNECTED"),
        ));
        checks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subsystems::Condition;

    #[test]
    fn test_link_down_zeroes_score() {
        let mut store = NetworkInterface.catalogue();
        store.set_value("linkUp", false.into(), 1);
        let assessment = NetworkInterface.assess(&store);
        assert_eq!(assessment.condition(), Condition::Critical);
        assert!(assessment.penalty() >= 100.0);
        assert_eq!(assessment.condition_message(), Some("CRITICAL: Link down"));
    }

    #[test]
    fn test_packet_loss_message_precision() {
        let mut store = NetworkInterface.catalogue();
        store.set_value("packetLoss", 0.5.into(), 1);
        assert_eq!(
            NetworkInterface.assess(&store).condition_message(),
            Some("WARNING: Packet loss (0.50%)")
        );
    }

    #[test]
    fn test_disconnected_status_raises_c2_fault() {
        let mut store = NetworkInterface.catalogue();
        store.set_value("connectionStatus", "DISCONNECTED".into(), 1);
        assert!(NetworkInterface
            .fault_checks(&store)
            .iter()
            .any(|c| c.code == "c2-disconnect" && c.active));
    }
}
