use radar_health::telemetry::TelemetryFrame;
use radar_health::*;

fn frame(pairs: &[(&str, TelemetryValue)]) -> TelemetryFrame {
    pairs.iter().map(|(k, v)| ((*k).to_string(), v.clone())).collect()
}

fn engine() -> (HealthEngine, FaultRegistry) {
    let mut engine = HealthEngine::new(&MonitorConfig::default());
    engine.register_defaults().unwrap();
    (engine, FaultRegistry::new())
}

#[test]
fn test_every_unit_fails_on_its_critical_reading() {
    let cases: Vec<(&str, &str, TelemetryValue, &str)> = vec![
        ("TX-001", "vswr", 2.5.into(), "vswr-high"),
        ("RX-001", "noiseFigure", 7.0.into(), "noise-figure-high"),
        ("ANT-001", "motorCurrent", 13.0.into(), "motor-overcurrent"),
        ("RF-001", "trSwitchOk", false.into(), "tr-switch-fail"),
        ("SP-001", "fpgaHealthy", false.into(), "fpga-error"),
        ("DP-001", "cpuLoad", 95.0.into(), "cpu-overload"),
        ("PSU-001", "inputVoltage", 170.0.into(), "input-low"),
        ("COOL-001", "coolantFlow", 5.0.into(), "flow-low"),
        ("TIME-001", "gpsLocked", false.into(), "gps-unlock"),
        ("NET-001", "linkUp", false.into(), "link-down"),
    ];

    for (unit_id, parameter, value, code) in cases {
        let (mut engine, mut registry) = engine();
        engine.apply_telemetry(unit_id, &frame(&[(parameter, value)]), 100).unwrap();
        let snapshot = engine.recompute(unit_id, &mut registry, 100).unwrap();

        assert_eq!(snapshot.state, HealthState::Fail, "{unit_id} {parameter}");
        assert!(registry.has_fault(unit_id, code), "{unit_id} missing {code}");
        assert!(snapshot.score < 100.0, "{unit_id} kept a full score");

        // Other units are untouched
        let others_ok = engine
            .snapshots()
            .filter(|s| s.unit_id != unit_id)
            .all(|s| s.state == HealthState::Ok);
        assert!(others_ok, "{unit_id} affected other units");
    }
}

#[test]
fn test_fatal_fault_event_is_critical() {
    let (mut engine, mut registry) = engine();
    engine
        .apply_telemetry("SP-001", &frame(&[("fpgaHealthy", false.into())]), 10)
        .unwrap();
    engine.recompute("SP-001", &mut registry, 10);

    let fault = registry.fault("SP-001", "fpga-error").unwrap();
    assert_eq!(fault.severity, FaultSeverity::Fatal);
    assert_eq!(fault.metadata.get("source").map(String::as_str), Some("threshold"));
    assert!(registry
        .drain_events()
        .iter()
        .any(|e| matches!(e, MonitorEvent::CriticalFault { code, .. } if code == "fpga-error")));
}

#[test]
fn test_unrelated_parameter_does_not_clear_fault() {
    let (mut engine, mut registry) = engine();
    engine
        .apply_telemetry("COOL-001", &frame(&[("coolantFlow", 5.0.into())]), 10)
        .unwrap();
    engine.recompute("COOL-001", &mut registry, 10);
    assert!(registry.has_fault("COOL-001", "flow-low"));

    // Only the triggering parameter is re-checked
    engine
        .apply_telemetry("COOL-001", &frame(&[("coolantTemp", 30.0.into())]), 20)
        .unwrap();
    engine.recompute("COOL-001", &mut registry, 20);
    assert!(registry.has_fault("COOL-001", "flow-low"));

    engine
        .apply_telemetry("COOL-001", &frame(&[("coolantFlow", 20.0.into())]), 30)
        .unwrap();
    let snapshot = engine.recompute("COOL-001", &mut registry, 30).unwrap();
    assert!(!registry.has_fault("COOL-001", "flow-low"));
    assert_eq!(snapshot.state, HealthState::Ok);
}

#[test]
fn test_injected_fault_is_not_cleared_by_telemetry() {
    let (mut engine, mut registry) = engine();
    registry.register(
        FaultRecord::new("TX-001", "overtemp", "Injected fault: overtemp", FaultSeverity::Critical, 0)
            .with_metadata("source", "injected"),
    );
    engine
        .apply_telemetry("TX-001", &frame(&[("temperature", 40.0.into())]), 10)
        .unwrap();
    let snapshot = engine.recompute("TX-001", &mut registry, 10).unwrap();

    assert!(registry.has_fault("TX-001", "overtemp"));
    assert_eq!(snapshot.state, HealthState::Fail);
}

#[test]
fn test_state_transition_events_carry_old_and_new() {
    let (mut engine, mut registry) = engine();
    engine
        .apply_telemetry("TIME-001", &frame(&[("gpsLocked", false.into())]), 500)
        .unwrap();
    engine.recompute("TIME-001", &mut registry, 500);

    let transitions: Vec<MonitorEvent> = engine
        .drain_events()
        .into_iter()
        .filter(|e| matches!(e, MonitorEvent::StateTransition { .. }))
        .collect();
    assert_eq!(
        transitions,
        vec![MonitorEvent::StateTransition {
            unit_id: "TIME-001".to_string(),
            old: HealthState::Ok,
            new: HealthState::Fail,
            timestamp: 500,
        }]
    );
}

#[test]
fn test_unknown_unit_errors() {
    let (mut engine, mut registry) = engine();
    assert!(matches!(
        engine.apply_telemetry("XX-001", &TelemetryFrame::new(), 0),
        Err(MonitorError::UnknownUnit(_))
    ));
    assert!(engine.recompute("XX-001", &mut registry, 0).is_none());
    assert!(engine.set_enabled("XX-001", false, 0).is_err());
}

#[test]
fn test_score_never_leaves_bounds() {
    let (mut engine, mut registry) = engine();
    engine
        .apply_telemetry(
            "NET-001",
            &frame(&[
                ("linkUp", false.into()),
                ("packetLoss", 40.0.into()),
                ("latency", 800.0.into()),
                ("connectionStatus", "DISCONNECTED".into()),
            ]),
            10,
        )
        .unwrap();
    let snapshot = engine.recompute("NET-001", &mut registry, 10).unwrap();
    assert!((0.0..=100.0).contains(&snapshot.score));
    assert!(snapshot.score.abs() < f64::EPSILON);
    assert_eq!(registry.fault_count("NET-001"), 4);
}
