use radar_health::*;

const START: u64 = 1_700_000_000_000;

fn analyzer() -> TrendAnalyzer {
    TrendAnalyzer::new(&MonitorConfig::default())
}

fn feed(trends: &mut TrendAnalyzer, parameter: &str, values: impl IntoIterator<Item = f64>) {
    for (i, value) in values.into_iter().enumerate() {
        trends.add_data_point("RX-001", parameter, value, START + i as u64 * 1000);
    }
}

#[test]
fn test_anomaly_against_known_distribution() {
    let mut trends = analyzer();
    // Mean 50, population std dev 2
    feed(&mut trends, "gain", (0..20).map(|i| if i % 2 == 0 { 48.0 } else { 52.0 }));

    assert!(trends.is_anomaly("RX-001", "gain", 65.0));
    assert!(!trends.is_anomaly("RX-001", "gain", 51.0));
    assert!(!trends.is_anomaly("RX-001", "unknown", 65.0));
    assert!(trends.drain_events().is_empty());
}

#[test]
fn test_decreasing_series() {
    let mut trends = analyzer();
    feed(&mut trends, "gain", (0..20).map(|i| 40.0 - 0.5 * f64::from(i)));

    let trend = trends.analyze_trend("RX-001", "gain").unwrap();
    assert_eq!(trend.direction, TrendDirection::Decreasing);
    assert!((trend.slope + 0.5).abs() < 1e-9);
    assert!((trend.r_squared - 1.0).abs() < 1e-9);
    assert!((trend.current_value - 30.5).abs() < 1e-9);
    assert_eq!(trend.sample_count, 20);

    // Ten seconds ahead along the line
    assert!((trends.predict_value("RX-001", "gain", 10.0) - 25.5).abs() < 1e-6);
}

#[test]
fn test_window_limits_regression() {
    let mut trends = analyzer();
    trends.set_window_size(10);
    // Flat for a long time, then a steady climb over the last ten samples
    feed(
        &mut trends,
        "noiseFigure",
        (0..50).map(|i| if i < 40 { 3.0 } else { 3.0 + 0.01 * f64::from(i - 39) }),
    );

    let trend = trends.analyze_trend("RX-001", "noiseFigure").unwrap();
    assert_eq!(trend.sample_count, 10);
    assert_eq!(trend.direction, TrendDirection::Stable);
    assert!(trend.slope > 0.0);

    trends.set_trend_threshold(0.005);
    let trend = trends.analyze_trend("RX-001", "noiseFigure").unwrap();
    assert_eq!(trend.direction, TrendDirection::Increasing);
}

#[test]
fn test_detect_anomalies_checks_newest_sample() {
    let mut trends = analyzer();
    feed(&mut trends, "temperature", (0..15).map(|i| if i % 2 == 0 { 34.0 } else { 36.0 }));
    feed(&mut trends, "gain", (0..15).map(|i| if i % 2 == 0 { 29.0 } else { 31.0 }));
    assert!(trends.detect_anomalies("RX-001").is_empty());

    trends.add_data_point("RX-001", "temperature", 90.0, START + 20_000);
    let anomalies = trends.detect_anomalies("RX-001");
    assert_eq!(anomalies.len(), 1);
    assert_eq!(anomalies[0].parameter, "temperature");
    assert!(anomalies[0].z_score > 3.0);

    let events = trends.drain_events();
    assert!(events.iter().any(|e| matches!(
        e,
        MonitorEvent::AnomalyDetected { parameter, value, .. } if parameter == "temperature" && (*value - 90.0).abs() < 1e-9
    )));
}

#[test]
fn test_trend_line_spans_data() {
    let mut trends = analyzer();
    feed(&mut trends, "gain", (0..11).map(|i| 20.0 + f64::from(i)));

    let line = trends.trend_line("RX-001", "gain", 3);
    assert_eq!(line.len(), 3);
    assert_eq!(line[0].timestamp, START);
    assert_eq!(line[2].timestamp, START + 10_000);
    assert!((line[1].value - 25.0).abs() < 1e-6);

    assert!(trends.trend_line("RX-001", "gain", 1).is_empty());
    assert!(trends.trend_line("RX-001", "missing", 5).is_empty());
}

#[test]
fn test_data_points_and_parameters() {
    let mut trends = analyzer();
    feed(&mut trends, "gain", (0..8).map(f64::from));
    feed(&mut trends, "temperature", (0..4).map(f64::from));

    let tail = trends.data_points("RX-001", "gain", 3);
    let values: Vec<f64> = tail.iter().map(|p| p.value).collect();
    assert_eq!(values, vec![5.0, 6.0, 7.0]);

    assert_eq!(trends.parameters("RX-001"), vec!["gain".to_string(), "temperature".to_string()]);
    assert_eq!(trends.analyze_trends("RX-001").len(), 2);

    trends.clear_data("RX-001");
    assert!(trends.parameters("RX-001").is_empty());
    assert!(trends.analyze_trend("RX-001", "gain").is_none());
}

#[test]
fn test_non_finite_points_ignored() {
    let mut trends = analyzer();
    trends.add_data_point("RX-001", "gain", f64::NAN, START);
    trends.add_data_point("RX-001", "gain", f64::INFINITY, START + 1);
    assert_eq!(trends.point_count("RX-001", "gain"), 0);
}

#[test]
fn test_crossing_in_past_is_none() {
    let mut trends = analyzer();
    feed(&mut trends, "gain", (0..10).map(|i| 30.0 + f64::from(i)));
    // Line passed 31 early in the series
    assert_eq!(trends.predict_threshold_crossing("RX-001", "gain", 31.0), None);
    assert_eq!(
        trends.predict_threshold_crossing("RX-001", "gain", 49.0),
        Some(START + 19_000)
    );
}

#[test]
fn test_linear_ramp_over_default_window_is_increasing() {
    let mut trends = analyzer();
    // value = 10 + 0.5 * seconds elapsed, filling the default window
    feed(&mut trends, "temperature", (0..100).map(|s| 10.0 + 0.5 * f64::from(s)));

    let trend = trends.analyze_trend("RX-001", "temperature").unwrap();
    assert_eq!(trend.sample_count, 100);
    assert_eq!(trend.direction, TrendDirection::Increasing);
    assert!((trend.slope - 0.5).abs() < 1e-9);
    assert!((trend.r_squared - 1.0).abs() < 1e-9);
}

#[test]
fn test_scatter_around_ramp_is_volatile() {
    let mut trends = analyzer();
    feed(
        &mut trends,
        "temperature",
        (0..40).map(|i| 20.0 + 0.5 * f64::from(i) + if i % 2 == 0 { 10.0 } else { -10.0 }),
    );
    let trend = trends.analyze_trend("RX-001", "temperature").unwrap();
    assert_eq!(trend.direction, TrendDirection::Volatile);
}
