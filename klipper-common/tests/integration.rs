//! Integration tests for klipper-common library.

use klipper_common::{LogFormat, LoggingConfig, MetricKind, Sample, init_tracing};

#[test]
fn test_sample_builders() {
    let gauge = Sample::gauge("klipper_system_uptime", "Klipper system uptime.", 3600.0);
    assert_eq!(gauge.kind, MetricKind::Gauge);
    assert!(gauge.labels.is_empty());

    let counter = Sample::counter(
        "klipper_network_rx_bytes",
        "Klipper network received bytes.",
        1024.0,
    )
    .with_label("interface", "wlan0");
    assert_eq!(counter.kind, MetricKind::Counter);
    assert_eq!(counter.label("interface"), Some("wlan0"));
}

#[test]
fn test_sample_serializes_for_debugging() {
    let sample = Sample::gauge("klipper_fan_speed", "Klipper fan speed.", 0.5)
        .with_label("fan", "hotend");

    let json = serde_json::to_value(&sample).unwrap();

    assert_eq!(json["name"], "klipper_fan_speed");
    assert_eq!(json["kind"], "gauge");
    assert_eq!(json["labels"][0][0], "fan");
    assert_eq!(json["labels"][0][1], "hotend");
    assert_eq!(json["value"], 0.5);
}

#[test]
fn test_init_tracing_twice_fails() {
    let config = LoggingConfig {
        level: "warn".to_string(),
        format: LogFormat::Text,
    };

    // The first call may race with other tests in this binary, but a second
    // install into the same process must always be rejected.
    let _ = init_tracing(&config);
    assert!(init_tracing(&config).is_err());
}
