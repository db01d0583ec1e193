//! Integration tests for the SPC engine.

use chrono::{TimeZone, Utc};
use spc_engine::capability::SpecLimits;
use spc_engine::threshold::ThresholdConfig;
use spc_engine::types::{AlertFilter, ControlState, ReadingStatus, SpecCompliance};
use spc_engine::{Engine, InboundReading};

fn now() -> chrono::DateTime<Utc> {
  Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap()
}

fn fixture_reading() -> InboundReading {
  let json = r#"{
    "parameter_id": "oven-temp",
    "station_id": "station-a",
    "sensor_id": "probe-1",
    "value": 182.5,
    "timestamp": "2025-03-10T10:30:00Z",
    "unit": "°C",
    "upper_spec_limit": 195.0,
    "lower_spec_limit": 165.0
  }"#;
  serde_json::from_str(json).unwrap()
}

fn reading(value: f64, minute: u32) -> InboundReading {
  InboundReading {
    parameter_id: "oven-temp".into(),
    station_id: "station-a".into(),
    sensor_id: "probe-1".into(),
    value,
    timestamp: format!("2025-03-10T10:{:02}:00Z", minute),
    unit: None,
    upper_control_limit: None,
    lower_control_limit: None,
    upper_spec_limit: None,
    lower_spec_limit: None,
  }
}

fn alarm_thresholds() -> ThresholdConfig {
  ThresholdConfig {
    parameter_id: "oven-temp".into(),
    upper_alarm: Some(200.0),
    upper_warning: Some(190.0),
    lower_warning: Some(160.0),
    lower_alarm: Some(150.0),
    scaling_factor: 1.0,
    offset: 0.0,
  }
}

#[test]
fn single_reading_produces_full_outcome() {
  let mut engine = Engine::with_defaults();
  let outcome = engine.process_at(&fixture_reading(), now()).unwrap();

  assert_eq!(outcome.parameter_id, "oven-temp");
  assert_eq!(outcome.status, ReadingStatus::Valid);
  assert_eq!(outcome.control_state, ControlState::Normal);
  assert_eq!(outcome.spec_compliance, SpecCompliance::Pass);
  assert_eq!(outcome.within_spec, Some(true));
  assert_eq!(outcome.sample_size, 1);
  assert!((outcome.x_bar - 182.5).abs() < f64::EPSILON);
  assert!(outcome.range.is_none());
  assert!(outcome.moving_range.is_none());
  assert!(outcome.alert_id.is_none());
}

#[test]
fn unknown_fields_are_ignored() {
  let json = r#"{
    "parameter_id": "oven-temp",
    "station_id": "station-a",
    "sensor_id": "probe-1",
    "value": 180.0,
    "timestamp": "2025-03-10T10:30:00Z",
    "some_unknown_field": "should be ignored",
    "another": 42
  }"#;
  let raw: InboundReading = serde_json::from_str(json).unwrap();
  let mut engine = Engine::with_defaults();
  assert!(engine.process_at(&raw, now()).is_ok());
}

#[test]
fn window_is_bounded_at_thirty() {
  let mut engine = Engine::with_defaults();
  for i in 0..120u32 {
    let mut r = reading(100.0 + i as f64, 0);
    r.timestamp = format!("2025-03-10T10:{:02}:{:02}Z", i / 60, i % 60);
    engine.process_at(&r, now()).unwrap();
  }
  let baseline = engine.baseline("oven-temp").unwrap();
  assert_eq!(baseline.sample_size, 30);
  // Mean over the surviving window (values 190..=219).
  assert!((baseline.x_bar - 204.5).abs() < 1e-9);
}

#[test]
fn moving_range_tracks_only_last_difference() {
  let mut engine = Engine::with_defaults();
  engine.process_at(&reading(10.0, 0), now()).unwrap();
  let outcome = engine.process_at(&reading(12.0, 1), now()).unwrap();
  assert_eq!(outcome.moving_range, Some(2.0));

  let outcome = engine.process_at(&reading(9.0, 2), now()).unwrap();
  assert_eq!(outcome.moving_range, Some(3.0));
}

#[test]
fn subgroup_range_covers_last_five_values() {
  let mut engine = Engine::with_defaults();
  let values = [1.0, 5.0, 3.0, 9.0, 2.0, 7.0];
  let mut last = None;
  for (i, v) in values.into_iter().enumerate() {
    last = Some(engine.process_at(&reading(v, i as u32), now()).unwrap());
  }
  // Last five are [5, 3, 9, 2, 7] -> 9 - 2 = 7.
  assert_eq!(last.unwrap().range, Some(7.0));
}

#[test]
fn capability_becomes_available_at_ten_samples() {
  let mut engine = Engine::with_defaults();
  engine.set_spec_limits("oven-temp", SpecLimits::from_bounds(200.0, 100.0).unwrap());

  for i in 0..9u32 {
    engine
      .process_at(&reading(150.0 + (i % 3) as f64, i), now())
      .unwrap();
  }
  let snapshot = engine.capability_at("oven-temp", now()).unwrap();
  assert_eq!(snapshot.sample_size, 9);
  assert!(snapshot.cp.is_none() && snapshot.cpk.is_none());

  engine.process_at(&reading(151.0, 9), now()).unwrap();
  let snapshot = engine.capability_at("oven-temp", now()).unwrap();
  assert_eq!(snapshot.sample_size, 10);
  assert!(snapshot.cp.is_some() && snapshot.cpk.is_some());
  assert!(snapshot.pp.is_some() && snapshot.ppk.is_some());
}

#[test]
fn alarm_breaches_deduplicate_to_one_open_alert() {
  let mut engine = Engine::with_defaults();
  engine.set_threshold(alarm_thresholds()).unwrap();

  let first = engine.process_at(&reading(205.0, 0), now()).unwrap();
  let second = engine.process_at(&reading(210.0, 1), now()).unwrap();
  assert_eq!(first.control_state, ControlState::Alarm);
  assert_eq!(first.alert_id, second.alert_id);

  let active = engine.active_alerts(&AlertFilter::default());
  assert_eq!(active.len(), 1);
  assert!(active[0].message.contains("210"), "message reflects the second breach");
  assert_eq!(
    active[0].opened_at,
    Utc.with_ymd_and_hms(2025, 3, 10, 10, 0, 0).unwrap()
  );
  assert_eq!(
    active[0].last_updated,
    Utc.with_ymd_and_hms(2025, 3, 10, 10, 1, 0).unwrap()
  );
}

#[test]
fn resolved_alert_is_not_reused_on_rebreach() {
  let mut engine = Engine::with_defaults();
  engine.set_threshold(alarm_thresholds()).unwrap();

  let first = engine.process_at(&reading(205.0, 0), now()).unwrap();
  let first_id = first.alert_id.unwrap();
  engine
    .resolve_alert(&first_id, "inspector", Some("sensor swapped".into()))
    .unwrap();

  let third = engine.process_at(&reading(206.0, 2), now()).unwrap();
  let new_id = third.alert_id.unwrap();
  assert_ne!(first_id, new_id);

  let active = engine.active_alerts(&AlertFilter::default());
  assert_eq!(active.len(), 1);
  assert_eq!(active[0].id, new_id);
}

#[test]
fn inverted_spec_limits_reject_without_baseline_mutation() {
  let mut engine = Engine::with_defaults();
  engine.process_at(&reading(150.0, 0), now()).unwrap();

  let mut bad = reading(151.0, 1);
  bad.lower_spec_limit = Some(200.0);
  bad.upper_spec_limit = Some(100.0);
  let err = engine.process_at(&bad, now()).unwrap_err();
  assert!(err.to_string().contains("spec_limit"));

  let baseline = engine.baseline("oven-temp").unwrap();
  assert_eq!(baseline.sample_size, 1);
  assert!((baseline.x_bar - 150.0).abs() < f64::EPSILON);
}

#[test]
fn threshold_config_ordering_violations_are_rejected() {
  let mut engine = Engine::with_defaults();
  let mut cfg = alarm_thresholds();
  cfg.upper_warning = Some(205.0); // above upper_alarm
  assert!(engine.set_threshold(cfg).is_err());

  // Engine still has no thresholds: readings stay Normal.
  let outcome = engine.process_at(&reading(210.0, 0), now()).unwrap();
  assert_eq!(outcome.control_state, ControlState::Normal);
}

#[test]
fn control_and_spec_states_stay_independent() {
  let mut engine = Engine::with_defaults();
  engine.set_threshold(alarm_thresholds()).unwrap();
  // Spec band is wider than the alarm band here.
  engine.set_spec_limits("oven-temp", SpecLimits::from_bounds(250.0, 50.0).unwrap());

  let outcome = engine.process_at(&reading(205.0, 0), now()).unwrap();
  assert_eq!(outcome.control_state, ControlState::Alarm);
  assert_eq!(outcome.spec_compliance, SpecCompliance::Pass);
  assert_eq!(outcome.within_spec, Some(true));
}

#[test]
fn escalation_sweep_flags_stale_open_alerts() {
  let mut engine = Engine::with_defaults();
  engine.set_threshold(alarm_thresholds()).unwrap();
  engine.process_at(&reading(205.0, 0), now()).unwrap();

  // 30 minutes later: nothing to escalate yet.
  let sweep_at = Utc.with_ymd_and_hms(2025, 3, 10, 10, 30, 0).unwrap();
  assert!(engine.escalation_sweep(sweep_at).is_empty());

  // Past the default one-hour age: flagged exactly once.
  let sweep_at = Utc.with_ymd_and_hms(2025, 3, 10, 11, 30, 0).unwrap();
  let escalated = engine.escalation_sweep(sweep_at);
  assert_eq!(escalated.len(), 1);
  assert!(escalated[0].escalated);
  assert!(engine.escalation_sweep(sweep_at).is_empty());
}

#[test]
fn json_line_round_trip_matches_contract() {
  let mut engine = Engine::with_defaults();
  let outcome = engine.process_at(&fixture_reading(), now()).unwrap();
  let json = serde_json::to_string(&outcome).unwrap();
  assert!(json.contains("\"control_state\":\"normal\""));
  assert!(json.contains("\"spec_compliance\":\"pass\""));
  assert!(json.contains("\"status\":\"valid\""));
  // Absent alert id is omitted, not null.
  assert!(!json.contains("alert_id"));
}
