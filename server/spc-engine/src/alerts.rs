//! Alert manager: dedup, lifecycle, escalation.
//!
//! At most one Open alert exists per (station, sensor, alert type). A breach
//! while one is Open updates it in place; Resolved is terminal and a later
//! breach opens a fresh alert under the same key.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

use crate::error::EngineError;
use crate::types::{
  AlertAction, AlertFilter, AlertRecord, AlertSeverity, AlertStatus, ControlState, DedupKey,
};

/// In-memory alert state for the engine. Persistence is the caller's concern.
#[derive(Debug)]
pub struct AlertBook {
  alerts: HashMap<String, AlertRecord>,
  /// Dedup key -> id of the single Open alert for that key.
  open: HashMap<DedupKey, String>,
  escalation_age: Duration,
  seq: u64,
}

impl AlertBook {
  pub fn new(escalation_age_minutes: i64) -> Self {
    Self {
      alerts: HashMap::new(),
      open: HashMap::new(),
      escalation_age: Duration::minutes(escalation_age_minutes),
      seq: 0,
    }
  }

  /// Evaluate one reading's control state against the open-alert book.
  pub fn evaluate(
    &mut self,
    parameter_id: &str,
    station_id: &str,
    sensor_id: &str,
    state: ControlState,
    message: String,
    now: DateTime<Utc>,
  ) -> AlertAction {
    if state == ControlState::Normal {
      return AlertAction::None;
    }

    let key = DedupKey {
      station_id: station_id.to_string(),
      sensor_id: sensor_id.to_string(),
      alert_type: state,
    };

    if let Some(id) = self.open.get(&key) {
      if let Some(alert) = self.alerts.get_mut(id) {
        alert.message = message;
        alert.last_updated = now;
        return AlertAction::Updated(id.clone());
      }
    }

    self.seq += 1;
    let id = alert_id(&key, now, self.seq);
    let severity = match state {
      ControlState::Alarm => AlertSeverity::High,
      _ => AlertSeverity::Medium,
    };
    let record = AlertRecord {
      id: id.clone(),
      parameter_id: parameter_id.to_string(),
      station_id: station_id.to_string(),
      sensor_id: sensor_id.to_string(),
      alert_type: state,
      severity,
      status: AlertStatus::Open,
      message,
      opened_at: now,
      last_updated: now,
      escalated: false,
      acknowledged_by: None,
      resolved_by: None,
      resolution_notes: None,
    };
    self.open.insert(key, id.clone());
    self.alerts.insert(id.clone(), record);
    AlertAction::Opened(id)
  }

  /// Open -> Acknowledged. The key frees up: a further breach opens anew.
  pub fn acknowledge(
    &mut self,
    id: &str,
    actor: &str,
    now: DateTime<Utc>,
  ) -> Result<AlertRecord, EngineError> {
    let alert = self
      .alerts
      .get_mut(id)
      .ok_or_else(|| EngineError::UnknownAlert(id.to_string()))?;
    if alert.status == AlertStatus::Resolved {
      return Err(EngineError::AlertResolved(id.to_string()));
    }
    alert.status = AlertStatus::Acknowledged;
    alert.acknowledged_by = Some(actor.to_string());
    alert.last_updated = now;
    let record = alert.clone();
    self.open.remove(&dedup_key(&record));
    Ok(record)
  }

  /// Any non-Resolved state -> Resolved. Terminal for this alert instance.
  pub fn resolve(
    &mut self,
    id: &str,
    actor: &str,
    notes: Option<String>,
    now: DateTime<Utc>,
  ) -> Result<AlertRecord, EngineError> {
    let alert = self
      .alerts
      .get_mut(id)
      .ok_or_else(|| EngineError::UnknownAlert(id.to_string()))?;
    if alert.status == AlertStatus::Resolved {
      return Err(EngineError::AlertResolved(id.to_string()));
    }
    alert.status = AlertStatus::Resolved;
    alert.resolved_by = Some(actor.to_string());
    alert.resolution_notes = notes;
    alert.last_updated = now;
    let record = alert.clone();
    self.open.remove(&dedup_key(&record));
    Ok(record)
  }

  /// Flag Open alerts older than the escalation age and return them. What to
  /// do with an escalated alert beyond re-dispatch is an extension point;
  /// this is invoked by an external timer, never self-scheduled.
  pub fn escalation_sweep(&mut self, now: DateTime<Utc>) -> Vec<AlertRecord> {
    let mut escalated = Vec::new();
    for alert in self.alerts.values_mut() {
      if alert.status == AlertStatus::Open
        && !alert.escalated
        && now - alert.opened_at >= self.escalation_age
      {
        alert.escalated = true;
        alert.last_updated = now;
        escalated.push(alert.clone());
      }
    }
    escalated.sort_by_key(|a| a.opened_at);
    escalated
  }

  pub fn get(&self, id: &str) -> Option<&AlertRecord> {
    self.alerts.get(id)
  }

  /// Snapshot of live alerts matching the filter, oldest first.
  pub fn active(&self, filter: &AlertFilter) -> Vec<AlertRecord> {
    let mut out: Vec<AlertRecord> = self
      .alerts
      .values()
      .filter(|a| match a.status {
        AlertStatus::Open => true,
        AlertStatus::Acknowledged => filter.include_acknowledged,
        AlertStatus::Resolved => false,
      })
      .filter(|a| filter.station_id.as_deref().map_or(true, |s| a.station_id == s))
      .filter(|a| filter.sensor_id.as_deref().map_or(true, |s| a.sensor_id == s))
      .filter(|a| filter.severity.map_or(true, |s| a.severity == s))
      .cloned()
      .collect();
    out.sort_by_key(|a| a.opened_at);
    out
  }
}

fn dedup_key(alert: &AlertRecord) -> DedupKey {
  DedupKey {
    station_id: alert.station_id.clone(),
    sensor_id: alert.sensor_id.clone(),
    alert_type: alert.alert_type,
  }
}

/// Stable alert id: hash of dedup key + open time + sequence.
fn alert_id(key: &DedupKey, opened_at: DateTime<Utc>, seq: u64) -> String {
  let mut hasher = blake3::Hasher::new();
  hasher.update(key.station_id.as_bytes());
  hasher.update(b"|");
  hasher.update(key.sensor_id.as_bytes());
  hasher.update(b"|");
  hasher.update(key.alert_type.label().as_bytes());
  hasher.update(b"|");
  hasher.update(opened_at.to_rfc3339().as_bytes());
  hasher.update(b"|");
  hasher.update(&seq.to_le_bytes());
  let hex = hasher.finalize().to_hex();
  format!("alr-{}", &hex[..16])
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  fn ts(min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 10, 10, min, 0).unwrap()
  }

  fn breach(book: &mut AlertBook, state: ControlState, msg: &str, min: u32) -> AlertAction {
    book.evaluate("temp-01", "station-a", "sensor-1", state, msg.into(), ts(min))
  }

  #[test]
  fn normal_state_takes_no_action() {
    let mut book = AlertBook::new(60);
    assert_eq!(breach(&mut book, ControlState::Normal, "ok", 0), AlertAction::None);
    assert!(book.active(&AlertFilter::default()).is_empty());
  }

  #[test]
  fn repeated_breach_updates_instead_of_duplicating() {
    let mut book = AlertBook::new(60);
    let first = breach(&mut book, ControlState::Alarm, "first breach", 0);
    let id = match first {
      AlertAction::Opened(id) => id,
      other => panic!("expected Opened, got {:?}", other),
    };

    let second = breach(&mut book, ControlState::Alarm, "second breach", 5);
    assert_eq!(second, AlertAction::Updated(id.clone()));

    let active = book.active(&AlertFilter::default());
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].message, "second breach");
    assert_eq!(active[0].last_updated, ts(5));
    assert_eq!(active[0].opened_at, ts(0));
  }

  #[test]
  fn warning_and_alarm_are_distinct_dedup_keys() {
    let mut book = AlertBook::new(60);
    breach(&mut book, ControlState::Alarm, "alarm", 0);
    breach(&mut book, ControlState::Warning, "warning", 1);
    assert_eq!(book.active(&AlertFilter::default()).len(), 2);
  }

  #[test]
  fn severity_maps_from_state() {
    let mut book = AlertBook::new(60);
    breach(&mut book, ControlState::Alarm, "alarm", 0);
    breach(&mut book, ControlState::Warning, "warning", 1);
    let active = book.active(&AlertFilter::default());
    let alarm = active.iter().find(|a| a.alert_type == ControlState::Alarm).unwrap();
    let warning = active.iter().find(|a| a.alert_type == ControlState::Warning).unwrap();
    assert_eq!(alarm.severity, AlertSeverity::High);
    assert_eq!(warning.severity, AlertSeverity::Medium);
  }

  #[test]
  fn resolve_is_terminal_and_rebreach_opens_new_alert() {
    let mut book = AlertBook::new(60);
    let id = match breach(&mut book, ControlState::Alarm, "breach", 0) {
      AlertAction::Opened(id) => id,
      other => panic!("expected Opened, got {:?}", other),
    };

    book.resolve(&id, "inspector", Some("recalibrated".into()), ts(10)).unwrap();
    assert!(matches!(book.resolve(&id, "inspector", None, ts(11)), Err(EngineError::AlertResolved(_))));

    let action = breach(&mut book, ControlState::Alarm, "again", 12);
    let new_id = match action {
      AlertAction::Opened(id) => id,
      other => panic!("expected a fresh Opened, got {:?}", other),
    };
    assert_ne!(new_id, id);

    let resolved = book.get(&id).unwrap();
    assert_eq!(resolved.status, AlertStatus::Resolved);
    assert_eq!(resolved.resolved_by.as_deref(), Some("inspector"));
    assert_eq!(resolved.resolution_notes.as_deref(), Some("recalibrated"));
  }

  #[test]
  fn acknowledge_stamps_actor_and_frees_the_key() {
    let mut book = AlertBook::new(60);
    let id = match breach(&mut book, ControlState::Warning, "breach", 0) {
      AlertAction::Opened(id) => id,
      other => panic!("expected Opened, got {:?}", other),
    };

    let record = book.acknowledge(&id, "operator", ts(2)).unwrap();
    assert_eq!(record.status, AlertStatus::Acknowledged);
    assert_eq!(record.acknowledged_by.as_deref(), Some("operator"));

    // Not listed as active unless asked for.
    assert!(book.active(&AlertFilter::default()).is_empty());
    let with_acked = AlertFilter {
      include_acknowledged: true,
      ..AlertFilter::default()
    };
    assert_eq!(book.active(&with_acked).len(), 1);

    // Next breach opens a new Open alert for the same key.
    assert!(matches!(
      breach(&mut book, ControlState::Warning, "again", 3),
      AlertAction::Opened(_)
    ));
  }

  #[test]
  fn unknown_alert_id_errors() {
    let mut book = AlertBook::new(60);
    assert!(matches!(
      book.acknowledge("alr-missing", "operator", ts(0)),
      Err(EngineError::UnknownAlert(_))
    ));
  }

  #[test]
  fn escalation_flags_only_old_open_alerts() {
    let mut book = AlertBook::new(60);
    breach(&mut book, ControlState::Alarm, "old", 0);
    let young_id = match book.evaluate("p2", "station-b", "sensor-2", ControlState::Alarm, "young".into(), ts(50)) {
      AlertAction::Opened(id) => id,
      other => panic!("expected Opened, got {:?}", other),
    };

    let escalated = book.escalation_sweep(Utc.with_ymd_and_hms(2025, 3, 10, 11, 5, 0).unwrap());
    assert_eq!(escalated.len(), 1);
    assert_eq!(escalated[0].message, "old");
    assert!(escalated[0].escalated);
    assert!(!book.get(&young_id).unwrap().escalated);

    // Already-escalated alerts are not flagged twice.
    let again = book.escalation_sweep(Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap());
    assert_eq!(again.len(), 1);
    assert_eq!(again[0].message, "young");
  }

  #[test]
  fn filter_narrows_by_station_and_severity() {
    let mut book = AlertBook::new(60);
    breach(&mut book, ControlState::Alarm, "a", 0);
    book.evaluate("p2", "station-b", "sensor-2", ControlState::Warning, "b".into(), ts(1));

    let by_station = AlertFilter {
      station_id: Some("station-b".into()),
      ..AlertFilter::default()
    };
    let matches = book.active(&by_station);
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].station_id, "station-b");

    let by_severity = AlertFilter {
      severity: Some(AlertSeverity::High),
      ..AlertFilter::default()
    };
    assert_eq!(book.active(&by_severity).len(), 1);
  }
}
