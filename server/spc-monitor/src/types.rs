//! Service-side types: stored records, update events, dispatch errors.

use serde::Serialize;
use spc_engine::types::{ControlState, ReadingOutcome, SpecCompliance};
use thiserror::Error;
use uuid::Uuid;

/// Work order / item / batch tags attached to a stored reading for
/// downstream reporting only. Never influences control logic.
#[derive(Debug, Clone, Serialize)]
pub struct ProductionContext {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub work_order: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub item: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub batch_no: Option<String>,
}

/// A committed reading as handed to the repository.
#[derive(Debug, Clone, Serialize)]
pub struct StoredReading {
  pub id: Uuid,
  #[serde(flatten)]
  pub outcome: ReadingOutcome,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub context: Option<ProductionContext>,
}

/// Published after each committed reading (dashboards, rooms, etc.).
#[derive(Debug, Clone, Serialize)]
pub struct UpdateEvent {
  pub parameter_id: String,
  pub station_id: String,
  pub sensor_id: String,
  pub value: f64,
  pub timestamp: String,
  pub control_state: ControlState,
  pub spec_compliance: SpecCompliance,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub alert_id: Option<String>,
}

impl UpdateEvent {
  pub fn from_outcome(outcome: &ReadingOutcome) -> Self {
    Self {
      parameter_id: outcome.parameter_id.clone(),
      station_id: outcome.station_id.clone(),
      sensor_id: outcome.sensor_id.clone(),
      value: outcome.value,
      timestamp: outcome.timestamp.clone(),
      control_state: outcome.control_state,
      spec_compliance: outcome.spec_compliance,
      alert_id: outcome.alert_id.clone(),
    }
  }
}

/// Transient downstream failure. Logged and retried, never surfaced as an
/// ingestion failure.
#[derive(Debug, Error)]
pub enum DispatchError {
  #[error("repository: {0}")]
  Repository(String),

  #[error("notify: {0}")]
  Notify(String),

  #[error("publish: {0}")]
  Publish(String),

  #[error("dispatch retries exhausted")]
  RetriesExhausted,
}
