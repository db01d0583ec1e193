//! Storage-agnostic persistence behind a trait, with an in-memory default.

use spc_engine::types::{AlertRecord, Baseline};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::types::{DispatchError, StoredReading};

/// Append readings, upsert alerts, write baselines. Implementations must be
/// cheap to call from async tasks; slow backends should buffer internally.
pub trait Repository: Send + Sync {
  fn append_reading(&self, reading: &StoredReading) -> Result<(), DispatchError>;
  fn upsert_alert(&self, alert: &AlertRecord) -> Result<(), DispatchError>;
  fn save_baseline(&self, baseline: &Baseline) -> Result<(), DispatchError>;
}

/// In-memory repository for tests and the reference binary.
#[derive(Debug, Default)]
pub struct MemoryRepository {
  readings: Mutex<Vec<StoredReading>>,
  alerts: Mutex<HashMap<String, AlertRecord>>,
  baselines: Mutex<HashMap<String, Baseline>>,
}

impl MemoryRepository {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn readings(&self) -> Vec<StoredReading> {
    self.readings.lock().unwrap().clone()
  }

  pub fn reading_count(&self) -> usize {
    self.readings.lock().unwrap().len()
  }

  pub fn alert(&self, id: &str) -> Option<AlertRecord> {
    self.alerts.lock().unwrap().get(id).cloned()
  }

  pub fn alert_count(&self) -> usize {
    self.alerts.lock().unwrap().len()
  }

  pub fn baseline(&self, parameter_id: &str) -> Option<Baseline> {
    self.baselines.lock().unwrap().get(parameter_id).cloned()
  }
}

impl Repository for MemoryRepository {
  fn append_reading(&self, reading: &StoredReading) -> Result<(), DispatchError> {
    self.readings.lock().unwrap().push(reading.clone());
    Ok(())
  }

  fn upsert_alert(&self, alert: &AlertRecord) -> Result<(), DispatchError> {
    self
      .alerts
      .lock()
      .unwrap()
      .insert(alert.id.clone(), alert.clone());
    Ok(())
  }

  fn save_baseline(&self, baseline: &Baseline) -> Result<(), DispatchError> {
    self
      .baselines
      .lock()
      .unwrap()
      .insert(baseline.parameter_id.clone(), baseline.clone());
    Ok(())
  }
}
