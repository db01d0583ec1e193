//! Concurrent ingestion gateway.
//!
//! Each parameter's window + threshold state lives in its own cell behind an
//! async mutex, so one parameter has exactly one writer at a time while
//! distinct parameters proceed fully in parallel. Compute happens inside the
//! cell lock; repository, publisher, and notifier I/O happens after every
//! lock is released, so a slow collaborator cannot serialize with the math.

use chrono::{DateTime, Utc};
use log::warn;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;
use uuid::Uuid;

use spc_engine::alerts::AlertBook;
use spc_engine::capability::SpecLimits;
use spc_engine::config::{ChartSettings, EngineConfig, StartupConfig};
use spc_engine::engine::ParameterState;
use spc_engine::threshold::ThresholdConfig;
use spc_engine::types::{
  AlertFilter, AlertRecord, Baseline, CapabilitySnapshot, ControlState, InboundReading,
  ReadingOutcome, StatsSummary, TrendPoint,
};
use spc_engine::EngineError;

use crate::context::ContextLookup;
use crate::notify::{dispatch_with_retry, Notifier, RetryPolicy};
use crate::publish::Publisher;
use crate::repository::Repository;
use crate::types::{ProductionContext, StoredReading, UpdateEvent};

/// Per-parameter state plus its write-time-validated configuration.
struct ParamCell {
  state: ParameterState,
  threshold: Option<ThresholdConfig>,
  spec: Option<SpecLimits>,
  chart: Option<ChartSettings>,
}

impl ParamCell {
  fn new(config: &EngineConfig) -> Self {
    Self {
      state: ParameterState::new(config),
      threshold: None,
      spec: None,
      chart: None,
    }
  }
}

pub struct Gateway {
  config: EngineConfig,
  cells: StdMutex<HashMap<String, Arc<Mutex<ParamCell>>>>,
  alerts: Mutex<AlertBook>,
  repository: Arc<dyn Repository>,
  notifier: Arc<dyn Notifier>,
  publisher: Arc<dyn Publisher>,
  context: Option<Arc<dyn ContextLookup>>,
  retry: RetryPolicy,
  channels: Vec<String>,
}

impl Gateway {
  pub fn new(
    config: EngineConfig,
    repository: Arc<dyn Repository>,
    notifier: Arc<dyn Notifier>,
    publisher: Arc<dyn Publisher>,
  ) -> Self {
    let alerts = Mutex::new(AlertBook::new(config.escalation_age_minutes));
    Self {
      config,
      cells: StdMutex::new(HashMap::new()),
      alerts,
      repository,
      notifier,
      publisher,
      context: None,
      retry: RetryPolicy::default(),
      channels: vec!["system".to_string()],
    }
  }

  pub fn with_context_lookup(mut self, lookup: Arc<dyn ContextLookup>) -> Self {
    self.context = Some(lookup);
    self
  }

  pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
    self.retry = retry;
    self
  }

  pub fn with_channels(mut self, channels: Vec<String>) -> Self {
    self.channels = channels;
    self
  }

  fn cell(&self, parameter_id: &str) -> Arc<Mutex<ParamCell>> {
    let mut cells = self.cells.lock().unwrap();
    cells
      .entry(parameter_id.to_string())
      .or_insert_with(|| Arc::new(Mutex::new(ParamCell::new(&self.config))))
      .clone()
  }

  // -------------------------------------------------------------------------
  // Configuration (validated at write time)
  // -------------------------------------------------------------------------

  pub async fn set_threshold(&self, cfg: ThresholdConfig) -> Result<(), EngineError> {
    cfg.validate()?;
    let cell = self.cell(&cfg.parameter_id);
    cell.lock().await.threshold = Some(cfg);
    Ok(())
  }

  pub async fn set_spec_limits(&self, parameter_id: &str, spec: SpecLimits) {
    let cell = self.cell(parameter_id);
    cell.lock().await.spec = Some(spec);
  }

  pub async fn set_chart_settings(
    &self,
    parameter_id: &str,
    settings: ChartSettings,
  ) -> Result<(), EngineError> {
    settings.validate()?;
    let cell = self.cell(parameter_id);
    cell.lock().await.chart = Some(settings);
    Ok(())
  }

  pub async fn apply_startup(&self, startup: &StartupConfig) -> Result<(), EngineError> {
    for cfg in &startup.thresholds {
      self.set_threshold(cfg.clone()).await?;
    }
    for entry in &startup.spec_limits {
      let limits = entry.to_limits()?;
      self.set_spec_limits(&entry.parameter_id, limits).await;
    }
    for chart in &startup.chart_settings {
      self
        .set_chart_settings(&chart.parameter_id, chart.settings.clone())
        .await?;
    }
    Ok(())
  }

  // -------------------------------------------------------------------------
  // Ingestion
  // -------------------------------------------------------------------------

  /// Process one reading. Validation failures surface synchronously and
  /// mutate nothing; downstream persist/notify/publish failures are logged
  /// and never unwind the committed reading.
  pub async fn submit(&self, raw: &InboundReading) -> Result<ReadingOutcome, EngineError> {
    let cell = self.cell(&raw.parameter_id);
    let mut guard = cell.lock().await;
    let cell_ref = &mut *guard;
    let eval = cell_ref.state.apply(
      raw,
      cell_ref.threshold.as_ref(),
      cell_ref.spec.as_ref(),
      &self.config,
      Utc::now(),
    )?;

    // Alert evaluation stays inside the parameter's critical section so a
    // reading and its alert transition are atomic per parameter.
    let (alert_record, opened) = if eval.control_state != ControlState::Normal {
      let mut book = self.alerts.lock().await;
      let action = book.evaluate(
        &eval.reading.parameter_id,
        &eval.reading.station_id,
        &eval.reading.sensor_id,
        eval.control_state,
        eval.alert_message(),
        eval.reading.timestamp,
      );
      let opened = matches!(action, spc_engine::types::AlertAction::Opened(_));
      let record = action.alert_id().and_then(|id| book.get(id).cloned());
      (record, opened)
    } else {
      (None, false)
    };
    drop(guard);

    let baseline = eval.baseline.clone();
    let outcome = eval.into_outcome(alert_record.as_ref().map(|a| a.id.clone()));

    // I/O outside the critical section, best-effort.
    let stored = StoredReading {
      id: Uuid::new_v4(),
      outcome: outcome.clone(),
      context: self.lookup_context(&outcome),
    };
    if let Err(e) = self.repository.append_reading(&stored) {
      warn!("reading {} not persisted: {}", stored.id, e);
    }
    if let Err(e) = self.repository.save_baseline(&baseline) {
      warn!("baseline for {} not persisted: {}", baseline.parameter_id, e);
    }
    if let Err(e) = self.publisher.publish(&UpdateEvent::from_outcome(&outcome)) {
      warn!("update event for {} not published: {}", outcome.parameter_id, e);
    }
    if let Some(alert) = alert_record {
      if let Err(e) = self.repository.upsert_alert(&alert) {
        warn!("alert {} not persisted: {}", alert.id, e);
      }
      if opened {
        tokio::spawn(dispatch_with_retry(
          self.notifier.clone(),
          alert,
          self.channels.clone(),
          self.retry,
        ));
      }
    }

    Ok(outcome)
  }

  fn lookup_context(&self, outcome: &ReadingOutcome) -> Option<ProductionContext> {
    self
      .context
      .as_ref()
      .and_then(|c| c.lookup(&outcome.station_id, &outcome.sensor_id))
  }

  // -------------------------------------------------------------------------
  // Queries (snapshot reads)
  // -------------------------------------------------------------------------

  pub async fn baseline(&self, parameter_id: &str) -> Option<Baseline> {
    let cell = self.existing_cell(parameter_id)?;
    let guard = cell.lock().await;
    Some(guard.state.baseline(parameter_id))
  }

  pub async fn capability(&self, parameter_id: &str) -> Option<CapabilitySnapshot> {
    let cell = self.existing_cell(parameter_id)?;
    let guard = cell.lock().await;
    Some(
      guard
        .state
        .capability(parameter_id, guard.spec.as_ref(), &self.config, Utc::now()),
    )
  }

  /// Derived statistical control limits, using the parameter's chart sigma
  /// level when one is configured.
  pub async fn control_limits(&self, parameter_id: &str) -> Option<(f64, f64)> {
    let cell = self.existing_cell(parameter_id)?;
    let guard = cell.lock().await;
    let sigma = guard
      .chart
      .as_ref()
      .map(|c| c.sigma_level)
      .unwrap_or(self.config.sigma_level);
    spc_engine::capability::derived_limits(guard.state.window(), sigma)
  }

  pub async fn trend(
    &self,
    parameter_id: &str,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
  ) -> Vec<TrendPoint> {
    match self.existing_cell(parameter_id) {
      Some(cell) => cell.lock().await.state.trend(from, to),
      None => Vec::new(),
    }
  }

  pub async fn summary(&self, parameter_id: &str) -> Option<StatsSummary> {
    let cell = self.existing_cell(parameter_id)?;
    let guard = cell.lock().await;
    guard.state.summary(parameter_id, guard.spec.as_ref())
  }

  pub async fn active_alerts(&self, filter: &AlertFilter) -> Vec<AlertRecord> {
    self.alerts.lock().await.active(filter)
  }

  pub async fn alert(&self, id: &str) -> Option<AlertRecord> {
    self.alerts.lock().await.get(id).cloned()
  }

  fn existing_cell(&self, parameter_id: &str) -> Option<Arc<Mutex<ParamCell>>> {
    self.cells.lock().unwrap().get(parameter_id).cloned()
  }

  // -------------------------------------------------------------------------
  // Alert control
  // -------------------------------------------------------------------------

  pub async fn acknowledge(&self, id: &str, actor: &str) -> Result<AlertRecord, EngineError> {
    let record = self.alerts.lock().await.acknowledge(id, actor, Utc::now())?;
    if let Err(e) = self.repository.upsert_alert(&record) {
      warn!("alert {} ack not persisted: {}", record.id, e);
    }
    Ok(record)
  }

  pub async fn resolve(
    &self,
    id: &str,
    actor: &str,
    notes: Option<String>,
  ) -> Result<AlertRecord, EngineError> {
    let record = self
      .alerts
      .lock()
      .await
      .resolve(id, actor, notes, Utc::now())?;
    if let Err(e) = self.repository.upsert_alert(&record) {
      warn!("alert {} resolution not persisted: {}", record.id, e);
    }
    Ok(record)
  }

  /// Escalation check, invoked by an external timer (see the binary).
  /// Escalated alerts are persisted and re-dispatched.
  pub async fn escalation_sweep(&self) -> Vec<AlertRecord> {
    let escalated = self.alerts.lock().await.escalation_sweep(Utc::now());
    for alert in &escalated {
      if let Err(e) = self.repository.upsert_alert(alert) {
        warn!("escalated alert {} not persisted: {}", alert.id, e);
      }
      tokio::spawn(dispatch_with_retry(
        self.notifier.clone(),
        alert.clone(),
        self.channels.clone(),
        self.retry,
      ));
    }
    escalated
  }
}
