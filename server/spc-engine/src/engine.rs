//! Core engine: per-parameter state, per-reading orchestration, queries.
//!
//! `Engine` is the single-threaded facade used by the binary and by tests.
//! The concurrent monitor composes the same pieces — [`ParameterState`] plus
//! [`crate::alerts::AlertBook`] — behind its own per-parameter locking.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};

use crate::alerts::AlertBook;
use crate::capability::{self, SpecLimits};
use crate::config::{ChartSettings, EngineConfig};
use crate::error::EngineError;
use crate::stats::Window;
use crate::threshold::{self, ThresholdConfig};
use crate::types::*;
use crate::validate;

/// Everything derived from one accepted reading, before alert handling.
#[derive(Debug, Clone)]
pub struct Evaluation {
  pub reading: Reading,
  pub baseline: Baseline,
  pub control_state: ControlState,
  pub spec_compliance: SpecCompliance,
  pub within_spec: Option<bool>,
  pub deviation_pct: Option<f64>,
}

impl Evaluation {
  /// Human-readable alert text for threshold breaches.
  pub fn alert_message(&self) -> String {
    let value = match self.reading.unit.as_deref() {
      Some(u) => format!("{} {}", self.reading.value, u),
      None => self.reading.value.to_string(),
    };
    format!(
      "{} {}: {} at {}",
      self.reading.parameter_id,
      self.control_state.label(),
      value,
      self.reading.timestamp.to_rfc3339()
    )
  }

  pub fn into_outcome(self, alert_id: Option<String>) -> ReadingOutcome {
    ReadingOutcome {
      parameter_id: self.reading.parameter_id,
      station_id: self.reading.station_id,
      sensor_id: self.reading.sensor_id,
      value: self.reading.value,
      timestamp: self.reading.timestamp.to_rfc3339(),
      status: self.reading.status,
      control_state: self.control_state,
      spec_compliance: self.spec_compliance,
      within_spec: self.within_spec,
      deviation_pct: self.deviation_pct,
      x_bar: self.baseline.x_bar,
      range: self.baseline.range,
      moving_range: self.baseline.moving_range,
      std_dev: self.baseline.std_dev,
      sample_size: self.baseline.sample_size,
      alert_id,
    }
  }
}

/// Owned state for one parameter: the rolling window, retained trend points,
/// and the last accepted timestamp. Exactly one writer at a time.
#[derive(Debug)]
pub struct ParameterState {
  window: Window,
  history: VecDeque<TrendPoint>,
  trend_capacity: usize,
  last_accepted: Option<DateTime<Utc>>,
}

impl ParameterState {
  pub fn new(config: &EngineConfig) -> Self {
    Self {
      window: Window::new(config.window_size, config.subgroup_size),
      history: VecDeque::with_capacity(64),
      trend_capacity: config.trend_capacity,
      last_accepted: None,
    }
  }

  /// Validate one inbound reading and fold it into this parameter's state.
  ///
  /// Validation failures reject the reading with no mutation. Readings that
  /// validate but breach their own control/spec limits are recorded Invalid
  /// and excluded from the rolling window, matching the window's
  /// valid-values-only contract.
  pub fn apply(
    &mut self,
    raw: &InboundReading,
    threshold_cfg: Option<&ThresholdConfig>,
    spec: Option<&SpecLimits>,
    config: &EngineConfig,
    now: DateTime<Utc>,
  ) -> Result<Evaluation, EngineError> {
    let mut reading = validate::normalize(
      raw,
      threshold_cfg,
      now,
      self.last_accepted,
      config.out_of_order,
    )?;
    self.last_accepted = Some(reading.timestamp);

    let control_state = threshold_cfg
      .map(|cfg| cfg.evaluate(reading.value))
      .unwrap_or(ControlState::Normal);

    // Reading-supplied spec limits win; configured limits fill the gaps.
    let usl = reading.upper_spec_limit.or_else(|| spec.map(|s| s.usl));
    let lsl = reading.lower_spec_limit.or_else(|| spec.map(|s| s.lsl));
    let spec_compliance = threshold::spec_compliance(reading.value, usl, lsl);
    let within_spec = match spec_compliance {
      SpecCompliance::Pass => Some(true),
      SpecCompliance::Fail => Some(false),
      SpecCompliance::NotEvaluated => None,
    };
    let deviation_pct = threshold::deviation_pct(reading.value, usl, lsl);

    let control_breach = matches!(reading.upper_control_limit, Some(u) if reading.value > u)
      || matches!(reading.lower_control_limit, Some(l) if reading.value < l);
    reading.status = if control_breach || spec_compliance == SpecCompliance::Fail {
      ReadingStatus::Invalid
    } else {
      ReadingStatus::Valid
    };

    if reading.status == ReadingStatus::Valid {
      self.window.push(reading.value, reading.timestamp);
    }

    if self.history.len() == self.trend_capacity {
      self.history.pop_front();
    }
    self.history.push_back(TrendPoint {
      timestamp: reading.timestamp,
      value: reading.value,
      control_state,
      status: reading.status,
    });

    let baseline = self.window.baseline(&reading.parameter_id);
    Ok(Evaluation {
      reading,
      baseline,
      control_state,
      spec_compliance,
      within_spec,
      deviation_pct,
    })
  }

  pub fn window(&self) -> &Window {
    &self.window
  }

  /// Capability snapshot: indices from the valid-values window, yield over
  /// all retained readings, Invalid ones included.
  pub fn capability(
    &self,
    parameter_id: &str,
    spec: Option<&SpecLimits>,
    config: &EngineConfig,
    now: DateTime<Utc>,
  ) -> CapabilitySnapshot {
    let mut snapshot = capability::compute(
      parameter_id,
      &self.window,
      spec,
      config.min_capability_samples,
      now,
    );
    if let Some(s) = spec {
      if !self.history.is_empty() {
        snapshot.yield_pct = capability::yield_pct(self.history.iter().map(|p| p.value), s);
      }
    }
    snapshot
  }

  pub fn baseline(&self, parameter_id: &str) -> Baseline {
    self.window.baseline(parameter_id)
  }

  /// Retained points within [from, to], oldest first.
  pub fn trend(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<TrendPoint> {
    self
      .history
      .iter()
      .filter(|p| p.timestamp >= from && p.timestamp <= to)
      .cloned()
      .collect()
  }

  /// Statistical summary over the retained trend points.
  pub fn summary(&self, parameter_id: &str, spec: Option<&SpecLimits>) -> Option<StatsSummary> {
    if self.history.is_empty() {
      return None;
    }
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut sum = 0.0;
    let mut normal = 0usize;
    let mut warning = 0usize;
    let mut alarm = 0usize;
    for p in &self.history {
      min = min.min(p.value);
      max = max.max(p.value);
      sum += p.value;
      match p.control_state {
        ControlState::Normal => normal += 1,
        ControlState::Warning => warning += 1,
        ControlState::Alarm => alarm += 1,
      }
    }
    let count = self.history.len();
    let yield_pct = spec.and_then(|s| capability::yield_pct(self.history.iter().map(|p| p.value), s));
    Some(StatsSummary {
      parameter_id: parameter_id.to_string(),
      count,
      min,
      max,
      mean: sum / count as f64,
      std_dev: self.window.std_dev(),
      normal_count: normal,
      warning_count: warning,
      alarm_count: alarm,
      yield_pct,
    })
  }
}

/// The SPC engine. Holds in-memory state across readings.
pub struct Engine {
  config: EngineConfig,
  thresholds: HashMap<String, ThresholdConfig>,
  specs: HashMap<String, SpecLimits>,
  charts: HashMap<String, ChartSettings>,
  params: HashMap<String, ParameterState>,
  alerts: AlertBook,
}

impl Engine {
  pub fn new(config: EngineConfig) -> Self {
    let alerts = AlertBook::new(config.escalation_age_minutes);
    Self {
      config,
      thresholds: HashMap::new(),
      specs: HashMap::new(),
      charts: HashMap::new(),
      params: HashMap::new(),
      alerts,
    }
  }

  pub fn with_defaults() -> Self {
    Self::new(EngineConfig::default())
  }

  pub fn config(&self) -> &EngineConfig {
    &self.config
  }

  // -------------------------------------------------------------------------
  // Configuration (validated at write time, never auto-corrected)
  // -------------------------------------------------------------------------

  pub fn set_threshold(&mut self, cfg: ThresholdConfig) -> Result<(), EngineError> {
    cfg.validate()?;
    self.thresholds.insert(cfg.parameter_id.clone(), cfg);
    Ok(())
  }

  pub fn set_spec_limits(&mut self, parameter_id: &str, spec: SpecLimits) {
    // SpecLimits constructors enforce ordering; storing is infallible.
    self.specs.insert(parameter_id.to_string(), spec);
  }

  pub fn set_chart_settings(
    &mut self,
    parameter_id: &str,
    settings: ChartSettings,
  ) -> Result<(), EngineError> {
    settings.validate()?;
    self.charts.insert(parameter_id.to_string(), settings);
    Ok(())
  }

  /// Apply a parsed startup config. Stops at the first invalid entry.
  pub fn apply_startup(&mut self, startup: &crate::config::StartupConfig) -> Result<(), EngineError> {
    for threshold_cfg in &startup.thresholds {
      self.set_threshold(threshold_cfg.clone())?;
    }
    for entry in &startup.spec_limits {
      let limits = entry.to_limits()?;
      self.set_spec_limits(&entry.parameter_id, limits);
    }
    for chart in &startup.chart_settings {
      self.set_chart_settings(&chart.parameter_id, chart.settings.clone())?;
    }
    Ok(())
  }

  // -------------------------------------------------------------------------
  // Ingestion
  // -------------------------------------------------------------------------

  /// Process a single inbound reading through validate -> stats -> threshold
  /// -> alert evaluation, and return the computed outcome.
  pub fn process(&mut self, raw: &InboundReading) -> Result<ReadingOutcome, EngineError> {
    self.process_at(raw, Utc::now())
  }

  /// Same as [`Engine::process`] with an injected clock.
  pub fn process_at(
    &mut self,
    raw: &InboundReading,
    now: DateTime<Utc>,
  ) -> Result<ReadingOutcome, EngineError> {
    let threshold_cfg = self.thresholds.get(&raw.parameter_id);
    let spec = self.specs.get(&raw.parameter_id);
    let param = self
      .params
      .entry(raw.parameter_id.clone())
      .or_insert_with(|| ParameterState::new(&self.config));

    let eval = param.apply(raw, threshold_cfg, spec, &self.config, now)?;

    let action = self.alerts.evaluate(
      &eval.reading.parameter_id,
      &eval.reading.station_id,
      &eval.reading.sensor_id,
      eval.control_state,
      eval.alert_message(),
      eval.reading.timestamp,
    );

    Ok(eval.into_outcome(action.alert_id().map(String::from)))
  }

  // -------------------------------------------------------------------------
  // Queries (snapshot reads)
  // -------------------------------------------------------------------------

  pub fn baseline(&self, parameter_id: &str) -> Option<Baseline> {
    self.params.get(parameter_id).map(|p| p.baseline(parameter_id))
  }

  /// Derived statistical control limits (mean ± σ·std_dev). The sigma level
  /// comes from the parameter's chart settings when present.
  pub fn control_limits(&self, parameter_id: &str) -> Option<(f64, f64)> {
    let param = self.params.get(parameter_id)?;
    let sigma = self
      .charts
      .get(parameter_id)
      .map(|c| c.sigma_level)
      .unwrap_or(self.config.sigma_level);
    capability::derived_limits(param.window(), sigma)
  }

  pub fn capability(&self, parameter_id: &str) -> Option<CapabilitySnapshot> {
    self.capability_at(parameter_id, Utc::now())
  }

  pub fn capability_at(&self, parameter_id: &str, now: DateTime<Utc>) -> Option<CapabilitySnapshot> {
    let param = self.params.get(parameter_id)?;
    Some(param.capability(parameter_id, self.specs.get(parameter_id), &self.config, now))
  }

  pub fn trend(&self, parameter_id: &str, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<TrendPoint> {
    self
      .params
      .get(parameter_id)
      .map(|p| p.trend(from, to))
      .unwrap_or_default()
  }

  pub fn summary(&self, parameter_id: &str) -> Option<StatsSummary> {
    self
      .params
      .get(parameter_id)?
      .summary(parameter_id, self.specs.get(parameter_id))
  }

  pub fn active_alerts(&self, filter: &AlertFilter) -> Vec<AlertRecord> {
    self.alerts.active(filter)
  }

  pub fn alert(&self, id: &str) -> Option<&AlertRecord> {
    self.alerts.get(id)
  }

  // -------------------------------------------------------------------------
  // Alert control
  // -------------------------------------------------------------------------

  pub fn acknowledge_alert(&mut self, id: &str, actor: &str) -> Result<AlertRecord, EngineError> {
    self.alerts.acknowledge(id, actor, Utc::now())
  }

  pub fn resolve_alert(
    &mut self,
    id: &str,
    actor: &str,
    notes: Option<String>,
  ) -> Result<AlertRecord, EngineError> {
    self.alerts.resolve(id, actor, notes, Utc::now())
  }

  /// Invoked by an external timer; see [`AlertBook::escalation_sweep`].
  pub fn escalation_sweep(&mut self, now: DateTime<Utc>) -> Vec<AlertRecord> {
    self.alerts.escalation_sweep(now)
  }
}
