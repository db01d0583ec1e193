//! Core types for the SPC engine (JSON contracts + internal models).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Inbound types (JSON contract — what the caller sends)
// ---------------------------------------------------------------------------

/// One inbound reading line from stdin. Unknown fields are silently ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundReading {
  pub parameter_id: String,
  pub station_id: String,
  pub sensor_id: String,
  pub value: f64,
  pub timestamp: String,
  #[serde(default)]
  pub unit: Option<String>,
  #[serde(default)]
  pub upper_control_limit: Option<f64>,
  #[serde(default)]
  pub lower_control_limit: Option<f64>,
  #[serde(default)]
  pub upper_spec_limit: Option<f64>,
  #[serde(default)]
  pub lower_spec_limit: Option<f64>,
}

// ---------------------------------------------------------------------------
// Status enums
// ---------------------------------------------------------------------------

/// Data-quality status of a stored reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadingStatus {
  Valid,
  Invalid,
  Pending,
}

/// Process-control state of a parameter after a reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlState {
  Normal,
  Warning,
  Alarm,
}

impl ControlState {
  pub fn label(self) -> &'static str {
    match self {
      Self::Normal => "normal",
      Self::Warning => "warning",
      Self::Alarm => "alarm",
    }
  }
}

/// Specification compliance, evaluated independently of the control state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecCompliance {
  Pass,
  Fail,
  NotEvaluated,
}

// ---------------------------------------------------------------------------
// Internal canonical types
// ---------------------------------------------------------------------------

/// Canonical reading after validation + scaling. Immutable except `status`.
#[derive(Debug, Clone)]
pub struct Reading {
  pub parameter_id: String,
  pub station_id: String,
  pub sensor_id: String,
  pub value: f64,
  pub timestamp: DateTime<Utc>,
  pub unit: Option<String>,
  pub upper_control_limit: Option<f64>,
  pub lower_control_limit: Option<f64>,
  pub upper_spec_limit: Option<f64>,
  pub lower_spec_limit: Option<f64>,
  pub status: ReadingStatus,
}

/// Derived rolling statistics for one parameter at a point in time.
#[derive(Debug, Clone, Serialize)]
pub struct Baseline {
  pub parameter_id: String,
  pub x_bar: f64,
  /// Subgroup range: max - min over the most recent subgroup (None below
  /// subgroup size).
  pub range: Option<f64>,
  /// Absolute difference between the two most recent values.
  pub moving_range: Option<f64>,
  /// Sample standard deviation (n-1 denominator) over the full window.
  pub std_dev: Option<f64>,
  pub sample_size: usize,
  pub last_updated: DateTime<Utc>,
}

/// One retained point for trend queries.
#[derive(Debug, Clone, Serialize)]
pub struct TrendPoint {
  pub timestamp: DateTime<Utc>,
  pub value: f64,
  pub control_state: ControlState,
  pub status: ReadingStatus,
}

// ---------------------------------------------------------------------------
// Capability
// ---------------------------------------------------------------------------

/// Qualitative interpretation of Cpk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityRating {
  Excellent,
  Good,
  Marginal,
  Poor,
  /// Below the minimum sample size, or zero spread.
  Pending,
}

impl CapabilityRating {
  pub fn from_cpk(cpk: f64) -> Self {
    if cpk >= 1.33 {
      Self::Excellent
    } else if cpk >= 1.0 {
      Self::Good
    } else if cpk >= 0.67 {
      Self::Marginal
    } else {
      Self::Poor
    }
  }

  pub fn label(self) -> &'static str {
    match self {
      Self::Excellent => "Excellent capability",
      Self::Good => "Good capability",
      Self::Marginal => "Marginal capability",
      Self::Poor => "Poor — process improvement needed",
      Self::Pending => "Pending — insufficient data",
    }
  }
}

/// Capability indices for one parameter. Index fields stay `None` until the
/// minimum sample size is reached and the spread is non-zero.
#[derive(Debug, Clone, Serialize)]
pub struct CapabilitySnapshot {
  pub parameter_id: String,
  pub cp: Option<f64>,
  pub cpu: Option<f64>,
  pub cpl: Option<f64>,
  pub cpk: Option<f64>,
  pub pp: Option<f64>,
  pub ppk: Option<f64>,
  pub mean: f64,
  pub std_dev: Option<f64>,
  pub sample_size: usize,
  /// Fraction of window values inside the spec limits, as a percentage.
  pub yield_pct: Option<f64>,
  pub computed_at: DateTime<Utc>,
  pub rating: CapabilityRating,
}

// ---------------------------------------------------------------------------
// Alerts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
  Medium,
  High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
  Open,
  Acknowledged,
  Resolved,
}

/// Identity used to avoid duplicate Open alerts for the same condition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
  pub station_id: String,
  pub sensor_id: String,
  pub alert_type: ControlState,
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertRecord {
  pub id: String,
  pub parameter_id: String,
  pub station_id: String,
  pub sensor_id: String,
  pub alert_type: ControlState,
  pub severity: AlertSeverity,
  pub status: AlertStatus,
  pub message: String,
  pub opened_at: DateTime<Utc>,
  pub last_updated: DateTime<Utc>,
  pub escalated: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub acknowledged_by: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub resolved_by: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub resolution_notes: Option<String>,
}

/// What the alert manager did for one evaluated reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertAction {
  None,
  Opened(String),
  Updated(String),
}

impl AlertAction {
  pub fn alert_id(&self) -> Option<&str> {
    match self {
      Self::None => None,
      Self::Opened(id) | Self::Updated(id) => Some(id),
    }
  }
}

/// Filter for active-alert queries. Empty filter matches everything open.
#[derive(Debug, Clone, Default)]
pub struct AlertFilter {
  pub station_id: Option<String>,
  pub sensor_id: Option<String>,
  pub severity: Option<AlertSeverity>,
  /// Include Acknowledged alerts alongside Open ones.
  pub include_acknowledged: bool,
}

// ---------------------------------------------------------------------------
// Output types (JSON contract — what we emit)
// ---------------------------------------------------------------------------

/// Result of processing one reading.
#[derive(Debug, Clone, Serialize)]
pub struct ReadingOutcome {
  pub parameter_id: String,
  pub station_id: String,
  pub sensor_id: String,
  pub value: f64,
  pub timestamp: String,
  pub status: ReadingStatus,
  pub control_state: ControlState,
  pub spec_compliance: SpecCompliance,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub within_spec: Option<bool>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub deviation_pct: Option<f64>,
  pub x_bar: f64,
  pub range: Option<f64>,
  pub moving_range: Option<f64>,
  pub std_dev: Option<f64>,
  pub sample_size: usize,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub alert_id: Option<String>,
}

/// Statistical summary over the retained window.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSummary {
  pub parameter_id: String,
  pub count: usize,
  pub min: f64,
  pub max: f64,
  pub mean: f64,
  pub std_dev: Option<f64>,
  pub normal_count: usize,
  pub warning_count: usize,
  pub alarm_count: usize,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub yield_pct: Option<f64>,
}

// ---------------------------------------------------------------------------
// CLI stream wrappers
// ---------------------------------------------------------------------------

/// Structured error output for invalid input lines.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorOutput {
  pub error: bool,
  pub message: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub field: Option<String>,
}

impl ErrorOutput {
  pub fn new(message: impl Into<String>) -> Self {
    Self {
      error: true,
      message: message.into(),
      field: None,
    }
  }

  pub fn with_field(mut self, field: impl Into<String>) -> Self {
    self.field = Some(field.into());
    self
  }
}
