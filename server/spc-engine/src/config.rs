//! Engine configuration with sane defaults.

use crate::error::EngineError;
use serde::Deserialize;

/// What to do with a reading older than the parameter's last accepted one.
///
/// Rejecting keeps moving-range and window semantics meaningful; Accept
/// applies readings in arrival order for transports that cannot guarantee
/// timestamp ordering. There is no reorder buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutOfOrderPolicy {
  Reject,
  Accept,
}

/// Tunable parameters for statistics, capability, and alert escalation.
#[derive(Debug, Clone)]
pub struct EngineConfig {
  /// Rolling window length per parameter (valid values only).
  pub window_size: usize,
  /// Subgroup length for the range statistic (most recent values).
  pub subgroup_size: usize,
  /// Minimum samples before capability indices become available.
  pub min_capability_samples: usize,
  /// Sigma multiplier for derived control limits (mean ± σ·std_dev).
  pub sigma_level: f64,
  /// Age in minutes after which an Open alert is flagged for escalation.
  pub escalation_age_minutes: i64,
  /// Retained points for trend queries, per parameter.
  pub trend_capacity: usize,
  pub out_of_order: OutOfOrderPolicy,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      window_size: 30,
      subgroup_size: 5,
      min_capability_samples: 10,
      sigma_level: 3.0,
      escalation_age_minutes: 60,
      trend_capacity: 500,
      out_of_order: OutOfOrderPolicy::Reject,
    }
  }
}

/// Control-chart display settings, validated at write time.
#[derive(Debug, Clone, Deserialize)]
pub struct ChartSettings {
  /// Sigma multiplier used for this parameter's derived limits.
  pub sigma_level: f64,
  /// Data points to display.
  pub sample_size: usize,
  #[serde(default)]
  pub auto_refresh: bool,
  #[serde(default)]
  pub refresh_interval_secs: u64,
}

impl ChartSettings {
  pub fn validate(&self) -> Result<(), EngineError> {
    if !self.sigma_level.is_finite() || self.sigma_level <= 0.0 || self.sigma_level > 6.0 {
      return Err(EngineError::config("sigma level must be in (0, 6]"));
    }
    if self.sample_size == 0 {
      return Err(EngineError::config("sample size must be greater than 0"));
    }
    if self.auto_refresh && self.refresh_interval_secs == 0 {
      return Err(EngineError::config(
        "refresh interval must be greater than 0 when auto-refresh is on",
      ));
    }
    Ok(())
  }
}

// ---------------------------------------------------------------------------
// Startup configuration (JSON file consumed by the binaries)
// ---------------------------------------------------------------------------

/// Per-parameter specification limits in either explicit-bounds or
/// target ± tolerance form.
#[derive(Debug, Clone, Deserialize)]
pub struct SpecLimitEntry {
  pub parameter_id: String,
  #[serde(default)]
  pub usl: Option<f64>,
  #[serde(default)]
  pub lsl: Option<f64>,
  #[serde(default)]
  pub target: Option<f64>,
  #[serde(default)]
  pub tolerance_plus: Option<f64>,
  #[serde(default)]
  pub tolerance_minus: Option<f64>,
}

impl SpecLimitEntry {
  pub fn to_limits(&self) -> Result<crate::capability::SpecLimits, EngineError> {
    use crate::capability::SpecLimits;
    match (self.target, self.tolerance_plus, self.tolerance_minus) {
      (Some(t), Some(plus), Some(minus)) => SpecLimits::from_target(t, plus, minus),
      _ => match (self.usl, self.lsl) {
        (Some(usl), Some(lsl)) => SpecLimits::from_bounds(usl, lsl),
        _ => Err(EngineError::config(format!(
          "spec limits for {} need usl+lsl or target+tolerances",
          self.parameter_id
        ))),
      },
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChartEntry {
  pub parameter_id: String,
  #[serde(flatten)]
  pub settings: ChartSettings,
}

/// Optional JSON config applied at startup by both binaries.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StartupConfig {
  #[serde(default)]
  pub thresholds: Vec<crate::threshold::ThresholdConfig>,
  #[serde(default)]
  pub spec_limits: Vec<SpecLimitEntry>,
  #[serde(default)]
  pub chart_settings: Vec<ChartEntry>,
}

impl StartupConfig {
  pub fn from_json(json: &str) -> Result<Self, EngineError> {
    Ok(serde_json::from_str(json)?)
  }
}
