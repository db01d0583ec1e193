//! Threshold configuration and the per-parameter control state machine,
//! plus the independent specification-compliance check.

use serde::Deserialize;

use crate::error::EngineError;
use crate::types::{ControlState, SpecCompliance};

fn default_scaling() -> f64 {
  1.0
}

/// Alarm/warning bounds plus raw-signal scaling for one parameter.
///
/// Ordering invariants are enforced by [`ThresholdConfig::validate`] at write
/// time; a violating config is rejected, never silently reordered.
#[derive(Debug, Clone, Deserialize)]
pub struct ThresholdConfig {
  pub parameter_id: String,
  #[serde(default)]
  pub upper_alarm: Option<f64>,
  #[serde(default)]
  pub upper_warning: Option<f64>,
  #[serde(default)]
  pub lower_warning: Option<f64>,
  #[serde(default)]
  pub lower_alarm: Option<f64>,
  #[serde(default = "default_scaling")]
  pub scaling_factor: f64,
  #[serde(default)]
  pub offset: f64,
}

impl ThresholdConfig {
  /// Bounds-free config that still applies scaling.
  pub fn passthrough(parameter_id: &str) -> Self {
    Self {
      parameter_id: parameter_id.to_string(),
      upper_alarm: None,
      upper_warning: None,
      lower_warning: None,
      lower_alarm: None,
      scaling_factor: 1.0,
      offset: 0.0,
    }
  }

  pub fn validate(&self) -> Result<(), EngineError> {
    for (name, bound) in [
      ("upper_alarm", self.upper_alarm),
      ("upper_warning", self.upper_warning),
      ("lower_warning", self.lower_warning),
      ("lower_alarm", self.lower_alarm),
    ] {
      if let Some(v) = bound {
        if !v.is_finite() {
          return Err(EngineError::config(format!("{} must be finite", name)));
        }
      }
    }
    if !self.scaling_factor.is_finite() || self.scaling_factor == 0.0 {
      return Err(EngineError::config("scaling factor cannot be zero"));
    }
    if !self.offset.is_finite() {
      return Err(EngineError::config("offset must be finite"));
    }
    if let (Some(ua), Some(uw)) = (self.upper_alarm, self.upper_warning) {
      if ua <= uw {
        return Err(EngineError::config(
          "upper alarm threshold must be greater than upper warning threshold",
        ));
      }
    }
    if let (Some(la), Some(lw)) = (self.lower_alarm, self.lower_warning) {
      if la >= lw {
        return Err(EngineError::config(
          "lower alarm threshold must be less than lower warning threshold",
        ));
      }
    }
    if let (Some(uw), Some(lw)) = (self.upper_warning, self.lower_warning) {
      if uw <= lw {
        return Err(EngineError::config(
          "upper warning threshold must be greater than lower warning threshold",
        ));
      }
    }
    if let (Some(ua), Some(la)) = (self.upper_alarm, self.lower_alarm) {
      if ua <= la {
        return Err(EngineError::config(
          "upper alarm threshold must be greater than lower alarm threshold",
        ));
      }
    }
    Ok(())
  }

  /// Apply raw-signal scaling: `value * scaling_factor + offset`.
  pub fn apply_scaling(&self, raw: f64) -> f64 {
    raw * self.scaling_factor + self.offset
  }

  /// Evaluate the control state for one (already scaled) value. Alarm bounds
  /// take strict priority over warning bounds.
  pub fn evaluate(&self, value: f64) -> ControlState {
    if matches!(self.upper_alarm, Some(ua) if value >= ua) {
      return ControlState::Alarm;
    }
    if matches!(self.lower_alarm, Some(la) if value <= la) {
      return ControlState::Alarm;
    }
    if matches!(self.upper_warning, Some(uw) if value >= uw) {
      return ControlState::Warning;
    }
    if matches!(self.lower_warning, Some(lw) if value <= lw) {
      return ControlState::Warning;
    }
    ControlState::Normal
  }
}

/// Pass/fail against specification limits. Computed alongside the control
/// state but never merged with it.
pub fn spec_compliance(value: f64, usl: Option<f64>, lsl: Option<f64>) -> SpecCompliance {
  if usl.is_none() && lsl.is_none() {
    return SpecCompliance::NotEvaluated;
  }
  if matches!(usl, Some(u) if value > u) || matches!(lsl, Some(l) if value < l) {
    return SpecCompliance::Fail;
  }
  SpecCompliance::Pass
}

/// Deviation from the spec-band center as a percentage of the half-band.
/// Inside the limits this is 0..=100; outside it keeps growing past 100.
/// Requires both limits.
pub fn deviation_pct(value: f64, usl: Option<f64>, lsl: Option<f64>) -> Option<f64> {
  let (usl, lsl) = (usl?, lsl?);
  let half_band = (usl - lsl) / 2.0;
  if half_band <= 0.0 {
    return None;
  }
  let center = (usl + lsl) / 2.0;
  Some((value - center).abs() / half_band * 100.0)
}
