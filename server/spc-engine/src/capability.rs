//! Control limits and process capability indices.
//!
//! Two distinct limit types are exposed and never conflated: derived
//! (statistical) limits from the current window, and configured
//! (specification) limits supplied externally as target ± tolerance or as
//! explicit bounds.

use chrono::{DateTime, Utc};

use crate::error::EngineError;
use crate::stats::Window;
use crate::types::{CapabilityRating, CapabilitySnapshot};

/// Statistical control limits: mean ± σ·std_dev of the current window.
/// `None` until the window has a computable spread.
pub fn derived_limits(window: &Window, sigma_level: f64) -> Option<(f64, f64)> {
  let std_dev = window.std_dev()?;
  let mean = window.x_bar();
  Some((mean + sigma_level * std_dev, mean - sigma_level * std_dev))
}

/// Externally configured specification limits for one parameter.
#[derive(Debug, Clone)]
pub struct SpecLimits {
  pub usl: f64,
  pub lsl: f64,
  pub target: Option<f64>,
}

impl SpecLimits {
  /// Explicit bounds. Rejected unless both are finite and `usl > lsl`.
  pub fn from_bounds(usl: f64, lsl: f64) -> Result<Self, EngineError> {
    if !usl.is_finite() || !lsl.is_finite() {
      return Err(EngineError::config("specification limits must be finite"));
    }
    if usl <= lsl {
      return Err(EngineError::config(
        "upper specification limit must be greater than lower specification limit",
      ));
    }
    Ok(Self {
      usl,
      lsl,
      target: None,
    })
  }

  /// Target ± tolerance form. Tolerances must be positive.
  pub fn from_target(target: f64, tolerance_plus: f64, tolerance_minus: f64) -> Result<Self, EngineError> {
    if !target.is_finite() {
      return Err(EngineError::config("target must be finite"));
    }
    if tolerance_plus <= 0.0 || tolerance_minus <= 0.0 {
      return Err(EngineError::config("tolerance values must be positive"));
    }
    let mut limits = Self::from_bounds(target + tolerance_plus, target - tolerance_minus)?;
    limits.target = Some(target);
    Ok(limits)
  }
}

/// Percentage of values inside the spec band. Returns `None` for an empty
/// sample.
pub fn yield_pct(values: impl Iterator<Item = f64>, spec: &SpecLimits) -> Option<f64> {
  let mut total = 0usize;
  let mut inside = 0usize;
  for v in values {
    total += 1;
    if v >= spec.lsl && v <= spec.usl {
      inside += 1;
    }
  }
  if total == 0 {
    return None;
  }
  Some(inside as f64 / total as f64 * 100.0)
}

/// Compute a capability snapshot for one parameter's window.
///
/// Indices require `sample_size >= min_samples` and a non-zero spread;
/// otherwise the fields stay `None` and the rating is `Pending` (an explicit
/// "not available", never an error). Pp/Ppk use the same formulas over the
/// same window as Cp/Cpk.
pub fn compute(
  parameter_id: &str,
  window: &Window,
  spec: Option<&SpecLimits>,
  min_samples: usize,
  now: DateTime<Utc>,
) -> CapabilitySnapshot {
  let sample_size = window.len();
  let mean = window.x_bar();
  let std_dev = window.std_dev();

  let mut snapshot = CapabilitySnapshot {
    parameter_id: parameter_id.to_string(),
    cp: None,
    cpu: None,
    cpl: None,
    cpk: None,
    pp: None,
    ppk: None,
    mean,
    std_dev,
    sample_size,
    yield_pct: None,
    computed_at: now,
    rating: CapabilityRating::Pending,
  };

  let spec = match spec {
    Some(s) => s,
    None => return snapshot,
  };

  snapshot.yield_pct = yield_pct(window.values(), spec);

  let std_dev = match std_dev {
    Some(s) if s > 0.0 && sample_size >= min_samples => s,
    _ => return snapshot,
  };

  let cp = (spec.usl - spec.lsl) / (6.0 * std_dev);
  let cpu = (spec.usl - mean) / (3.0 * std_dev);
  let cpl = (mean - spec.lsl) / (3.0 * std_dev);
  let cpk = cpu.min(cpl);

  snapshot.cp = Some(cp);
  snapshot.cpu = Some(cpu);
  snapshot.cpl = Some(cpl);
  snapshot.cpk = Some(cpk);
  snapshot.pp = Some(cp);
  snapshot.ppk = Some(cpk);
  snapshot.rating = CapabilityRating::from_cpk(cpk);
  snapshot
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap()
  }

  fn window_with(values: &[f64]) -> Window {
    let mut w = Window::new(30, 5);
    for &v in values {
      w.push(v, now());
    }
    w
  }

  #[test]
  fn spec_limits_reject_inverted_bounds() {
    assert!(SpecLimits::from_bounds(0.0, 10.0).is_err());
    assert!(SpecLimits::from_bounds(10.0, 10.0).is_err());
    assert!(SpecLimits::from_bounds(10.0, 0.0).is_ok());
  }

  #[test]
  fn spec_limits_from_target_and_tolerance() {
    let spec = SpecLimits::from_target(10.0, 0.5, 0.3).unwrap();
    assert!((spec.usl - 10.5).abs() < f64::EPSILON);
    assert!((spec.lsl - 9.7).abs() < f64::EPSILON);
    assert_eq!(spec.target, Some(10.0));
    assert!(SpecLimits::from_target(10.0, 0.0, 0.3).is_err());
    assert!(SpecLimits::from_target(10.0, 0.5, -0.1).is_err());
  }

  #[test]
  fn unavailable_below_minimum_samples_available_at_it() {
    let spec = SpecLimits::from_bounds(10.0, 0.0).unwrap();
    let mut values: Vec<f64> = (0..9).map(|i| 4.0 + (i % 3) as f64).collect();

    let snapshot = compute("p", &window_with(&values), Some(&spec), 10, now());
    assert_eq!(snapshot.sample_size, 9);
    assert!(snapshot.cpk.is_none());
    assert_eq!(snapshot.rating, CapabilityRating::Pending);

    values.push(5.0);
    let snapshot = compute("p", &window_with(&values), Some(&spec), 10, now());
    assert_eq!(snapshot.sample_size, 10);
    assert!(snapshot.cpk.is_some());
  }

  #[test]
  fn centered_process_scores_excellent() {
    // Mean 5, sample std dev exactly 1.0 against usl=10, lsl=0.
    // Eight alternating 4/6 readings contribute 8 to the squared deviation
    // sum; the final symmetric pair at 5 ∓ sqrt(0.5) brings it to 9, so the
    // sample variance over n-1 = 9 is exactly 1.
    let d = 0.5f64.sqrt();
    let values = [4.0, 6.0, 4.0, 6.0, 4.0, 6.0, 4.0, 6.0, 5.0 - d, 5.0 + d];
    let w = window_with(&values);
    assert!((w.x_bar() - 5.0).abs() < 1e-9);
    assert!((w.std_dev().unwrap() - 1.0).abs() < 1e-9);

    let spec = SpecLimits::from_bounds(10.0, 0.0).unwrap();
    let snapshot = compute("p", &w, Some(&spec), 10, now());
    let cp = snapshot.cp.unwrap();
    let cpk = snapshot.cpk.unwrap();
    assert!((cp - 1.667).abs() < 1e-3, "cp was {}", cp);
    assert!((cpk - 1.667).abs() < 1e-3, "cpk was {}", cpk);
    assert!((snapshot.cpu.unwrap() - snapshot.cpl.unwrap()).abs() < 1e-9);
    assert_eq!(snapshot.rating, CapabilityRating::Excellent);
    assert_eq!(snapshot.rating.label(), "Excellent capability");
  }

  #[test]
  fn cpk_is_min_of_cpu_and_cpl() {
    // Off-center process: mean pulled toward the upper limit.
    let values = [7.0, 9.0, 7.0, 9.0, 7.0, 9.0, 7.0, 9.0, 7.0, 9.0];
    let spec = SpecLimits::from_bounds(10.0, 0.0).unwrap();
    let snapshot = compute("p", &window_with(&values), Some(&spec), 10, now());
    assert!(snapshot.cpu.unwrap() < snapshot.cpl.unwrap());
    assert!((snapshot.cpk.unwrap() - snapshot.cpu.unwrap()).abs() < 1e-12);
  }

  #[test]
  fn zero_spread_keeps_indices_unavailable() {
    let values = [5.0; 12];
    let spec = SpecLimits::from_bounds(10.0, 0.0).unwrap();
    let snapshot = compute("p", &window_with(&values), Some(&spec), 10, now());
    assert!(snapshot.cpk.is_none());
    assert_eq!(snapshot.rating, CapabilityRating::Pending);
    // Yield is still reported.
    assert!((snapshot.yield_pct.unwrap() - 100.0).abs() < f64::EPSILON);
  }

  #[test]
  fn yield_counts_values_inside_spec() {
    let values = [1.0, 2.0, 3.0, 11.0];
    let spec = SpecLimits::from_bounds(10.0, 0.0).unwrap();
    let snapshot = compute("p", &window_with(&values), Some(&spec), 10, now());
    assert!((snapshot.yield_pct.unwrap() - 75.0).abs() < f64::EPSILON);
  }

  #[test]
  fn derived_limits_use_sigma_level() {
    let w = window_with(&[4.0, 6.0, 4.0, 6.0]);
    let (ucl, lcl) = derived_limits(&w, 3.0).unwrap();
    assert!(ucl > lcl);
    assert!((ucl + lcl - 2.0 * w.x_bar()).abs() < 1e-12);
  }
}
