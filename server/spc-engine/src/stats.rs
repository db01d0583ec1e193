//! Rolling per-parameter statistics: bounded window, x-bar, subgroup range,
//! moving range, sample standard deviation.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;

use crate::types::Baseline;

/// Bounded ordered window of the most recent valid values for one parameter.
/// Appending beyond capacity evicts the oldest value.
#[derive(Debug, Clone)]
pub struct Window {
  values: VecDeque<f64>,
  capacity: usize,
  subgroup: usize,
  last_updated: Option<DateTime<Utc>>,
}

impl Window {
  pub fn new(capacity: usize, subgroup: usize) -> Self {
    Self {
      values: VecDeque::with_capacity(capacity),
      capacity,
      subgroup,
      last_updated: None,
    }
  }

  /// Append one valid value, evicting the oldest when full.
  pub fn push(&mut self, value: f64, at: DateTime<Utc>) {
    if self.values.len() == self.capacity {
      self.values.pop_front();
    }
    self.values.push_back(value);
    self.last_updated = Some(at);
  }

  pub fn len(&self) -> usize {
    self.values.len()
  }

  pub fn is_empty(&self) -> bool {
    self.values.is_empty()
  }

  pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
    self.values.iter().copied()
  }

  /// Arithmetic mean over the full window.
  pub fn x_bar(&self) -> f64 {
    if self.values.is_empty() {
      return 0.0;
    }
    self.values.iter().sum::<f64>() / self.values.len() as f64
  }

  /// Subgroup range: max - min over the most recent `subgroup` values only.
  pub fn subgroup_range(&self) -> Option<f64> {
    if self.values.len() < self.subgroup {
      return None;
    }
    let start = self.values.len() - self.subgroup;
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for &v in self.values.iter().skip(start) {
      min = min.min(v);
      max = max.max(v);
    }
    Some(max - min)
  }

  /// Absolute difference between the two most recent values. Only the latest
  /// adjacent difference is retained, not a full moving-range series.
  pub fn moving_range(&self) -> Option<f64> {
    let n = self.values.len();
    if n < 2 {
      return None;
    }
    Some((self.values[n - 1] - self.values[n - 2]).abs())
  }

  /// Sample standard deviation (n-1 denominator) over the full window. This
  /// is the single std-dev form used everywhere, including capability.
  pub fn std_dev(&self) -> Option<f64> {
    let n = self.values.len();
    if n < 2 {
      return None;
    }
    let mean = self.x_bar();
    let variance =
      self.values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / (n - 1) as f64;
    Some(variance.sqrt())
  }

  /// Snapshot the derived statistics.
  pub fn baseline(&self, parameter_id: &str) -> Baseline {
    Baseline {
      parameter_id: parameter_id.to_string(),
      x_bar: self.x_bar(),
      range: self.subgroup_range(),
      moving_range: self.moving_range(),
      std_dev: self.std_dev(),
      sample_size: self.values.len(),
      last_updated: self.last_updated.unwrap_or_else(Utc::now),
    }
  }
}
