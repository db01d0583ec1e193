//! Normalize inbound readings into canonical Reading models.

use chrono::{DateTime, Utc};

use crate::config::OutOfOrderPolicy;
use crate::error::EngineError;
use crate::threshold::ThresholdConfig;
use crate::types::{InboundReading, Reading, ReadingStatus};

/// Parse and validate an InboundReading into a canonical Reading.
///
/// Rejections are synchronous and cause no mutation anywhere. On success the
/// value has raw-signal scaling applied (when a threshold config exists) and
/// the status is `Pending` until the engine classifies it.
pub fn normalize(
  raw: &InboundReading,
  threshold: Option<&ThresholdConfig>,
  now: DateTime<Utc>,
  last_accepted: Option<DateTime<Utc>>,
  out_of_order: OutOfOrderPolicy,
) -> Result<Reading, EngineError> {
  if raw.parameter_id.is_empty() {
    return Err(EngineError::validation("parameter_id", "must not be empty"));
  }
  if raw.station_id.is_empty() {
    return Err(EngineError::validation("station_id", "must not be empty"));
  }
  if raw.sensor_id.is_empty() {
    return Err(EngineError::validation("sensor_id", "must not be empty"));
  }

  if !raw.value.is_finite() {
    return Err(EngineError::validation(
      "value",
      "must be a finite number",
    ));
  }

  let timestamp: DateTime<Utc> = DateTime::parse_from_rfc3339(&raw.timestamp)
    .map_err(|e| EngineError::validation("timestamp", &format!("invalid RFC3339: {}", e)))?
    .with_timezone(&Utc);

  if timestamp > now {
    return Err(EngineError::validation(
      "timestamp",
      "cannot be in the future",
    ));
  }

  if out_of_order == OutOfOrderPolicy::Reject {
    if let Some(last) = last_accepted {
      if timestamp < last {
        return Err(EngineError::validation(
          "timestamp",
          "older than the last accepted reading for this parameter",
        ));
      }
    }
  }

  check_limit_pair(
    "control_limit",
    raw.upper_control_limit,
    raw.lower_control_limit,
  )?;
  check_limit_pair("spec_limit", raw.upper_spec_limit, raw.lower_spec_limit)?;

  let value = match threshold {
    Some(cfg) => cfg.apply_scaling(raw.value),
    None => raw.value,
  };

  Ok(Reading {
    parameter_id: raw.parameter_id.clone(),
    station_id: raw.station_id.clone(),
    sensor_id: raw.sensor_id.clone(),
    value,
    timestamp,
    unit: raw.unit.clone(),
    upper_control_limit: raw.upper_control_limit,
    lower_control_limit: raw.lower_control_limit,
    upper_spec_limit: raw.upper_spec_limit,
    lower_spec_limit: raw.lower_spec_limit,
    status: ReadingStatus::Pending,
  })
}

fn check_limit_pair(field: &str, upper: Option<f64>, lower: Option<f64>) -> Result<(), EngineError> {
  for v in [upper, lower].into_iter().flatten() {
    if !v.is_finite() {
      return Err(EngineError::validation(field, "limits must be finite"));
    }
  }
  if let (Some(u), Some(l)) = (upper, lower) {
    if u <= l {
      return Err(EngineError::validation(
        field,
        "upper limit must be greater than lower limit",
      ));
    }
  }
  Ok(())
}
