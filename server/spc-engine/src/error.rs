//! Structured error types for the SPC engine.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
  #[error("validation: {field}: {reason}")]
  Validation { field: String, reason: String },

  #[error("config: {reason}")]
  Config { reason: String },

  #[error("unknown alert: {0}")]
  UnknownAlert(String),

  #[error("alert {0} is already resolved")]
  AlertResolved(String),

  #[error("json: {0}")]
  Json(#[from] serde_json::Error),
}

impl EngineError {
  pub fn validation(field: &str, reason: &str) -> Self {
    Self::Validation {
      field: field.to_string(),
      reason: reason.to_string(),
    }
  }

  pub fn config(reason: impl Into<String>) -> Self {
    Self::Config {
      reason: reason.into(),
    }
  }
}
