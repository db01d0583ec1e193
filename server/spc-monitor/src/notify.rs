//! Alert notification dispatch: fire-and-forget with bounded retry.

use log::{error, info, warn};
use spc_engine::types::AlertRecord;
use std::sync::Arc;
use std::time::Duration;

use crate::types::DispatchError;

/// Delivers one alert to the named channels. Implementations may block; the
/// gateway always calls this off the hot path.
pub trait Notifier: Send + Sync {
  fn send(&self, alert: &AlertRecord, channels: &[String]) -> Result<(), DispatchError>;
}

/// Reference notifier: writes alerts to the operational log.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
  fn send(&self, alert: &AlertRecord, channels: &[String]) -> Result<(), DispatchError> {
    info!(
      "alert {} [{:?}/{:?}] -> {}: {}",
      alert.id,
      alert.severity,
      alert.status,
      channels.join(","),
      alert.message
    );
    Ok(())
  }
}

/// Bounded retry with doubling backoff and a per-attempt timeout.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
  pub max_attempts: u32,
  pub backoff: Duration,
  pub timeout: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_attempts: 3,
      backoff: Duration::from_millis(200),
      timeout: Duration::from_secs(2),
    }
  }
}

/// Deliver one alert, retrying transient failures. A slow or failing channel
/// cannot create ingestion backpressure: callers spawn this and move on.
pub async fn dispatch_with_retry(
  notifier: Arc<dyn Notifier>,
  alert: AlertRecord,
  channels: Vec<String>,
  policy: RetryPolicy,
) -> Result<(), DispatchError> {
  let mut backoff = policy.backoff;
  for attempt in 1..=policy.max_attempts {
    let n = notifier.clone();
    let a = alert.clone();
    let ch = channels.clone();
    let send = tokio::task::spawn_blocking(move || n.send(&a, &ch));
    match tokio::time::timeout(policy.timeout, send).await {
      Ok(Ok(Ok(()))) => return Ok(()),
      Ok(Ok(Err(e))) => warn!("alert {} dispatch attempt {}: {}", alert.id, attempt, e),
      Ok(Err(e)) => warn!("alert {} dispatch attempt {} aborted: {}", alert.id, attempt, e),
      Err(_) => warn!("alert {} dispatch attempt {} timed out", alert.id, attempt),
    }
    if attempt < policy.max_attempts {
      tokio::time::sleep(backoff).await;
      backoff *= 2;
    }
  }
  error!(
    "alert {} dispatch gave up after {} attempts",
    alert.id, policy.max_attempts
  );
  Err(DispatchError::RetriesExhausted)
}
