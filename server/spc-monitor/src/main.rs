//! Binary entrypoint for the SPC monitor service.
//!
//! Reads InboundReading JSON lines from stdin and writes outcome/error JSON
//! lines to stdout, with a background escalation sweep. An optional first
//! argument names the same JSON startup config the core binary accepts.
//!
//! Environment:
//! - `ESCALATION_SWEEP_SECS` — sweep interval (default 60)
//! - `RUST_LOG` — operational log level (env_logger)

use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

use spc_engine::config::StartupConfig;
use spc_engine::types::ErrorOutput;
use spc_engine::{EngineConfig, EngineError, InboundReading};
use spc_monitor::{BroadcastPublisher, Gateway, LogNotifier, MemoryRepository};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  env_logger::init();

  let sweep_secs: u64 = std::env::var("ESCALATION_SWEEP_SECS")
    .unwrap_or_else(|_| "60".into())
    .parse()
    .expect("ESCALATION_SWEEP_SECS must be a valid u64");

  let repository = Arc::new(MemoryRepository::new());
  let gateway = Arc::new(Gateway::new(
    EngineConfig::default(),
    repository,
    Arc::new(LogNotifier),
    Arc::new(BroadcastPublisher::new(256)),
  ));

  if let Some(path) = std::env::args().nth(1) {
    let json = std::fs::read_to_string(&path)?;
    let startup = StartupConfig::from_json(&json)?;
    gateway.apply_startup(&startup).await?;
  }

  // External timer: the engine never self-schedules its escalation check.
  let sweeper = gateway.clone();
  tokio::spawn(async move {
    let mut tick = tokio::time::interval(Duration::from_secs(sweep_secs));
    tick.tick().await; // first tick fires immediately; skip it
    loop {
      tick.tick().await;
      let escalated = sweeper.escalation_sweep().await;
      if !escalated.is_empty() {
        log::info!("escalated {} overdue alert(s)", escalated.len());
      }
    }
  });

  let mut lines = BufReader::new(tokio::io::stdin()).lines();
  while let Some(line) = lines.next_line().await? {
    let trimmed = line.trim();
    if trimmed.is_empty() {
      continue;
    }

    let raw: InboundReading = match serde_json::from_str(trimmed) {
      Ok(v) => v,
      Err(e) => {
        let err = ErrorOutput::new(format!("json parse: {}", e));
        println!("{}", serde_json::to_string(&err)?);
        continue;
      }
    };

    match gateway.submit(&raw).await {
      Ok(outcome) => println!("{}", serde_json::to_string(&outcome)?),
      Err(e) => {
        let err = match &e {
          EngineError::Validation { field, reason } => {
            ErrorOutput::new(reason.clone()).with_field(field.clone())
          }
          _ => ErrorOutput::new(e.to_string()),
        };
        println!("{}", serde_json::to_string(&err)?);
      }
    }
  }

  Ok(())
}
