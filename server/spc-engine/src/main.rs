//! Binary entrypoint: read JSON lines from stdin, write JSON lines to stdout.
//!
//! Each input line is an InboundReading. Output lines are either:
//! - A ReadingOutcome (status, rolling stats, control state, alert id)
//! - An ErrorOutput (when input validation fails)
//!
//! An optional first argument names a JSON startup config with threshold
//! bounds, spec limits, and chart settings.

use spc_engine::config::StartupConfig;
use spc_engine::types::ErrorOutput;
use spc_engine::{Engine, EngineError, InboundReading};
use std::io::{self, BufRead, Write};

fn main() {
  let mut engine = Engine::with_defaults();

  if let Some(path) = std::env::args().nth(1) {
    let json = match std::fs::read_to_string(&path) {
      Ok(s) => s,
      Err(e) => {
        eprintln!("spc-engine: cannot read config {}: {}", path, e);
        std::process::exit(1);
      }
    };
    let startup = match StartupConfig::from_json(&json) {
      Ok(c) => c,
      Err(e) => {
        eprintln!("spc-engine: bad config {}: {}", path, e);
        std::process::exit(1);
      }
    };
    if let Err(e) = engine.apply_startup(&startup) {
      eprintln!("spc-engine: config rejected: {}", e);
      std::process::exit(1);
    }
  }

  let stdin = io::stdin();
  let stdout = io::stdout();
  let mut out = io::BufWriter::new(stdout.lock());

  for line in stdin.lock().lines() {
    let line = match line {
      Ok(l) => l,
      Err(e) => {
        let _ = writeln!(io::stderr(), "spc-engine: read error: {}", e);
        std::process::exit(1);
      }
    };

    // Skip blank lines.
    let trimmed = line.trim();
    if trimmed.is_empty() {
      continue;
    }

    // Parse inbound reading.
    let raw: InboundReading = match serde_json::from_str(trimmed) {
      Ok(v) => v,
      Err(e) => {
        let err = ErrorOutput::new(format!("json parse: {}", e));
        let _ = serde_json::to_writer(&mut out, &err);
        let _ = writeln!(out);
        continue;
      }
    };

    // Process through engine.
    match engine.process(&raw) {
      Ok(outcome) => {
        let _ = serde_json::to_writer(&mut out, &outcome);
        let _ = writeln!(out);
      }
      Err(e) => {
        let err = match &e {
          EngineError::Validation { field, reason } => {
            ErrorOutput::new(reason.clone()).with_field(field.clone())
          }
          _ => ErrorOutput::new(e.to_string()),
        };
        let _ = serde_json::to_writer(&mut out, &err);
        let _ = writeln!(out);
      }
    }
  }

  let _ = out.flush();
}
