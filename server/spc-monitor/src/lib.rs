//! LineScope SPC Monitor
//!
//! Concurrent ingestion service around the SPC engine core: per-parameter
//! serialized state behind keyed async locks, storage-agnostic repository,
//! fire-and-forget alert dispatch with bounded retry, real-time update
//! publishing, and a timer-driven escalation sweep.

pub mod context;
pub mod gateway;
pub mod notify;
pub mod publish;
pub mod repository;
pub mod types;

pub use context::{ContextLookup, StaticContextLookup};
pub use gateway::Gateway;
pub use notify::{LogNotifier, Notifier, RetryPolicy};
pub use publish::{BroadcastPublisher, Publisher};
pub use repository::{MemoryRepository, Repository};
pub use types::{DispatchError, ProductionContext, StoredReading, UpdateEvent};
