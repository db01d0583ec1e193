//! Pub/sub collaborator for real-time update events.

use tokio::sync::broadcast;

use crate::types::{DispatchError, UpdateEvent};

pub trait Publisher: Send + Sync {
  fn publish(&self, event: &UpdateEvent) -> Result<(), DispatchError>;
}

/// Fan-out over a tokio broadcast channel. Lagging or absent subscribers
/// never fail the publish.
#[derive(Debug)]
pub struct BroadcastPublisher {
  tx: broadcast::Sender<UpdateEvent>,
}

impl BroadcastPublisher {
  pub fn new(capacity: usize) -> Self {
    let (tx, _) = broadcast::channel(capacity);
    Self { tx }
  }

  pub fn subscribe(&self) -> broadcast::Receiver<UpdateEvent> {
    self.tx.subscribe()
  }
}

impl Publisher for BroadcastPublisher {
  fn publish(&self, event: &UpdateEvent) -> Result<(), DispatchError> {
    // send() errors only when there are no subscribers; that is not a fault.
    let _ = self.tx.send(event.clone());
    Ok(())
  }
}
