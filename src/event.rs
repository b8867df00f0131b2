use serde::Serialize;
use tokio::sync::mpsc;

use crate::sync::EntityType;

/// Events produced by sync operations for the presentation layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SyncEvent {
  /// A failure the user should see
  Error { entity: EntityType, message: String },
  /// A pull-to-refresh finished, whatever its outcome
  RefreshComplete { entity: EntityType },
}

/// Receiving end of the sync event channel
pub struct EventHandler {
  tx: mpsc::UnboundedSender<SyncEvent>,
  rx: mpsc::UnboundedReceiver<SyncEvent>,
}

impl EventHandler {
  pub fn new() -> Self {
    let (tx, rx) = mpsc::unbounded_channel();
    Self { tx, rx }
  }

  /// Sender handed to each sync operation
  pub fn sender(&self) -> mpsc::UnboundedSender<SyncEvent> {
    self.tx.clone()
  }

  /// Take every event queued so far without waiting
  pub fn drain(&mut self) -> Vec<SyncEvent> {
    let mut events = Vec::new();
    while let Ok(event) = self.rx.try_recv() {
      events.push(event);
    }
    events
  }
}

impl Default for EventHandler {
  fn default() -> Self {
    Self::new()
  }
}
