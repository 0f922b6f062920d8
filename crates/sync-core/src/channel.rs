use tokio::sync::broadcast;

use crate::types::BackendEvent;

/// Broadcast event stream type used by event-feed subscribers.
pub type EventStream = broadcast::Receiver<BackendEvent>;

/// Fan-out sender for backend notifications.
#[derive(Clone, Debug)]
pub struct EventFeed {
    event_tx: broadcast::Sender<BackendEvent>,
}

impl EventFeed {
    pub fn new(buffer: usize) -> Self {
        let (event_tx, _) = broadcast::channel(buffer.max(1));
        Self { event_tx }
    }

    /// Subscribe to emitted backend events.
    pub fn subscribe(&self) -> EventStream {
        self.event_tx.subscribe()
    }

    /// Emit an event to all subscribers.
    ///
    /// Emission is best-effort; lagged subscribers are handled by `broadcast`.
    pub fn emit(&self, event: BackendEvent) {
        let _ = self.event_tx.send(event);
    }
}

impl Default for EventFeed {
    fn default() -> Self {
        Self::new(256)
    }
}
