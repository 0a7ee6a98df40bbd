//! Unbounded in-process event bus.
//!
//! The sender half is cheap to clone and is handed to every mutation
//! subsystem. Sending is synchronous and never waits on the consumer, so a
//! slow or failing automation can't hold up the request that raised the event.

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{DomainEvent, QueueError};

/// Create a connected bus / stream pair.
pub fn channel() -> (EventBus, EventStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventBus { tx }, EventStream { rx })
}

/// Producer side of the domain event queue.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: mpsc::UnboundedSender<DomainEvent>,
}

impl EventBus {
    /// Queue an event. Failures are logged and swallowed.
    pub fn emit(&self, event: DomainEvent) {
        if let Err(e) = self.try_emit(event) {
            warn!("{e}");
        }
    }

    /// Queue an event, reporting whether the consumer is still alive.
    pub fn try_emit(&self, event: DomainEvent) -> Result<(), QueueError> {
        let id = event.id;
        debug!(event_id = %id, event_type = %event.event_type, "emitting domain event");
        self.tx.send(event).map_err(|_| QueueError::Closed(id))
    }

    /// Build and queue an event from its parts; returns the event id.
    pub fn emit_parts(
        &self,
        tenant_id: Uuid,
        event_type: &str,
        record_id: &str,
        payload: Value,
        actor_id: &str,
    ) -> Uuid {
        let event = DomainEvent::new(tenant_id, event_type, record_id, payload, actor_id);
        let id = event.id;
        self.emit(event);
        id
    }
}

/// Consumer side of the domain event queue.
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<DomainEvent>,
}

impl EventStream {
    /// Wait for the next event. `None` once every [`EventBus`] is dropped.
    pub async fn recv(&mut self) -> Option<DomainEvent> {
        self.rx.recv().await
    }

    /// Take the next already-queued event without waiting.
    pub fn try_recv(&mut self) -> Option<DomainEvent> {
        self.rx.try_recv().ok()
    }
}
