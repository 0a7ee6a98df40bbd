//! The domain event contract consumed by the trigger dispatcher.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Event type names raised by the CRM mutation subsystems.
///
/// A trigger node's subtype is compared against these verbatim.
pub mod event_types {
    pub const RECORD_CREATED: &str = "record_created";
    pub const STATUS_CHANGED: &str = "status_changed";
    pub const TEMPERATURE_CHANGED: &str = "temperature_changed";
    pub const TAG_ADDED: &str = "tag_added";
    pub const TAG_REMOVED: &str = "tag_removed";
    pub const RECORD_ASSIGNED: &str = "record_assigned";
    pub const TASK_COMPLETED: &str = "task_completed";
    pub const BOARD_MOVED: &str = "board_moved";
}

/// A record/task mutation notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainEvent {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub tenant_id: Uuid,
    #[serde(rename = "type")]
    pub event_type: String,
    pub record_id: String,
    /// Subtype-specific details, e.g. `{"fromStatusId": "..", "toStatusId": ".."}`.
    #[serde(default)]
    pub payload: Value,
    pub actor_id: String,
    /// Hop count of the automation run whose action raised this event.
    /// Zero for events raised by people.
    #[serde(default)]
    pub chain_depth: u32,
}

impl DomainEvent {
    pub fn new(
        tenant_id: Uuid,
        event_type: impl Into<String>,
        record_id: impl Into<String>,
        payload: Value,
        actor_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            event_type: event_type.into(),
            record_id: record_id.into(),
            payload,
            actor_id: actor_id.into(),
            chain_depth: 0,
        }
    }

    /// Mark this event as raised by an automation run that had already
    /// visited `depth` nodes.
    pub fn with_chain_depth(mut self, depth: u32) -> Self {
        self.chain_depth = depth;
        self
    }

    /// String field from the payload, `None` when absent or not a string.
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_wire_shape_with_defaults() {
        let tenant = Uuid::new_v4();
        let event: DomainEvent = serde_json::from_value(json!({
            "tenantId": tenant,
            "type": "status_changed",
            "recordId": "rec-1",
            "payload": { "toStatusId": "st-2" },
            "actorId": "user-9"
        }))
        .expect("valid event");

        assert_eq!(event.event_type, event_types::STATUS_CHANGED);
        assert_eq!(event.chain_depth, 0);
        assert_eq!(event.payload_str("toStatusId"), Some("st-2"));
        assert_eq!(event.payload_str("fromStatusId"), None);
    }
}
