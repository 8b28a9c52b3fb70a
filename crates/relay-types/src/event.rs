// ============================================================================
// Broker Events
// ============================================================================
//
// One event per mutation. The record key is the message id; the value is a
// JSON object tagged with an explicit `action`:
//
//   {"action":"CREATE","id":"01H...","data":{...}}
//   {"action":"UPDATE","id":"01H...","data":{...}}
//   {"action":"DELETE","id":"01H..."}
//
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::id::MessageId;
use crate::message::Message;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventAction {
    Create,
    Update,
    Delete,
}

impl EventAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventAction::Create => "CREATE",
            EventAction::Update => "UPDATE",
            EventAction::Delete => "DELETE",
        }
    }
}

impl fmt::Display for EventAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JSON value of a broker record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "UPPERCASE")]
pub enum EventBody {
    Create { id: MessageId, data: Value },
    Update { id: MessageId, data: Value },
    Delete { id: MessageId },
}

/// A change event ready to be published
#[derive(Debug, Clone, PartialEq)]
pub struct MessageEvent {
    pub body: EventBody,
}

impl MessageEvent {
    pub fn created(record: &Message) -> Self {
        Self {
            body: EventBody::Create {
                id: record.id.clone(),
                data: record.payload.clone(),
            },
        }
    }

    pub fn updated(record: &Message) -> Self {
        Self {
            body: EventBody::Update {
                id: record.id.clone(),
                data: record.payload.clone(),
            },
        }
    }

    pub fn deleted(id: &MessageId) -> Self {
        Self {
            body: EventBody::Delete { id: id.clone() },
        }
    }

    /// Record key; equals the message id
    pub fn key(&self) -> &MessageId {
        match &self.body {
            EventBody::Create { id, .. }
            | EventBody::Update { id, .. }
            | EventBody::Delete { id } => id,
        }
    }

    pub fn action(&self) -> EventAction {
        match self.body {
            EventBody::Create { .. } => EventAction::Create,
            EventBody::Update { .. } => EventAction::Update,
            EventBody::Delete { .. } => EventAction::Delete,
        }
    }

    /// Payload carried by the event, if any
    pub fn data(&self) -> Option<&Value> {
        match &self.body {
            EventBody::Create { data, .. } | EventBody::Update { data, .. } => Some(data),
            EventBody::Delete { .. } => None,
        }
    }

    /// Serialized record value
    pub fn encode(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(&self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn record() -> Message {
        let now = Utc::now();
        Message {
            id: MessageId::parse("01ARZ3NDEKTSV4RRFFQ69G5FAV").unwrap(),
            topic: "orders".to_string(),
            payload: json!({"sku": "X1"}),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_every_action_is_tagged_explicitly() {
        let record = record();

        let decode = |event: MessageEvent| -> Value {
            serde_json::from_slice(&event.encode().unwrap()).unwrap()
        };

        let created = decode(MessageEvent::created(&record));
        assert_eq!(
            created,
            json!({"action": "CREATE", "id": "01ARZ3NDEKTSV4RRFFQ69G5FAV", "data": {"sku": "X1"}})
        );

        let updated = decode(MessageEvent::updated(&record));
        assert_eq!(updated["action"], "UPDATE");
        assert_eq!(updated["data"], json!({"sku": "X1"}));

        let deleted = decode(MessageEvent::deleted(&record.id));
        assert_eq!(
            deleted,
            json!({"action": "DELETE", "id": "01ARZ3NDEKTSV4RRFFQ69G5FAV"})
        );
    }

    #[test]
    fn test_key_and_action_accessors() {
        let record = record();
        let event = MessageEvent::deleted(&record.id);

        assert_eq!(event.key(), &record.id);
        assert_eq!(event.action(), EventAction::Delete);
        assert!(event.data().is_none());
        assert_eq!(MessageEvent::updated(&record).data(), Some(&record.payload));
    }

    #[test]
    fn test_event_body_decodes_for_consumers() {
        let body: EventBody = serde_json::from_value(
            json!({"action": "UPDATE", "id": "01ARZ3NDEKTSV4RRFFQ69G5FAV", "data": [1, 2]}),
        )
        .unwrap();
        assert!(matches!(body, EventBody::Update { ref data, .. } if data == &json!([1, 2])));
    }
}
