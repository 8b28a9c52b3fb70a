// ============================================================================
// Message Record and Request Validation
// ============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::id::MessageId;

/// Topic used when a request omits one
pub const DEFAULT_TOPIC: &str = "test-topic";

/// Longest topic name the broker accepts
pub const MAX_TOPIC_LEN: usize = 249;

/// A persisted message
///
/// Serializes to the wire shape `{id, topic, message, created_at, updated_at}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub topic: String,
    #[serde(rename = "message")]
    pub payload: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Payload as it arrives from a client: either a JSON-encoded string or an
/// already structured document.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum PayloadInput {
    Raw(String),
    Structured(Value),
}

impl PayloadInput {
    /// Normalize to a structured document
    ///
    /// Numbers keep their textual form, so integers wider than 64 bits and
    /// long decimals come back exactly as sent.
    pub fn into_document(self) -> Result<Value, ValidationError> {
        let document = match self {
            PayloadInput::Raw(raw) if raw.trim().is_empty() => {
                return Err(ValidationError::MissingPayload);
            }
            PayloadInput::Raw(raw) => {
                serde_json::from_str(&raw).map_err(|_| ValidationError::MalformedPayload)?
            }
            PayloadInput::Structured(Value::Null) => return Err(ValidationError::MissingPayload),
            PayloadInput::Structured(value) => value,
        };

        if contains_nul(&document) {
            return Err(ValidationError::UnstorablePayload);
        }
        Ok(document)
    }
}

/// JSONB cannot hold U+0000 in a string or an object key
fn contains_nul(value: &Value) -> bool {
    match value {
        Value::String(s) => s.contains('\0'),
        Value::Array(items) => items.iter().any(contains_nul),
        Value::Object(map) => map
            .iter()
            .any(|(key, item)| key.contains('\0') || contains_nul(item)),
        _ => false,
    }
}

/// Body of create and update requests
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageRequest {
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub message: Option<PayloadInput>,
}

/// A request that passed validation: the topic is resolved and the payload
/// is a structured document.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidMessage {
    pub topic: String,
    pub payload: Value,
}

impl MessageRequest {
    pub fn new(topic: Option<&str>, message: Value) -> Self {
        Self {
            topic: topic.map(str::to_string),
            message: Some(PayloadInput::Structured(message)),
        }
    }

    /// Validate the payload first, then resolve the topic
    pub fn validate(self) -> Result<ValidMessage, ValidationError> {
        let payload = self
            .message
            .ok_or(ValidationError::MissingPayload)?
            .into_document()?;
        let topic = resolve_topic(self.topic.as_deref())?;
        Ok(ValidMessage { topic, payload })
    }
}

/// Apply the default topic and check the name is usable as a broker topic
pub fn resolve_topic(topic: Option<&str>) -> Result<String, ValidationError> {
    let topic = match topic {
        Some(t) if !t.is_empty() => t,
        _ => DEFAULT_TOPIC,
    };

    if topic.len() > MAX_TOPIC_LEN {
        return Err(ValidationError::InvalidTopic(format!(
            "topic exceeds {} characters",
            MAX_TOPIC_LEN
        )));
    }
    if topic == "." || topic == ".." {
        return Err(ValidationError::InvalidTopic(format!(
            "'{}' is not a valid topic",
            topic
        )));
    }
    if let Some(bad) = topic
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
    {
        return Err(ValidationError::InvalidTopic(format!(
            "topic contains illegal character '{}'",
            bad
        )));
    }

    Ok(topic.to_string())
}

/// Request validation failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Message is required")]
    MissingPayload,
    #[error("Message must be valid JSON")]
    MalformedPayload,
    #[error("Message must not contain NUL characters")]
    UnstorablePayload,
    #[error("Invalid topic: {0}")]
    InvalidTopic(String),
}
