// ============================================================================
// Message Identifiers
// ============================================================================
//
// Every message gets a ULID: 48-bit millisecond timestamp followed by 80 bits
// of randomness, rendered as 26 characters of Crockford base32. Identifiers
// created later sort lexically after earlier ones.
//
// ============================================================================

use std::fmt;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use ulid::{Generator, Ulid};

/// Length of the textual form of a [`MessageId`]
pub const MESSAGE_ID_LEN: usize = 26;

/// Sortable unique message identifier (ULID, 26 characters)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MessageId(String);

impl MessageId {
    /// Parse and validate an identifier received from a client or the store
    ///
    /// # Examples
    /// ```
    /// use relay_types::MessageId;
    ///
    /// let id = MessageId::parse("01ARZ3NDEKTSV4RRFFQ69G5FAV").unwrap();
    /// assert_eq!(id.as_str(), "01ARZ3NDEKTSV4RRFFQ69G5FAV");
    ///
    /// assert!(MessageId::parse("not-an-id").is_err());
    /// ```
    pub fn parse(s: &str) -> Result<Self, MessageIdError> {
        if s.len() != MESSAGE_ID_LEN {
            return Err(MessageIdError::Length(s.len()));
        }
        let ulid = Ulid::from_string(s).map_err(|_| MessageIdError::Encoding(s.to_string()))?;
        Ok(Self(ulid.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Raw bytes of the textual form, used as the broker partition key
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl From<Ulid> for MessageId {
    fn from(ulid: Ulid) -> Self {
        Self(ulid.to_string())
    }
}

impl TryFrom<String> for MessageId {
    type Error = MessageIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<MessageId> for String {
    fn from(id: MessageId) -> Self {
        id.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Errors that can occur when parsing a message ID
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MessageIdError {
    #[error("Message ID must be {MESSAGE_ID_LEN} characters, got {0}")]
    Length(usize),
    #[error("Message ID is not valid Crockford base32: {0}")]
    Encoding(String),
}

/// Source of fresh message identifiers
pub trait IdGenerator: Send + Sync {
    fn generate(&self) -> MessageId;
}

/// ULID generator, monotonic within a single process
///
/// Identifiers generated in the same millisecond increment the random part
/// instead of drawing new randomness, so they still sort in creation order.
pub struct UlidGenerator {
    inner: Mutex<Generator>,
}

impl UlidGenerator {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Generator::new()),
        }
    }
}

impl Default for UlidGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdGenerator for UlidGenerator {
    fn generate(&self) -> MessageId {
        let next = match self.inner.lock() {
            Ok(mut generator) => generator.generate().ok(),
            // a poisoned lock only loses monotonicity; uniqueness still holds
            Err(_) => None,
        };
        // 2^80 ids in one millisecond overflow the monotonic counter
        MessageId::from(next.unwrap_or_else(Ulid::new))
    }
}
