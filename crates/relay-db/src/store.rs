use async_trait::async_trait;
use relay_error::AppError;
use relay_types::{Message, MessageId};
use serde_json::Value;

/// Durable keyed storage for messages
///
/// Lookups that miss return `Ok(None)`; callers decide whether that is a
/// not-found error. Each mutating call is atomic: concurrent readers see the
/// row either before or after the change, never in between.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Insert a new record. Fails with [`StoreError::DuplicateKey`] if `id` exists.
    async fn insert(&self, id: &MessageId, topic: &str, payload: &Value)
    -> Result<Message, StoreError>;

    async fn get(&self, id: &MessageId) -> Result<Option<Message>, StoreError>;

    /// All records, newest `created_at` first
    async fn list(&self) -> Result<Vec<Message>, StoreError>;

    /// Replace topic and payload and refresh `updated_at`; returns the new record
    async fn update(
        &self,
        id: &MessageId,
        topic: &str,
        payload: &Value,
    ) -> Result<Option<Message>, StoreError>;

    /// Remove the record, returning it as it was immediately before removal
    async fn delete(&self, id: &MessageId) -> Result<Option<Message>, StoreError>;

    /// Cheap connectivity check for readiness probes
    async fn ping(&self) -> Result<(), StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    #[error("stored row is malformed: {0}")]
    Corrupt(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateKey(id) => AppError::DuplicateKey(id),
            StoreError::Database(e) => AppError::Database(e),
            other => AppError::Store(other.to_string()),
        }
    }
}
