use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use relay_types::{Message, MessageId};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::store::{MessageStore, StoreError};

/// In-process [`MessageStore`]
///
/// Mirrors the Postgres semantics, including strictly increasing
/// `updated_at`. `set_available(false)` makes every call fail with
/// [`StoreError::Unavailable`] to simulate an outage.
#[derive(Default)]
pub struct MemoryMessageStore {
    rows: RwLock<HashMap<MessageId, Message>>,
    unavailable: AtomicBool,
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store offline".to_string()));
        }
        Ok(())
    }
}

fn next_timestamp(previous: DateTime<Utc>) -> DateTime<Utc> {
    let now = Utc::now();
    if now > previous {
        now
    } else {
        previous + Duration::microseconds(1)
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn insert(
        &self,
        id: &MessageId,
        topic: &str,
        payload: &Value,
    ) -> Result<Message, StoreError> {
        self.check_available()?;
        let mut rows = self.rows.write().await;
        if rows.contains_key(id) {
            return Err(StoreError::DuplicateKey(id.to_string()));
        }

        let now = Utc::now();
        let record = Message {
            id: id.clone(),
            topic: topic.to_string(),
            payload: payload.clone(),
            created_at: now,
            updated_at: now,
        };
        rows.insert(id.clone(), record.clone());
        Ok(record)
    }

    async fn get(&self, id: &MessageId) -> Result<Option<Message>, StoreError> {
        self.check_available()?;
        Ok(self.rows.read().await.get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<Message>, StoreError> {
        self.check_available()?;
        let mut records: Vec<Message> = self.rows.read().await.values().cloned().collect();
        records.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(records)
    }

    async fn update(
        &self,
        id: &MessageId,
        topic: &str,
        payload: &Value,
    ) -> Result<Option<Message>, StoreError> {
        self.check_available()?;
        let mut rows = self.rows.write().await;
        let Some(record) = rows.get_mut(id) else {
            return Ok(None);
        };

        record.topic = topic.to_string();
        record.payload = payload.clone();
        record.updated_at = next_timestamp(record.updated_at);
        Ok(Some(record.clone()))
    }

    async fn delete(&self, id: &MessageId) -> Result<Option<Message>, StoreError> {
        self.check_available()?;
        Ok(self.rows.write().await.remove(id))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check_available()
    }
}
