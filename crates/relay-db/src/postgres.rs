use async_trait::async_trait;
use chrono::{DateTime, Utc};
use relay_types::{Message, MessageId};
use serde_json::Value;
use sqlx::types::Json;

use crate::DbPool;
use crate::store::{MessageStore, StoreError};

/// PostgreSQL implementation of [`MessageStore`]
#[derive(Clone)]
pub struct PgMessageStore {
    pool: DbPool,
}

impl PgMessageStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: String,
    topic: String,
    message: Json<Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<MessageRow> for Message {
    type Error = StoreError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        let id = MessageId::parse(&row.id)
            .map_err(|e| StoreError::Corrupt(format!("row '{}': {}", row.id, e)))?;
        Ok(Message {
            id,
            topic: row.topic,
            payload: row.message.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_message(row: Option<MessageRow>) -> Result<Option<Message>, StoreError> {
    row.map(Message::try_from).transpose()
}

#[async_trait]
impl MessageStore for PgMessageStore {
    async fn insert(
        &self,
        id: &MessageId,
        topic: &str,
        payload: &Value,
    ) -> Result<Message, StoreError> {
        let result = sqlx::query_as::<_, MessageRow>(
            r#"
            INSERT INTO messages (id, topic, message)
            VALUES ($1, $2, $3)
            RETURNING id, topic, message, created_at, updated_at
            "#,
        )
        .bind(id.as_str())
        .bind(topic)
        .bind(Json(payload))
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => row.try_into(),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(StoreError::DuplicateKey(id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, id: &MessageId) -> Result<Option<Message>, StoreError> {
        let row = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT id, topic, message, created_at, updated_at
            FROM messages
            WHERE id = $1
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        into_message(row)
    }

    async fn list(&self) -> Result<Vec<Message>, StoreError> {
        let rows = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT id, topic, message, created_at, updated_at
            FROM messages
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Message::try_from).collect()
    }

    async fn update(
        &self,
        id: &MessageId,
        topic: &str,
        payload: &Value,
    ) -> Result<Option<Message>, StoreError> {
        // clock_timestamp() moves within a transaction; GREATEST keeps updated_at strictly increasing
        let row = sqlx::query_as::<_, MessageRow>(
            r#"
            UPDATE messages
            SET topic = $1,
                message = $2,
                updated_at = GREATEST(clock_timestamp(), updated_at + INTERVAL '1 microsecond')
            WHERE id = $3
            RETURNING id, topic, message, created_at, updated_at
            "#,
        )
        .bind(topic)
        .bind(Json(payload))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        into_message(row)
    }

    async fn delete(&self, id: &MessageId) -> Result<Option<Message>, StoreError> {
        let row = sqlx::query_as::<_, MessageRow>(
            r#"
            DELETE FROM messages
            WHERE id = $1
            RETURNING id, topic, message, created_at, updated_at
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        into_message(row)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
