// ============================================================================
// Drift Records
// ============================================================================
//
// A drift record is written when a store mutation committed but its event
// was never acknowledged by the broker. The caller still sees success; the
// record carries what a re-publishing sweep needs to close the gap: id,
// topic, action and payload.
//
// ============================================================================

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use relay_types::{EventAction, EventBody, MessageEvent, MessageId};
use serde::Serialize;
use serde_json::Value;

use crate::metrics;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriftRecord {
    pub message_id: MessageId,
    pub topic: String,
    pub action: EventAction,
    /// Payload the event would have carried; `None` for deletes
    pub payload: Option<Value>,
    pub error: String,
    pub occurred_at: DateTime<Utc>,
}

impl DriftRecord {
    pub fn new(topic: &str, event: &MessageEvent, error: impl ToString) -> Self {
        Self {
            message_id: event.key().clone(),
            topic: topic.to_string(),
            action: event.action(),
            payload: event.data().cloned(),
            error: error.to_string(),
            occurred_at: Utc::now(),
        }
    }

    /// The event that should have been published
    pub fn event(&self) -> MessageEvent {
        let id = self.message_id.clone();
        let data = self.payload.clone().unwrap_or(Value::Null);
        MessageEvent {
            body: match self.action {
                EventAction::Create => EventBody::Create { id, data },
                EventAction::Update => EventBody::Update { id, data },
                EventAction::Delete => EventBody::Delete { id },
            },
        }
    }
}

/// Destination for drift records
pub trait DriftSink: Send + Sync {
    fn record(&self, record: DriftRecord);
}

/// Logs every drift record at `warn` and counts it
pub struct TracingDriftSink {
    log_payloads: bool,
}

impl TracingDriftSink {
    pub fn new(log_payloads: bool) -> Self {
        Self { log_payloads }
    }
}

impl DriftSink for TracingDriftSink {
    fn record(&self, record: DriftRecord) {
        metrics::DRIFT_RECORDS_TOTAL
            .with_label_values(&[record.action.as_str()])
            .inc();

        if self.log_payloads {
            let payload = record
                .payload
                .as_ref()
                .map(Value::to_string)
                .unwrap_or_default();
            tracing::warn!(
                drift = true,
                message_id = %record.message_id,
                topic = %record.topic,
                action = %record.action,
                payload = %payload,
                error = %record.error,
                occurred_at = %record.occurred_at.to_rfc3339(),
                "Stored change was not published"
            );
        } else {
            tracing::warn!(
                drift = true,
                message_id = %record.message_id,
                topic = %record.topic,
                action = %record.action,
                error = %record.error,
                occurred_at = %record.occurred_at.to_rfc3339(),
                "Stored change was not published"
            );
        }
    }
}

/// Keeps drift records in memory for inspection
#[derive(Default)]
pub struct MemoryDriftSink {
    records: Mutex<Vec<DriftRecord>>,
}

impl MemoryDriftSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<DriftRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

impl DriftSink for MemoryDriftSink {
    fn record(&self, record: DriftRecord) {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(record);
    }
}
