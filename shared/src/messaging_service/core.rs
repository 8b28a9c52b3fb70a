// ============================================================================
// Dual-Write Coordinator
// ============================================================================
//
// Every mutation is written to the store first and announced on the broker
// second. The store is the system of record:
//
//   validate -> store write --(fails)--> error, nothing published
//                    |
//                    +--> publish --(ok)-----> success, Published
//                              |
//                              +--(fails)--> success, Drifted + drift record
//
// A committed write is never rolled back and there is no retry loop here.
// The store write and publish run together on a tracked task, so a client
// that disconnects mid-request cannot stop the publish after the commit, and
// shutdown can wait for every such task before disconnecting the publisher.
//
// ============================================================================

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use relay_db::{MessageStore, StoreError};
use relay_error::{AppError, AppResult};
use relay_types::{IdGenerator, Message, MessageEvent, MessageId, MessageRequest};
use tokio_util::task::TaskTracker;

use crate::drift::{DriftRecord, DriftSink};
use crate::kafka::{EventPublisher, PublishReceipt};
use crate::metrics;

/// How the event for a committed mutation fared
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    Published(PublishReceipt),
    /// Store write committed, event not acknowledged
    Drifted(DriftRecord),
}

/// Result of a successful mutation
#[derive(Debug, Clone)]
pub struct OperationOutcome {
    pub record: Message,
    pub delivery: Delivery,
}

impl OperationOutcome {
    pub fn is_published(&self) -> bool {
        matches!(self.delivery, Delivery::Published(_))
    }
}

struct Backends {
    ids: Arc<dyn IdGenerator>,
    store: Arc<dyn MessageStore>,
    publisher: Arc<dyn EventPublisher>,
    drift: Arc<dyn DriftSink>,
}

impl Backends {
    /// Publish `event` for a record that is already durable
    async fn announce(&self, topic: &str, event: MessageEvent) -> Delivery {
        let action = event.action();

        match self.publisher.publish(topic, &event).await {
            Ok(receipt) => {
                metrics::EVENTS_PUBLISHED_TOTAL
                    .with_label_values(&[action.as_str(), "ok"])
                    .inc();
                Delivery::Published(receipt)
            }
            Err(err) => {
                metrics::EVENTS_PUBLISHED_TOTAL
                    .with_label_values(&[action.as_str(), "failed"])
                    .inc();
                let record = DriftRecord::new(topic, &event, &err);
                self.drift.record(record.clone());
                Delivery::Drifted(record)
            }
        }
    }
}

fn observe_store<T>(op: &'static str, result: Result<T, StoreError>) -> AppResult<T> {
    match result {
        Ok(value) => {
            metrics::STORE_OPERATIONS_TOTAL
                .with_label_values(&[op, "ok"])
                .inc();
            Ok(value)
        }
        Err(err) => {
            metrics::STORE_OPERATIONS_TOTAL
                .with_label_values(&[op, "error"])
                .inc();
            Err(err.into())
        }
    }
}

/// Like [`observe_store`], with a missing row mapped to `NotFound`
fn require_found<T>(op: &'static str, result: Result<Option<T>, StoreError>) -> AppResult<T> {
    match observe_store(op, result)? {
        Some(value) => Ok(value),
        None => {
            metrics::STORE_OPERATIONS_TOTAL
                .with_label_values(&[op, "not_found"])
                .inc();
            Err(AppError::message_not_found())
        }
    }
}

/// Ids that cannot be parsed cannot exist in the store
fn parse_id(raw: &str) -> AppResult<MessageId> {
    MessageId::parse(raw).map_err(|_| AppError::message_not_found())
}

/// Orders store writes and broker publishes for every message operation
#[derive(Clone)]
pub struct DualWriteCoordinator {
    backends: Arc<Backends>,
    tracker: TaskTracker,
}

impl DualWriteCoordinator {
    pub fn new(
        ids: Arc<dyn IdGenerator>,
        store: Arc<dyn MessageStore>,
        publisher: Arc<dyn EventPublisher>,
        drift: Arc<dyn DriftSink>,
    ) -> Self {
        Self {
            backends: Arc::new(Backends {
                ids,
                store,
                publisher,
                drift,
            }),
            tracker: TaskTracker::new(),
        }
    }

    /// Run a store-write-then-publish sequence to completion, even if the
    /// awaiting caller goes away
    async fn run_tracked<F>(&self, operation: F) -> AppResult<OperationOutcome>
    where
        F: Future<Output = AppResult<OperationOutcome>> + Send + 'static,
    {
        self.tracker
            .spawn(operation)
            .await
            .map_err(|e| AppError::internal(format!("operation task failed: {}", e)))?
    }

    /// Validate, assign an id, insert, then publish CREATE
    ///
    /// Validation runs before an id is generated, so rejected requests
    /// consume nothing.
    pub async fn create(&self, request: MessageRequest) -> AppResult<OperationOutcome> {
        let valid = request.validate()?;
        let id = self.backends.ids.generate();
        let backends = Arc::clone(&self.backends);

        let outcome = self
            .run_tracked(async move {
                let record = observe_store(
                    "insert",
                    backends.store.insert(&id, &valid.topic, &valid.payload).await,
                )?;
                let delivery = backends
                    .announce(&record.topic, MessageEvent::created(&record))
                    .await;
                Ok(OperationOutcome { record, delivery })
            })
            .await?;

        tracing::info!(
            message_id = %outcome.record.id,
            topic = %outcome.record.topic,
            published = outcome.is_published(),
            "Message created"
        );
        Ok(outcome)
    }

    pub async fn get(&self, id: &str) -> AppResult<Message> {
        let id = parse_id(id)?;
        require_found("get", self.backends.store.get(&id).await)
    }

    /// Every message, newest first
    pub async fn list(&self) -> AppResult<Vec<Message>> {
        observe_store("list", self.backends.store.list().await)
    }

    /// Validate, replace topic and payload, then publish UPDATE
    ///
    /// An omitted topic resets the record to the default topic.
    pub async fn update(&self, id: &str, request: MessageRequest) -> AppResult<OperationOutcome> {
        let valid = request.validate()?;
        let id = parse_id(id)?;
        let backends = Arc::clone(&self.backends);

        let outcome = self
            .run_tracked(async move {
                let record = require_found(
                    "update",
                    backends
                        .store
                        .update(&id, &valid.topic, &valid.payload)
                        .await,
                )?;
                let delivery = backends
                    .announce(&record.topic, MessageEvent::updated(&record))
                    .await;
                Ok(OperationOutcome { record, delivery })
            })
            .await?;

        tracing::info!(
            message_id = %outcome.record.id,
            topic = %outcome.record.topic,
            published = outcome.is_published(),
            "Message updated"
        );
        Ok(outcome)
    }

    /// Remove the record, then publish DELETE on the topic it was stored under
    pub async fn delete(&self, id: &str) -> AppResult<OperationOutcome> {
        let id = parse_id(id)?;
        let backends = Arc::clone(&self.backends);

        let outcome = self
            .run_tracked(async move {
                let record = require_found("delete", backends.store.delete(&id).await)?;
                let delivery = backends
                    .announce(&record.topic, MessageEvent::deleted(&record.id))
                    .await;
                Ok(OperationOutcome { record, delivery })
            })
            .await?;

        tracing::info!(
            message_id = %outcome.record.id,
            topic = %outcome.record.topic,
            published = outcome.is_published(),
            "Message deleted"
        );
        Ok(outcome)
    }

    /// Store connectivity, for readiness checks
    pub async fn ping(&self) -> AppResult<()> {
        self.backends.store.ping().await.map_err(AppError::from)
    }

    /// Number of mutations currently between store write and publish result
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Wait for in-flight mutations to finish publishing
    ///
    /// Returns `false` if some were still running when `timeout` expired.
    pub async fn drain(&self, timeout: Duration) -> bool {
        self.tracker.close();
        let pending = self.tracker.len();
        if pending > 0 {
            tracing::info!(pending, "Draining in-flight message operations");
        }

        match tokio::time::timeout(timeout, self.tracker.wait()).await {
            Ok(()) => true,
            Err(_) => {
                tracing::warn!(
                    remaining = self.tracker.len(),
                    timeout_secs = timeout.as_secs(),
                    "Timed out draining in-flight message operations"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drift::MemoryDriftSink;
    use crate::kafka::{MemoryEventPublisher, PublishError};
    use async_trait::async_trait;
    use relay_db::MemoryMessageStore;
    use relay_types::{DEFAULT_TOPIC, EventAction, EventBody, UlidGenerator};
    use serde_json::{Value, json};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Harness {
        coordinator: DualWriteCoordinator,
        store: Arc<MemoryMessageStore>,
        publisher: Arc<MemoryEventPublisher>,
        drift: Arc<MemoryDriftSink>,
    }

    async fn harness() -> Harness {
        let store = Arc::new(MemoryMessageStore::new());
        let publisher = Arc::new(MemoryEventPublisher::new());
        publisher.connect().await.unwrap();
        let drift = Arc::new(MemoryDriftSink::new());

        let coordinator = DualWriteCoordinator::new(
            Arc::new(UlidGenerator::new()),
            store.clone(),
            publisher.clone(),
            drift.clone(),
        );
        Harness {
            coordinator,
            store,
            publisher,
            drift,
        }
    }

    fn request(topic: Option<&str>, message: Value) -> MessageRequest {
        MessageRequest::new(topic, message)
    }

    #[tokio::test]
    async fn test_create_stores_then_publishes() {
        let h = harness().await;

        let outcome = h
            .coordinator
            .create(request(Some("orders"), json!({"sku": "X1"})))
            .await
            .unwrap();

        assert!(outcome.is_published());
        assert_eq!(outcome.record.id.as_str().len(), 26);
        assert_eq!(outcome.record.topic, "orders");
        assert_eq!(outcome.record.payload, json!({"sku": "X1"}));

        let published = h.publisher.published();
        assert_eq!(published.len(), 1);
        let (topic, event) = &published[0];
        assert_eq!(topic, "orders");
        assert_eq!(event.key(), &outcome.record.id);
        assert_eq!(event.action(), EventAction::Create);
        assert_eq!(event.data(), Some(&json!({"sku": "X1"})));
    }

    #[tokio::test]
    async fn test_create_defaults_topic() {
        let h = harness().await;

        let outcome = h.coordinator.create(request(None, json!(1))).await.unwrap();

        assert_eq!(outcome.record.topic, DEFAULT_TOPIC);
        assert_eq!(h.publisher.published()[0].0, DEFAULT_TOPIC);
    }

    struct CountingIds {
        inner: UlidGenerator,
        calls: AtomicUsize,
    }

    impl IdGenerator for CountingIds {
        fn generate(&self) -> MessageId {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.generate()
        }
    }

    #[tokio::test]
    async fn test_invalid_create_consumes_no_id_and_writes_nothing() {
        let ids = Arc::new(CountingIds {
            inner: UlidGenerator::new(),
            calls: AtomicUsize::new(0),
        });
        let store = Arc::new(MemoryMessageStore::new());
        let publisher = Arc::new(MemoryEventPublisher::new());
        publisher.connect().await.unwrap();
        let coordinator = DualWriteCoordinator::new(
            ids.clone(),
            store.clone(),
            publisher.clone(),
            Arc::new(MemoryDriftSink::new()),
        );

        let err = coordinator
            .create(MessageRequest::default())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Validation(ref msg) if msg == "Message is required"));
        assert_eq!(ids.calls.load(Ordering::SeqCst), 0);
        assert!(store.is_empty().await);
        assert!(publisher.published().is_empty());
    }

    #[tokio::test]
    async fn test_publish_failure_still_succeeds_and_records_drift() {
        let h = harness().await;
        h.publisher.set_available(false);

        let outcome = h
            .coordinator
            .create(request(Some("orders"), json!({"sku": "X1"})))
            .await
            .unwrap();

        let Delivery::Drifted(record) = &outcome.delivery else {
            panic!("expected drift, got {:?}", outcome.delivery);
        };
        assert_eq!(record.message_id, outcome.record.id);
        assert_eq!(record.topic, "orders");
        assert_eq!(record.action, EventAction::Create);
        assert_eq!(record.payload, Some(json!({"sku": "X1"})));

        let stored = h.store.get(&outcome.record.id).await.unwrap();
        assert_eq!(stored, Some(outcome.record.clone()));
        assert_eq!(h.drift.records(), vec![record.clone()]);
    }

    #[tokio::test]
    async fn test_store_failure_aborts_before_publish() {
        let h = harness().await;
        h.store.set_available(false);

        let err = h
            .coordinator
            .create(request(Some("orders"), json!(1)))
            .await
            .unwrap_err();

        assert_eq!(err.error_code(), "STORE_ERROR");
        assert!(h.publisher.published().is_empty());
        assert!(h.drift.records().is_empty());
    }

    #[tokio::test]
    async fn test_update_publishes_new_payload_on_new_topic() {
        let h = harness().await;
        let created = h
            .coordinator
            .create(request(Some("orders"), json!({"v": 1})))
            .await
            .unwrap();

        let updated = h
            .coordinator
            .update(
                created.record.id.as_str(),
                request(Some("billing"), json!({"v": 2})),
            )
            .await
            .unwrap();

        assert_eq!(updated.record.topic, "billing");
        assert_eq!(updated.record.created_at, created.record.created_at);
        assert!(updated.record.updated_at > created.record.updated_at);

        let (topic, event) = h.publisher.published().pop().unwrap();
        assert_eq!(topic, "billing");
        assert!(matches!(
            event.body,
            EventBody::Update { ref data, .. } if data == &json!({"v": 2})
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_updates_to_one_id_serialize() {
        const WRITERS: usize = 16;
        let h = harness().await;
        let created = h
            .coordinator
            .create(request(Some("orders"), json!({"v": 0})))
            .await
            .unwrap();
        let id = created.record.id.as_str().to_string();

        let mut tasks = tokio::task::JoinSet::new();
        for n in 1..=WRITERS {
            let coordinator = h.coordinator.clone();
            let id = id.clone();
            tasks.spawn(async move {
                coordinator
                    .update(&id, request(Some("orders"), json!({"v": n})))
                    .await
            });
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            outcomes.push(joined.unwrap().unwrap());
        }
        assert_eq!(outcomes.len(), WRITERS);
        assert!(outcomes.iter().all(OperationOutcome::is_published));

        let mut stamps: Vec<_> = outcomes.iter().map(|o| o.record.updated_at).collect();
        stamps.sort();
        assert!(stamps.windows(2).all(|pair| pair[0] < pair[1]));
        assert!(stamps[0] > created.record.updated_at);

        let last_write = outcomes
            .iter()
            .max_by_key(|o| o.record.updated_at)
            .unwrap();
        let current = h.coordinator.get(&id).await.unwrap();
        assert_eq!(current, last_write.record);
        let submitted: Vec<Value> = (1..=WRITERS).map(|n| json!({"v": n})).collect();
        assert!(submitted.contains(&current.payload));

        let updates = h
            .publisher
            .published()
            .into_iter()
            .filter(|(_, event)| event.action() == EventAction::Update)
            .count();
        assert_eq!(updates, WRITERS);
        assert!(h.drift.records().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_creates_get_distinct_records() {
        const WRITERS: usize = 16;
        let h = harness().await;

        let mut tasks = tokio::task::JoinSet::new();
        for n in 0..WRITERS {
            let coordinator = h.coordinator.clone();
            tasks.spawn(async move { coordinator.create(request(None, json!({"n": n}))).await });
        }

        let mut ids = std::collections::HashSet::new();
        while let Some(joined) = tasks.join_next().await {
            let outcome = joined.unwrap().unwrap();
            assert!(outcome.is_published());
            ids.insert(outcome.record.id.as_str().to_string());
        }

        assert_eq!(ids.len(), WRITERS);
        assert_eq!(h.store.len().await, WRITERS);
        assert_eq!(h.coordinator.list().await.unwrap().len(), WRITERS);

        let published = h.publisher.published();
        assert_eq!(published.len(), WRITERS);
        assert!(
            published
                .iter()
                .all(|(_, event)| event.action() == EventAction::Create
                    && ids.contains(event.key().as_str()))
        );
    }

    #[tokio::test]
    async fn test_delete_publishes_on_stored_topic() {
        let h = harness().await;
        let created = h
            .coordinator
            .create(request(Some("orders"), json!(1)))
            .await
            .unwrap();

        let deleted = h
            .coordinator
            .delete(created.record.id.as_str())
            .await
            .unwrap();
        assert_eq!(deleted.record, created.record);

        let (topic, event) = h.publisher.published().pop().unwrap();
        assert_eq!(topic, "orders");
        assert_eq!(event, MessageEvent::deleted(&created.record.id));

        let again = h.coordinator.delete(created.record.id.as_str()).await;
        assert!(matches!(again, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_missing_ids_are_not_found_without_side_effects() {
        let h = harness().await;
        let missing = UlidGenerator::new().generate();

        for id in [missing.as_str(), "not-a-ulid"] {
            assert!(matches!(h.coordinator.get(id).await, Err(AppError::NotFound(_))));
            assert!(matches!(
                h.coordinator.update(id, request(None, json!(1))).await,
                Err(AppError::NotFound(_))
            ));
            assert!(matches!(h.coordinator.delete(id).await, Err(AppError::NotFound(_))));
        }

        assert!(h.store.is_empty().await);
        assert!(h.publisher.published().is_empty());
    }

    #[tokio::test]
    async fn test_update_validates_payload_before_lookup() {
        let h = harness().await;

        let err = h
            .coordinator
            .update("not-a-ulid", MessageRequest::default())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
    }

    /// Holds every publish for `delay` before delegating
    struct SlowPublisher {
        inner: MemoryEventPublisher,
        delay: Duration,
    }

    #[async_trait]
    impl EventPublisher for SlowPublisher {
        async fn connect(&self) -> Result<(), PublishError> {
            self.inner.connect().await
        }

        async fn publish(
            &self,
            topic: &str,
            event: &MessageEvent,
        ) -> Result<PublishReceipt, PublishError> {
            tokio::time::sleep(self.delay).await;
            self.inner.publish(topic, event).await
        }

        async fn disconnect(&self) -> Result<(), PublishError> {
            self.inner.disconnect().await
        }
    }

    #[tokio::test]
    async fn test_cancelled_caller_does_not_skip_publish() {
        let store = Arc::new(MemoryMessageStore::new());
        let publisher = Arc::new(SlowPublisher {
            inner: MemoryEventPublisher::new(),
            delay: Duration::from_millis(100),
        });
        publisher.connect().await.unwrap();
        let coordinator = DualWriteCoordinator::new(
            Arc::new(UlidGenerator::new()),
            store.clone(),
            publisher.clone(),
            Arc::new(MemoryDriftSink::new()),
        );

        let caller = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                coordinator
                    .create(MessageRequest::new(Some("orders"), json!(1)))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        caller.abort();

        assert_eq!(store.len().await, 1);
        assert_eq!(coordinator.in_flight(), 1);
        assert!(coordinator.drain(Duration::from_secs(2)).await);
        assert_eq!(publisher.inner.published().len(), 1);
    }

    #[tokio::test]
    async fn test_drain_reports_timeout() {
        let publisher = Arc::new(SlowPublisher {
            inner: MemoryEventPublisher::new(),
            delay: Duration::from_millis(300),
        });
        publisher.connect().await.unwrap();
        let coordinator = DualWriteCoordinator::new(
            Arc::new(UlidGenerator::new()),
            Arc::new(MemoryMessageStore::new()),
            publisher,
            Arc::new(MemoryDriftSink::new()),
        );

        let background = coordinator.clone();
        tokio::spawn(async move {
            let _ = background
                .create(MessageRequest::new(None, json!(1)))
                .await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(!coordinator.drain(Duration::from_millis(10)).await);
        assert!(coordinator.drain(Duration::from_secs(2)).await);
    }
}
