use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use relay_config::KafkaConfig;
use relay_types::MessageEvent;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError};
use super::config::create_client_config;
use crate::metrics;

/// Broker acknowledgment for a published event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishReceipt {
    pub partition: i32,
    pub offset: i64,
}

impl PublishReceipt {
    /// Receipt used when publishing is disabled
    pub const DISABLED: PublishReceipt = PublishReceipt {
        partition: -1,
        offset: -1,
    };
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("publisher is not connected")]
    NotConnected,

    #[error("publisher circuit is open (retry in {0:?})")]
    CircuitOpen(Duration),

    #[error("publish timed out after {0:?}")]
    Timeout(Duration),

    #[error("broker error: {0}")]
    Kafka(String),

    #[error("failed to encode event: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<CircuitBreakerError<rdkafka::error::KafkaError>> for PublishError {
    fn from(err: CircuitBreakerError<rdkafka::error::KafkaError>) -> Self {
        match err {
            CircuitBreakerError::Open { retry_in } => PublishError::CircuitOpen(retry_in),
            CircuitBreakerError::Timeout { timeout } => PublishError::Timeout(timeout),
            CircuitBreakerError::Inner(e) => PublishError::Kafka(e.to_string()),
        }
    }
}

/// At-least-once delivery of change events to broker topics
///
/// `connect` and `disconnect` are called once at process start and stop.
/// `publish` is safe to call concurrently and waits for the broker
/// acknowledgment; it does not retry.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn connect(&self) -> Result<(), PublishError>;

    async fn publish(
        &self,
        topic: &str,
        event: &MessageEvent,
    ) -> Result<PublishReceipt, PublishError>;

    /// Flush in-flight sends and release the broker session
    async fn disconnect(&self) -> Result<(), PublishError>;
}

// ============================================================================
// Kafka
// ============================================================================

/// [`EventPublisher`] on an `rdkafka` `FutureProducer`
///
/// Configured for:
/// - `acks=all` with idempotence, so retried sends keep per-key order
/// - bounded `delivery.timeout.ms`, so a publish cannot hang indefinitely
/// - circuit breaker protection against slow or unreachable brokers
///
/// With `KAFKA_ENABLED=false` every publish is acknowledged locally with
/// [`PublishReceipt::DISABLED`] and nothing is sent.
pub struct KafkaEventPublisher {
    config: KafkaConfig,
    /// Held for reading by every publish; `disconnect` takes it for writing,
    /// so it waits for in-flight sends before tearing the session down.
    producer: RwLock<Option<FutureProducer>>,
    circuit_breaker: Arc<CircuitBreaker>,
}

impl KafkaEventPublisher {
    pub fn new(config: &KafkaConfig) -> Self {
        Self {
            config: config.clone(),
            producer: RwLock::new(None),
            circuit_breaker: Arc::new(CircuitBreaker::with_config(CircuitBreakerConfig::from(
                config,
            ))),
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.producer.read().await.is_some()
    }

    fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.config.publish_timeout_ms)
    }

    fn flush_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.config.producer_delivery_timeout_ms))
    }

    /// Ask the brokers for cluster metadata
    ///
    /// librdkafka reconnects on its own, so an unreachable cluster at startup
    /// is reported but does not fail `connect`.
    async fn probe(&self, producer: FutureProducer) {
        let timeout = self.send_timeout();
        let probe = tokio::task::spawn_blocking(move || {
            producer
                .client()
                .fetch_metadata(None, Timeout::After(timeout))
                .map(|metadata| (metadata.brokers().len(), metadata.topics().len()))
        })
        .await;

        match probe {
            Ok(Ok((brokers, topics))) => {
                info!(brokers, topics, "Kafka cluster metadata received");
            }
            Ok(Err(e)) => {
                warn!(
                    error = %e,
                    brokers = %self.config.brokers,
                    "Kafka brokers unreachable at startup - publishes will drift until they recover"
                );
            }
            Err(e) => {
                warn!(error = %e, "Kafka metadata probe task failed");
            }
        }
    }
}

#[async_trait]
impl EventPublisher for KafkaEventPublisher {
    async fn connect(&self) -> Result<(), PublishError> {
        if !self.config.enabled {
            info!("Kafka publisher disabled (KAFKA_ENABLED=false)");
            return Ok(());
        }

        let mut slot = self.producer.write().await;
        if slot.is_some() {
            debug!("Kafka publisher already connected");
            return Ok(());
        }

        info!(
            client_id = %self.config.client_id,
            brokers = %self.config.brokers,
            "Initializing Kafka producer..."
        );
        let producer: FutureProducer = create_client_config(&self.config)
            .create()
            .map_err(|e| PublishError::Kafka(format!("failed to create producer: {}", e)))?;

        self.probe(producer.clone()).await;
        *slot = Some(producer);
        self.circuit_breaker.reset();

        info!("Kafka producer initialized with circuit breaker");
        Ok(())
    }

    async fn publish(
        &self,
        topic: &str,
        event: &MessageEvent,
    ) -> Result<PublishReceipt, PublishError> {
        if !self.config.enabled {
            debug!(
                message_id = %event.key(),
                action = %event.action(),
                "Kafka disabled - event NOT sent (dummy receipt)"
            );
            return Ok(PublishReceipt::DISABLED);
        }

        let slot = self.producer.read().await;
        let producer = slot.as_ref().ok_or(PublishError::NotConnected)?;

        let payload = event.encode()?;
        let key = event.key().as_bytes();
        let start = Instant::now();

        let result = self
            .circuit_breaker
            .call(async {
                producer
                    .send(
                        FutureRecord::to(topic).key(key).payload(&payload),
                        Timeout::After(self.send_timeout()),
                    )
                    .await
                    .map_err(|(kafka_err, _message)| kafka_err)
            })
            .await;

        let latency = start.elapsed();
        match result {
            Ok((partition, offset)) => {
                metrics::PUBLISH_LATENCY_SECONDS.observe(latency.as_secs_f64());
                debug!(
                    message_id = %event.key(),
                    topic = %topic,
                    action = %event.action(),
                    partition,
                    offset,
                    latency_ms = latency.as_millis() as u64,
                    "Event persisted to Kafka"
                );
                Ok(PublishReceipt { partition, offset })
            }
            Err(e) => {
                let err = PublishError::from(e);
                error!(
                    error = %err,
                    message_id = %event.key(),
                    topic = %topic,
                    action = %event.action(),
                    latency_ms = latency.as_millis() as u64,
                    "Failed to send event to Kafka"
                );
                Err(err)
            }
        }
    }

    async fn disconnect(&self) -> Result<(), PublishError> {
        let Some(producer) = self.producer.write().await.take() else {
            return Ok(());
        };

        let timeout = self.flush_timeout();
        info!(timeout_ms = timeout.as_millis() as u64, "Flushing Kafka producer");

        let flushed =
            tokio::task::spawn_blocking(move || producer.flush(Timeout::After(timeout))).await;

        match flushed {
            Ok(Ok(())) => {
                info!("Kafka producer flushed and disconnected");
                Ok(())
            }
            Ok(Err(e)) => Err(PublishError::Kafka(format!("flush failed: {}", e))),
            Err(e) => Err(PublishError::Kafka(format!("flush task failed: {}", e))),
        }
    }
}

// ============================================================================
// In-process
// ============================================================================

/// In-process [`EventPublisher`] that keeps every acknowledged event
///
/// Follows the same lifecycle rules as the Kafka publisher.
/// `set_available(false)` makes publishes fail with a broker error.
#[derive(Default)]
pub struct MemoryEventPublisher {
    state: std::sync::Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    connected: bool,
    unavailable: bool,
    published: Vec<(String, MessageEvent)>,
}

impl MemoryEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_available(&self, available: bool) {
        self.state().unavailable = !available;
    }

    pub fn is_connected(&self) -> bool {
        self.state().connected
    }

    /// Acknowledged events as `(topic, event)`, in publish order
    pub fn published(&self) -> Vec<(String, MessageEvent)> {
        self.state().published.clone()
    }
}

#[async_trait]
impl EventPublisher for MemoryEventPublisher {
    async fn connect(&self) -> Result<(), PublishError> {
        self.state().connected = true;
        Ok(())
    }

    async fn publish(
        &self,
        topic: &str,
        event: &MessageEvent,
    ) -> Result<PublishReceipt, PublishError> {
        let mut state = self.state();
        if !state.connected {
            return Err(PublishError::NotConnected);
        }
        if state.unavailable {
            return Err(PublishError::Kafka("broker unavailable".to_string()));
        }

        event.encode()?;
        state.published.push((topic.to_string(), event.clone()));
        Ok(PublishReceipt {
            partition: 0,
            offset: state.published.len() as i64 - 1,
        })
    }

    async fn disconnect(&self) -> Result<(), PublishError> {
        self.state().connected = false;
        Ok(())
    }
}
