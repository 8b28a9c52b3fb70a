// Kafka module for change-event publication
//
// Events describe store mutations that have already committed. The publisher
// is protected by a circuit breaker so a broker outage degrades into drift
// records instead of stalled requests.

pub mod circuit_breaker;
pub mod config;
pub mod publisher;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError};
pub use config::create_client_config;
pub use publisher::{
    EventPublisher, KafkaEventPublisher, MemoryEventPublisher, PublishError, PublishReceipt,
};
