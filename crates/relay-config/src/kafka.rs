// ============================================================================
// Kafka Configuration
// ============================================================================

use crate::constants::*;
use crate::env::{Lookup, parse_or, string_or};

/// Broker connection and producer configuration
#[derive(Clone, Debug)]
pub struct KafkaConfig {
    /// Whether publishing is enabled (false = events are acknowledged locally and dropped)
    pub enabled: bool,
    /// Client identifier reported to the brokers
    pub client_id: String,
    /// Comma-separated list of Kafka brokers (e.g., "kafka1:9092,kafka2:9092")
    pub brokers: String,
    /// SSL/TLS enabled
    pub ssl_enabled: bool,
    /// SASL mechanism (e.g., "SCRAM-SHA-256", "PLAIN")
    pub sasl_mechanism: Option<String>,
    pub sasl_username: Option<String>,
    pub sasl_password: Option<String>,
    /// Path to CA certificate file (for self-signed certificates)
    pub ssl_ca_location: Option<String>,
    // producer-specific settings
    pub producer_compression: String, // "zstd" | "snappy" | "gzip" | "lz4" | "none"
    pub producer_acks: String,        // "all" | "1" | "-1" | "0"
    pub producer_linger_ms: u32,
    pub producer_max_in_flight: u32,
    pub producer_request_timeout_ms: u32,
    pub producer_delivery_timeout_ms: u32,
    pub producer_enable_idempotence: bool,
    /// Upper bound on a single publish, enforced by the circuit breaker
    pub publish_timeout_ms: u64,
    /// Consecutive publish failures before the circuit opens
    pub circuit_failure_threshold: u32,
    /// Time the circuit stays open before a half-open trial
    pub circuit_reset_secs: u64,
}

impl KafkaConfig {
    pub(crate) fn from_lookup(lookup: Lookup<'_>) -> Self {
        Self {
            enabled: parse_or(lookup, "KAFKA_ENABLED", true),
            client_id: string_or(lookup, "KAFKA_CLIENT_ID", DEFAULT_KAFKA_CLIENT_ID),
            brokers: string_or(lookup, "KAFKA_BROKERS", DEFAULT_KAFKA_BROKERS),
            ssl_enabled: parse_or(lookup, "KAFKA_SSL_ENABLED", false),
            sasl_mechanism: lookup("KAFKA_SASL_MECHANISM"),
            sasl_username: lookup("KAFKA_SASL_USERNAME"),
            sasl_password: lookup("KAFKA_SASL_PASSWORD"),
            ssl_ca_location: lookup("KAFKA_SSL_CA_LOCATION"),
            producer_compression: string_or(lookup, "KAFKA_PRODUCER_COMPRESSION", "snappy"),
            producer_acks: string_or(lookup, "KAFKA_PRODUCER_ACKS", "all"),
            producer_linger_ms: parse_or(lookup, "KAFKA_PRODUCER_LINGER_MS", 5),
            producer_max_in_flight: parse_or(lookup, "KAFKA_PRODUCER_MAX_IN_FLIGHT", 5),
            producer_request_timeout_ms: parse_or(
                lookup,
                "KAFKA_PRODUCER_REQUEST_TIMEOUT_MS",
                3000,
            ),
            producer_delivery_timeout_ms: parse_or(
                lookup,
                "KAFKA_PRODUCER_DELIVERY_TIMEOUT_MS",
                5000,
            ),
            producer_enable_idempotence: parse_or(
                lookup,
                "KAFKA_PRODUCER_ENABLE_IDEMPOTENCE",
                true,
            ),
            publish_timeout_ms: parse_or(lookup, "KAFKA_PUBLISH_TIMEOUT_MS", 5000),
            circuit_failure_threshold: parse_or(lookup, "KAFKA_CIRCUIT_FAILURE_THRESHOLD", 5),
            circuit_reset_secs: parse_or(lookup, "KAFKA_CIRCUIT_RESET_SECS", 30),
        }
    }

    /// Broker addresses as a list
    pub fn broker_list(&self) -> Vec<&str> {
        self.brokers
            .split(',')
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .collect()
    }
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self::from_lookup(&|_| None)
    }
}
