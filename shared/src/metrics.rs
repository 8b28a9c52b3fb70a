//! Prometheus metrics for the relay services
//!
//! - Store operations
//! - Event publication
//! - Drift between store and broker
//! - Circuit breaker state

use anyhow::Result;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use once_cell::sync::Lazy;
use prometheus::{
    Encoder, Histogram, IntCounterVec, IntGauge, TextEncoder, histogram_opts, opts,
    register_histogram, register_int_counter_vec, register_int_gauge,
};

// ============================================================================
// Store Metrics
// ============================================================================

/// Store calls by operation and outcome (`ok`, `not_found`, `error`)
pub static STORE_OPERATIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "relay_store_operations_total",
            "Message store operations by operation and outcome"
        ),
        &["op", "outcome"]
    )
    .expect("Failed to register STORE_OPERATIONS_TOTAL metric")
});

// ============================================================================
// Publish Metrics
// ============================================================================

/// Publish attempts by event action and outcome (`ok`, `failed`)
pub static EVENTS_PUBLISHED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "relay_events_published_total",
            "Broker publish attempts by action and outcome"
        ),
        &["action", "outcome"]
    )
    .expect("Failed to register EVENTS_PUBLISHED_TOTAL metric")
});

/// Time from send to broker acknowledgment
pub static PUBLISH_LATENCY_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(histogram_opts!(
        "relay_publish_latency_seconds",
        "Latency of acknowledged broker publishes",
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    ))
    .expect("Failed to register PUBLISH_LATENCY_SECONDS metric")
});

// ============================================================================
// Drift Metrics
// ============================================================================

/// Committed mutations whose event was never acknowledged
pub static DRIFT_RECORDS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "relay_drift_records_total",
            "Store mutations committed without a published event"
        ),
        &["action"]
    )
    .expect("Failed to register DRIFT_RECORDS_TOTAL metric")
});

// ============================================================================
// Circuit Breaker Metrics
// ============================================================================

/// Publisher circuit breaker state (0=Closed, 1=Open, 2=HalfOpen)
pub static CIRCUIT_BREAKER_STATE: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(opts!(
        "relay_publisher_circuit_breaker_state",
        "Publisher circuit breaker state (0=closed, 1=open, 2=half-open)"
    ))
    .expect("Failed to register CIRCUIT_BREAKER_STATE metric")
});

/// Encode every registered metric in the Prometheus text format
pub fn gather_metrics() -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Axum handler that serves Prometheus metrics in text format
pub async fn metrics_handler() -> impl IntoResponse {
    match gather_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            body,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to gather metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                format!("Failed to gather metrics: {}", e),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_includes_touched_metrics() {
        EVENTS_PUBLISHED_TOTAL
            .with_label_values(&["CREATE", "ok"])
            .inc();
        DRIFT_RECORDS_TOTAL.with_label_values(&["DELETE"]).inc();

        let text = gather_metrics().unwrap();
        assert!(text.contains("relay_events_published_total"));
        assert!(text.contains("relay_drift_records_total"));
    }
}
