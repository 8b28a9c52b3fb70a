use std::sync::Arc;

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use relay_config::MAX_REQUEST_BODY_SIZE;
use serde_json::{Value, json};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::messaging_service::{MessagingServiceContext, handlers};
use crate::metrics::metrics_handler;

/// Liveness: the process is up and serving
pub async fn health_check() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

/// Build the HTTP router for the messaging service
pub fn create_router(context: Arc<MessagingServiceContext>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health_check))
        .route("/health/ready", get(handlers::readiness))
        .route("/metrics", get(metrics_handler))
        // Message endpoints
        .route("/message", post(handlers::create_message))
        .route("/messages", get(handlers::list_messages))
        .route(
            "/messages/{id}",
            get(handlers::get_message)
                .put(handlers::update_message)
                .delete(handlers::delete_message),
        )
        // Apply middleware
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_SIZE))
                .into_inner(),
        )
        .with_state(context)
}
