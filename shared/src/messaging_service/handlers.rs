use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use relay_error::{AppError, AppResult};
use relay_types::{Message, MessageRequest};
use serde_json::{Value, json};

use super::MessagingServiceContext;

/// Malformed or non-JSON bodies are client errors in the API's own format
fn request_body(payload: Result<Json<MessageRequest>, JsonRejection>) -> AppResult<MessageRequest> {
    payload
        .map(|Json(request)| request)
        .map_err(|rejection| AppError::validation(rejection.body_text()))
}

/// POST /message
pub async fn create_message(
    State(context): State<Arc<MessagingServiceContext>>,
    payload: Result<Json<MessageRequest>, JsonRejection>,
) -> AppResult<Json<Value>> {
    let request = request_body(payload)?;
    let outcome = context.coordinator.create(request).await?;

    Ok(Json(json!({
        "status": "Message sent successfully!",
        "stored": outcome.record,
        "published": outcome.is_published(),
    })))
}

/// GET /messages
pub async fn list_messages(
    State(context): State<Arc<MessagingServiceContext>>,
) -> AppResult<Json<Vec<Message>>> {
    Ok(Json(context.coordinator.list().await?))
}

/// GET /messages/{id}
pub async fn get_message(
    State(context): State<Arc<MessagingServiceContext>>,
    Path(id): Path<String>,
) -> AppResult<Json<Message>> {
    Ok(Json(context.coordinator.get(&id).await?))
}

/// PUT /messages/{id}
pub async fn update_message(
    State(context): State<Arc<MessagingServiceContext>>,
    Path(id): Path<String>,
    payload: Result<Json<MessageRequest>, JsonRejection>,
) -> AppResult<Json<Value>> {
    let request = request_body(payload)?;
    let outcome = context.coordinator.update(&id, request).await?;

    Ok(Json(json!({
        "status": "Message updated successfully!",
        "updated": outcome.record,
        "published": outcome.is_published(),
    })))
}

/// DELETE /messages/{id}
pub async fn delete_message(
    State(context): State<Arc<MessagingServiceContext>>,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let outcome = context.coordinator.delete(&id).await?;

    Ok(Json(json!({
        "status": "Message deleted successfully!",
        "deleted": outcome.record,
        "published": outcome.is_published(),
    })))
}

/// GET /health/ready
pub async fn readiness(State(context): State<Arc<MessagingServiceContext>>) -> impl IntoResponse {
    match context.coordinator.ping().await {
        Ok(()) => (StatusCode::OK, Json(json!({"status": "ready"}))),
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed: store unreachable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"status": "unavailable"})),
            )
        }
    }
}
