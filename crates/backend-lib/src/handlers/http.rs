// ============================
// crates/backend-lib/src/handlers/http.rs
// ============================
//! REST surface under `/socket`: directory listings and server-initiated
//! pushes.
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use roomsync_common::NotificationRequest;
use serde_json::{json, Value};

use crate::error::AppError;
use crate::validation::validate_platform;
use crate::AppState;

/// `GET /socket/users`
pub async fn list_users(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "ok": true,
        "clients": state.coordinator.connected_users(None),
    }))
}

/// `GET /socket/users/{platform}`
pub async fn list_platform_users(
    State(state): State<Arc<AppState>>,
    Path(platform): Path<String>,
) -> Result<Json<Value>, AppError> {
    validate_platform(&platform)?;
    Ok(Json(json!({
        "ok": true,
        "clients": state.coordinator.connected_users(Some(&platform)),
    })))
}

/// `POST /socket/alert`; the whole body is pushed as `alert-{platform}`
pub async fn post_alert(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, AppError> {
    let platform = body
        .get("platform")
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::InvalidInput("platform is required".to_string()))?;
    validate_platform(platform)?;

    state.coordinator.alert(platform, &body);
    Ok(Json(json!({ "ok": true, "body": body })))
}

/// `POST /socket/notification`
pub async fn post_notification(
    State(state): State<Arc<AppState>>,
    Json(request): Json<NotificationRequest>,
) -> Result<Json<Value>, AppError> {
    validate_platform(&request.platform)?;

    let senders = state.coordinator.notify_users(
        &request.user_ids,
        &request.platform,
        &request.notification,
    )?;
    Ok(Json(json!({
        "ok": true,
        "notification": request.notification,
        "senders": senders,
    })))
}

/// `GET /healthz`
pub async fn healthz(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "ok": true,
        "connections": state.coordinator.directory().len(),
        "rooms": state.coordinator.registry().len(),
    }))
}
