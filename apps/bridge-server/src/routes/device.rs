//! Server-side callers of the shell capabilities, acting for the session that
//! made the request.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use plugin_bridge::plugins::{
    CameraPhoto, NotificationRequest, PhotoOptions, Position, PositionOptions,
    DEFAULT_VIBRATION_MS,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{observe_invoke, ApiResult, InvokeResponse, ShellSession};
use crate::state::AppState;

pub async fn take_photo(
    State(state): State<AppState>,
    session: ShellSession,
    Json(options): Json<PhotoOptions>,
) -> ApiResult<CameraPhoto> {
    let client = state.client(session.0);
    let photo = observe_invoke("camera", client.camera().take_photo(&options)).await?;
    Ok(Json(photo))
}

pub async fn current_location(
    State(state): State<AppState>,
    session: ShellSession,
    Query(options): Query<PositionOptions>,
) -> ApiResult<Position> {
    let client = state.client(session.0);
    let position =
        observe_invoke("geolocation", client.geolocation().current_position(&options)).await?;
    Ok(Json(position))
}

pub async fn schedule_notification(
    State(state): State<AppState>,
    session: ShellSession,
    Json(request): Json<NotificationRequest>,
) -> ApiResult<InvokeResponse> {
    let client = state.client(session.0);
    let result = observe_invoke("notification", client.notification().schedule(&request)).await?;
    Ok(Json(InvokeResponse { result }))
}

#[derive(Debug, Default, Deserialize)]
pub struct VibrateRequest {
    #[serde(default)]
    pub duration_ms: Option<u64>,
}

pub async fn vibrate(
    State(state): State<AppState>,
    session: ShellSession,
    Json(request): Json<VibrateRequest>,
) -> ApiResult<InvokeResponse> {
    let client = state.client(session.0);
    let duration = request.duration_ms.unwrap_or(DEFAULT_VIBRATION_MS);
    let result = observe_invoke("vibration", client.vibration().vibrate(duration)).await?;
    Ok(Json(InvokeResponse { result }))
}

#[derive(Debug, Serialize)]
pub struct StoredValue {
    pub key: String,
    pub value: Option<Value>,
}

pub async fn storage_get(
    State(state): State<AppState>,
    session: ShellSession,
    Path(key): Path<String>,
) -> ApiResult<StoredValue> {
    let client = state.client(session.0);
    let value = observe_invoke("storage", client.storage().get::<Value>(&key)).await?;
    Ok(Json(StoredValue { key, value }))
}

pub async fn storage_set(
    State(state): State<AppState>,
    session: ShellSession,
    Path(key): Path<String>,
    Json(value): Json<Value>,
) -> ApiResult<StoredValue> {
    let client = state.client(session.0);
    observe_invoke("storage", client.storage().set(&key, &value)).await?;
    Ok(Json(StoredValue {
        key,
        value: Some(value),
    }))
}

pub async fn storage_remove(
    State(state): State<AppState>,
    session: ShellSession,
    Path(key): Path<String>,
) -> ApiResult<StoredValue> {
    let client = state.client(session.0);
    observe_invoke("storage", client.storage().remove(&key)).await?;
    Ok(Json(StoredValue { key, value: None }))
}
