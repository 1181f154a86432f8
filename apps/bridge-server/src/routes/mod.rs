mod bridge;
mod device;
mod session;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bridge_proto::{INVOKE_PATH, MARK_ACTIVE_PATH, PLUGIN_CALLS_PATH, PLUGIN_RESPONSE_PATH};
use plugin_bridge::{PluginError, PluginResult, StoreError};
use serde::Serialize;
use tokio::time::Instant;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{metrics, state::AppState};

pub use bridge::*;
pub use device::*;
pub use session::{is_native_shell, ShellSession};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        .route("/readyz", get(ready_check))
        .route("/version", get(version))
        .route("/metrics", get(export_metrics))
        .route(MARK_ACTIVE_PATH, post(mark_active))
        .route(PLUGIN_CALLS_PATH, get(plugin_calls))
        .route(PLUGIN_RESPONSE_PATH, post(plugin_response))
        .route(INVOKE_PATH, post(invoke))
        .route("/api/device/camera/photo", post(take_photo))
        .route("/api/device/location", get(current_location))
        .route("/api/device/notifications", post(schedule_notification))
        .route("/api/device/vibrate", post(vibrate))
        .route(
            "/api/device/storage/:key",
            get(storage_get).put(storage_set).delete(storage_remove),
        )
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "ok"
}

async fn ready_check(State(state): State<AppState>) -> Result<&'static str, ApiError> {
    state.check_store().await.map_err(map_store_err)?;
    Ok("ok")
}

#[derive(Debug, Serialize)]
struct VersionInfo {
    name: &'static str,
    build_id: &'static str,
}

async fn version() -> Json<VersionInfo> {
    Json(VersionInfo {
        name: env!("CARGO_PKG_NAME"),
        build_id: crate::BUILD_ID,
    })
}

async fn export_metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::export_prometheus(),
    )
}

pub type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Plugin(PluginError),
    StoreUnavailable,
}

#[derive(Debug, Serialize)]
struct ApiErrorBody<'a> {
    error: &'a str,
    message: Option<String>,
}

impl From<PluginError> for ApiError {
    fn from(err: PluginError) -> Self {
        match err {
            PluginError::Store(err) => map_store_err(err),
            other => ApiError::Plugin(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                Json(ApiErrorBody {
                    error: "bad_request",
                    message: Some(msg),
                }),
            )
                .into_response(),
            ApiError::StoreUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiErrorBody {
                    error: "store_unavailable",
                    message: None,
                }),
            )
                .into_response(),
            ApiError::Plugin(err) => {
                let status = match &err {
                    PluginError::EnvironmentNotDetected { .. } => StatusCode::CONFLICT,
                    PluginError::Validation { .. } => StatusCode::BAD_REQUEST,
                    PluginError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
                    PluginError::Execution { .. } | PluginError::Decode { .. } => {
                        StatusCode::BAD_GATEWAY
                    }
                    PluginError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
                };
                let message = match &err {
                    PluginError::Execution { message, .. } => message.clone(),
                    other => other.to_string(),
                };
                (
                    status,
                    Json(ApiErrorBody {
                        error: err.code(),
                        message: Some(message),
                    }),
                )
                    .into_response()
            }
        }
    }
}

fn map_store_err(err: StoreError) -> ApiError {
    crate::state::log_store_unavailable(&err);
    ApiError::StoreUnavailable
}

/// Runs a capability call, recording its outcome and latency per plugin.
async fn observe_invoke<T, F>(plugin: &str, call: F) -> PluginResult<T>
where
    F: std::future::Future<Output = PluginResult<T>>,
{
    let plugin = metrics::plugin_label(plugin);
    let started = Instant::now();
    let result = call.await;
    let outcome = match &result {
        Ok(_) => "ok",
        Err(err) => err.code(),
    };
    metrics::INVOKE_OUTCOMES
        .with_label_values(&[plugin, outcome])
        .inc();
    if result.is_ok() {
        metrics::INVOKE_LATENCY_MS
            .with_label_values(&[plugin])
            .observe(started.elapsed().as_secs_f64() * 1000.0);
    }
    result
}
