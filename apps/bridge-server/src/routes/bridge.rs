use std::time::Duration;

use axum::{extract::State, http::HeaderMap, Json};
use bridge_proto::{BridgeAck, InvokeRequest, PendingCall, PluginResponse};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use super::{map_store_err, observe_invoke, ApiError, ApiResult, ShellSession};
use crate::{
    log_throttle::{should_log_bridge_event, BridgeLogKind},
    metrics,
    routes::is_native_shell,
    state::AppState,
};

/// Any body is accepted and ignored; shells send `{}`.
pub async fn mark_active(
    State(state): State<AppState>,
    session: ShellSession,
    headers: HeaderMap,
) -> ApiResult<BridgeAck> {
    metrics::BRIDGE_REQUESTS
        .with_label_values(&["mark_active"])
        .inc();
    state
        .endpoint()
        .mark_active(session.id())
        .await
        .map_err(map_store_err)?;
    if should_log_bridge_event(BridgeLogKind::MarkActive, session.id().as_str()) {
        info!(
            session_id = %session.id(),
            native_shell = is_native_shell(&headers),
            "session marked active"
        );
    }
    Ok(Json(BridgeAck::ok("Session marked as active")))
}

pub async fn plugin_calls(
    State(state): State<AppState>,
    session: ShellSession,
) -> ApiResult<Vec<PendingCall>> {
    metrics::BRIDGE_REQUESTS
        .with_label_values(&["plugin_calls"])
        .inc();
    let calls = state
        .endpoint()
        .poll_pending_calls(session.id())
        .await
        .map_err(map_store_err)?;
    if !calls.is_empty() {
        metrics::CALLS_DELIVERED.inc_by(calls.len() as u64);
        debug!(session_id = %session.id(), count = calls.len(), "delivering plugin calls");
    } else if should_log_bridge_event(BridgeLogKind::Poll, session.id().as_str()) {
        debug!(session_id = %session.id(), "no pending plugin calls");
    }
    Ok(Json(calls.into_iter().map(PendingCall::from).collect()))
}

pub async fn plugin_response(
    State(state): State<AppState>,
    session: ShellSession,
    Json(body): Json<PluginResponse>,
) -> ApiResult<BridgeAck> {
    metrics::BRIDGE_REQUESTS
        .with_label_values(&["plugin_response"])
        .inc();
    if body.call_id.trim().is_empty() {
        return Err(ApiError::BadRequest("call_id is required".into()));
    }
    let outcome = if body.error.as_deref().is_some_and(|e| !e.is_empty()) {
        "error"
    } else {
        "ok"
    };
    state
        .endpoint()
        .submit_result(session.id(), &body.call_id, body.result, body.error)
        .await
        .map_err(map_store_err)?;
    metrics::RESULTS_RECEIVED.with_label_values(&[outcome]).inc();
    Ok(Json(BridgeAck::ok("Response received")))
}

#[derive(Debug, Serialize)]
pub struct InvokeResponse {
    pub result: Value,
}

/// Queues a call for the requesting session's shell and waits for its result.
pub async fn invoke(
    State(state): State<AppState>,
    session: ShellSession,
    Json(body): Json<InvokeRequest>,
) -> ApiResult<InvokeResponse> {
    if body.plugin.is_empty() || body.command.is_empty() {
        return Err(ApiError::BadRequest("plugin and command are required".into()));
    }
    let client = state.client(session.0);
    let timeout = body
        .timeout_ms
        .map(Duration::from_millis)
        .unwrap_or(client.config().invoke_timeout);
    let result = observe_invoke(
        &body.plugin,
        client.invoke_with_timeout(&body.plugin, &body.command, body.args, timeout),
    )
    .await?;
    Ok(Json(InvokeResponse { result }))
}
