//! Typed wrappers over [`PluginClient::invoke`](crate::PluginClient::invoke),
//! one per native plugin. Arguments are validated before anything is queued.

mod camera;
mod geolocation;
mod notification;
mod storage;
mod vibration;

use bridge_proto::PluginArgs;
use serde::Serialize;
use serde_json::Value;

use crate::error::{PluginError, PluginResult};

pub use camera::{Camera, CameraPhoto, PhotoOptions, ResultType};
pub use geolocation::{Geolocation, Position, PositionOptions};
pub use notification::{Notification, NotificationChannel, NotificationRequest};
pub use storage::Storage;
pub use vibration::{FeedbackKind, ImpactStyle, Vibration, DEFAULT_VIBRATION_MS};

/// Serializes an options struct into the argument map sent to the shell.
pub(crate) fn to_args<T: Serialize>(plugin: &str, options: &T) -> PluginResult<PluginArgs> {
    match serde_json::to_value(options) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(Value::Null) => Ok(PluginArgs::new()),
        Ok(other) => Err(PluginError::validation(
            plugin,
            format!("arguments must be an object, got {other}"),
        )),
        Err(err) => Err(PluginError::validation(plugin, err.to_string())),
    }
}

/// Builds an argument map from literal pairs.
pub(crate) fn args<const N: usize>(pairs: [(&str, Value); N]) -> PluginArgs {
    pairs
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

/// Pulls `field` out of an object result, treating anything else as absent.
pub(crate) fn field(value: &Value, name: &str) -> Option<Value> {
    value.get(name).filter(|v| !v.is_null()).cloned()
}

pub(crate) fn decode<T: serde::de::DeserializeOwned>(plugin: &str, value: Value) -> PluginResult<T> {
    serde_json::from_value(value).map_err(|source| PluginError::Decode {
        plugin: plugin.to_string(),
        source,
    })
}

#[cfg(test)]
pub(crate) mod testing {
    use std::time::Duration;

    use bridge_proto::PluginCall;
    use serde_json::Value;
    use tokio::task::JoinHandle;

    use crate::config::BridgeConfig;
    use crate::endpoint::BridgeEndpoint;
    use crate::session::SessionId;
    use crate::store::MemoryCallStore;
    use crate::PluginClient;

    /// Active client plus a handle to its endpoint.
    pub(crate) async fn active_client() -> (BridgeEndpoint, PluginClient) {
        let store = MemoryCallStore::shared();
        let endpoint = BridgeEndpoint::new(store, BridgeConfig::default());
        let session = SessionId::from("plugin-test");
        endpoint.mark_active(&session).await.unwrap();
        let client = endpoint.client(session);
        (endpoint, client)
    }

    /// Answers the next queued call with `result` and returns what was asked.
    pub(crate) fn respond_once(endpoint: &BridgeEndpoint, result: Value) -> JoinHandle<PluginCall> {
        let endpoint = endpoint.clone();
        let session = SessionId::from("plugin-test");
        tokio::spawn(async move {
            loop {
                let mut calls = endpoint.poll_pending_calls(&session).await.unwrap();
                if let Some(call) = calls.pop() {
                    endpoint
                        .submit_result(&session, &call.id, Some(result), None)
                        .await
                        .unwrap();
                    return call;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
    }
}
