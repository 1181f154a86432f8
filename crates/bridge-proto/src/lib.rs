//! Shared protocol definitions for server ↔ native shell communication.
//! Keeping this in a dedicated crate lets the shell side depend on the wire
//! format without pulling in the call store or the HTTP server.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

pub const MARK_ACTIVE_PATH: &str = "/api/bridge/mark-active";
pub const PLUGIN_CALLS_PATH: &str = "/api/bridge/plugin-calls";
pub const PLUGIN_RESPONSE_PATH: &str = "/api/bridge/plugin-response";
pub const INVOKE_PATH: &str = "/api/bridge/invoke";

/// Cookie carrying the shell's session identifier.
pub const SESSION_COOKIE: &str = "bridge_session";
/// Header fallback for shells that cannot manage cookies.
pub const SESSION_HEADER: &str = "x-bridge-session";
/// Set by native shells so the server can tell them apart from browsers.
pub const NATIVE_SHELL_HEADER: &str = "x-native-shell";

/// Argument map handed to a native command.
pub type PluginArgs = Map<String, Value>;

/// One queued plugin invocation as held by the call store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginCall {
    pub id: String,
    pub plugin: String,
    pub command: String,
    #[serde(default)]
    pub args: PluginArgs,
    #[serde(default)]
    pub picked_up: bool,
    /// Unix milliseconds.
    pub queued_at: i64,
}

impl PluginCall {
    pub fn new(
        plugin: impl Into<String>,
        command: impl Into<String>,
        args: PluginArgs,
        queued_at: i64,
    ) -> Self {
        Self {
            id: new_call_id(),
            plugin: plugin.into(),
            command: command.into(),
            args,
            picked_up: false,
            queued_at,
        }
    }

    /// Name the native side dispatches on, e.g. `plugin:camera|takePhoto`.
    pub fn invocation(&self) -> String {
        invocation_name(&self.plugin, &self.command)
    }
}

/// Poll response entry: the subset of [`PluginCall`] the shell needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingCall {
    pub id: String,
    pub plugin: String,
    pub command: String,
    #[serde(default)]
    pub args: PluginArgs,
}

impl PendingCall {
    pub fn invocation(&self) -> String {
        invocation_name(&self.plugin, &self.command)
    }
}

impl From<PluginCall> for PendingCall {
    fn from(call: PluginCall) -> Self {
        Self {
            id: call.id,
            plugin: call.plugin,
            command: call.command,
            args: call.args,
        }
    }
}

/// Result slot written when the shell reports back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallResult {
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub completed: bool,
}

impl CallResult {
    pub fn completed(result: Option<Value>, error: Option<String>) -> Self {
        Self {
            result,
            error,
            completed: true,
        }
    }

    /// Native error message, if the shell reported one. Empty strings count as success.
    pub fn failure(&self) -> Option<&str> {
        self.error.as_deref().filter(|message| !message.is_empty())
    }
}

/// Body the shell posts to [`PLUGIN_RESPONSE_PATH`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginResponse {
    pub call_id: String,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

impl PluginResponse {
    pub fn success(call_id: impl Into<String>, result: Value) -> Self {
        Self {
            call_id: call_id.into(),
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(call_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            result: None,
            error: Some(error.into()),
        }
    }
}

/// Generic acknowledgement returned by the bridge routes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeAck {
    pub success: bool,
    pub message: String,
}

impl BridgeAck {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

/// Body accepted by [`INVOKE_PATH`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvokeRequest {
    pub plugin: String,
    pub command: String,
    #[serde(default)]
    pub args: PluginArgs,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

pub fn invocation_name(plugin: &str, command: &str) -> String {
    format!("plugin:{plugin}|{command}")
}

/// Splits `plugin:{plugin}|{command}` back into its parts.
pub fn parse_invocation(invocation: &str) -> Option<(&str, &str)> {
    let rest = invocation.strip_prefix("plugin:")?;
    let (plugin, command) = rest.split_once('|')?;
    if plugin.is_empty() || command.is_empty() {
        return None;
    }
    Some((plugin, command))
}

pub fn new_call_id() -> String {
    format!("call_{}", Uuid::new_v4().simple())
}
