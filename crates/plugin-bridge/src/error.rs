use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("gave up on {key} after {attempts} conflicting writes")]
    Contention { key: String, attempts: u32 },
}

/// Failure surfaced to code invoking a native capability.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("{plugin}: native shell environment not detected for this session")]
    EnvironmentNotDetected { plugin: String },
    #[error("{plugin}.{command} timed out after {timeout:?}")]
    Timeout {
        plugin: String,
        command: String,
        timeout: Duration,
    },
    #[error("{plugin}.{command} failed: {message}")]
    Execution {
        plugin: String,
        command: String,
        message: String,
    },
    #[error("{plugin}: {message}")]
    Validation { plugin: String, message: String },
    #[error("{plugin}: unexpected result shape: {source}")]
    Decode {
        plugin: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("call store unavailable: {0}")]
    Store(#[from] StoreError),
}

impl PluginError {
    pub(crate) fn validation(plugin: &str, message: impl Into<String>) -> Self {
        PluginError::Validation {
            plugin: plugin.to_string(),
            message: message.into(),
        }
    }

    /// Stable machine-readable code, used in HTTP error bodies and metrics labels.
    pub fn code(&self) -> &'static str {
        match self {
            PluginError::EnvironmentNotDetected { .. } => "environment_not_detected",
            PluginError::Timeout { .. } => "plugin_timeout",
            PluginError::Execution { .. } => "plugin_execution_error",
            PluginError::Validation { .. } => "validation_error",
            PluginError::Decode { .. } => "decode_error",
            PluginError::Store(_) => "store_unavailable",
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
pub type PluginResult<T> = Result<T, PluginError>;
