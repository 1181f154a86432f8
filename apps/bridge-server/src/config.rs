use std::time::Duration;

use plugin_bridge::BridgeConfig;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default)]
    pub redis_url: Option<String>,
    /// Namespace for bridge keys when several deployments share one Redis.
    #[serde(default)]
    pub redis_key_prefix: Option<String>,
    #[serde(default = "default_active_ttl")]
    pub active_ttl_secs: u64,
    #[serde(default = "default_calls_ttl")]
    pub calls_ttl_secs: u64,
    #[serde(default = "default_result_ttl")]
    pub result_ttl_secs: u64,
    #[serde(default = "default_invoke_timeout")]
    pub invoke_timeout_ms: u64,
    #[serde(default = "default_result_poll_interval")]
    pub result_poll_interval_ms: u64,
    /// How often the in-memory store drops expired entries. Ignored with Redis.
    #[serde(default = "default_purge_interval")]
    pub purge_interval_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            bind_addr: default_bind_addr(),
            redis_url: None,
            redis_key_prefix: None,
            active_ttl_secs: default_active_ttl(),
            calls_ttl_secs: default_calls_ttl(),
            result_ttl_secs: default_result_ttl(),
            invoke_timeout_ms: default_invoke_timeout(),
            result_poll_interval_ms: default_result_poll_interval(),
            purge_interval_secs: default_purge_interval(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        config::Config::builder()
            .add_source(config::Environment::default().separator("__"))
            .build()
            .and_then(|c| c.try_deserialize())
            .map(AppConfig::normalize)
            .unwrap_or_else(|_| AppConfig::default().normalize())
    }

    pub fn bridge_config(&self) -> BridgeConfig {
        BridgeConfig {
            active_ttl: Duration::from_secs(self.active_ttl_secs),
            calls_ttl: Duration::from_secs(self.calls_ttl_secs),
            result_ttl: Duration::from_secs(self.result_ttl_secs),
            ..BridgeConfig::default()
        }
        .with_invoke_timeout(Duration::from_millis(self.invoke_timeout_ms))
        .with_result_poll_interval(Duration::from_millis(self.result_poll_interval_ms))
    }

    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval_secs.max(1))
    }

    fn normalize(mut self) -> Self {
        self.redis_url = Self::normalize_opt(self.redis_url.take());
        self.redis_key_prefix = Self::normalize_opt(self.redis_key_prefix.take());
        let bind_addr = self.bind_addr.trim();
        self.bind_addr = if bind_addr.is_empty() {
            default_bind_addr()
        } else {
            bind_addr.to_string()
        };
        self
    }

    fn normalize_opt(value: Option<String>) -> Option<String> {
        value.and_then(|s| {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
    }
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_active_ttl() -> u64 {
    2 * 60 * 60
}

fn default_calls_ttl() -> u64 {
    30 * 60
}

fn default_result_ttl() -> u64 {
    5 * 60
}

fn default_invoke_timeout() -> u64 {
    30_000
}

fn default_result_poll_interval() -> u64 {
    100
}

fn default_purge_interval() -> u64 {
    60
}
