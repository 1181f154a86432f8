use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bridge_proto::{CallResult, PluginArgs, PluginCall};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::config::{deadline_after, BridgeConfig};
use crate::endpoint::BridgeEndpoint;
use crate::error::{PluginError, PluginResult};
use crate::plugins::{self, Camera, Geolocation, Notification, Storage, Vibration};
use crate::session::SessionId;
use crate::store::{read_record, SharedCallStore, StoreKey};

/// Server-side handle for invoking native capabilities of one session.
///
/// Every call is queued in the store, picked up by the shell on its next poll
/// and awaited here until the shell posts a result or the timeout lapses.
#[derive(Clone)]
pub struct PluginClient {
    bridge: BridgeEndpoint,
    session: SessionId,
}

impl PluginClient {
    pub fn new(store: SharedCallStore, config: BridgeConfig, session: SessionId) -> Self {
        Self {
            bridge: BridgeEndpoint::new(store, config),
            session,
        }
    }

    pub fn session(&self) -> &SessionId {
        &self.session
    }

    pub fn config(&self) -> &BridgeConfig {
        self.bridge.config()
    }

    pub async fn invoke(&self, plugin: &str, command: &str, args: PluginArgs) -> PluginResult<Value> {
        let timeout = self.bridge.config().invoke_timeout;
        self.invoke_with_timeout(plugin, command, args, timeout)
            .await
    }

    pub async fn invoke_with_timeout(
        &self,
        plugin: &str,
        command: &str,
        args: PluginArgs,
        timeout: Duration,
    ) -> PluginResult<Value> {
        if !self.bridge.is_active(&self.session).await? {
            return Err(PluginError::EnvironmentNotDetected {
                plugin: plugin.to_string(),
            });
        }

        let call = PluginCall::new(plugin, command, args, now_ms());
        let call_id = call.id.clone();
        self.bridge.enqueue(&self.session, call).await?;
        debug!(
            session_id = %self.session,
            call_id = %call_id,
            plugin,
            command,
            "awaiting native result"
        );

        let Some(slot) = self.wait_for_result(&call_id, timeout).await? else {
            warn!(
                session_id = %self.session,
                call_id = %call_id,
                plugin,
                command,
                timeout_ms = timeout.as_millis() as u64,
                "plugin call timed out"
            );
            return Err(PluginError::Timeout {
                plugin: plugin.to_string(),
                command: command.to_string(),
                timeout,
            });
        };

        if let Some(message) = slot.failure() {
            return Err(PluginError::Execution {
                plugin: plugin.to_string(),
                command: command.to_string(),
                message: message.to_string(),
            });
        }
        Ok(slot.result.unwrap_or(Value::Null))
    }

    /// `invoke` followed by decoding the result into `T`.
    pub async fn invoke_as<T: DeserializeOwned>(
        &self,
        plugin: &str,
        command: &str,
        args: PluginArgs,
    ) -> PluginResult<T> {
        let value = self.invoke(plugin, command, args).await?;
        plugins::decode(plugin, value)
    }

    pub async fn request_permissions(&self, plugin: &str) -> PluginResult<PluginArgs> {
        self.invoke_as(plugin, "requestPermissions", PluginArgs::new())
            .await
    }

    pub async fn check_permissions(&self, plugin: &str) -> PluginResult<PluginArgs> {
        self.invoke_as(plugin, "checkPermissions", PluginArgs::new())
            .await
    }

    pub fn camera(&self) -> Camera<'_> {
        Camera::new(self)
    }

    pub fn geolocation(&self) -> Geolocation<'_> {
        Geolocation::new(self)
    }

    pub fn storage(&self) -> Storage<'_> {
        Storage::new(self)
    }

    pub fn notification(&self) -> Notification<'_> {
        Notification::new(self)
    }

    pub fn vibration(&self) -> Vibration<'_> {
        Vibration::new(self)
    }

    /// Waits for the result slot of `call_id`, consuming it once completed.
    /// `None` means the deadline passed first.
    async fn wait_for_result(
        &self,
        call_id: &str,
        timeout: Duration,
    ) -> PluginResult<Option<CallResult>> {
        let store = self.bridge.store();
        let key = StoreKey::result(&self.session, call_id);
        let poll_interval = self.bridge.config().result_poll_interval;
        let deadline = deadline_after(timeout);

        loop {
            let slot: Option<CallResult> = read_record(store.as_ref(), &key).await?;
            if let Some(slot) = slot.filter(|slot| slot.completed) {
                store.forget(&key).await?;
                return Ok(Some(slot));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let nap = poll_interval.min(deadline - now);
            tokio::select! {
                _ = store.changed(&key) => {}
                _ = sleep(nap) => {}
            }
        }
    }
}

impl BridgeEndpoint {
    /// Client for `session` sharing this endpoint's store and timings.
    pub fn client(&self, session: SessionId) -> PluginClient {
        PluginClient {
            bridge: self.clone(),
            session,
        }
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
