use bridge_proto::PluginArgs;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::args;
use crate::error::{PluginError, PluginResult};
use crate::PluginClient;

const PLUGIN: &str = "vibration";
pub const DEFAULT_VIBRATION_MS: u64 = 300;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImpactStyle {
    Light,
    #[default]
    Medium,
    Heavy,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackKind {
    #[default]
    Success,
    Warning,
    Error,
}

/// Haptics and plain vibration.
pub struct Vibration<'a> {
    client: &'a PluginClient,
}

impl<'a> Vibration<'a> {
    pub(crate) fn new(client: &'a PluginClient) -> Self {
        Self { client }
    }

    pub async fn vibrate(&self, duration_ms: u64) -> PluginResult<Value> {
        if duration_ms == 0 {
            return Err(PluginError::validation(PLUGIN, "duration must be positive"));
        }
        self.client
            .invoke(PLUGIN, "vibrate", args([("duration", json!(duration_ms))]))
            .await
    }

    /// Alternating vibrate/pause durations in milliseconds.
    pub async fn vibrate_pattern(&self, pattern: &[u64]) -> PluginResult<Value> {
        if pattern.is_empty() {
            return Err(PluginError::validation(PLUGIN, "pattern must not be empty"));
        }
        self.client
            .invoke(PLUGIN, "vibratePattern", args([("pattern", json!(pattern))]))
            .await
    }

    pub async fn cancel(&self) -> PluginResult<Value> {
        self.client.invoke(PLUGIN, "cancel", PluginArgs::new()).await
    }

    pub async fn impact(&self, style: ImpactStyle) -> PluginResult<Value> {
        self.client
            .invoke(PLUGIN, "impact", args([("style", json!(style))]))
            .await
    }

    pub async fn notification(&self, kind: FeedbackKind) -> PluginResult<Value> {
        self.client
            .invoke(PLUGIN, "notification", args([("type", json!(kind))]))
            .await
    }

    pub async fn selection(&self) -> PluginResult<Value> {
        self.client
            .invoke(PLUGIN, "selection", PluginArgs::new())
            .await
    }

    pub async fn request_permissions(&self) -> PluginResult<PluginArgs> {
        self.client.request_permissions(PLUGIN).await
    }

    pub async fn check_permissions(&self) -> PluginResult<PluginArgs> {
        self.client.check_permissions(PLUGIN).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::testing::{active_client, respond_once};

    #[tokio::test(start_paused = true)]
    async fn impact_sends_lowercase_style() {
        let (endpoint, client) = active_client().await;
        let shell = respond_once(&endpoint, json!({}));
        client.vibration().impact(ImpactStyle::Heavy).await.unwrap();
        let call = shell.await.unwrap();
        assert_eq!(call.invocation(), "plugin:vibration|impact");
        assert_eq!(call.args.get("style"), Some(&json!("heavy")));
    }

    #[tokio::test(start_paused = true)]
    async fn notification_feedback_uses_type_key() {
        let (endpoint, client) = active_client().await;
        let shell = respond_once(&endpoint, json!({}));
        client
            .vibration()
            .notification(FeedbackKind::Warning)
            .await
            .unwrap();
        let call = shell.await.unwrap();
        assert_eq!(call.args.get("type"), Some(&json!("warning")));
    }

    #[tokio::test]
    async fn invalid_durations_are_rejected() {
        let (_, client) = active_client().await;
        assert!(matches!(
            client.vibration().vibrate(0).await,
            Err(PluginError::Validation { .. })
        ));
        assert!(matches!(
            client.vibration().vibrate_pattern(&[]).await,
            Err(PluginError::Validation { .. })
        ));
    }
}
