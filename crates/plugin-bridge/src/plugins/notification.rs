use bridge_proto::PluginArgs;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{args, decode, field, to_args};
use crate::error::{PluginError, PluginResult};
use crate::PluginClient;

const PLUGIN: &str = "notification";

/// A local notification to schedule. Extra shell-specific fields (sound,
/// attachments, schedule) go in `extra` and are sent as-is.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(flatten)]
    pub extra: PluginArgs,
}

impl NotificationRequest {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    fn validate(&self) -> PluginResult<()> {
        if self.title.trim().is_empty() {
            return Err(PluginError::validation(PLUGIN, "notification title is required"));
        }
        Ok(())
    }
}

/// Android notification channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationChannel {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub importance: Option<u8>,
}

pub struct Notification<'a> {
    client: &'a PluginClient,
}

fn id_list(ids: &[i64]) -> Value {
    Value::Array(ids.iter().map(|id| json!({ "id": id })).collect())
}

impl<'a> Notification<'a> {
    pub(crate) fn new(client: &'a PluginClient) -> Self {
        Self { client }
    }

    pub async fn schedule(&self, request: &NotificationRequest) -> PluginResult<Value> {
        self.schedule_multiple(std::slice::from_ref(request)).await
    }

    pub async fn schedule_multiple(&self, requests: &[NotificationRequest]) -> PluginResult<Value> {
        if requests.is_empty() {
            return Err(PluginError::validation(PLUGIN, "no notifications to schedule"));
        }
        let mut notifications = Vec::with_capacity(requests.len());
        for request in requests {
            request.validate()?;
            notifications.push(Value::Object(to_args(PLUGIN, request)?));
        }
        self.client
            .invoke(
                PLUGIN,
                "schedule",
                args([("notifications", Value::Array(notifications))]),
            )
            .await
    }

    pub async fn pending(&self) -> PluginResult<Vec<Value>> {
        self.list("getPending", "notifications").await
    }

    pub async fn cancel(&self, id: i64) -> PluginResult<Value> {
        self.cancel_multiple(&[id]).await
    }

    pub async fn cancel_multiple(&self, ids: &[i64]) -> PluginResult<Value> {
        self.client
            .invoke(PLUGIN, "cancel", args([("notifications", id_list(ids))]))
            .await
    }

    pub async fn cancel_all(&self) -> PluginResult<Value> {
        self.client
            .invoke(PLUGIN, "cancelAll", PluginArgs::new())
            .await
    }

    pub async fn delivered(&self) -> PluginResult<Vec<Value>> {
        self.list("getDelivered", "notifications").await
    }

    pub async fn remove_delivered(&self, ids: &[i64]) -> PluginResult<Value> {
        self.client
            .invoke(
                PLUGIN,
                "removeDelivered",
                args([("notifications", id_list(ids))]),
            )
            .await
    }

    pub async fn remove_all_delivered(&self) -> PluginResult<Value> {
        self.client
            .invoke(PLUGIN, "removeAllDelivered", PluginArgs::new())
            .await
    }

    pub async fn create_channel(&self, channel: &NotificationChannel) -> PluginResult<Value> {
        if channel.id.is_empty() || channel.name.is_empty() {
            return Err(PluginError::validation(PLUGIN, "channel id and name are required"));
        }
        self.client
            .invoke(PLUGIN, "createChannel", to_args(PLUGIN, channel)?)
            .await
    }

    pub async fn delete_channel(&self, channel_id: &str) -> PluginResult<Value> {
        if channel_id.is_empty() {
            return Err(PluginError::validation(PLUGIN, "channel id is required"));
        }
        self.client
            .invoke(PLUGIN, "deleteChannel", args([("id", json!(channel_id))]))
            .await
    }

    pub async fn list_channels(&self) -> PluginResult<Vec<NotificationChannel>> {
        let result = self
            .client
            .invoke(PLUGIN, "listChannels", PluginArgs::new())
            .await?;
        match field(&result, "channels") {
            Some(channels) => decode(PLUGIN, channels),
            None => Ok(Vec::new()),
        }
    }

    pub async fn request_permissions(&self) -> PluginResult<PluginArgs> {
        self.client.request_permissions(PLUGIN).await
    }

    pub async fn check_permissions(&self) -> PluginResult<PluginArgs> {
        self.client.check_permissions(PLUGIN).await
    }

    async fn list(&self, command: &str, name: &str) -> PluginResult<Vec<Value>> {
        let result = self
            .client
            .invoke(PLUGIN, command, PluginArgs::new())
            .await?;
        match field(&result, name) {
            Some(Value::Array(items)) => Ok(items),
            _ => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::testing::{active_client, respond_once};
    use crate::store::{CallStore, StoreKey};

    #[tokio::test(start_paused = true)]
    async fn schedule_wraps_single_request() {
        let (endpoint, client) = active_client().await;
        let shell = respond_once(&endpoint, json!({"scheduled": 1}));
        let mut request = NotificationRequest::new("Build finished").body("All green");
        request.extra.insert("sound".into(), json!("chime"));
        client.notification().schedule(&request).await.unwrap();
        let call = shell.await.unwrap();
        assert_eq!(
            call.args.get("notifications"),
            Some(&json!([{"title": "Build finished", "body": "All green", "sound": "chime"}]))
        );
    }

    #[tokio::test]
    async fn blank_title_is_rejected_before_queueing() {
        let (endpoint, client) = active_client().await;
        let err = client
            .notification()
            .schedule(&NotificationRequest::new("  "))
            .await
            .unwrap_err();
        assert!(matches!(err, PluginError::Validation { .. }));
        assert_eq!(
            endpoint
                .store()
                .get(&StoreKey::calls(client.session()))
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_sends_id_objects() {
        let (endpoint, client) = active_client().await;
        let shell = respond_once(&endpoint, json!({}));
        client.notification().cancel_multiple(&[3, 4]).await.unwrap();
        let call = shell.await.unwrap();
        assert_eq!(call.command, "cancel");
        assert_eq!(
            call.args.get("notifications"),
            Some(&json!([{"id": 3}, {"id": 4}]))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn list_channels_decodes_entries() {
        let (endpoint, client) = active_client().await;
        let shell = respond_once(
            &endpoint,
            json!({"channels": [{"id": "alerts", "name": "Alerts", "importance": 4}]}),
        );
        let channels = client.notification().list_channels().await.unwrap();
        shell.await.unwrap();
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].id, "alerts");
        assert_eq!(channels[0].importance, Some(4));
    }
}
