use std::collections::BTreeMap;

use bridge_proto::PluginArgs;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use super::{args, decode, field};
use crate::error::{PluginError, PluginResult};
use crate::PluginClient;

const PLUGIN: &str = "storage";

/// Device key-value storage. Values travel as JSON-encoded strings so the
/// shell stores them opaquely.
pub struct Storage<'a> {
    client: &'a PluginClient,
}

fn check_key(key: &str) -> PluginResult<()> {
    if key.is_empty() {
        return Err(PluginError::validation(PLUGIN, "storage key must not be empty"));
    }
    Ok(())
}

fn encode<T: Serialize + ?Sized>(value: &T) -> PluginResult<String> {
    serde_json::to_string(value).map_err(|err| PluginError::validation(PLUGIN, err.to_string()))
}

fn decode_stored<T: DeserializeOwned>(key: &str, raw: Option<Value>) -> Option<T> {
    let Some(Value::String(raw)) = raw else {
        return None;
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(err) => {
            debug!(key, error = %err, "ignoring undecodable stored value");
            None
        }
    }
}

impl<'a> Storage<'a> {
    pub(crate) fn new(client: &'a PluginClient) -> Self {
        Self { client }
    }

    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> PluginResult<Value> {
        check_key(key)?;
        let encoded = encode(value)?;
        self.client
            .invoke(
                PLUGIN,
                "set",
                args([("key", json!(key)), ("value", json!(encoded))]),
            )
            .await
    }

    /// `None` when the key is absent or its stored value does not decode as `T`.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> PluginResult<Option<T>> {
        check_key(key)?;
        let result = self
            .client
            .invoke(PLUGIN, "get", args([("key", json!(key))]))
            .await?;
        Ok(decode_stored(key, field(&result, "value")))
    }

    pub async fn remove(&self, key: &str) -> PluginResult<Value> {
        check_key(key)?;
        self.client
            .invoke(PLUGIN, "remove", args([("key", json!(key))]))
            .await
    }

    pub async fn clear(&self) -> PluginResult<Value> {
        self.client.invoke(PLUGIN, "clear", PluginArgs::new()).await
    }

    pub async fn keys(&self) -> PluginResult<Vec<String>> {
        let result = self.client.invoke(PLUGIN, "keys", PluginArgs::new()).await?;
        match field(&result, "keys") {
            Some(keys) => decode(PLUGIN, keys),
            None => Ok(Vec::new()),
        }
    }

    pub async fn length(&self) -> PluginResult<u64> {
        let result = self
            .client
            .invoke(PLUGIN, "length", PluginArgs::new())
            .await?;
        Ok(field(&result, "length")
            .and_then(|v| v.as_u64())
            .unwrap_or(0))
    }

    pub async fn has(&self, key: &str) -> PluginResult<bool> {
        check_key(key)?;
        Ok(self.keys().await?.iter().any(|k| k == key))
    }

    pub async fn set_multiple<T: Serialize>(
        &self,
        items: &BTreeMap<String, T>,
    ) -> PluginResult<Value> {
        let mut encoded = PluginArgs::new();
        for (key, value) in items {
            check_key(key)?;
            encoded.insert(key.clone(), Value::String(encode(value)?));
        }
        self.client
            .invoke(PLUGIN, "setMultiple", args([("items", Value::Object(encoded))]))
            .await
    }

    /// Values for the requested keys; keys that are absent or undecodable are omitted.
    pub async fn get_multiple<T: DeserializeOwned>(
        &self,
        keys: &[&str],
    ) -> PluginResult<BTreeMap<String, T>> {
        for key in keys {
            check_key(key)?;
        }
        let result = self
            .client
            .invoke(PLUGIN, "getMultiple", args([("keys", json!(keys))]))
            .await?;
        let Some(Value::Object(items)) = field(&result, "items") else {
            return Ok(BTreeMap::new());
        };
        Ok(items
            .into_iter()
            .filter_map(|(key, raw)| decode_stored(&key, Some(raw)).map(|value| (key, value)))
            .collect())
    }

    pub async fn remove_multiple(&self, keys: &[&str]) -> PluginResult<Value> {
        for key in keys {
            check_key(key)?;
        }
        self.client
            .invoke(PLUGIN, "removeMultiple", args([("keys", json!(keys))]))
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
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Prefs {
        theme: String,
        volume: u8,
    }

    #[tokio::test(start_paused = true)]
    async fn set_encodes_value_as_json_string() {
        let (endpoint, client) = active_client().await;
        let shell = respond_once(&endpoint, json!({}));
        let prefs = Prefs {
            theme: "dark".into(),
            volume: 7,
        };
        client.storage().set("prefs", &prefs).await.unwrap();
        let call = shell.await.unwrap();
        assert_eq!(call.args.get("key"), Some(&json!("prefs")));
        assert_eq!(
            call.args.get("value"),
            Some(&json!(r#"{"theme":"dark","volume":7}"#))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn get_decodes_stored_string() {
        let (endpoint, client) = active_client().await;
        let shell = respond_once(&endpoint, json!({"value": r#"{"theme":"light","volume":3}"#}));
        let prefs: Option<Prefs> = client.storage().get("prefs").await.unwrap();
        shell.await.unwrap();
        assert_eq!(
            prefs,
            Some(Prefs {
                theme: "light".into(),
                volume: 3
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn missing_or_garbled_values_read_as_none() {
        let (endpoint, client) = active_client().await;
        let shell = respond_once(&endpoint, json!({"value": null}));
        let missing: Option<Prefs> = client.storage().get("prefs").await.unwrap();
        shell.await.unwrap();
        assert_eq!(missing, None);

        let shell = respond_once(&endpoint, json!({"value": "{not json"}));
        let garbled: Option<Prefs> = client.storage().get("prefs").await.unwrap();
        shell.await.unwrap();
        assert_eq!(garbled, None);
    }

    #[tokio::test]
    async fn empty_key_is_rejected() {
        let (_, client) = active_client().await;
        let err = client.storage().remove("").await.unwrap_err();
        assert!(matches!(err, PluginError::Validation { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn get_multiple_skips_undecodable_entries() {
        let (endpoint, client) = active_client().await;
        let shell = respond_once(
            &endpoint,
            json!({"items": {"a": "1", "b": "oops", "c": "3"}}),
        );
        let items: BTreeMap<String, u32> =
            client.storage().get_multiple(&["a", "b", "c"]).await.unwrap();
        let call = shell.await.unwrap();
        assert_eq!(call.args.get("keys"), Some(&json!(["a", "b", "c"])));
        assert_eq!(items.len(), 2);
        assert_eq!(items["a"], 1);
        assert_eq!(items["c"], 3);
    }

    #[tokio::test(start_paused = true)]
    async fn has_checks_key_listing() {
        let (endpoint, client) = active_client().await;
        let shell = respond_once(&endpoint, json!({"keys": ["prefs", "token"]}));
        assert!(client.storage().has("token").await.unwrap());
        shell.await.unwrap();
    }
}
