use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::{CallStore, StoreKey, UpdateFn};
use crate::error::{StoreError, StoreResult};

const DEFAULT_KEY_PREFIX: &str = "plugin-bridge";
const MAX_UPDATE_ATTEMPTS: u32 = 16;

/// Redis-backed store shared by every server replica. Values are JSON strings
/// written with `SET .. PX`, so Redis owns expiry.
#[derive(Clone)]
pub struct RedisCallStore {
    client: Arc<redis::Client>,
    prefix: String,
}

impl RedisCallStore {
    pub fn new(client: redis::Client) -> Self {
        Self {
            client: Arc::new(client),
            prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }

    pub fn open(url: &str) -> StoreResult<Self> {
        Ok(Self::new(redis::Client::open(url)?))
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.client.get_async_connection().await?;
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await?;
        Ok(())
    }

    fn key(&self, key: &StoreKey) -> String {
        key.render(&self.prefix)
    }
}

// PX rejects zero, and expiries that overflow the server clock.
const MAX_TTL_MILLIS: u64 = 100 * 365 * 24 * 60 * 60 * 1000;

fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis())
        .unwrap_or(u64::MAX)
        .clamp(1, MAX_TTL_MILLIS)
}

fn decode(raw: Option<String>) -> StoreResult<Option<Value>> {
    match raw {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

#[async_trait]
impl CallStore for RedisCallStore {
    async fn get(&self, key: &StoreKey) -> StoreResult<Option<Value>> {
        let mut conn = self.client.get_async_connection().await?;
        let raw: Option<String> = redis::cmd("GET")
            .arg(self.key(key))
            .query_async(&mut conn)
            .await?;
        decode(raw)
    }

    async fn put(&self, key: &StoreKey, value: Value, ttl: Duration) -> StoreResult<()> {
        let mut conn = self.client.get_async_connection().await?;
        let payload = serde_json::to_string(&value)?;
        redis::cmd("SET")
            .arg(self.key(key))
            .arg(payload)
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn forget(&self, key: &StoreKey) -> StoreResult<()> {
        let mut conn = self.client.get_async_connection().await?;
        redis::cmd("DEL")
            .arg(self.key(key))
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn update(
        &self,
        key: &StoreKey,
        ttl: Duration,
        apply: &mut UpdateFn<'_>,
    ) -> StoreResult<bool> {
        let redis_key = self.key(key);
        let mut conn = self.client.get_async_connection().await?;
        for attempt in 1..=MAX_UPDATE_ATTEMPTS {
            redis::cmd("WATCH")
                .arg(&redis_key)
                .query_async::<_, ()>(&mut conn)
                .await?;
            let raw: Option<String> = redis::cmd("GET")
                .arg(&redis_key)
                .query_async(&mut conn)
                .await?;
            let current = match decode(raw) {
                Ok(current) => current,
                Err(err) => {
                    redis::cmd("UNWATCH")
                        .query_async::<_, ()>(&mut conn)
                        .await?;
                    return Err(err);
                }
            };
            let Some(next) = apply(current) else {
                redis::cmd("UNWATCH")
                    .query_async::<_, ()>(&mut conn)
                    .await?;
                return Ok(false);
            };
            let payload = serde_json::to_string(&next)?;
            // EXEC replies nil when the watched key changed underneath us.
            let committed: Option<(String,)> = redis::pipe()
                .atomic()
                .cmd("SET")
                .arg(&redis_key)
                .arg(payload)
                .arg("PX")
                .arg(ttl_millis(ttl))
                .query_async(&mut conn)
                .await?;
            if committed.is_some() {
                return Ok(true);
            }
            debug!(key = %redis_key, attempt, "call store update raced; retrying");
        }
        Err(StoreError::Contention {
            key: redis_key,
            attempts: MAX_UPDATE_ATTEMPTS,
        })
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionId;
    use serde_json::json;
    use std::time::{SystemTime, UNIX_EPOCH};

    #[test]
    fn ttl_is_clamped_to_what_px_accepts() {
        assert_eq!(ttl_millis(Duration::ZERO), 1);
        assert_eq!(ttl_millis(Duration::from_micros(300)), 1);
        assert_eq!(ttl_millis(Duration::from_millis(1500)), 1500);
        assert_eq!(ttl_millis(Duration::MAX), MAX_TTL_MILLIS);
        assert_eq!(ttl_millis(Duration::from_secs(u64::MAX)), MAX_TTL_MILLIS);
    }

    #[test]
    fn decode_reads_json_payloads() {
        assert_eq!(decode(None).unwrap(), None);
        assert_eq!(
            decode(Some(r#"{"a":[1,2]}"#.into())).unwrap(),
            Some(json!({"a": [1, 2]}))
        );
        assert!(matches!(
            decode(Some("{not json".into())),
            Err(StoreError::Serde(_))
        ));
    }

    #[test]
    fn keys_carry_the_configured_prefix() {
        let session = SessionId::from("s 1");
        let store = RedisCallStore::open("redis://127.0.0.1/").unwrap();
        assert_eq!(
            store.key(&StoreKey::active(&session)),
            "plugin-bridge:active:s%201"
        );
        let store = store.with_prefix("replica-a");
        assert_eq!(
            store.key(&StoreKey::result(&session, "call_1")),
            "replica-a:result:s%201:call_1"
        );
    }

    // Needs a live server: REDIS_URL=redis://127.0.0.1/ cargo test -- --ignored
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ignore]
    async fn concurrent_updates_are_not_lost() {
        let Ok(url) = std::env::var("REDIS_URL") else {
            return;
        };
        let nonce = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let prefix = format!("plugin-bridge-test-{}-{nonce}", std::process::id());
        let store = RedisCallStore::open(&url).unwrap().with_prefix(prefix);
        let key = StoreKey::calls(&SessionId::from("counter"));
        let ttl = Duration::from_secs(60);
        const WRITERS: u64 = 4;
        const INCREMENTS: u64 = 10;

        let mut writers = Vec::new();
        for _ in 0..WRITERS {
            let store = store.clone();
            let key = key.clone();
            writers.push(tokio::spawn(async move {
                let mut done = 0;
                while done < INCREMENTS {
                    let outcome = store
                        .update(&key, ttl, &mut |current: Option<Value>| {
                            let n = current.and_then(|v| v.as_u64()).unwrap_or(0);
                            Some(json!(n + 1))
                        })
                        .await;
                    match outcome {
                        Ok(wrote) => {
                            assert!(wrote);
                            done += 1;
                        }
                        Err(StoreError::Contention { .. }) => {}
                        Err(err) => panic!("update failed: {err}"),
                    }
                }
            }));
        }
        for writer in writers {
            writer.await.unwrap();
        }

        assert_eq!(store.get(&key).await.unwrap(), Some(json!(WRITERS * INCREMENTS)));

        let mut conn = store.client.get_async_connection().await.unwrap();
        let pttl: i64 = redis::cmd("PTTL")
            .arg(store.key(&key))
            .query_async(&mut conn)
            .await
            .unwrap();
        assert!(pttl > 0 && pttl <= 60_000, "pttl {pttl}");

        // Declined updates leave the key alone.
        let wrote = store
            .update(&key, Duration::from_secs(600), &mut |_| None)
            .await
            .unwrap();
        assert!(!wrote);

        store.forget(&key).await.unwrap();
        assert_eq!(store.get(&key).await.unwrap(), None);
    }
}
