use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Notify, RwLock};
use tokio::time::Instant;

use super::{CallStore, StoreKey, UpdateFn};
use crate::config::deadline_after;
use crate::error::StoreResult;

#[derive(Debug)]
struct Entry {
    value: Value,
    expires_at: Instant,
}

impl Entry {
    fn new(value: Value, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: deadline_after(ttl),
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// Process-local store. Expiry runs on the tokio clock so paused-time tests
/// can fast-forward TTLs; expired entries are dropped lazily on access and in
/// bulk by [`MemoryCallStore::purge_expired`].
#[derive(Debug, Default)]
pub struct MemoryCallStore {
    entries: RwLock<HashMap<StoreKey, Entry>>,
    changed: Notify,
}

impl MemoryCallStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Drops every expired entry, returning how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        before - entries.len()
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        let entries = self.entries.read().await;
        entries.values().filter(|entry| entry.is_live(now)).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl CallStore for MemoryCallStore {
    async fn get(&self, key: &StoreKey) -> StoreResult<Option<Value>> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if entry.is_live(now) => return Ok(Some(entry.value.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }
        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|entry| !entry.is_live(now)) {
            entries.remove(key);
        }
        Ok(None)
    }

    async fn put(&self, key: &StoreKey, value: Value, ttl: Duration) -> StoreResult<()> {
        self.entries
            .write()
            .await
            .insert(key.clone(), Entry::new(value, ttl));
        self.changed.notify_waiters();
        Ok(())
    }

    async fn forget(&self, key: &StoreKey) -> StoreResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn update(
        &self,
        key: &StoreKey,
        ttl: Duration,
        apply: &mut UpdateFn<'_>,
    ) -> StoreResult<bool> {
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        let current = entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone());
        let Some(next) = apply(current) else {
            return Ok(false);
        };
        entries.insert(key.clone(), Entry::new(next, ttl));
        drop(entries);
        self.changed.notify_waiters();
        Ok(true)
    }

    async fn changed(&self, _key: &StoreKey) {
        self.changed.notified().await
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
