//! Keyed, TTL-bounded storage shared by every bridge operation.
//!
//! The store is the single source of truth for pending calls, result slots and
//! active markers. Neither the endpoint nor the client caches any of it across
//! operations; both talk to a [`SharedCallStore`] handed to them at construction.

mod memory;
mod redis_store;

use std::{collections::BTreeMap, fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use bridge_proto::PluginCall;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::error::StoreResult;
use crate::session::SessionId;

pub use memory::MemoryCallStore;
pub use redis_store::RedisCallStore;

/// Pending calls of one session, keyed by call id.
pub type CallCollection = BTreeMap<String, PluginCall>;

pub type SharedCallStore = Arc<dyn CallStore>;

/// Read-modify-write step for [`CallStore::update`]. Receives the live value
/// (if any) and returns what to write, or `None` to leave the key untouched.
/// May run more than once when a backend retries after a conflicting write.
pub type UpdateFn<'a> = dyn FnMut(Option<Value>) -> Option<Value> + Send + 'a;

const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.');

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyNamespace {
    Active,
    Calls,
    Result,
}

impl KeyNamespace {
    pub fn as_str(self) -> &'static str {
        match self {
            KeyNamespace::Active => "active",
            KeyNamespace::Calls => "calls",
            KeyNamespace::Result => "result",
        }
    }
}

/// Structured store key. Backends that need a flat string use [`StoreKey::render`],
/// which percent-encodes each segment so two distinct keys never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoreKey {
    namespace: KeyNamespace,
    session: SessionId,
    id: Option<String>,
}

impl StoreKey {
    pub fn active(session: &SessionId) -> Self {
        Self {
            namespace: KeyNamespace::Active,
            session: session.clone(),
            id: None,
        }
    }

    pub fn calls(session: &SessionId) -> Self {
        Self {
            namespace: KeyNamespace::Calls,
            session: session.clone(),
            id: None,
        }
    }

    pub fn result(session: &SessionId, call_id: &str) -> Self {
        Self {
            namespace: KeyNamespace::Result,
            session: session.clone(),
            id: Some(call_id.to_string()),
        }
    }

    pub fn namespace(&self) -> KeyNamespace {
        self.namespace
    }

    pub fn session(&self) -> &SessionId {
        &self.session
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn render(&self, prefix: &str) -> String {
        let mut out = String::new();
        if !prefix.is_empty() {
            out.push_str(prefix);
            out.push(':');
        }
        out.push_str(self.namespace.as_str());
        out.push(':');
        out.extend(utf8_percent_encode(self.session.as_str(), SEGMENT));
        if let Some(id) = &self.id {
            out.push(':');
            out.extend(utf8_percent_encode(id, SEGMENT));
        }
        out
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(""))
    }
}

#[async_trait]
pub trait CallStore: Send + Sync {
    /// Live value under `key`; expired entries read as absent.
    async fn get(&self, key: &StoreKey) -> StoreResult<Option<Value>>;

    async fn put(&self, key: &StoreKey, value: Value, ttl: Duration) -> StoreResult<()>;

    async fn forget(&self, key: &StoreKey) -> StoreResult<()>;

    /// Atomically applies `apply` to the live value and writes the outcome with
    /// a fresh `ttl`. Returns whether anything was written.
    async fn update(
        &self,
        key: &StoreKey,
        ttl: Duration,
        apply: &mut UpdateFn<'_>,
    ) -> StoreResult<bool>;

    /// Resolves after a write that may concern `key`. Backends without change
    /// notification never resolve; waiters must pair this with a timer.
    async fn changed(&self, _key: &StoreKey) {
        std::future::pending::<()>().await
    }

    fn backend(&self) -> &'static str;
}

pub(crate) async fn read_record<T: DeserializeOwned>(
    store: &dyn CallStore,
    key: &StoreKey,
) -> StoreResult<Option<T>> {
    match store.get(key).await? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

pub(crate) async fn write_record<T: Serialize + ?Sized>(
    store: &dyn CallStore,
    key: &StoreKey,
    record: &T,
    ttl: Duration,
) -> StoreResult<()> {
    let value = serde_json::to_value(record)?;
    store.put(key, value, ttl).await
}

/// Decodes a stored call collection. Unreadable payloads are treated as empty
/// so one corrupt write cannot wedge a session until its TTL lapses.
pub(crate) fn decode_collection(value: Option<Value>) -> CallCollection {
    match value {
        Some(value) => serde_json::from_value(value).unwrap_or_else(|err| {
            tracing::warn!(error = %err, "discarding unreadable call collection");
            CallCollection::new()
        }),
        None => CallCollection::new(),
    }
}
