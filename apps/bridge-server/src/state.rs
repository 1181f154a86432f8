use std::{sync::Arc, time::Duration};

use plugin_bridge::{
    BridgeConfig, BridgeEndpoint, CallStore, MemoryCallStore, PluginClient, RedisCallStore,
    SessionId, SharedCallStore, StoreResult,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::metrics;

#[derive(Clone)]
enum Backend {
    Memory(Arc<MemoryCallStore>),
    Redis(RedisCallStore),
}

#[derive(Clone)]
pub struct AppState {
    backend: Backend,
    endpoint: BridgeEndpoint,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl AppState {
    /// In-memory state; only suitable for a single server process.
    pub fn new() -> Self {
        Self::with_config(BridgeConfig::default())
    }

    pub fn with_config(config: BridgeConfig) -> Self {
        let memory = MemoryCallStore::shared();
        let store: SharedCallStore = memory.clone();
        Self {
            backend: Backend::Memory(memory),
            endpoint: BridgeEndpoint::new(store, config),
        }
    }

    /// Moves call storage to Redis so every replica sees the same calls.
    pub fn with_redis(self, redis: RedisCallStore) -> Self {
        let store: SharedCallStore = Arc::new(redis.clone());
        Self {
            endpoint: BridgeEndpoint::new(store, *self.endpoint.config()),
            backend: Backend::Redis(redis),
        }
    }

    pub fn endpoint(&self) -> &BridgeEndpoint {
        &self.endpoint
    }

    pub fn client(&self, session: SessionId) -> PluginClient {
        self.endpoint.client(session)
    }

    pub fn backend_name(&self) -> &'static str {
        self.endpoint.store().backend()
    }

    /// Readiness probe. The memory store is always reachable.
    pub async fn check_store(&self) -> StoreResult<()> {
        let outcome = match &self.backend {
            Backend::Memory(_) => Ok(()),
            Backend::Redis(redis) => redis.ping().await,
        };
        metrics::STORE_AVAILABLE.set(i64::from(outcome.is_ok()));
        outcome
    }

    /// Drops expired in-memory entries. Redis expires keys on its own.
    pub async fn purge_expired(&self) -> usize {
        match &self.backend {
            Backend::Memory(memory) => memory.purge_expired().await,
            Backend::Redis(_) => 0,
        }
    }

    /// Periodically purges the in-memory store until `shutdown` fires. With
    /// Redis there is nothing to do and no task is started.
    pub fn spawn_reaper(
        &self,
        every: Duration,
        shutdown: CancellationToken,
    ) -> Option<JoinHandle<()>> {
        if matches!(self.backend, Backend::Redis(_)) {
            return None;
        }
        let state = self.clone();
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let removed = state.purge_expired().await;
                if removed > 0 {
                    debug!(removed, "purged expired bridge entries");
                }
            }
            debug!("bridge reaper stopped");
        }))
    }
}

/// Opens the Redis store named by `url` and checks that it answers.
pub async fn connect_redis(url: &str, prefix: Option<&str>) -> StoreResult<RedisCallStore> {
    let mut store = RedisCallStore::open(url)?;
    if let Some(prefix) = prefix {
        store = store.with_prefix(prefix);
    }
    store.ping().await?;
    Ok(store)
}

pub(crate) fn log_store_unavailable(err: &dyn std::fmt::Display) {
    metrics::STORE_AVAILABLE.set(0);
    warn!(error = %err, "call store operation failed");
}
