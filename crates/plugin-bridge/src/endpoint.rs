use bridge_proto::{CallResult, PluginCall};
use serde_json::Value;
use tracing::{debug, trace};

use crate::config::BridgeConfig;
use crate::error::StoreResult;
use crate::session::SessionId;
use crate::store::{
    decode_collection, read_record, write_record, CallCollection, SharedCallStore, StoreKey,
};

/// Server-side half of the bridge the native shell talks to: announces
/// sessions, hands out pending calls and accepts their results.
#[derive(Clone)]
pub struct BridgeEndpoint {
    store: SharedCallStore,
    config: BridgeConfig,
}

impl BridgeEndpoint {
    pub fn new(store: SharedCallStore, config: BridgeConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &SharedCallStore {
        &self.store
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Flags the session as backed by a live shell. Repeating it only refreshes
    /// the marker's lifetime.
    pub async fn mark_active(&self, session: &SessionId) -> StoreResult<()> {
        self.store
            .put(
                &StoreKey::active(session),
                Value::Bool(true),
                self.config.active_ttl,
            )
            .await?;
        debug!(session_id = %session, "session marked active");
        Ok(())
    }

    pub async fn is_active(&self, session: &SessionId) -> StoreResult<bool> {
        let marker: Option<bool> =
            read_record(self.store.as_ref(), &StoreKey::active(session)).await?;
        Ok(marker.unwrap_or(false))
    }

    /// Returns every call not yet handed out and flags them as picked up in the
    /// same atomic write, so no call is delivered twice. Ordered by queue time.
    pub async fn poll_pending_calls(&self, session: &SessionId) -> StoreResult<Vec<PluginCall>> {
        let mut pending = Vec::new();
        let mut encode_error = None;
        self.store
            .update(
                &StoreKey::calls(session),
                self.config.calls_ttl,
                &mut |current| {
                    pending.clear();
                    let mut calls = decode_collection(current);
                    for call in calls.values_mut().filter(|call| !call.picked_up) {
                        pending.push(call.clone());
                        call.picked_up = true;
                    }
                    if pending.is_empty() {
                        return None;
                    }
                    encode_collection(&calls, &mut encode_error)
                },
            )
            .await?;
        if let Some(err) = encode_error {
            return Err(err.into());
        }
        pending.sort_by(|a, b| a.queued_at.cmp(&b.queued_at).then_with(|| a.id.cmp(&b.id)));
        if pending.is_empty() {
            trace!(session_id = %session, "no pending plugin calls");
        } else {
            debug!(session_id = %session, count = pending.len(), "delivering plugin calls");
        }
        Ok(pending)
    }

    /// Stores the outcome of a call. Ids that were never queued are accepted
    /// and simply expire; a repeated submission overwrites the earlier one.
    pub async fn submit_result(
        &self,
        session: &SessionId,
        call_id: &str,
        result: Option<Value>,
        error: Option<String>,
    ) -> StoreResult<()> {
        let slot = CallResult::completed(result, error);
        write_record(
            self.store.as_ref(),
            &StoreKey::result(session, call_id),
            &slot,
            self.config.result_ttl,
        )
        .await?;
        debug!(
            session_id = %session,
            call_id,
            failed = slot.failure().is_some(),
            "plugin result stored"
        );
        Ok(())
    }

    /// Appends a call to the session's collection, refreshing its lifetime.
    pub(crate) async fn enqueue(&self, session: &SessionId, call: PluginCall) -> StoreResult<()> {
        let mut encode_error = None;
        self.store
            .update(
                &StoreKey::calls(session),
                self.config.calls_ttl,
                &mut |current| {
                    let mut calls: CallCollection = decode_collection(current);
                    calls.insert(call.id.clone(), call.clone());
                    encode_collection(&calls, &mut encode_error)
                },
            )
            .await?;
        if let Some(err) = encode_error {
            return Err(err.into());
        }
        trace!(session_id = %session, call_id = %call.id, "plugin call queued");
        Ok(())
    }
}

fn encode_collection(
    calls: &CallCollection,
    encode_error: &mut Option<serde_json::Error>,
) -> Option<Value> {
    match serde_json::to_value(calls) {
        Ok(value) => Some(value),
        Err(err) => {
            *encode_error = Some(err);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{CallStore, MemoryCallStore};
    use bridge_proto::PluginArgs;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn endpoint() -> (Arc<MemoryCallStore>, BridgeEndpoint) {
        let store = MemoryCallStore::shared();
        let endpoint = BridgeEndpoint::new(store.clone(), BridgeConfig::default());
        (store, endpoint)
    }

    fn call(command: &str, queued_at: i64) -> PluginCall {
        PluginCall::new("camera", command, PluginArgs::new(), queued_at)
    }

    #[tokio::test]
    async fn poll_delivers_each_call_once() {
        let (_, endpoint) = endpoint();
        let session = SessionId::from("s1");
        endpoint.enqueue(&session, call("takePhoto", 1)).await.unwrap();

        let first = endpoint.poll_pending_calls(&session).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].command, "takePhoto");
        assert!(!first[0].picked_up);

        let second = endpoint.poll_pending_calls(&session).await.unwrap();
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn poll_orders_by_queue_time() {
        let (_, endpoint) = endpoint();
        let session = SessionId::from("s1");
        endpoint.enqueue(&session, call("late", 20)).await.unwrap();
        endpoint.enqueue(&session, call("early", 10)).await.unwrap();
        let commands: Vec<_> = endpoint
            .poll_pending_calls(&session)
            .await
            .unwrap()
            .into_iter()
            .map(|call| call.command)
            .collect();
        assert_eq!(commands, vec!["early", "late"]);
    }

    #[tokio::test]
    async fn sessions_do_not_see_each_others_calls() {
        let (_, endpoint) = endpoint();
        endpoint
            .enqueue(&SessionId::from("a"), call("takePhoto", 1))
            .await
            .unwrap();
        let other = endpoint.poll_pending_calls(&SessionId::from("b")).await.unwrap();
        assert!(other.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn empty_poll_does_not_extend_collection_lifetime() {
        let (store, endpoint) = endpoint();
        let session = SessionId::from("s1");
        endpoint.enqueue(&session, call("takePhoto", 1)).await.unwrap();
        endpoint.poll_pending_calls(&session).await.unwrap();

        tokio::time::advance(Duration::from_secs(20 * 60)).await;
        assert!(endpoint.poll_pending_calls(&session).await.unwrap().is_empty());
        tokio::time::advance(Duration::from_secs(11 * 60)).await;
        assert_eq!(store.get(&StoreKey::calls(&session)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn mark_active_is_idempotent() {
        let (store, endpoint) = endpoint();
        let session = SessionId::from("s1");
        assert!(!endpoint.is_active(&session).await.unwrap());
        endpoint.mark_active(&session).await.unwrap();
        endpoint.mark_active(&session).await.unwrap();
        assert!(endpoint.is_active(&session).await.unwrap());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unbounded_lifetimes_do_not_overflow() {
        let config = BridgeConfig {
            active_ttl: Duration::from_secs(u64::MAX),
            calls_ttl: Duration::MAX,
            result_ttl: Duration::MAX,
            ..BridgeConfig::default()
        };
        let endpoint = BridgeEndpoint::new(MemoryCallStore::shared(), config);
        let session = SessionId::from("s1");
        endpoint.mark_active(&session).await.unwrap();
        endpoint.enqueue(&session, call("takePhoto", 1)).await.unwrap();
        endpoint
            .submit_result(&session, "call_1", Some(json!(1)), None)
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(365 * 24 * 60 * 60)).await;
        assert!(endpoint.is_active(&session).await.unwrap());
        assert_eq!(endpoint.poll_pending_calls(&session).await.unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_call_result_is_stored_and_expires() {
        let (store, endpoint) = endpoint();
        let session = SessionId::from("s1");
        endpoint
            .submit_result(&session, "nonexistent", Some(json!(1)), None)
            .await
            .unwrap();
        let key = StoreKey::result(&session, "nonexistent");
        let stored: CallResult = read_record(store.as_ref(), &key).await.unwrap().unwrap();
        assert!(stored.completed);
        assert_eq!(stored.result, Some(json!(1)));
        assert_eq!(store.get(&StoreKey::calls(&session)).await.unwrap(), None);

        tokio::time::advance(Duration::from_secs(5 * 60 + 1)).await;
        assert_eq!(store.get(&key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn repeated_submission_keeps_last_write() {
        let (store, endpoint) = endpoint();
        let session = SessionId::from("s1");
        endpoint
            .submit_result(&session, "call_1", None, Some("first".into()))
            .await
            .unwrap();
        endpoint
            .submit_result(&session, "call_1", Some(json!("second")), None)
            .await
            .unwrap();
        let stored: CallResult = read_record(store.as_ref(), &StoreKey::result(&session, "call_1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.result, Some(json!("second")));
        assert_eq!(stored.failure(), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_pollers_never_share_a_call() {
        let (_, endpoint) = endpoint();
        let session = SessionId::from("s1");
        for n in 0..50 {
            endpoint.enqueue(&session, call("vibrate", n)).await.unwrap();
        }
        let mut tasks = Vec::new();
        for _ in 0..8 {
            let endpoint = endpoint.clone();
            let session = session.clone();
            tasks.push(tokio::spawn(async move {
                endpoint.poll_pending_calls(&session).await.unwrap()
            }));
        }
        let mut seen = std::collections::HashSet::new();
        for task in tasks {
            for call in task.await.unwrap() {
                assert!(seen.insert(call.id), "call delivered twice");
            }
        }
        assert_eq!(seen.len(), 50);
    }
}
