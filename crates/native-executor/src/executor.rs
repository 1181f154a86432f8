use std::{sync::Arc, time::Duration};

use bridge_proto::{PendingCall, PluginResponse};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dispatch::NativeDispatcher;
use crate::transport::BridgeTransport;
use crate::ExecutorResult;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
const DEFAULT_REASSERT_EVERY: Duration = Duration::from_secs(30 * 60);
const POLL_WARN_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorConfig {
    pub poll_interval: Duration,
    /// How often the active marker is refreshed. Must stay below the server's
    /// marker lifetime or the session lapses between refreshes.
    pub reassert_every: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            reassert_every: DEFAULT_REASSERT_EVERY,
        }
    }
}

/// Warns on the first polling failure of a streak and then at most once per
/// [`POLL_WARN_INTERVAL`], counting what was suppressed in between.
#[derive(Default)]
struct PollFailureLog {
    last_warned: Option<Instant>,
    suppressed: u64,
}

impl PollFailureLog {
    fn record(&mut self, err: &dyn std::fmt::Display) {
        let now = Instant::now();
        match self.last_warned {
            Some(at) if now.duration_since(at) < POLL_WARN_INTERVAL => {
                self.suppressed += 1;
            }
            _ => {
                warn!(
                    target = "native_executor",
                    error = %err,
                    suppressed = self.suppressed,
                    "polling plugin calls failed"
                );
                self.last_warned = Some(now);
                self.suppressed = 0;
            }
        }
    }

    fn recovered(&mut self) {
        if self.last_warned.take().is_some() {
            info!(target = "native_executor", "polling plugin calls recovered");
        }
        self.suppressed = 0;
    }
}

pub struct NativeExecutor<T, D> {
    transport: Arc<T>,
    dispatcher: Arc<D>,
    config: ExecutorConfig,
}

impl<T, D> NativeExecutor<T, D>
where
    T: BridgeTransport + 'static,
    D: NativeDispatcher + 'static,
{
    pub fn new(transport: T, dispatcher: D) -> Self {
        Self {
            transport: Arc::new(transport),
            dispatcher: Arc::new(dispatcher),
            config: ExecutorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    /// Polls until `shutdown` fires. Calls already handed to a task keep
    /// running and still report their result.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut marked_at: Option<Instant> = None;
        let mut failures = PollFailureLog::default();

        info!(
            target = "native_executor",
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "native executor started"
        );
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let due = marked_at.map_or(true, |at| at.elapsed() >= self.config.reassert_every);
            if due {
                match self.transport.mark_active().await {
                    Ok(()) => {
                        debug!(target = "native_executor", "session marked active");
                        marked_at = Some(Instant::now());
                    }
                    Err(err) => {
                        failures.record(&err);
                        continue;
                    }
                }
            }

            match self.poll_once().await {
                Ok(_) => failures.recovered(),
                Err(err) => failures.record(&err),
            }
        }
        info!(target = "native_executor", "native executor stopped");
    }

    /// Fetches pending calls once and starts a task per call. Returns the
    /// handles so callers can await completion.
    pub async fn poll_once(&self) -> ExecutorResult<Vec<JoinHandle<()>>> {
        let calls = self.transport.fetch_calls().await?;
        if !calls.is_empty() {
            debug!(target = "native_executor", count = calls.len(), "received plugin calls");
        }
        Ok(calls
            .into_iter()
            .map(|call| {
                let transport = Arc::clone(&self.transport);
                let dispatcher = Arc::clone(&self.dispatcher);
                tokio::spawn(execute(transport, dispatcher, call))
            })
            .collect())
    }
}

async fn execute<T, D>(transport: Arc<T>, dispatcher: Arc<D>, call: PendingCall)
where
    T: BridgeTransport,
    D: NativeDispatcher,
{
    let invocation = call.invocation();
    let response = match dispatcher.dispatch(&invocation, &call.args).await {
        Ok(result) => PluginResponse::success(&call.id, result),
        Err(message) => {
            debug!(
                target = "native_executor",
                call_id = %call.id,
                invocation = %invocation,
                error = %message,
                "native command failed"
            );
            PluginResponse::failure(&call.id, message)
        }
    };
    if let Err(err) = transport.post_result(&response).await {
        warn!(
            target = "native_executor",
            call_id = %call.id,
            invocation = %invocation,
            error = %err,
            "failed to post plugin result"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::DispatchTable;
    use crate::transport::LocalTransport;
    use crate::ExecutorError;
    use async_trait::async_trait;
    use bridge_proto::PluginArgs;
    use plugin_bridge::{BridgeConfig, BridgeEndpoint, MemoryCallStore, PluginError, SessionId};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use test_timeout::tokio_timeout_test;

    fn bridge() -> (BridgeEndpoint, SessionId) {
        let endpoint = BridgeEndpoint::new(MemoryCallStore::shared(), BridgeConfig::default());
        (endpoint, SessionId::from("shell-1"))
    }

    fn table() -> DispatchTable {
        DispatchTable::new()
            .register("test", "echo", |args| Ok(Value::Object(args.clone())))
            .register("camera", "takePhoto", |_| Err("native failure".to_string()))
            .register_async("test", "slow", |_| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(json!("late"))
            })
    }

    #[tokio_timeout_test(10, paused)]
    async fn executor_round_trips_calls_through_the_bridge() {
        let (endpoint, session) = bridge();
        let shutdown = CancellationToken::new();
        let worker = NativeExecutor::new(LocalTransport::new(endpoint.clone(), session.clone()), table())
            .spawn(shutdown.clone());

        // First tick marks the session active.
        tokio::time::sleep(Duration::from_millis(10)).await;
        let client = endpoint.client(session);
        let mut args = PluginArgs::new();
        args.insert("a".into(), json!(1));
        let value = client.invoke("test", "echo", args).await.unwrap();
        assert_eq!(value, json!({"a": 1}));

        shutdown.cancel();
        worker.await.unwrap();
    }

    #[tokio_timeout_test(10, paused)]
    async fn failing_call_does_not_block_others() {
        let (endpoint, session) = bridge();
        let shutdown = CancellationToken::new();
        let worker = NativeExecutor::new(LocalTransport::new(endpoint.clone(), session.clone()), table())
            .spawn(shutdown.clone());
        tokio::time::sleep(Duration::from_millis(10)).await;

        let client = endpoint.client(session);
        let failing = client.invoke("camera", "takePhoto", PluginArgs::new());
        let slow = client.invoke("test", "slow", PluginArgs::new());
        let echo = client.invoke("test", "echo", PluginArgs::new());
        let (failing, slow, echo) = tokio::join!(failing, slow, echo);

        match failing {
            Err(PluginError::Execution { message, .. }) => assert_eq!(message, "native failure"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(slow.unwrap(), json!("late"));
        assert_eq!(echo.unwrap(), json!({}));

        shutdown.cancel();
        worker.await.unwrap();
    }

    #[tokio_timeout_test(10, paused)]
    async fn unsupported_command_is_reported_to_caller() {
        let (endpoint, session) = bridge();
        let shutdown = CancellationToken::new();
        let worker = NativeExecutor::new(LocalTransport::new(endpoint.clone(), session.clone()), table())
            .spawn(shutdown.clone());
        tokio::time::sleep(Duration::from_millis(10)).await;

        let err = endpoint
            .client(session)
            .invoke("geolocation", "getCurrentPosition", PluginArgs::new())
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "geolocation.getCurrentPosition failed: unsupported plugin command plugin:geolocation|getCurrentPosition"
        );

        shutdown.cancel();
        worker.await.unwrap();
    }

    /// Counts marker refreshes and fails every poll.
    #[derive(Default)]
    struct FlakyTransport {
        marks: AtomicUsize,
        polls: AtomicUsize,
    }

    #[async_trait]
    impl BridgeTransport for FlakyTransport {
        async fn mark_active(&self) -> ExecutorResult<()> {
            self.marks.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn fetch_calls(&self) -> ExecutorResult<Vec<PendingCall>> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            Err(ExecutorError::UnexpectedStatus {
                status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
                body: "down".into(),
            })
        }

        async fn post_result(&self, _response: &PluginResponse) -> ExecutorResult<()> {
            Ok(())
        }
    }

    #[tokio_timeout_test(10, paused)]
    async fn keeps_polling_and_reasserts_marker() {
        let shutdown = CancellationToken::new();
        let executor = NativeExecutor::new(FlakyTransport::default(), DispatchTable::new())
            .with_config(ExecutorConfig {
                poll_interval: Duration::from_millis(500),
                reassert_every: Duration::from_secs(2),
            });
        let transport = Arc::clone(&executor.transport);
        let worker = executor.spawn(shutdown.clone());

        tokio::time::sleep(Duration::from_millis(4_750)).await;
        shutdown.cancel();
        worker.await.unwrap();

        // Ticks at 0, 0.5, ..., 4.5s; marker refreshed at 0, 2 and 4s.
        assert_eq!(transport.polls.load(Ordering::SeqCst), 10);
        assert_eq!(transport.marks.load(Ordering::SeqCst), 3);
    }
}
