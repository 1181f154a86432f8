use std::time::Duration;

use tokio::time::Instant;

const DEFAULT_ACTIVE_TTL: Duration = Duration::from_secs(2 * 60 * 60);
const DEFAULT_CALLS_TTL: Duration = Duration::from_secs(30 * 60);
const DEFAULT_RESULT_TTL: Duration = Duration::from_secs(5 * 60);
const DEFAULT_INVOKE_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_RESULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
// Stand-in for "never" when a lifetime does not fit the clock.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Lifetimes and wait cadence shared by the endpoint and the plugin client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeConfig {
    /// How long a `mark-active` keeps a session eligible for new calls.
    pub active_ttl: Duration,
    /// Refreshed every time a session's call collection is written.
    pub calls_ttl: Duration,
    /// Lifetime of an unconsumed result slot.
    pub result_ttl: Duration,
    pub invoke_timeout: Duration,
    pub result_poll_interval: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            active_ttl: DEFAULT_ACTIVE_TTL,
            calls_ttl: DEFAULT_CALLS_TTL,
            result_ttl: DEFAULT_RESULT_TTL,
            invoke_timeout: DEFAULT_INVOKE_TIMEOUT,
            result_poll_interval: DEFAULT_RESULT_POLL_INTERVAL,
        }
    }
}

impl BridgeConfig {
    pub fn with_invoke_timeout(mut self, timeout: Duration) -> Self {
        self.invoke_timeout = timeout;
        self
    }

    pub fn with_result_poll_interval(mut self, interval: Duration) -> Self {
        // A zero interval would turn the result wait into a busy loop.
        self.result_poll_interval = interval.max(Duration::from_millis(1));
        self
    }
}

/// `now + span`, saturating to roughly thirty years out instead of panicking
/// when `span` overflows the clock.
pub(crate) fn deadline_after(span: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(span)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn oversized_spans_saturate() {
        let now = Instant::now();
        assert_eq!(deadline_after(Duration::from_secs(5)), now + Duration::from_secs(5));
        assert_eq!(deadline_after(Duration::MAX), now + FAR_FUTURE);
        assert_eq!(deadline_after(Duration::from_secs(u64::MAX)), now + FAR_FUTURE);
    }
}
