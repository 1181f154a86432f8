use once_cell::sync::Lazy;
use std::{
    collections::HashMap,
    sync::Mutex,
    time::{Duration, Instant},
};

const MAX_TRACKED: usize = 4_096;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BridgeLogKind {
    Poll,
    MarkActive,
}

impl BridgeLogKind {
    fn interval(self) -> Duration {
        match self {
            BridgeLogKind::Poll => Duration::from_secs(10),
            BridgeLogKind::MarkActive => Duration::from_secs(60),
        }
    }
}

#[derive(Eq, PartialEq, Hash)]
struct LogKey {
    kind: BridgeLogKind,
    session_id: String,
}

static BRIDGE_LOG_MEMORY: Lazy<Mutex<HashMap<LogKey, Instant>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Shells poll every few hundred milliseconds; this keeps per-session route
/// logs to one line per interval.
pub fn should_log_bridge_event(kind: BridgeLogKind, session_id: &str) -> bool {
    let mut guard = BRIDGE_LOG_MEMORY
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    let now = Instant::now();
    if guard.len() >= MAX_TRACKED {
        guard.retain(|key, last| now.duration_since(*last) < key.kind.interval());
    }
    let key = LogKey {
        kind,
        session_id: session_id.to_string(),
    };
    if let Some(last) = guard.get(&key) {
        if now.duration_since(*last) < kind.interval() {
            return false;
        }
    }
    guard.insert(key, now);
    true
}
