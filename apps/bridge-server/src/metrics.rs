use once_cell::sync::Lazy;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

/// Plugins with their own label value; anything else a caller names in an
/// invoke body is counted under `other`.
const KNOWN_PLUGINS: &[&str] = &["camera", "geolocation", "storage", "notification", "vibration"];

pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

pub static STORE_AVAILABLE: Lazy<IntGauge> = Lazy::new(|| {
    let g = IntGauge::new("call_store_available", "Call store reachability: 1=up, 0=down").unwrap();
    REGISTRY.register(Box::new(g.clone())).ok();
    g
});

pub static BRIDGE_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(
        Opts::new("bridge_requests_total", "Bridge route requests from native shells"),
        &["route"],
    )
    .unwrap();
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static CALLS_DELIVERED: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::new(
        "plugin_calls_delivered_total",
        "Plugin calls handed to native shells",
    )
    .unwrap();
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static RESULTS_RECEIVED: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(
        Opts::new("plugin_results_received_total", "Plugin results posted by shells"),
        &["outcome"],
    )
    .unwrap();
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static INVOKE_OUTCOMES: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(
        Opts::new("plugin_invocations_total", "Server-side plugin invocations"),
        &["plugin", "outcome"],
    )
    .unwrap();
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static INVOKE_LATENCY_MS: Lazy<HistogramVec> = Lazy::new(|| {
    let h = HistogramVec::new(
        HistogramOpts::new(
            "plugin_invoke_latency_ms",
            "Time from queueing a plugin call to its result",
        )
        .buckets(vec![
            10.0, 50.0, 100.0, 250.0, 500.0, 1_000.0, 2_500.0, 5_000.0, 10_000.0, 30_000.0,
        ]),
        &["plugin"],
    )
    .unwrap();
    REGISTRY.register(Box::new(h.clone())).ok();
    h
});

pub fn plugin_label(plugin: &str) -> &'static str {
    KNOWN_PLUGINS
        .iter()
        .copied()
        .find(|known| *known == plugin)
        .unwrap_or("other")
}

pub fn export_prometheus() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).ok();
    String::from_utf8(buffer).unwrap_or_default()
}
