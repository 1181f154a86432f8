use std::net::SocketAddr;

use anyhow::Context;
use bridge_server::{
    config::AppConfig,
    routes::build_router,
    state::{connect_redis, AppState},
    BUILD_ID,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cfg = AppConfig::from_env();
    let mut state = AppState::with_config(cfg.bridge_config());

    if let Some(redis_url) = &cfg.redis_url {
        match connect_redis(redis_url, cfg.redis_key_prefix.as_deref()).await {
            Ok(store) => {
                info!("connected to redis at {}", redis_url);
                state = state.with_redis(store);
            }
            Err(err) => {
                warn!(error = %err, "redis unavailable; keeping calls in memory");
            }
        }
    } else {
        info!("REDIS_URL not set; bridge state is local to this process");
    }
    if state.check_store().await.is_err() {
        warn!("call store not ready at startup");
    }

    let shutdown = CancellationToken::new();
    let reaper = state.spawn_reaper(cfg.purge_interval(), shutdown.clone());

    let app = build_router(state.clone());
    let addr: SocketAddr = cfg.bind_addr.parse()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("failed to bind listener")?;
    info!(
        build_id = BUILD_ID,
        backend = state.backend_name(),
        "Starting plugin bridge on {addr}"
    );

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server shutdown with error")?;

    shutdown.cancel();
    if let Some(reaper) = reaper {
        let _ = reaper.await;
    }
    info!("plugin bridge stopped");
    Ok(())
}

async fn shutdown_signal() {
    let _ = signal::ctrl_c().await;
}

fn init_tracing() {
    tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}
