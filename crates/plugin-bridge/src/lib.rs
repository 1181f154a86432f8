//! Server-side plugin bridge: lets application code call capabilities that
//! only exist inside a native shell and await their results.
//!
//! The shell never accepts inbound requests. Instead it polls
//! [`BridgeEndpoint::poll_pending_calls`] for work and reports back through
//! [`BridgeEndpoint::submit_result`], while [`PluginClient::invoke`] queues a
//! call and waits on the shared [`CallStore`] for the matching result.

pub mod client;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod plugins;
pub mod session;
pub mod store;

pub use client::PluginClient;
pub use config::BridgeConfig;
pub use endpoint::BridgeEndpoint;
pub use error::{PluginError, PluginResult, StoreError, StoreResult};
pub use session::SessionId;
pub use store::{CallStore, MemoryCallStore, RedisCallStore, SharedCallStore, StoreKey};
