//! HTTP front of the plugin bridge: the routes native shells poll, plus
//! server-side routes that invoke shell capabilities for the calling session.

pub mod config;
pub mod log_throttle;
pub mod metrics;
pub mod routes;
pub mod state;

/// `{timestamp}-{git sha}` stamped at build time.
pub const BUILD_ID: &str = env!("BRIDGE_BUILD_ID");
