//! Shell-side half of the plugin bridge.
//!
//! The executor polls the server for queued plugin calls, runs each through a
//! [`NativeDispatcher`] and posts the outcome back. It talks to the server
//! through a [`BridgeTransport`]: [`HttpTransport`] for a real shell,
//! [`LocalTransport`] when the endpoint lives in the same process.

mod dispatch;
mod executor;
mod transport;

use thiserror::Error;

pub use dispatch::{DispatchTable, NativeDispatcher};
pub use executor::{ExecutorConfig, NativeExecutor};
pub use transport::{BridgeTransport, HttpTransport, LocalTransport};

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status: {status} body={body}")]
    UnexpectedStatus {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("invalid bridge url: {0}")]
    Url(#[from] url::ParseError),
    #[error("call store error: {0}")]
    Store(#[from] plugin_bridge::StoreError),
}

pub type ExecutorResult<T> = Result<T, ExecutorError>;
