use async_trait::async_trait;
use bridge_proto::{
    BridgeAck, PendingCall, PluginResponse, MARK_ACTIVE_PATH, NATIVE_SHELL_HEADER,
    PLUGIN_CALLS_PATH, PLUGIN_RESPONSE_PATH, SESSION_COOKIE,
};
use plugin_bridge::{BridgeEndpoint, SessionId};
use reqwest::{header, RequestBuilder, Response};
use serde_json::json;
use url::Url;

use crate::{ExecutorError, ExecutorResult};

/// How the executor reaches the bridge endpoint for its session.
#[async_trait]
pub trait BridgeTransport: Send + Sync {
    async fn mark_active(&self) -> ExecutorResult<()>;
    async fn fetch_calls(&self) -> ExecutorResult<Vec<PendingCall>>;
    async fn post_result(&self, response: &PluginResponse) -> ExecutorResult<()>;
}

/// Talks to the bridge routes over HTTP, identifying itself with the session
/// cookie and the native shell marker header.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    http: reqwest::Client,
    mark_active_url: Url,
    calls_url: Url,
    response_url: Url,
    session: SessionId,
}

impl HttpTransport {
    pub fn new(base_url: &str, session: SessionId) -> ExecutorResult<Self> {
        Self::with_client(reqwest::Client::new(), base_url, session)
    }

    pub fn with_client(
        http: reqwest::Client,
        base_url: &str,
        session: SessionId,
    ) -> ExecutorResult<Self> {
        let base = Url::parse(base_url)?;
        Ok(Self {
            http,
            mark_active_url: base.join(MARK_ACTIVE_PATH)?,
            calls_url: base.join(PLUGIN_CALLS_PATH)?,
            response_url: base.join(PLUGIN_RESPONSE_PATH)?,
            session,
        })
    }

    pub fn session(&self) -> &SessionId {
        &self.session
    }

    fn decorate(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header(header::COOKIE, format!("{SESSION_COOKIE}={}", self.session))
            .header(NATIVE_SHELL_HEADER, "1")
    }
}

async fn ensure_success(res: Response) -> ExecutorResult<Response> {
    if res.status().is_success() {
        Ok(res)
    } else {
        let status = res.status();
        let body = res.text().await.unwrap_or_default();
        Err(ExecutorError::UnexpectedStatus { status, body })
    }
}

#[async_trait]
impl BridgeTransport for HttpTransport {
    async fn mark_active(&self) -> ExecutorResult<()> {
        let res = self
            .decorate(self.http.post(self.mark_active_url.clone()))
            .json(&json!({}))
            .send()
            .await?;
        ensure_success(res).await?.json::<BridgeAck>().await?;
        Ok(())
    }

    async fn fetch_calls(&self) -> ExecutorResult<Vec<PendingCall>> {
        let res = self
            .decorate(self.http.get(self.calls_url.clone()))
            .send()
            .await?;
        Ok(ensure_success(res).await?.json::<Vec<PendingCall>>().await?)
    }

    async fn post_result(&self, response: &PluginResponse) -> ExecutorResult<()> {
        let res = self
            .decorate(self.http.post(self.response_url.clone()))
            .json(response)
            .send()
            .await?;
        ensure_success(res).await?.json::<BridgeAck>().await?;
        Ok(())
    }
}

/// Calls a [`BridgeEndpoint`] directly, for shells embedded in the server
/// process and for tests.
#[derive(Clone)]
pub struct LocalTransport {
    endpoint: BridgeEndpoint,
    session: SessionId,
}

impl LocalTransport {
    pub fn new(endpoint: BridgeEndpoint, session: SessionId) -> Self {
        Self { endpoint, session }
    }
}

#[async_trait]
impl BridgeTransport for LocalTransport {
    async fn mark_active(&self) -> ExecutorResult<()> {
        Ok(self.endpoint.mark_active(&self.session).await?)
    }

    async fn fetch_calls(&self) -> ExecutorResult<Vec<PendingCall>> {
        let calls = self.endpoint.poll_pending_calls(&self.session).await?;
        Ok(calls.into_iter().map(PendingCall::from).collect())
    }

    async fn post_result(&self, response: &PluginResponse) -> ExecutorResult<()> {
        self.endpoint
            .submit_result(
                &self.session,
                &response.call_id,
                response.result.clone(),
                response.error.clone(),
            )
            .await?;
        Ok(())
    }
}
