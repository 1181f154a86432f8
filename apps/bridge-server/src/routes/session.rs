use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use bridge_proto::{NATIVE_SHELL_HEADER, SESSION_COOKIE, SESSION_HEADER};
use plugin_bridge::SessionId;

use super::ApiError;

const MAX_SESSION_LEN: usize = 128;

/// Session of the shell (or page) making the request, taken from the
/// `bridge_session` cookie or the `x-bridge-session` header.
#[derive(Clone, Debug)]
pub struct ShellSession(pub SessionId);

#[async_trait]
impl<S> FromRequestParts<S> for ShellSession
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = extract_session(&parts.headers)
            .ok_or_else(|| ApiError::BadRequest("missing bridge session".into()))?;
        if raw.len() > MAX_SESSION_LEN {
            return Err(ApiError::BadRequest(format!(
                "bridge session longer than {MAX_SESSION_LEN} bytes"
            )));
        }
        Ok(ShellSession(SessionId::new(raw)))
    }
}

impl ShellSession {
    pub fn id(&self) -> &SessionId {
        &self.0
    }
}

fn extract_session(headers: &HeaderMap) -> Option<String> {
    session_cookie(headers)
        .or_else(|| {
            headers
                .get(SESSION_HEADER)
                .and_then(|value| value.to_str().ok())
                .map(|value| value.trim().to_owned())
        })
        .filter(|session| !session.is_empty())
}

fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_owned())
}

/// Native shells announce themselves with `x-native-shell`; older Tauri builds
/// only identify through their user agent.
pub fn is_native_shell(headers: &HeaderMap) -> bool {
    if headers.contains_key(NATIVE_SHELL_HEADER) {
        return true;
    }
    headers
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(|agent| agent.contains("Tauri"))
        .unwrap_or(false)
}
