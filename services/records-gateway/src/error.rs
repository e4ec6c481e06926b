//! Per-request gateway errors and their HTTP rendering
//!
//! Every failure the proxy handler can hit becomes one of these, and every
//! one of these becomes a JSON body of the form
//! `{"error":{"type":"...","message":"...","request_id":"req_..."}}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use transport::Url;

#[derive(Error, Debug)]
pub enum Error {
    /// Credential renewal failed; the user must log in again.
    #[error("session expired: {reason}")]
    SessionExpired { reason: String, login_url: Url },

    /// Backend still rejected the request after a renewal.
    #[error("backend rejected the renewed credential")]
    Unauthorized { status: u16 },

    #[error("upstream timeout: {0}")]
    UpstreamTimeout(String),

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl Error {
    /// Translate a dispatcher failure. `login_url` is where an expired session
    /// sends the user.
    pub fn from_dispatch(err: session_refresh::Error, login_url: &Url) -> Self {
        match err {
            session_refresh::Error::SessionExpired(reason) => Error::SessionExpired {
                reason,
                login_url: login_url.clone(),
            },
            session_refresh::Error::RetryExhausted { status } => Error::Unauthorized { status },
            session_refresh::Error::Transport(e) if e.is_timeout() => {
                Error::UpstreamTimeout(e.to_string())
            }
            session_refresh::Error::Transport(transport::Error::InvalidRequest(msg)) => {
                Error::InvalidRequest(msg)
            }
            session_refresh::Error::Transport(e) => Error::Upstream(e.to_string()),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Error::SessionExpired { .. } => StatusCode::UNAUTHORIZED,
            Error::Unauthorized { status } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::UNAUTHORIZED)
            }
            Error::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Error::Upstream(_) => StatusCode::BAD_GATEWAY,
            Error::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// `type` field of the JSON body.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::SessionExpired { .. } => "session_expired",
            Error::Unauthorized { .. } => "unauthorized",
            Error::UpstreamTimeout(_) => "upstream_timeout",
            Error::Upstream(_) => "upstream_error",
            Error::InvalidRequest(_) => "invalid_request",
        }
    }

    pub fn into_response_with_id(self, request_id: &str) -> Response {
        let mut error = serde_json::json!({
            "type": self.kind(),
            "message": self.to_string(),
            "request_id": request_id,
        });
        if let Error::SessionExpired { login_url, .. } = &self {
            error["login_url"] = serde_json::Value::String(login_url.to_string());
        }
        (
            self.status(),
            [(axum::http::header::CONTENT_TYPE, "application/json")],
            serde_json::json!({ "error": error }).to_string(),
        )
            .into_response()
    }
}
