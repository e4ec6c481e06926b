//! Inbound request forwarding
//!
//! Receives inbound requests, strips hop-by-hop and client credential headers,
//! and hands a buffered descriptor to the dispatcher, which attaches the
//! gateway's own credential and handles expiry. Upstream responses, error
//! statuses included, are returned verbatim.

use std::sync::Arc;
use std::time::Instant;

use axum::response::Response;
use session_refresh::Dispatcher;
use tracing::{error, instrument, warn};
use transport::header::{AUTHORIZATION, CONTENT_LENGTH, HOST};
use transport::{HeaderMap, RequestDescriptor, Url};

use crate::config::backend_join;
use crate::error::Error;
use crate::metrics;
use crate::service::ServiceMetrics;

/// Inbound bodies are buffered so they can be replayed after a renewal.
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Headers to strip before forwarding (hop-by-hop per RFC 2616 Section 13.5.1)
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Shared state passed to the proxy handler via axum State extractor
#[derive(Clone)]
pub struct ProxyState {
    pub dispatcher: Arc<Dispatcher>,
    pub backend_url: Url,
    pub login_url: Url,
    pub metrics: ServiceMetrics,
}

/// Forward one inbound request through the dispatcher.
#[instrument(skip_all, fields(request_id = %request_id, method = %request.method(), path = %request.uri().path()))]
pub async fn proxy_request(
    state: &ProxyState,
    request: axum::http::Request<axum::body::Body>,
    request_id: String,
) -> Response {
    let _in_flight = state.metrics.track();
    let started = Instant::now();
    let method = request.method().clone();

    let response = match forward(state, request).await {
        Ok(response) => response,
        Err(err) => {
            state.metrics.record_error();
            match &err {
                Error::InvalidRequest(_) => warn!(error = %err, "rejected inbound request"),
                _ => error!(error = %err, kind = err.kind(), "request failed"),
            }
            err.into_response_with_id(&request_id)
        }
    };

    metrics::record_request(
        response.status().as_u16(),
        method.as_str(),
        started.elapsed().as_secs_f64(),
    );
    response
}

async fn forward(
    state: &ProxyState,
    request: axum::http::Request<axum::body::Body>,
) -> Result<Response, Error> {
    let (parts, body) = request.into_parts();

    let target = upstream_url(&state.backend_url, &parts.uri)?;
    let headers = forwarded_headers(&parts.headers);
    let body = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| Error::InvalidRequest(format!("invalid request body: {e}")))?;

    let descriptor = RequestDescriptor::new(parts.method, target)
        .with_headers(headers)
        .with_body(body);

    let upstream = state.dispatcher.dispatch(descriptor).await.map_err(|e| {
        metrics::record_upstream_error(e.kind());
        Error::from_dispatch(e, &state.login_url)
    })?;

    let mut response = Response::builder().status(upstream.status);
    for (name, value) in &upstream.headers {
        if !is_hop_by_hop(name.as_str()) {
            response = response.header(name, value);
        }
    }
    response
        .body(axum::body::Body::from(upstream.body))
        .map_err(|e| Error::Upstream(format!("response build error: {e}")))
}

/// Backend base URL plus the inbound path and query.
fn upstream_url(backend: &Url, uri: &axum::http::Uri) -> Result<Url, Error> {
    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    backend_join(backend, path_and_query).map_err(Error::InvalidRequest)
}

/// Inbound headers minus hop-by-hop, `Host`, `Content-Length` and any client
/// `Authorization`; the dispatcher sets the credential.
fn forwarded_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in inbound {
        if is_hop_by_hop(name.as_str())
            || *name == AUTHORIZATION
            || *name == HOST
            || *name == CONTENT_LENGTH
        {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    headers
}

/// Check if a header is hop-by-hop (should be stripped before forwarding)
pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP_HEADERS
        .iter()
        .any(|h| h.eq_ignore_ascii_case(name))
}
