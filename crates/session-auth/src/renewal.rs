//! Credential renewal against the authentication service
//!
//! The renewal endpoint exchanges the caller's ambient session (a cookie) for
//! a new access credential. Any non-success status, network error or
//! unparseable body is a failure; the coordinator treats all of them the same.
//! Timeouts are enforced by the coordinator, not here, so every `Renewer`
//! implementation gets the same bound.

use std::future::Future;
use std::pin::Pin;

use common::Secret;
use reqwest::Url;
use reqwest::header::{ACCEPT, COOKIE, HeaderValue};
use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};

/// Successful body from the renewal endpoint.
///
/// The backend emits `accessToken`; `access_token` is accepted too.
#[derive(Debug, Deserialize)]
pub struct RenewalResponse {
    #[serde(alias = "accessToken")]
    pub access_token: String,
}

/// Something that can obtain a fresh access credential.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn Renewer>`).
pub trait Renewer: Send + Sync {
    /// The renewal endpoint. Requests aimed here never trigger a renewal.
    fn endpoint(&self) -> &Url;

    /// Perform one renewal call.
    fn renew(&self) -> Pin<Box<dyn Future<Output = Result<Secret<String>>> + Send + '_>>;
}

/// Renewer that POSTs to the authentication service with the session cookie.
pub struct HttpRenewer {
    client: reqwest::Client,
    endpoint: Url,
    session_cookie: Option<Secret<String>>,
}

impl HttpRenewer {
    pub fn new(
        client: reqwest::Client,
        endpoint: Url,
        session_cookie: Option<Secret<String>>,
    ) -> Self {
        Self {
            client,
            endpoint,
            session_cookie,
        }
    }
}

impl Renewer for HttpRenewer {
    fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn renew(&self) -> Pin<Box<dyn Future<Output = Result<Secret<String>>> + Send + '_>> {
        Box::pin(async move {
            let mut request = self
                .client
                .post(self.endpoint.clone())
                .header(ACCEPT, "application/json");

            if let Some(cookie) = &self.session_cookie {
                let mut value = HeaderValue::from_str(cookie.expose())
                    .map_err(|e| Error::Http(format!("invalid session cookie: {e}")))?;
                value.set_sensitive(true);
                request = request.header(COOKIE, value);
            }

            let response = request
                .send()
                .await
                .map_err(|e| Error::Http(format!("renewal request failed: {e}")))?;

            let status = response.status();
            if !status.is_success() {
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| String::from("<no body>"));
                return Err(Error::Rejected {
                    status: status.as_u16(),
                    body,
                });
            }

            let renewed = response
                .json::<RenewalResponse>()
                .await
                .map_err(|e| Error::InvalidResponse(format!("unparseable renewal body: {e}")))?;

            if renewed.access_token.is_empty() {
                return Err(Error::InvalidResponse(
                    "renewal body carried an empty access token".into(),
                ));
            }

            debug!(endpoint = %self.endpoint, "renewal endpoint issued a new credential");
            Ok(Secret::new(renewed.access_token))
        })
    }
}
