//! Request descriptors, attempt markers and buffered responses

use bytes::Bytes;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Method, StatusCode, Url};

use crate::error::{Error, Result};

/// Number of renewal-triggered retries a logical request may consume.
pub const MAX_RENEWAL_RETRIES: u8 = 1;

/// How many times a logical request has been replayed after a credential
/// renewal.
///
/// Values are immutable: `next()` returns a new marker and leaves the old one
/// untouched, so the marker travels with one attempt instead of living on a
/// shared request object.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Attempt {
    renewals: u8,
}

impl Attempt {
    /// Marker for the original send of a logical request.
    pub fn first() -> Self {
        Self::default()
    }

    /// Marker for the replay that follows a renewal.
    pub fn next(self) -> Self {
        Self {
            renewals: self.renewals.saturating_add(1),
        }
    }

    pub fn renewals(self) -> u8 {
        self.renewals
    }

    /// Whether the request already spent its renewal-triggered retry.
    pub fn is_exhausted(self) -> bool {
        self.renewals >= MAX_RENEWAL_RETRIES
    }
}

/// An outbound request: method, target, headers and a fully buffered body.
///
/// Descriptors are never mutated once built. Attaching a credential returns a
/// new descriptor, which is how a queued request is replayed with the same
/// method, target, body and headers but a different `Authorization` value.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Bytes,
}

impl RequestDescriptor {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Copy of this request carrying `Authorization: Bearer <credential>`.
    ///
    /// Any existing `Authorization` header is replaced. With `None` the header
    /// is removed, so a request sent while no credential is held goes out
    /// unauthenticated rather than with a stale value. The header is marked
    /// sensitive so it prints as `Sensitive` in debug output.
    pub fn with_credential(&self, credential: Option<&str>) -> Result<Self> {
        let mut request = self.clone();
        request.headers.remove(AUTHORIZATION);
        if let Some(credential) = credential {
            let mut value = HeaderValue::from_str(&format!("Bearer {credential}"))
                .map_err(|e| Error::InvalidRequest(format!("invalid credential value: {e}")))?;
            value.set_sensitive(true);
            request.headers.insert(AUTHORIZATION, value);
        }
        Ok(request)
    }

    /// Whether this request is aimed at `endpoint`.
    ///
    /// Scheme, host, port and path must match; query and fragment are ignored.
    pub fn targets(&self, endpoint: &Url) -> bool {
        self.url.scheme() == endpoint.scheme()
            && self.url.host_str() == endpoint.host_str()
            && self.url.port_or_known_default() == endpoint.port_or_known_default()
            && self.url.path().trim_end_matches('/') == endpoint.path().trim_end_matches('/')
    }
}

/// A complete response with its body read into memory.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Response {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Whether the backend rejected the credential (HTTP 401).
    pub fn is_unauthorized(&self) -> bool {
        self.status == StatusCode::UNAUTHORIZED
    }
}
