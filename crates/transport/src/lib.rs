//! Transport abstraction for outbound calls to the records backend
//!
//! Defines the `Transport` trait that decouples the request dispatcher from
//! the HTTP client doing the actual I/O. `HttpTransport` wraps reqwest;
//! tests substitute in-memory transports that script responses.
//!
//! A `Response` with a non-success status is still `Ok`: deciding what a 401
//! or a 500 means is the dispatcher's job, not the transport's. Only failures
//! to get any response at all surface as `Error`.

pub mod error;
pub mod http;
pub mod request;

pub use error::{Error, Result};
pub use http::HttpTransport;
pub use request::{Attempt, MAX_RENEWAL_RETRIES, RequestDescriptor, Response};

pub use reqwest::header::{self, HeaderMap, HeaderValue};
pub use reqwest::{Method, StatusCode, Url};

use std::future::Future;
use std::pin::Pin;

/// Performs request/response I/O for the dispatcher.
///
/// Uses `Pin<Box<dyn Future>>` return types so the dispatcher can hold an
/// `Arc<dyn Transport>`.
pub trait Transport: Send + Sync {
    /// Identifier for logging (e.g. "http")
    fn id(&self) -> &str;

    /// Send one request exactly as described. The descriptor already carries
    /// whatever `Authorization` header the caller wants on the wire.
    fn send<'a>(
        &'a self,
        request: &'a RequestDescriptor,
    ) -> Pin<Box<dyn Future<Output = Result<Response>> + Send + 'a>>;
}
