//! reqwest-backed transport

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::debug;

use crate::request::{RequestDescriptor, Response};
use crate::{Result, Transport};

/// Sends descriptors over a shared `reqwest::Client` with a per-request
/// timeout. Bodies are buffered in full so a response can be replayed to the
/// caller after classification.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

impl Transport for HttpTransport {
    fn id(&self) -> &str {
        "http"
    }

    fn send<'a>(
        &'a self,
        request: &'a RequestDescriptor,
    ) -> Pin<Box<dyn Future<Output = Result<Response>> + Send + 'a>> {
        Box::pin(async move {
            let response = self
                .client
                .request(request.method().clone(), request.url().clone())
                .headers(request.headers().clone())
                .timeout(self.timeout)
                .body(request.body().clone())
                .send()
                .await?;

            let status = response.status();
            let headers = response.headers().clone();
            let body = response.bytes().await?;
            debug!(
                method = %request.method(),
                url = %request.url(),
                status = status.as_u16(),
                bytes = body.len(),
                "transport round trip complete"
            );
            Ok(Response {
                status,
                headers,
                body,
            })
        })
    }
}
