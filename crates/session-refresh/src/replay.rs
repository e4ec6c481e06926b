//! Re-issuing a request after a successful renewal

use common::Secret;
use tracing::debug;
use transport::{Attempt, RequestDescriptor, Response, Transport};

/// Send `request` with `credential` attached (or with no credential).
pub(crate) async fn send_with(
    transport: &dyn Transport,
    request: &RequestDescriptor,
    credential: Option<&str>,
) -> transport::Result<Response> {
    let request = request.with_credential(credential)?;
    transport.send(&request).await
}

/// Replay `original` once with the renewed credential.
///
/// Method, target, body and every other header are kept; only
/// `Authorization` changes. Returns the incremented attempt marker together
/// with the outcome, so a further 401 is classified as `RetryExhausted`
/// rather than starting another renewal.
pub async fn replay(
    transport: &dyn Transport,
    original: &RequestDescriptor,
    attempt: Attempt,
    credential: &Secret<String>,
) -> (Attempt, transport::Result<Response>) {
    let attempt = attempt.next();
    debug!(
        method = %original.method(),
        path = original.url().path(),
        renewals = attempt.renewals(),
        "replaying request with renewed credential"
    );
    let outcome = send_with(transport, original, Some(credential.expose())).await;
    (attempt, outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedTransport, get};
    use transport::header::{AUTHORIZATION, HeaderMap, HeaderValue};
    use transport::{Method, StatusCode, Url};

    #[tokio::test]
    async fn replay_swaps_only_the_credential() {
        let transport = ScriptedTransport::accepting("at_new");
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer at_old"));
        headers.insert("x-records-view", HeaderValue::from_static("grid"));
        let original = RequestDescriptor::new(
            Method::POST,
            Url::parse("https://records.test/api/forms").unwrap(),
        )
        .with_headers(headers)
        .with_body(r#"{"name":"intake"}"#);

        let (attempt, outcome) = replay(
            &transport,
            &original,
            Attempt::first(),
            &Secret::new("at_new".into()),
        )
        .await;

        assert_eq!(outcome.unwrap().status, StatusCode::OK);
        assert!(attempt.is_exhausted());
        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].authorization.as_deref(), Some("Bearer at_new"));
        assert_eq!(sent[0].body, r#"{"name":"intake"}"#);
        assert_eq!(
            original.headers().get(AUTHORIZATION).unwrap(),
            "Bearer at_old"
        );
    }

    #[tokio::test]
    async fn replayed_rejection_comes_back_as_response() {
        let transport = ScriptedTransport::accepting("at_other");
        let (attempt, outcome) = replay(
            &transport,
            &get("/api/charts"),
            Attempt::first(),
            &Secret::new("at_new".into()),
        )
        .await;
        assert_eq!(attempt.renewals(), 1);
        assert_eq!(outcome.unwrap().status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn invalid_credential_is_reported_without_sending() {
        let transport = ScriptedTransport::accepting("unused");
        let (_, outcome) = replay(
            &transport,
            &get("/api/charts"),
            Attempt::first(),
            &Secret::new("bad\nvalue".into()),
        )
        .await;
        assert!(matches!(
            outcome,
            Err(transport::Error::InvalidRequest(_))
        ));
        assert!(transport.sent().is_empty());
    }
}
