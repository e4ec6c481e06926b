//! In-memory collaborators for coordinator and dispatcher tests

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use common::Secret;
use parking_lot::Mutex;
use session_auth::{CredentialHolder, Renewer};
use tokio::sync::Notify;
use transport::header::AUTHORIZATION;
use transport::{Method, RequestDescriptor, Response, StatusCode, Transport, Url};

use crate::{Dispatcher, Navigator, RefreshCoordinator, SessionInvalidator};

pub const RENEWAL_URL: &str = "https://records.test/api/auth/refresh";

pub fn renewal_url() -> Url {
    Url::parse(RENEWAL_URL).unwrap()
}

pub fn get(path: &str) -> RequestDescriptor {
    RequestDescriptor::new(
        Method::GET,
        Url::parse(&format!("https://records.test{path}")).unwrap(),
    )
}

/// Navigator that only counts invocations.
#[derive(Default)]
pub struct CountingNavigator {
    calls: AtomicUsize,
}

impl CountingNavigator {
    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Navigator for CountingNavigator {
    fn navigate_to_entry_point(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

enum RenewOutcome {
    Succeed(&'static str),
    Reject(u16),
    Panic,
}

/// Renewer with a fixed outcome after a fixed delay, counting calls.
pub struct MockRenewer {
    endpoint: Url,
    delay: Duration,
    outcome: RenewOutcome,
    calls: AtomicUsize,
}

impl MockRenewer {
    fn with(outcome: RenewOutcome, delay: Duration) -> Self {
        Self {
            endpoint: renewal_url(),
            delay,
            outcome,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn succeeding(token: &'static str, delay: Duration) -> Self {
        Self::with(RenewOutcome::Succeed(token), delay)
    }

    pub fn rejecting(status: u16, delay: Duration) -> Self {
        Self::with(RenewOutcome::Reject(status), delay)
    }

    pub fn panicking() -> Self {
        Self::with(RenewOutcome::Panic, Duration::ZERO)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Renewer for MockRenewer {
    fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn renew(
        &self,
    ) -> Pin<Box<dyn Future<Output = session_auth::Result<Secret<String>>> + Send + '_>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            match self.outcome {
                RenewOutcome::Succeed(token) => Ok(Secret::new(token.to_string())),
                RenewOutcome::Reject(status) => Err(session_auth::Error::Rejected {
                    status,
                    body: "session expired".into(),
                }),
                RenewOutcome::Panic => panic!("renewer blew up"),
            }
        })
    }
}

/// What a scripted transport saw on the wire.
#[derive(Debug, Clone)]
pub struct SentRequest {
    pub path: String,
    pub authorization: Option<String>,
    pub body: String,
}

type Script = dyn Fn(&RequestDescriptor) -> transport::Result<Response> + Send + Sync;

/// Transport answering from a closure and recording every request.
pub struct ScriptedTransport {
    script: Box<Script>,
    sent: Mutex<Vec<SentRequest>>,
    gate: Option<(&'static str, Arc<Notify>)>,
}

impl ScriptedTransport {
    pub fn new(
        script: impl Fn(&RequestDescriptor) -> transport::Result<Response> + Send + Sync + 'static,
    ) -> Self {
        Self {
            script: Box::new(script),
            sent: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    /// Hold the first request to `path` until `gate` is notified.
    pub fn gated(mut self, path: &'static str, gate: Arc<Notify>) -> Self {
        self.gate = Some((path, gate));
        self
    }

    /// Backend that accepts only `Bearer <token>`: 200 with `{"path": ...}`
    /// for that credential, 401 for anything else.
    pub fn accepting(token: &'static str) -> Self {
        Self::new(move |request| {
            let expected = format!("Bearer {token}");
            let authorized = request
                .headers()
                .get(AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v == expected);
            if authorized {
                Ok(Response::new(
                    StatusCode::OK,
                    format!(r#"{{"path":"{}"}}"#, request.url().path()),
                ))
            } else {
                Ok(Response::new(StatusCode::UNAUTHORIZED, "expired"))
            }
        })
    }

    pub fn sent(&self) -> Vec<SentRequest> {
        self.sent.lock().clone()
    }

    pub fn sent_to(&self, path: &str) -> Vec<SentRequest> {
        self.sent().into_iter().filter(|r| r.path == path).collect()
    }
}

impl Transport for ScriptedTransport {
    fn id(&self) -> &str {
        "scripted"
    }

    fn send<'a>(
        &'a self,
        request: &'a RequestDescriptor,
    ) -> Pin<Box<dyn Future<Output = transport::Result<Response>> + Send + 'a>> {
        Box::pin(async move {
            let path = request.url().path().to_string();
            let gate = {
                let mut sent = self.sent.lock();
                let first = !sent.iter().any(|r| r.path == path);
                let gate = match &self.gate {
                    Some((gated, gate)) if first && *gated == path => Some(gate.clone()),
                    _ => None,
                };
                sent.push(SentRequest {
                    path,
                    authorization: request
                        .headers()
                        .get(AUTHORIZATION)
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string),
                    body: String::from_utf8_lossy(request.body()).into_owned(),
                });
                gate
            };
            if let Some(gate) = gate {
                gate.notified().await;
            }
            // Yield so concurrent callers interleave like real I/O
            tokio::task::yield_now().await;
            (self.script)(request)
        })
    }
}

/// Fully wired coordinator stack around in-memory collaborators.
pub struct Stack {
    pub holder: Arc<CredentialHolder>,
    pub navigator: Arc<CountingNavigator>,
    pub renewer: Arc<MockRenewer>,
    pub transport: Arc<ScriptedTransport>,
    pub coordinator: Arc<RefreshCoordinator>,
    pub dispatcher: Arc<Dispatcher>,
}

pub fn stack(
    transport: ScriptedTransport,
    renewer: MockRenewer,
    initial: Option<&str>,
    timeout: Duration,
) -> Stack {
    let holder = Arc::new(CredentialHolder::new(
        initial.map(|c| Secret::new(c.to_string())),
    ));
    let navigator = Arc::new(CountingNavigator::default());
    let renewer = Arc::new(renewer);
    let transport = Arc::new(transport);
    let invalidator = SessionInvalidator::new(holder.clone(), navigator.clone());
    let coordinator = Arc::new(RefreshCoordinator::new(
        holder.clone(),
        renewer.clone(),
        invalidator,
        timeout,
    ));
    let dispatcher = Arc::new(Dispatcher::new(
        transport.clone(),
        holder.clone(),
        coordinator.clone(),
    ));
    Stack {
        holder,
        navigator,
        renewer,
        transport,
        coordinator,
        dispatcher,
    }
}
