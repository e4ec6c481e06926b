//! Single-flight credential renewal
//!
//! The coordinator owns the only renewal that may be outstanding. The first
//! caller to need a new credential moves the state from `Idle` to `InFlight`
//! and spawns the renewal; every caller that arrives while it runs only adds a
//! completion handle to the queue. When the renewal settles, the outcome is
//! fanned out to every queued handle and the state returns to `Idle`.
//!
//! Transitions:
//! - Idle → InFlight (first `join_or_start_refresh`)
//! - InFlight → InFlight (later joiners, waiter cancellation)
//! - InFlight → Idle (renewal succeeded: holder updated, waiters get the credential)
//! - InFlight → Idle (renewal failed or timed out: session invalidated, waiters get the error)
//!
//! The renewal runs on its own task, so it finishes for the remaining waiters
//! even if the caller that started it goes away. The state lock is a
//! `parking_lot::Mutex` that is never held across an await.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::Duration;

use common::Secret;
use parking_lot::Mutex;
use session_auth::{CredentialHolder, Renewer};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use transport::Url;

use crate::invalidation::SessionInvalidator;

/// What every waiter of one renewal receives.
type RenewalOutcome = session_auth::Result<Secret<String>>;

enum RefreshState {
    Idle,
    InFlight {
        waiters: HashMap<u64, oneshot::Sender<RenewalOutcome>>,
    },
}

/// Point-in-time view of the coordinator for health reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshStatus {
    pub in_flight: bool,
    pub waiters: usize,
}

impl RefreshStatus {
    pub fn label(&self) -> &'static str {
        if self.in_flight { "in_flight" } else { "idle" }
    }
}

/// Single-flight controller around credential renewal.
pub struct RefreshCoordinator {
    state: Mutex<RefreshState>,
    next_waiter: AtomicU64,
    holder: Arc<CredentialHolder>,
    renewer: Arc<dyn Renewer>,
    invalidator: SessionInvalidator,
    timeout: Duration,
}

impl RefreshCoordinator {
    /// `timeout` bounds each renewal call; a renewal that exceeds it fails.
    pub fn new(
        holder: Arc<CredentialHolder>,
        renewer: Arc<dyn Renewer>,
        invalidator: SessionInvalidator,
        timeout: Duration,
    ) -> Self {
        info!(timeout_ms = timeout.as_millis() as u64, "refresh coordinator initialized");
        Self {
            state: Mutex::new(RefreshState::Idle),
            next_waiter: AtomicU64::new(0),
            holder,
            renewer,
            invalidator,
            timeout,
        }
    }

    /// The renewal endpoint, for classifying requests aimed at it.
    pub fn renewal_endpoint(&self) -> &Url {
        self.renewer.endpoint()
    }

    /// Register for the outcome of the current renewal, starting one if idle.
    ///
    /// Never issues a second renewal while one is outstanding. The returned
    /// future resolves with the new credential or the renewal error once the
    /// renewal settles. Dropping it before then leaves the queue quietly.
    pub fn join_or_start_refresh(self: &Arc<Self>) -> RefreshWait {
        let id = self.next_waiter.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();

        let started = {
            let mut state = self.state.lock();
            match &mut *state {
                RefreshState::Idle => {
                    *state = RefreshState::InFlight {
                        waiters: HashMap::from([(id, tx)]),
                    };
                    true
                }
                RefreshState::InFlight { waiters } => {
                    waiters.insert(id, tx);
                    debug!(waiter = id, queued = waiters.len(), "joined in-flight renewal");
                    false
                }
            }
        };

        if started {
            info!(waiter = id, "credential renewal started");
            let coordinator = Arc::clone(self);
            tokio::spawn(async move {
                coordinator.drive_renewal().await;
            });
        }

        RefreshWait {
            id,
            rx,
            coordinator: Arc::downgrade(self),
            settled: false,
        }
    }

    /// Snapshot of the state machine.
    pub fn status(&self) -> RefreshStatus {
        match &*self.state.lock() {
            RefreshState::Idle => RefreshStatus {
                in_flight: false,
                waiters: 0,
            },
            RefreshState::InFlight { waiters } => RefreshStatus {
                in_flight: true,
                waiters: waiters.len(),
            },
        }
    }

    /// Run the renewal call under the timeout and settle the cycle.
    ///
    /// The call itself runs on a separate task so a panicking renewer is
    /// reported as a failure instead of leaving the state stuck in `InFlight`.
    async fn drive_renewal(&self) {
        let renewer = Arc::clone(&self.renewer);
        let mut call = tokio::spawn(async move { renewer.renew().await });

        let outcome = match tokio::time::timeout(self.timeout, &mut call).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(session_auth::Error::Aborted(join_err.to_string())),
            Err(_) => {
                call.abort();
                Err(session_auth::Error::Timeout(self.timeout))
            }
        };

        match outcome {
            Ok(credential) => self.on_refresh_succeeded(credential).await,
            Err(e) => self.on_refresh_failed(e).await,
        }
    }

    /// Success transition: one holder mutation, then fan-out.
    ///
    /// The holder is updated while the state is still `InFlight`, so any
    /// caller that joins in the meantime receives the same credential.
    pub(crate) async fn on_refresh_succeeded(&self, credential: Secret<String>) {
        self.holder.replace(credential.clone()).await;

        let waiters = self.take_waiters();
        info!(waiters = waiters.len(), "credential renewal succeeded");
        metrics::counter!("session_renewals_total", "outcome" => "success").increment(1);
        metrics::histogram!("session_renewal_waiters").record(waiters.len() as f64);

        for (_, tx) in waiters {
            // A closed receiver means the waiter was cancelled after the
            // queue was drained; nothing to deliver.
            let _ = tx.send(Ok(credential.clone()));
        }
    }

    /// Failure transition: invalidate once, then fan out the same error.
    ///
    /// Invalidation runs before the state returns to `Idle`, so a renewal
    /// started by a later request cannot have its credential wiped by this
    /// cycle's teardown.
    pub(crate) async fn on_refresh_failed(&self, error: session_auth::Error) {
        self.invalidator.invalidate(&error.to_string()).await;

        let waiters = self.take_waiters();
        warn!(error = %error, waiters = waiters.len(), "credential renewal failed");
        metrics::counter!("session_renewals_total", "outcome" => "failure").increment(1);
        metrics::histogram!("session_renewal_waiters").record(waiters.len() as f64);

        for (_, tx) in waiters {
            let _ = tx.send(Err(error.clone()));
        }
    }

    /// Empty the queue and return to `Idle`.
    fn take_waiters(&self) -> HashMap<u64, oneshot::Sender<RenewalOutcome>> {
        let mut state = self.state.lock();
        match std::mem::replace(&mut *state, RefreshState::Idle) {
            RefreshState::InFlight { waiters } => waiters,
            RefreshState::Idle => {
                warn!("renewal settled while coordinator was idle");
                HashMap::new()
            }
        }
    }

    /// Remove a waiter that no longer wants the outcome.
    fn cancel(&self, id: u64) {
        let mut state = self.state.lock();
        if let RefreshState::InFlight { waiters } = &mut *state
            && waiters.remove(&id).is_some()
        {
            debug!(waiter = id, remaining = waiters.len(), "waiter left renewal queue");
        }
    }
}

/// A caller's place in the renewal queue.
///
/// Resolves to the renewed credential or the renewal error. Dropping it
/// before it resolves removes the caller from the queue without affecting
/// anyone else.
pub struct RefreshWait {
    id: u64,
    rx: oneshot::Receiver<RenewalOutcome>,
    coordinator: Weak<RefreshCoordinator>,
    settled: bool,
}

impl Future for RefreshWait {
    type Output = RenewalOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(outcome) => {
                self.settled = true;
                Poll::Ready(outcome.unwrap_or_else(|_| {
                    Err(session_auth::Error::Aborted(
                        "refresh coordinator dropped before settling".into(),
                    ))
                }))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for RefreshWait {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        if let Some(coordinator) = self.coordinator.upgrade() {
            coordinator.cancel(self.id);
        }
    }
}
