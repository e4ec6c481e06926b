//! Request dispatch with coordinated renewal and bounded replay

use std::sync::Arc;

use common::Secret;
use session_auth::CredentialHolder;
use tracing::{debug, info, warn};
use transport::{Attempt, RequestDescriptor, Response, StatusCode, Transport};

use crate::classify::{FailureClass, classify};
use crate::coordinator::RefreshCoordinator;
use crate::error::{Error, Result};
use crate::replay::{replay, send_with};

/// Sends requests with the current credential and recovers from expiry.
///
/// A first 401 joins (or starts) the shared renewal and, once it succeeds,
/// replays the request exactly once with the new credential. If the holder
/// already carries a newer credential than the one the request went out with,
/// that credential is used for the replay and no renewal is started.
/// Everything else is returned to the caller as-is.
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    holder: Arc<CredentialHolder>,
    coordinator: Arc<RefreshCoordinator>,
}

impl Dispatcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        holder: Arc<CredentialHolder>,
        coordinator: Arc<RefreshCoordinator>,
    ) -> Self {
        Self {
            transport,
            holder,
            coordinator,
        }
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }

    pub fn holder(&self) -> &Arc<CredentialHolder> {
        &self.holder
    }

    /// Send `request` and resolve its final outcome.
    ///
    /// Non-401 statuses come back as `Ok(Response)`. A 401 from the renewal
    /// endpoint also comes back unchanged, without touching the coordinator.
    pub async fn dispatch(&self, request: RequestDescriptor) -> Result<Response> {
        let sent_with = self.holder.current().await;
        let mut attempt = Attempt::first();
        let mut outcome = send_with(
            self.transport.as_ref(),
            &request,
            sent_with.as_ref().map(|c| c.expose().as_str()),
        )
        .await;

        loop {
            if outcome.as_ref().is_ok_and(|response| !response.is_unauthorized()) {
                return outcome.map_err(Error::from);
            }
            let status = outcome.as_ref().ok().map(|response| response.status);

            let class = classify(
                &request,
                status,
                attempt,
                self.coordinator.renewal_endpoint(),
            );
            debug!(
                method = %request.method(),
                path = request.url().path(),
                class = class.label(),
                renewals = attempt.renewals(),
                "classified failed call"
            );

            match class {
                FailureClass::UnrelatedFailure | FailureClass::RenewalEndpointFailure => {
                    return outcome.map_err(Error::from);
                }
                FailureClass::RetryExhausted => {
                    warn!(
                        path = request.url().path(),
                        "request rejected again after renewal"
                    );
                    return Err(Error::RetryExhausted {
                        status: status.unwrap_or(StatusCode::UNAUTHORIZED).as_u16(),
                    });
                }
                FailureClass::RecoverableAuthFailure => {
                    let credential = match self.holder.current().await {
                        // Renewed after this request went out: replay with it.
                        Some(current) if !same_credential(sent_with.as_ref(), &current) => {
                            debug!(
                                path = request.url().path(),
                                "credential already renewed, skipping renewal"
                            );
                            current
                        }
                        _ => self
                            .coordinator
                            .join_or_start_refresh()
                            .await
                            .map_err(|e| Error::SessionExpired(e.to_string()))?,
                    };
                    info!(
                        transport = self.transport.id(),
                        path = request.url().path(),
                        "credential renewed, replaying request"
                    );
                    (attempt, outcome) =
                        replay(self.transport.as_ref(), &request, attempt, &credential).await;
                }
            }
        }
    }
}

fn same_credential(sent: Option<&Secret<String>>, current: &Secret<String>) -> bool {
    sent.is_some_and(|sent| sent.expose() == current.expose())
}
