//! Failure classification for outbound calls
//!
//! Decides whether a failed call may enter the renewal machinery. Only a
//! first-time 401 from a non-renewal endpoint is recoverable; everything else
//! goes straight back to the caller without touching the coordinator or the
//! request's retry budget.

use transport::{Attempt, RequestDescriptor, StatusCode, Url};

/// What the dispatcher does with a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// First 401 on an ordinary endpoint: renew, then replay
    RecoverableAuthFailure,
    /// The call went to the renewal endpoint itself: never renew recursively
    RenewalEndpointFailure,
    /// 401 after the one renewal-triggered retry was already spent
    RetryExhausted,
    /// Not an authorization failure (other status, transport error)
    UnrelatedFailure,
}

impl FailureClass {
    /// Label for metrics and structured logs.
    pub fn label(self) -> &'static str {
        match self {
            FailureClass::RecoverableAuthFailure => "recoverable_auth_failure",
            FailureClass::RenewalEndpointFailure => "renewal_endpoint_failure",
            FailureClass::RetryExhausted => "retry_exhausted",
            FailureClass::UnrelatedFailure => "unrelated_failure",
        }
    }
}

/// Classify a failed call.
///
/// `status` is `None` when the transport produced no response at all. Rules
/// apply in priority order:
/// 1. Target is `renewal_endpoint` → `RenewalEndpointFailure`
/// 2. Status is not 401 → `UnrelatedFailure`
/// 3. `attempt` already spent its renewal retry → `RetryExhausted`
/// 4. Otherwise → `RecoverableAuthFailure`
pub fn classify(
    request: &RequestDescriptor,
    status: Option<StatusCode>,
    attempt: Attempt,
    renewal_endpoint: &Url,
) -> FailureClass {
    if request.targets(renewal_endpoint) {
        return FailureClass::RenewalEndpointFailure;
    }
    if status != Some(StatusCode::UNAUTHORIZED) {
        return FailureClass::UnrelatedFailure;
    }
    if attempt.is_exhausted() {
        return FailureClass::RetryExhausted;
    }
    FailureClass::RecoverableAuthFailure
}
