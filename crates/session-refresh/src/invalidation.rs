//! Session teardown after an irrecoverable renewal failure

use std::sync::Arc;

use session_auth::CredentialHolder;
use tracing::{debug, warn};

/// Sends the user back to the authentication entry point.
///
/// Injected so the coordinator never depends on a particular UI or HTTP
/// surface. Implementations must not block; the call happens on the renewal
/// task.
pub trait Navigator: Send + Sync {
    fn navigate_to_entry_point(&self);
}

/// Clears the credential holder and navigates, once per session.
///
/// The holder's `clear()` decides which invocation wins, so concurrent or
/// repeated invocations against an already-cleared session do nothing.
pub struct SessionInvalidator {
    holder: Arc<CredentialHolder>,
    navigator: Arc<dyn Navigator>,
}

impl SessionInvalidator {
    pub fn new(holder: Arc<CredentialHolder>, navigator: Arc<dyn Navigator>) -> Self {
        Self { holder, navigator }
    }

    /// Tear the session down. Returns `true` if this call navigated.
    pub async fn invalidate(&self, reason: &str) -> bool {
        if !self.holder.clear().await {
            debug!(reason, "session already cleared, skipping navigation");
            return false;
        }
        warn!(reason, "session invalidated, navigating to entry point");
        metrics::counter!("session_invalidations_total").increment(1);
        self.navigator.navigate_to_entry_point();
        true
    }
}
