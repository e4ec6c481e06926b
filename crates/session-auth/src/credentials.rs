//! In-memory holder for the current access credential
//!
//! There is exactly one credential per gateway process. Reads clone it out
//! under a brief read lock so an attempt always uses whatever value is current
//! at send time. Writes are single assignments performed by the refresh
//! coordinator (replace) or the session invalidation handler (clear).
//!
//! The holder also tracks whether the session has been torn down. `clear()`
//! reports whether this call was the one that ended the session, which is what
//! makes teardown idempotent: a second clear while already cleared is a no-op.

use common::Secret;
use tokio::sync::RwLock;
use tracing::{debug, info};

#[derive(Default)]
struct HolderState {
    credential: Option<Secret<String>>,
    cleared: bool,
}

/// Owner of the single access credential.
#[derive(Default)]
pub struct CredentialHolder {
    state: RwLock<HolderState>,
}

impl CredentialHolder {
    /// Create a holder seeded with an initial credential, or empty.
    ///
    /// An empty holder is a live session without a credential yet: requests go
    /// out unauthenticated and the first 401 drives a renewal.
    pub fn new(initial: Option<Secret<String>>) -> Self {
        Self {
            state: RwLock::new(HolderState {
                credential: initial,
                cleared: false,
            }),
        }
    }

    /// Clone of the credential to attach to an attempt.
    pub async fn current(&self) -> Option<Secret<String>> {
        self.state.read().await.credential.clone()
    }

    /// Install a freshly renewed credential.
    ///
    /// Also re-arms a cleared session, so a later terminal failure will
    /// navigate again.
    pub async fn replace(&self, credential: Secret<String>) {
        let mut state = self.state.write().await;
        let rearmed = state.cleared;
        state.credential = Some(credential);
        state.cleared = false;
        if rearmed {
            info!("session re-established by credential renewal");
        } else {
            debug!("credential replaced");
        }
    }

    /// Drop the credential and mark the session as ended.
    ///
    /// Returns `true` only for the call that moved the session from live to
    /// cleared. Later calls return `false` and change nothing.
    pub async fn clear(&self) -> bool {
        let mut state = self.state.write().await;
        if state.cleared {
            return false;
        }
        state.credential = None;
        state.cleared = true;
        debug!("credential cleared");
        true
    }

    pub async fn is_present(&self) -> bool {
        self.state.read().await.credential.is_some()
    }

    /// Whether the session was torn down and has not been renewed since.
    pub async fn is_cleared(&self) -> bool {
        self.state.read().await.cleared
    }
}
