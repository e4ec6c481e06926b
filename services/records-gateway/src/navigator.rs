//! Entry-point navigation for a headless gateway
//!
//! There is no browser to redirect. Navigating logs the entry point and counts
//! the teardown; `/health` reports the expired session and every
//! `session_expired` error body carries the login URL.

use std::sync::atomic::{AtomicU64, Ordering};

use session_refresh::Navigator;
use tracing::warn;
use transport::Url;

pub struct LoginRedirect {
    entry_point: Url,
    navigations: AtomicU64,
}

impl LoginRedirect {
    pub fn new(entry_point: Url) -> Self {
        Self {
            entry_point,
            navigations: AtomicU64::new(0),
        }
    }

    pub fn entry_point(&self) -> &Url {
        &self.entry_point
    }

    /// Sessions torn down since startup.
    pub fn navigations(&self) -> u64 {
        self.navigations.load(Ordering::Relaxed)
    }
}

impl Navigator for LoginRedirect {
    fn navigate_to_entry_point(&self) {
        self.navigations.fetch_add(1, Ordering::Relaxed);
        warn!(entry_point = %self.entry_point, "session ended, users must sign in again");
    }
}
