//! Error types for credential renewal

use std::time::Duration;

/// Ways a renewal can fail.
///
/// `Clone` because one renewal outcome is fanned out to every caller queued
/// behind it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("renewal rejected ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("invalid renewal response: {0}")]
    InvalidResponse(String),

    #[error("renewal timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("renewal task aborted: {0}")]
    Aborted(String),
}

/// Result alias for renewal operations.
pub type Result<T> = std::result::Result<T, Error>;
