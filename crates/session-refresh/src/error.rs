//! Error types for dispatched requests

/// Terminal outcomes a caller of `Dispatcher::dispatch` can see.
///
/// A 401 that was recovered by renewal and replay never shows up here, and
/// neither does a non-401 error status: those are returned as ordinary
/// responses.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The renewal call failed. Every caller queued behind it gets this.
    #[error("session expired: {0}")]
    SessionExpired(String),

    /// The replay after a successful renewal was rejected again.
    #[error("request still unauthorized after credential renewal ({status})")]
    RetryExhausted { status: u16 },

    #[error("transport error: {0}")]
    Transport(#[from] transport::Error),
}

impl Error {
    /// Label for metrics and error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::SessionExpired(_) => "session_expired",
            Error::RetryExhausted { .. } => "retry_exhausted",
            Error::Transport(e) => e.kind(),
        }
    }
}

/// Result alias for dispatch operations.
pub type Result<T> = std::result::Result<T, Error>;
