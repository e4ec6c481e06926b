//! Coordinated credential renewal for outbound requests
//!
//! When the access credential expires, every request that was already in
//! flight fails with 401 at roughly the same moment. This crate makes sure
//! those failures cost exactly one renewal call, that every caller sees the
//! same renewal outcome, that each request is replayed at most once, and that
//! an irrecoverable renewal failure tears the session down exactly once.
//!
//! Request lifecycle through `Dispatcher::dispatch`:
//! 1. Attach the current credential from `CredentialHolder` and send
//! 2. Success → return. Failure → `classify()` picks a `FailureClass`
//! 3. `RecoverableAuthFailure` → `RefreshCoordinator::join_or_start_refresh()`
//!    either starts the single renewal or joins the one in flight
//! 4. Renewal succeeded → `replay()` resends with the new credential and an
//!    incremented `Attempt`; its outcome is the caller's outcome
//! 5. Renewal failed → `SessionInvalidator` clears the holder and navigates
//!    once; every queued caller gets `Error::SessionExpired`

pub mod classify;
pub mod coordinator;
pub mod dispatcher;
pub mod error;
pub mod invalidation;
pub mod replay;

#[cfg(test)]
mod test_support;

pub use classify::{FailureClass, classify};
pub use coordinator::{RefreshCoordinator, RefreshStatus, RefreshWait};
pub use dispatcher::Dispatcher;
pub use error::{Error, Result};
pub use invalidation::{Navigator, SessionInvalidator};
pub use replay::replay;
