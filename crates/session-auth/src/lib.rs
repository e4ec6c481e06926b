//! Session credential handling for the records gateway
//!
//! Owns the single access credential the gateway attaches to backend calls
//! and talks to the authentication service's renewal endpoint. This crate
//! knows nothing about request dispatch or retry; the coordinator in
//! `session-refresh` decides when a renewal runs and what happens to its
//! result.
//!
//! Credential lifecycle:
//! 1. Gateway seeds `CredentialHolder` from `RECORDS_ACCESS_TOKEN` (or starts empty)
//! 2. Every outbound attempt reads `CredentialHolder::current()`
//! 3. On a coordinated renewal, `Renewer::renew()` exchanges the session cookie
//!    for a new credential and the coordinator calls `CredentialHolder::replace()`
//! 4. On irrecoverable renewal failure, `CredentialHolder::clear()` ends the session

pub mod constants;
pub mod credentials;
pub mod error;
pub mod renewal;

pub use constants::*;
pub use credentials::CredentialHolder;
pub use error::{Error, Result};
pub use renewal::{HttpRenewer, RenewalResponse, Renewer};
