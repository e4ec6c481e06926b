//! Authentication service defaults

/// Upper bound on a single renewal call when the config does not set one.
/// Waiters queued behind a renewal never wait longer than this.
pub const DEFAULT_RENEWAL_TIMEOUT_SECS: u64 = 10;

/// Renewal path on the records backend's authentication service
pub const DEFAULT_RENEWAL_PATH: &str = "/api/auth/refresh";

/// Login page the session invalidation handler sends users to
pub const DEFAULT_ENTRY_POINT_PATH: &str = "/login";
