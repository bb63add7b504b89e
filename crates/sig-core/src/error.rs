//! Error hierarchy for the signaling core.
//!
//! Two error enums cover the two places errors originate: [`RepositoryError`]
//! for the storage boundary, and [`SignalError`] for everything surfaced
//! toward an endpoint as an `error` event. Both are categorized
//! transient/permanent, since the sweeper and the caller of
//! `SessionRepository` need that distinction to decide whether to retry.

use std::borrow::Cow;
use thiserror::Error;

/// Errors from the session repository boundary.
#[derive(Debug, Error, Clone)]
pub enum RepositoryError {
    /// The backing store could not be reached. Retryable at caller
    /// discretion.
    #[error("store unavailable: {0}")]
    StoreUnavailable(Cow<'static, str>),

    /// A constraint was violated (e.g. an invalid status transition).
    #[error("constraint violation: {0}")]
    ConstraintViolation(Cow<'static, str>),
}

impl RepositoryError {
    /// Store-unavailable errors are transient; constraint violations are not.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, RepositoryError::StoreUnavailable(_))
    }
}

/// Crate-local result alias for repository operations.
pub type RepoResult<T> = std::result::Result<T, RepositoryError>;

/// Error kinds surfaced to a client endpoint as an `error` event, per the
/// propagation policy: these carry a client-safe message and never leak
/// internal detail.
#[derive(Debug, Error, Clone)]
pub enum SignalError {
    /// Validation failed (bad field, bad identifier, size overflow, rejected
    /// type).
    #[error("invalid input: {0}")]
    InvalidInput(Cow<'static, str>),

    /// Access code absent, wrong, or already used.
    #[error("invalid code")]
    InvalidCode,

    /// Session id unknown or expired.
    #[error("not found")]
    NotFound,

    /// Session status is already `COMPLETED`.
    #[error("already downloaded")]
    AlreadyDownloaded,

    /// Registry has no sender for the session.
    #[error("sender offline")]
    SenderOffline,

    /// A token bucket denied the operation.
    #[error("rate limited, retry after {wait_secs}s")]
    RateLimited {
        /// Seconds until the caller may retry.
        wait_secs: u64,
    },

    /// Concurrency or hourly cap denied the operation.
    #[error("session capped: {reason}")]
    SessionCapped {
        /// Machine-readable reason for the cap rejection.
        reason: Cow<'static, str>,
    },

    /// Abuse guard is in the blocked state.
    #[error("blocked, {remaining_minutes} minute(s) remaining")]
    Blocked {
        /// Minutes remaining until the block expires.
        remaining_minutes: u64,
    },

    /// Any unexpected failure. Details never leak to the client; the
    /// `Cow` here is for server-side logging only.
    #[error("internal error")]
    Internal(Cow<'static, str>),
}

impl SignalError {
    /// Returns true if a caller might reasonably retry this operation
    /// (after the indicated wait, in the rate-limited/blocked cases).
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SignalError::RateLimited { .. } | SignalError::Blocked { .. }
        )
    }

    /// Returns true if retrying without a state change (a different code,
    /// a fresh session) cannot possibly succeed.
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            SignalError::NotFound | SignalError::AlreadyDownloaded | SignalError::SenderOffline
        )
    }

    /// The machine-readable client-facing message kind, matching the
    /// `error{message, …}` vocabulary in the external interface.
    #[must_use]
    pub fn client_message(&self) -> &'static str {
        match self {
            SignalError::InvalidInput(_) => "Invalid input",
            SignalError::InvalidCode => "Invalid code",
            SignalError::NotFound => "Session not found",
            SignalError::AlreadyDownloaded => "Already downloaded",
            SignalError::SenderOffline => "Sender offline",
            SignalError::RateLimited { .. } => "Rate limited",
            SignalError::SessionCapped { .. } => "Session capped",
            SignalError::Blocked { .. } => "Blocked",
            SignalError::Internal(_) => "Internal error",
        }
    }
}

impl From<RepositoryError> for SignalError {
    fn from(err: RepositoryError) -> Self {
        SignalError::Internal(Cow::Owned(err.to_string()))
    }
}

/// Crate-local result alias for signaling operations.
pub type Result<T> = std::result::Result<T, SignalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_vs_permanent_are_disjoint() {
        let transient = [
            SignalError::RateLimited { wait_secs: 5 },
            SignalError::Blocked {
                remaining_minutes: 10,
            },
        ];
        for err in &transient {
            assert!(err.is_transient());
            assert!(!err.is_permanent());
        }

        let permanent = [
            SignalError::NotFound,
            SignalError::AlreadyDownloaded,
            SignalError::SenderOffline,
        ];
        for err in &permanent {
            assert!(err.is_permanent());
            assert!(!err.is_transient());
        }
    }

    #[test]
    fn repository_error_into_signal_error_is_internal() {
        let repo_err = RepositoryError::StoreUnavailable(Cow::Borrowed("timeout"));
        let signal_err: SignalError = repo_err.into();
        assert!(matches!(signal_err, SignalError::Internal(_)));
    }
}
