//! Error handling module with type-safe, non-exhaustive error types
//!
//! Policy denials (blacklisted, temporarily blocked, critical threat, rate
//! limited) are expected outcomes surfaced as [`crate::limiter::Decision`]
//! values, never as errors. The types here cover the two real failure
//! classes: quota backend unavailability (recoverable, drives the fail-open
//! policy) and invalid configuration (fatal at construction).

use crate::limiter::DenyReason;
use std::time::Duration;
use thiserror::Error;

/// Failure talking to the quota backend.
///
/// Recovered locally by the fail-open policy in
/// [`crate::limiter::AdaptiveLimiter::process_request`]; surfaced verbatim by
/// [`crate::limiter::AdaptiveLimiter::try_process_request`] for callers that
/// want a different policy.
#[derive(Error, Debug)]
pub enum QuotaBackendError {
    /// Backend is unreachable or the connection dropped
    #[error("quota backend connection failed: {reason}")]
    Connection {
        /// Description of the connection failure
        reason: String,
    },

    /// Backend call exceeded its deadline
    #[error("quota backend call timed out after {duration:?}")]
    Timeout {
        /// How long the call ran before the deadline
        duration: Duration,
    },

    /// Stored quota state could not be encoded or decoded
    #[error("quota state serialization failed: {reason}")]
    Serialization {
        /// Description of the codec failure
        reason: String,
    },
}

impl From<redis::RedisError> for QuotaBackendError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_timeout() {
            QuotaBackendError::Timeout {
                duration: Duration::from_millis(0),
            }
        } else {
            QuotaBackendError::Connection {
                reason: err.to_string(),
            }
        }
    }
}

impl From<serde_json::Error> for QuotaBackendError {
    fn from(err: serde_json::Error) -> Self {
        QuotaBackendError::Serialization {
            reason: err.to_string(),
        }
    }
}

/// Non-exhaustive error enum for the crate's outward seams
/// (middleware integration, construction).
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RateGuardError {
    /// Request denied by policy; carried as an error only at the Tower seam
    #[error("rate limit exceeded: {reason}")]
    RateLimited {
        /// Which policy rule denied the request
        reason: DenyReason,
        /// When the client can retry
        retry_after: Duration,
    },

    /// Quota backend failure propagated by a strict caller
    #[error(transparent)]
    Backend(#[from] QuotaBackendError),

    /// Limiter configuration rejected at construction
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    /// Internal error
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl RateGuardError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::Backend(_)
        )
    }

    /// Get retry-after duration if applicable
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }
}
