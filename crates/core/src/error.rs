//! Domain error model.

use thiserror::Error;

use crate::job::JobStatus;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (conflicts,
/// invalid transitions, validation). Infrastructure concerns belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A conditional write found a different status than the caller expected.
    ///
    /// This is an expected outcome under contention ("someone else took the
    /// job"), not a fault. Callers recover by refreshing their view of the
    /// record and deciding again; blind retry loops would hide the outcome
    /// from the user.
    #[error("job status changed: expected {expected}, found {actual}")]
    StatusChanged {
        expected: JobStatus,
        actual: JobStatus,
    },

    /// The requested status transition is not in the transition table.
    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    /// A requested record does not exist (or vanished concurrently).
    #[error("not found")]
    NotFound,

    /// The acting user is not the owner of the job.
    #[error("acting user is not the job owner")]
    NotOwner,

    /// Session-layer failure, propagated unchanged.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// A network-bound operation timed out. No partial state was left
    /// behind, so retrying with backoff is safe.
    #[error("operation timed out")]
    Timeout,

    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    /// True for the expected "this job was already taken" outcome, which the
    /// presentation layer reports as a business result rather than a failure.
    pub fn is_already_taken(&self) -> bool {
        matches!(self, Self::StatusChanged { .. })
    }

    /// True when retrying the operation (with backoff) is safe.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}
