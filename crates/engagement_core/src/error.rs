//! crates/engagement_core/src/error.rs
//!
//! The error type returned by every engine operation.

use crate::duration::DurationError;
use crate::ports::PortError;

/// Errors surfaced by the engagement engine.
#[derive(Debug, thiserror::Error)]
pub enum EngagementError {
    /// Malformed or missing required input. Never retried.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Referenced entity is absent, inactive, expired or soft-deleted.
    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    MalformedDuration(#[from] DurationError),

    /// Storage stayed unreachable after every retry. Safe for the caller to retry.
    #[error("Storage temporarily unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl EngagementError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngagementError::StorageUnavailable(_))
    }
}

impl From<PortError> for EngagementError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::NotFound(what) => EngagementError::NotFound(what),
            PortError::Transient(detail) => EngagementError::StorageUnavailable(detail),
            PortError::Constraint(detail) => EngagementError::Validation(detail),
            PortError::Unexpected(detail) => EngagementError::Storage(detail),
        }
    }
}

/// A convenience type alias for `Result<T, EngagementError>`.
pub type EngagementResult<T> = Result<T, EngagementError>;
