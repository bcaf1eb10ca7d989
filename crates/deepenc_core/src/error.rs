use std::fmt::Display;

use thiserror::Error;
use tracing::error;

/// Caller-facing errors.  Variants carry no cryptographic or storage detail;
/// that is logged where the error is produced.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// Malformed or out-of-policy input.  No side effects were performed.
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// Missing, or not readable with what the caller supplied.
    #[error("Not found")]
    NotFound,

    /// The caller does not own the message it tried to change.
    #[error("Forbidden")]
    Forbidden,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Internal error")]
    Internal,
}

impl ServiceError {
    pub(crate) fn validation(reason: impl Into<String>) -> Self {
        ServiceError::Validation(reason.into())
    }

    /// Log `err` server-side and collapse it to `Internal`.
    pub(crate) fn internal(context: &str, err: impl Display) -> Self {
        error!("[engine] {context}: {err}");
        ServiceError::Internal
    }
}
