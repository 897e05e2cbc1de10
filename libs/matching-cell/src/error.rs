use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use directory_cell::DirectoryError;
use shared_database::DatabaseError;
use shared_models::error::AppError;

use crate::models::MatchStatus;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatchingError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Authorization(String),

    #[error("Request {request_id} is {current}; cannot move to {attempted}")]
    InvalidState {
        request_id: Uuid,
        current: MatchStatus,
        attempted: MatchStatus,
    },

    #[error("Directory unavailable: {0}")]
    DirectoryUnavailable(String),

    /// Permanent storage faults: bad credentials, rejected queries, malformed rows.
    #[error("Storage error: {0}")]
    Internal(String),
}

impl MatchingError {
    pub fn kind(&self) -> &'static str {
        match self {
            MatchingError::Validation(_) => "validation",
            MatchingError::Conflict(_) => "conflict",
            MatchingError::NotFound(_) => "not_found",
            MatchingError::Authorization(_) => "authorization",
            MatchingError::InvalidState { .. } => "invalid_state",
            MatchingError::DirectoryUnavailable(_) => "directory_unavailable",
            MatchingError::Internal(_) => "internal",
        }
    }

    /// Only transient directory failures may be retried locally.
    pub fn is_retryable(&self) -> bool {
        matches!(self, MatchingError::DirectoryUnavailable(_))
    }
}

impl From<DirectoryError> for MatchingError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::NotFound(what) => MatchingError::NotFound(what),
            DirectoryError::Unavailable(reason) => MatchingError::DirectoryUnavailable(reason),
            DirectoryError::Conflict(msg) => MatchingError::Conflict(msg),
            DirectoryError::Validation(msg) => MatchingError::Validation(msg),
            DirectoryError::Unauthorized(msg) => MatchingError::Authorization(msg),
            DirectoryError::Storage(reason) => MatchingError::Internal(reason),
        }
    }
}

/// Classification for the match store: only transport, 5xx and 429 failures are transient.
impl From<DatabaseError> for MatchingError {
    fn from(err: DatabaseError) -> Self {
        if err.is_transient() {
            return MatchingError::DirectoryUnavailable(err.to_string());
        }
        if err.is_conflict() {
            return MatchingError::Conflict(err.to_string());
        }
        match err {
            DatabaseError::NotFound(what) => MatchingError::NotFound(what),
            other => MatchingError::Internal(other.to_string()),
        }
    }
}

impl From<MatchingError> for AppError {
    fn from(err: MatchingError) -> Self {
        let message = err.to_string();
        debug!("Matching error ({}): {}", err.kind(), message);
        match err {
            MatchingError::Validation(_) => AppError::ValidationError(message),
            MatchingError::Conflict(_) => AppError::Conflict(message),
            MatchingError::NotFound(_) => AppError::NotFound(message),
            MatchingError::Authorization(_) => AppError::Forbidden(message),
            MatchingError::InvalidState { .. } => AppError::InvalidState(message),
            MatchingError::DirectoryUnavailable(_) => AppError::ServiceUnavailable(message),
            MatchingError::Internal(_) => AppError::Internal(message),
        }
    }
}
