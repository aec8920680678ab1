//! Session-specific error types.

use crate::domain::foundation::{ErrorCode, SessionId, ValidationError};
use thiserror::Error;

/// Every way a session operation can be rejected.
///
/// All kinds except `StoreUnavailable` are deterministic and are returned to
/// the caller unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(SessionId),

    #[error("Session has expired")]
    Expired,

    #[error("Only the session creator can do this")]
    NotAuthorized,

    #[error("Votes have already been revealed for this round")]
    AlreadyRevealed,

    #[error("Invalid vote: {0}")]
    InvalidVote(String),

    #[error("Participant is not part of this session")]
    ParticipantNotFound,

    #[error("Automated clients are not allowed")]
    Forbidden,

    #[error("Session store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl SessionError {
    pub fn store_unavailable(message: impl Into<String>) -> Self {
        SessionError::StoreUnavailable(message.into())
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        SessionError::InvalidInput(message.into())
    }

    /// Returns the machine-readable error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            SessionError::NotFound(_) => ErrorCode::SessionNotFound,
            SessionError::Expired => ErrorCode::SessionExpired,
            SessionError::NotAuthorized => ErrorCode::NotAuthorized,
            SessionError::AlreadyRevealed => ErrorCode::AlreadyRevealed,
            SessionError::InvalidVote(_) => ErrorCode::InvalidVote,
            SessionError::ParticipantNotFound => ErrorCode::ParticipantNotFound,
            SessionError::Forbidden => ErrorCode::Forbidden,
            SessionError::StoreUnavailable(_) => ErrorCode::StoreUnavailable,
            SessionError::InvalidInput(_) => ErrorCode::InvalidInput,
        }
    }
}

impl From<ValidationError> for SessionError {
    fn from(err: ValidationError) -> Self {
        SessionError::InvalidInput(err.to_string())
    }
}
