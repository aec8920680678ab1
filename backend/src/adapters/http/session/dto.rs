//! HTTP DTOs for session endpoints.
//!
//! Envelopes are camelCase. The session record itself keeps its persisted
//! shape (snake_case fields, camelCase participants).

use serde::{Deserialize, Serialize};

use crate::application::{CreateSessionResult, JoinSessionResult, RoundStatistics};
use crate::domain::session::{Session, SessionError, VoteStatistics};

// ════════════════════════════════════════════════════════════════════════════
// Request DTOs
// ════════════════════════════════════════════════════════════════════════════

/// Body of `POST /api/session` and `POST /api/session/:id/join`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NicknameRequest {
    #[serde(default)]
    pub nickname: Option<String>,
}

/// Body of `POST /api/session/:id/vote`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    pub participant_id: String,
    pub vote: VoteValue,
}

/// A card face as sent by clients. Numeric cards may arrive as JSON numbers.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum VoteValue {
    Face(String),
    Number(u32),
}

impl VoteValue {
    pub fn into_face(self) -> String {
        match self {
            VoteValue::Face(face) => face,
            VoteValue::Number(n) => n.to_string(),
        }
    }
}

/// Body of the creator-only `reveal` and `reset` endpoints.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantRequest {
    pub participant_id: String,
}

// ════════════════════════════════════════════════════════════════════════════
// Response DTOs
// ════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResponse {
    pub session_id: String,
    pub participant_id: String,
    pub nickname: String,
}

impl From<CreateSessionResult> for CreateSessionResponse {
    fn from(result: CreateSessionResult) -> Self {
        Self {
            session_id: result.session_id.to_string(),
            participant_id: result.participant_id.to_string(),
            nickname: result.nickname.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinSessionResponse {
    pub participant_id: String,
    pub nickname: String,
    pub session: Session,
}

impl From<JoinSessionResult> for JoinSessionResponse {
    fn from(result: JoinSessionResult) -> Self {
        Self {
            participant_id: result.participant_id.to_string(),
            nickname: result.nickname.to_string(),
            session: result.session,
        }
    }
}

/// Acknowledgement for vote, reveal and reset.
#[derive(Debug, Clone, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    pub fn ok() -> Self {
        Self { success: true }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatisticsResponse {
    pub round: u32,
    pub revealed: bool,
    pub statistics: Option<VoteStatistics>,
}

impl From<RoundStatistics> for StatisticsResponse {
    fn from(stats: RoundStatistics) -> Self {
        Self {
            round: stats.round,
            revealed: stats.revealed,
            statistics: stats.statistics,
        }
    }
}

/// Standard error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        SessionError::invalid_input(message).into()
    }
}

impl From<SessionError> for ErrorResponse {
    fn from(error: SessionError) -> Self {
        Self {
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }
}
