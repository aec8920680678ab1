//! HTTP handlers for session endpoints.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::application::{
    CreateSessionCommand, CreatorCommand, JoinSessionCommand, SessionCoordinator,
    SubmitVoteCommand,
};
use crate::domain::foundation::{ParticipantId, SessionId};
use crate::domain::session::SessionError;
use serde::de::DeserializeOwned;

use super::dto::{
    CreateSessionResponse, ErrorResponse, JoinSessionResponse, NicknameRequest,
    ParticipantRequest, StatisticsResponse, SuccessResponse, VoteRequest,
};

// ════════════════════════════════════════════════════════════════════════════
// Handler state
// ════════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct SessionHandlers {
    coordinator: Arc<SessionCoordinator>,
}

impl SessionHandlers {
    pub fn new(coordinator: Arc<SessionCoordinator>) -> Self {
        Self { coordinator }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// HTTP handlers
// ════════════════════════════════════════════════════════════════════════════

/// POST /api/session - Create a session; the caller becomes its creator
pub async fn create_session(
    State(handlers): State<SessionHandlers>,
    body: Bytes,
) -> Response {
    let req: NicknameRequest = match optional_body(&body) {
        Ok(req) => req,
        Err(response) => return response,
    };
    let cmd = CreateSessionCommand {
        nickname: req.nickname,
    };

    match handlers.coordinator.create_session(cmd).await {
        Ok(result) => {
            (StatusCode::CREATED, Json(CreateSessionResponse::from(result))).into_response()
        }
        Err(e) => handle_session_error(e),
    }
}

/// POST /api/session/:id/join - Join as a non-creator participant
pub async fn join_session(
    State(handlers): State<SessionHandlers>,
    Path(session_id): Path<String>,
    body: Bytes,
) -> Response {
    let session_id = match parse_session_id(&session_id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    let req: NicknameRequest = match optional_body(&body) {
        Ok(req) => req,
        Err(response) => return response,
    };
    let cmd = JoinSessionCommand {
        session_id,
        nickname: req.nickname,
    };

    match handlers.coordinator.join_session(cmd).await {
        Ok(result) => (StatusCode::OK, Json(JoinSessionResponse::from(result))).into_response(),
        Err(e) => handle_session_error(e),
    }
}

/// POST /api/session/:id/vote - Cast or change a vote
pub async fn submit_vote(
    State(handlers): State<SessionHandlers>,
    Path(session_id): Path<String>,
    body: Result<Json<VoteRequest>, JsonRejection>,
) -> Response {
    let (session_id, req) = match (parse_session_id(&session_id), body) {
        (Ok(id), Ok(Json(req))) => (id, req),
        (Err(response), _) => return response,
        (_, Err(rejection)) => return bad_body(rejection),
    };
    let participant_id = match parse_participant_id(&req.participant_id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    let cmd = SubmitVoteCommand {
        session_id,
        participant_id,
        vote: req.vote.into_face(),
    };

    match handlers.coordinator.submit_vote(cmd).await {
        Ok(_) => (StatusCode::OK, Json(SuccessResponse::ok())).into_response(),
        Err(e) => handle_session_error(e),
    }
}

/// POST /api/session/:id/reveal - Reveal the round (creator only)
pub async fn reveal_votes(
    State(handlers): State<SessionHandlers>,
    Path(session_id): Path<String>,
    body: Result<Json<ParticipantRequest>, JsonRejection>,
) -> Response {
    let cmd = match creator_command(&session_id, body) {
        Ok(cmd) => cmd,
        Err(response) => return response,
    };

    match handlers.coordinator.reveal_votes(cmd).await {
        Ok(_) => (StatusCode::OK, Json(SuccessResponse::ok())).into_response(),
        Err(e) => handle_session_error(e),
    }
}

/// POST /api/session/:id/reset - Start the next round (creator only)
pub async fn reset_round(
    State(handlers): State<SessionHandlers>,
    Path(session_id): Path<String>,
    body: Result<Json<ParticipantRequest>, JsonRejection>,
) -> Response {
    let cmd = match creator_command(&session_id, body) {
        Ok(cmd) => cmd,
        Err(response) => return response,
    };

    match handlers.coordinator.reset_round(cmd).await {
        Ok(_) => (StatusCode::OK, Json(SuccessResponse::ok())).into_response(),
        Err(e) => handle_session_error(e),
    }
}

/// GET /api/session/:id - Current session record
pub async fn get_session(
    State(handlers): State<SessionHandlers>,
    Path(session_id): Path<String>,
) -> Response {
    let session_id = match parse_session_id(&session_id) {
        Ok(id) => id,
        Err(response) => return response,
    };

    match handlers.coordinator.fetch_session(&session_id).await {
        Ok(session) => (StatusCode::OK, Json(session)).into_response(),
        Err(e) => handle_session_error(e),
    }
}

/// GET /api/session/:id/statistics - Round statistics, empty until reveal
pub async fn get_statistics(
    State(handlers): State<SessionHandlers>,
    Path(session_id): Path<String>,
) -> Response {
    let session_id = match parse_session_id(&session_id) {
        Ok(id) => id,
        Err(response) => return response,
    };

    match handlers.coordinator.round_statistics(&session_id).await {
        Ok(stats) => (StatusCode::OK, Json(StatisticsResponse::from(stats))).into_response(),
        Err(e) => handle_session_error(e),
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Request parsing
// ════════════════════════════════════════════════════════════════════════════

fn parse_session_id(raw: &str) -> Result<SessionId, Response> {
    raw.parse::<SessionId>()
        .map_err(|e| handle_session_error(e.into()))
}

fn parse_participant_id(raw: &str) -> Result<ParticipantId, Response> {
    raw.parse::<ParticipantId>()
        .map_err(|e| handle_session_error(e.into()))
}

fn creator_command(
    session_id: &str,
    body: Result<Json<ParticipantRequest>, JsonRejection>,
) -> Result<CreatorCommand, Response> {
    let session_id = parse_session_id(session_id)?;
    let Json(req) = body.map_err(bad_body)?;
    Ok(CreatorCommand {
        session_id,
        participant_id: parse_participant_id(&req.participant_id)?,
    })
}

/// Decodes a body that may be left out entirely. An empty body means the
/// default; anything else must be valid JSON for `T`.
fn optional_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, Response> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    Json::<T>::from_bytes(body)
        .map(|Json(value)| value)
        .map_err(bad_body)
}

fn bad_body(rejection: JsonRejection) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse::invalid_input(rejection.body_text())),
    )
        .into_response()
}

// ════════════════════════════════════════════════════════════════════════════
// Error handling
// ════════════════════════════════════════════════════════════════════════════

fn status_for(error: &SessionError) -> StatusCode {
    match error {
        SessionError::NotFound(_) => StatusCode::NOT_FOUND,
        SessionError::Expired => StatusCode::GONE,
        SessionError::NotAuthorized
        | SessionError::ParticipantNotFound
        | SessionError::Forbidden => StatusCode::FORBIDDEN,
        SessionError::AlreadyRevealed
        | SessionError::InvalidVote(_)
        | SessionError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        SessionError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

pub(crate) fn handle_session_error(error: SessionError) -> Response {
    let status = status_for(&error);
    if status.is_server_error() {
        tracing::error!(error = %error, "Session request failed");
    }
    (status, Json(ErrorResponse::from(error))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_error_status_table() {
        let cases = [
            (SessionError::NotFound(SessionId::generate()), StatusCode::NOT_FOUND),
            (SessionError::Expired, StatusCode::GONE),
            (SessionError::NotAuthorized, StatusCode::FORBIDDEN),
            (SessionError::ParticipantNotFound, StatusCode::FORBIDDEN),
            (SessionError::Forbidden, StatusCode::FORBIDDEN),
            (SessionError::AlreadyRevealed, StatusCode::BAD_REQUEST),
            (SessionError::InvalidVote("7".into()), StatusCode::BAD_REQUEST),
            (SessionError::invalid_input("nickname"), StatusCode::BAD_REQUEST),
            (SessionError::store_unavailable("down"), StatusCode::SERVICE_UNAVAILABLE),
        ];

        for (error, expected) in cases {
            assert_eq!(handle_session_error(error).status(), expected);
        }
    }

    #[test]
    fn malformed_session_id_is_invalid_input() {
        let response = parse_session_id("not/an/id").unwrap_err();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn missing_nickname_body_means_default() {
        let empty: NicknameRequest = optional_body(&Bytes::new()).unwrap();
        let blank: NicknameRequest = optional_body(&Bytes::from_static(b" \n")).unwrap();

        assert!(empty.nickname.is_none());
        assert!(blank.nickname.is_none());
    }

    #[test]
    fn present_nickname_body_must_be_valid() {
        let named: NicknameRequest =
            optional_body(&Bytes::from_static(br#"{"nickname":"Ada"}"#)).unwrap();
        assert_eq!(named.nickname.as_deref(), Some("Ada"));

        for raw in [&br#"{"nickname":42}"#[..], b"{not json", b"[]"] {
            let response = optional_body::<NicknameRequest>(&Bytes::copy_from_slice(raw)).unwrap_err();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        }
    }

    #[test]
    fn participant_id_must_have_participant_length() {
        assert!(parse_participant_id("Ab_-12345678").is_err());
        assert!(parse_participant_id("0123456789abcdef").is_ok());
    }
}
