//! HTTP routes for session endpoints.

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{
    create_session, get_session, get_statistics, join_session, reset_round, reveal_votes,
    submit_vote, SessionHandlers,
};

/// Creates the session router.
///
/// # Routes
/// - `POST /api/session` - Create a session
/// - `GET /api/session/:id` - Session record
/// - `GET /api/session/:id/statistics` - Round statistics
/// - `POST /api/session/:id/join` - Join
/// - `POST /api/session/:id/vote` - Vote
/// - `POST /api/session/:id/reveal` - Reveal (creator)
/// - `POST /api/session/:id/reset` - Next round (creator)
pub fn session_routes(handlers: SessionHandlers) -> Router {
    Router::new()
        .route("/api/session", post(create_session))
        .route("/api/session/:id", get(get_session))
        .route("/api/session/:id/statistics", get(get_statistics))
        .route("/api/session/:id/join", post(join_session))
        .route("/api/session/:id/vote", post(submit_vote))
        .route("/api/session/:id/reveal", post(reveal_votes))
        .route("/api/session/:id/reset", post(reset_round))
        .with_state(handlers)
}
