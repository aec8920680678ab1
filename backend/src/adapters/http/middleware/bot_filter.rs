//! Bot filtering middleware for axum.
//!
//! Every `/api` request passes through the configured [`BotDetector`]. A
//! request it flags is answered with `403 FORBIDDEN` and never reaches a
//! handler, so bots cannot create, join or touch sessions.
//!
//! # Example
//!
//! ```ignore
//! use axum::{Router, middleware};
//! use std::sync::Arc;
//!
//! let detector: BotFilterState = Arc::new(UserAgentBotDetector::new());
//!
//! let app = Router::new()
//!     .route("/api/session", post(handler))
//!     .layer(middleware::from_fn_with_state(detector, bot_filter_middleware));
//! ```

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header::USER_AGENT,
    middleware::Next,
    response::Response,
};

use crate::adapters::http::session::handle_session_error;
use crate::domain::session::SessionError;
use crate::ports::BotDetector;

/// Bot filter middleware state.
pub type BotFilterState = Arc<dyn BotDetector>;

pub async fn bot_filter_middleware(
    State(detector): State<BotFilterState>,
    request: Request,
    next: Next,
) -> Response {
    let user_agent = request
        .headers()
        .get(USER_AGENT)
        .and_then(|value| value.to_str().ok());

    if detector.is_bot(user_agent) {
        tracing::info!(
            user_agent = user_agent.unwrap_or("<missing>"),
            path = %request.uri().path(),
            "Rejected automated client"
        );
        return handle_session_error(SessionError::Forbidden);
    }

    next.run(request).await
}
