//! HTTP adapters - REST API, the live endpoint wiring, and the HTTP poll
//! client.

pub mod client;
pub mod middleware;
pub mod session;

use std::sync::Arc;

use axum::{middleware::from_fn_with_state, routing::get, Router};

use crate::adapters::websocket::{websocket_router, WebSocketState};
use crate::application::SessionCoordinator;
use crate::ports::BotDetector;

pub use client::HttpSessionFetcher;
pub use middleware::{bot_filter_middleware, BotFilterState};
pub use session::{session_routes, SessionHandlers};

/// Builds the full application router.
///
/// Every `/api` route sits behind the bot filter; `/health` does not.
pub fn api_router(coordinator: Arc<SessionCoordinator>, bot_detector: Arc<dyn BotDetector>) -> Router {
    let api = session_routes(SessionHandlers::new(Arc::clone(&coordinator)))
        .merge(websocket_router(WebSocketState::new(coordinator)))
        .layer(from_fn_with_state(bot_detector, bot_filter_middleware));

    Router::new().route("/health", get(health)).merge(api)
}

async fn health() -> &'static str {
    "ok"
}
