//! HTTP middleware for axum.
//!
//! - `bot_filter` - rejects automated clients before any session handler runs

pub mod bot_filter;

pub use bot_filter::{bot_filter_middleware, BotFilterState};
