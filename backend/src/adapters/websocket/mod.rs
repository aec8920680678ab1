//! WebSocket push channel for live session updates.
//!
//! ```text
//!  SessionCoordinator ── publish ──▶ ChangeNotifier
//!                                        │ subscribe (one per socket)
//!                                        ▼
//!                               ws_handler  ──▶  client
//!                               connected, session.snapshot,
//!                               presence.sync, session.updated*,
//!                               presence.join/leave*, error
//! ```
//!
//! - [`messages`] - wire protocol
//! - [`handler`] - axum upgrade handler and per-connection loop
//! - [`presence`] - who holds a socket, per session
//! - [`client`] - the same protocol consumed as a [`ChangeNotifier`](crate::ports::ChangeNotifier)

pub mod client;
pub mod handler;
pub mod messages;
pub mod presence;

pub use client::WebSocketChangeNotifier;
pub use handler::{websocket_router, ws_handler, LiveQuery, WebSocketState};
pub use messages::{ClientMessage, ServerMessage};
pub use presence::{PresenceChange, PresenceRegistry, PresenceState};
