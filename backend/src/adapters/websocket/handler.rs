//! WebSocket upgrade handler for live session updates.
//!
//! Connection lifecycle:
//! 1. Validate the session id, the optional `participantId` query, and that
//!    the session is live
//! 2. Upgrade to WebSocket and subscribe to the session's changes
//! 3. Send `connected`, a `session.snapshot`, then `presence.sync`
//! 4. Forward each newer committed record as `session.updated`, and each
//!    presence change as `presence.join` / `presence.leave`
//! 5. On subscription failure send `error` and close, so the client polls

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    response::Response,
    routing::get,
    Router,
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use crate::adapters::http::session::handle_session_error;
use crate::application::SessionCoordinator;
use crate::domain::foundation::{ParticipantId, SessionId, Timestamp};
use crate::domain::session::{Nickname, Session, SessionError};
use crate::ports::SubscriptionEvent;

use super::messages::{ClientMessage, ServerMessage};
use super::presence::{PresenceChange, PresenceRegistry};

const SUBSCRIPTION_LOST: &str = "SUBSCRIPTION_LOST";

#[derive(Clone)]
pub struct WebSocketState {
    pub coordinator: Arc<SessionCoordinator>,
    pub presence: Arc<PresenceRegistry>,
}

impl WebSocketState {
    pub fn new(coordinator: Arc<SessionCoordinator>) -> Self {
        Self {
            coordinator,
            presence: Arc::new(PresenceRegistry::default()),
        }
    }
}

/// Query of the live endpoint. Without a participant id the socket only
/// observes.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveQuery {
    pub participant_id: Option<String>,
}

/// Who holds the socket, for presence.
#[derive(Debug, Clone)]
struct Viewer {
    participant_id: ParticipantId,
    nickname: Nickname,
}

/// Route: `GET /api/session/:id/live`
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    Query(query): Query<LiveQuery>,
    State(state): State<WebSocketState>,
) -> Response {
    let session_id: SessionId = match session_id.parse() {
        Ok(id) => id,
        Err(e) => return handle_session_error(SessionError::from(e)),
    };
    let participant_id: Option<ParticipantId> = match query.participant_id.map(|raw| raw.parse::<ParticipantId>()) {
        None => None,
        Some(Ok(id)) => Some(id),
        Some(Err(e)) => return handle_session_error(SessionError::from(e)),
    };

    // Unknown or expired sessions and strangers are refused before the upgrade.
    let session = match state.coordinator.fetch_session(&session_id).await {
        Ok(session) => session,
        Err(e) => return handle_session_error(e),
    };
    let viewer = match participant_id {
        None => None,
        Some(id) => match session.participant(&id) {
            Some(participant) => Some(Viewer {
                participant_id: id,
                nickname: participant.nickname.clone(),
            }),
            None => return handle_session_error(SessionError::ParticipantNotFound),
        },
    };

    ws.on_upgrade(move |socket| handle_socket(socket, session_id, viewer, state))
}

/// Per-connection state.
struct LiveConnection {
    sender: SplitSink<WebSocket, Message>,
    session_id: SessionId,
    connection_id: String,
    /// Revision of the newest record sent; older pushes are skipped.
    last_revision: Option<u64>,
}

impl LiveConnection {
    async fn send(&mut self, message: &ServerMessage) -> Result<(), axum::Error> {
        let json = serde_json::to_string(message).map_err(axum::Error::new)?;
        self.sender.send(Message::Text(json)).await
    }

    /// Sends the current record, or an `error` message if it cannot be read.
    async fn send_snapshot(&mut self, state: &WebSocketState) -> Result<(), axum::Error> {
        match state.coordinator.fetch_session(&self.session_id).await {
            Ok(session) => {
                self.note_revision(&session);
                self.send(&ServerMessage::snapshot(session)).await
            }
            Err(e) => {
                self.send(&ServerMessage::error(e.code().as_str(), e.to_string()))
                    .await
            }
        }
    }

    async fn send_update(&mut self, session: Session) -> Result<(), axum::Error> {
        if self.last_revision.is_some_and(|sent| session.revision() <= sent) {
            tracing::trace!(
                connection_id = %self.connection_id,
                revision = session.revision(),
                "Skipping record already sent"
            );
            return Ok(());
        }
        self.note_revision(&session);
        self.send(&ServerMessage::updated(session)).await
    }

    fn note_revision(&mut self, session: &Session) {
        let revision = session.revision();
        self.last_revision = Some(self.last_revision.map_or(revision, |sent| sent.max(revision)));
    }

    async fn fail(&mut self, code: &str, message: String) {
        let _ = self.send(&ServerMessage::error(code, message)).await;
        let _ = self.sender.send(Message::Close(None)).await;
    }
}

/// Runs for the lifetime of one connection.
async fn handle_socket(
    socket: WebSocket,
    session_id: SessionId,
    viewer: Option<Viewer>,
    state: WebSocketState,
) {
    let (sender, mut receiver) = socket.split();
    let mut conn = LiveConnection {
        sender,
        session_id: session_id.clone(),
        connection_id: Uuid::new_v4().to_string(),
        last_revision: None,
    };

    let mut subscription = match state.coordinator.notifier().subscribe(&session_id).await {
        Ok(subscription) => subscription,
        Err(e) => {
            tracing::warn!(session_id = %session_id, error = %e, "Live subscribe failed");
            conn.fail(SUBSCRIPTION_LOST, e.to_string()).await;
            return;
        }
    };

    let connection_id = conn.connection_id.clone();
    if conn
        .send(&ServerMessage::connected(session_id.as_str(), &connection_id))
        .await
        .is_err()
    {
        subscription.unsubscribe();
        return;
    }
    // Subscribed first, so nothing committed after this snapshot is missed.
    if conn.send_snapshot(&state).await.is_err() {
        subscription.unsubscribe();
        return;
    }

    let ticket = match &viewer {
        Some(v) => {
            state
                .presence
                .connect(&session_id, &v.participant_id, &v.nickname, Timestamp::now())
                .await
        }
        None => state.presence.observe(&session_id).await,
    };
    let mut presence = Some(ticket.changes);
    let viewer_id = viewer.as_ref().map(|v| v.participant_id.clone());
    tracing::debug!(
        session_id = %session_id,
        connection_id = %connection_id,
        participant_id = ?viewer_id,
        "Live connection opened"
    );

    if conn.send(&ServerMessage::presence_sync(ticket.members)).await.is_ok() {
        loop {
            tokio::select! {
                event = subscription.next() => match event {
                    Some(SubscriptionEvent::Snapshot(session)) => {
                        if conn.send_update(session).await.is_err() {
                            break;
                        }
                    }
                    Some(SubscriptionEvent::Status(status)) if status.is_failure() => {
                        tracing::warn!(
                            session_id = %session_id,
                            connection_id = %connection_id,
                            status = ?status,
                            "Live subscription failed"
                        );
                        conn.fail(SUBSCRIPTION_LOST, format!("{:?}", status)).await;
                        break;
                    }
                    Some(SubscriptionEvent::Status(_)) => {}
                    None => {
                        let _ = conn.sender.send(Message::Close(None)).await;
                        break;
                    }
                },
                change = next_presence(&mut presence) => {
                    let message = match change {
                        Ok(PresenceChange::Joined(member)) => ServerMessage::presence_join(member),
                        Ok(PresenceChange::Left(member)) => ServerMessage::presence_leave(member),
                        Err(RecvError::Lagged(missed)) => {
                            tracing::debug!(connection_id = %connection_id, missed, "Presence feed lagged, resyncing");
                            ServerMessage::presence_sync(state.presence.members(&session_id).await)
                        }
                        Err(RecvError::Closed) => {
                            presence = None;
                            continue;
                        }
                    };
                    if conn.send(&message).await.is_err() {
                        break;
                    }
                },
                incoming = receiver.next() => match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(id) = &viewer_id {
                            state.presence.touch(&session_id, id, Timestamp::now()).await;
                        }
                        let reply = match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(ClientMessage::Ping) => conn.send(&ServerMessage::pong()).await,
                            Ok(ClientMessage::RequestState) => conn.send_snapshot(&state).await,
                            Err(e) => {
                                tracing::debug!(connection_id = %connection_id, error = %e, "Ignoring unknown client message");
                                Ok(())
                            }
                        };
                        if reply.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!(connection_id = %connection_id, error = %e, "Receive error");
                        break;
                    }
                },
            }
        }
    }

    subscription.unsubscribe();
    drop(presence);
    state
        .presence
        .disconnect(&session_id, viewer_id.as_ref(), Timestamp::now())
        .await;
    tracing::debug!(session_id = %session_id, connection_id = %connection_id, "Live connection closed");
}

async fn next_presence(
    changes: &mut Option<tokio::sync::broadcast::Receiver<PresenceChange>>,
) -> Result<PresenceChange, RecvError> {
    match changes {
        Some(changes) => changes.recv().await,
        None => std::future::pending().await,
    }
}

/// Router for the live endpoint.
pub fn websocket_router(state: WebSocketState) -> Router {
    Router::new()
        .route("/api/session/:id/live", get(ws_handler))
        .with_state(state)
}
