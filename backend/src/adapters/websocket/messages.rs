//! WebSocket message types for live session updates.
//!
//! - Server → Client: connection ack, snapshots, updates, presence, errors, pongs
//! - Client → Server: pings, state requests
//!
//! Server messages also deserialize, for the out-of-process watcher.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::Timestamp;
use crate::domain::session::Session;

use super::presence::PresenceState;

// ============================================
// Server → Client Messages
// ============================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Subscription is live.
    Connected(ConnectedMessage),

    /// Full record, sent on connect and on `request.state`.
    #[serde(rename = "session.snapshot")]
    SessionSnapshot(SessionMessage),

    /// Record after a committed mutation.
    #[serde(rename = "session.updated")]
    SessionUpdated(SessionMessage),

    /// Everyone known to the room, sent after the first snapshot and after
    /// a lagged presence feed.
    #[serde(rename = "presence.sync")]
    PresenceSync(PresenceSyncMessage),

    #[serde(rename = "presence.join")]
    PresenceJoin(PresenceMessage),

    #[serde(rename = "presence.leave")]
    PresenceLeave(PresenceMessage),

    Error(ErrorMessage),

    Pong(PongMessage),
}

impl ServerMessage {
    pub fn connected(session_id: &str, connection_id: &str) -> Self {
        ServerMessage::Connected(ConnectedMessage {
            session_id: session_id.to_string(),
            connection_id: connection_id.to_string(),
            timestamp: Timestamp::now().to_rfc3339(),
        })
    }

    pub fn snapshot(session: Session) -> Self {
        ServerMessage::SessionSnapshot(SessionMessage::now(session))
    }

    pub fn updated(session: Session) -> Self {
        ServerMessage::SessionUpdated(SessionMessage::now(session))
    }

    pub fn presence_sync(presences: Vec<PresenceState>) -> Self {
        ServerMessage::PresenceSync(PresenceSyncMessage {
            presences,
            timestamp: Timestamp::now().to_rfc3339(),
        })
    }

    pub fn presence_join(presence: PresenceState) -> Self {
        ServerMessage::PresenceJoin(PresenceMessage { presence })
    }

    pub fn presence_leave(presence: PresenceState) -> Self {
        ServerMessage::PresenceLeave(PresenceMessage { presence })
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        ServerMessage::Error(ErrorMessage {
            code: code.into(),
            message: message.into(),
            timestamp: Timestamp::now().to_rfc3339(),
        })
    }

    pub fn pong() -> Self {
        ServerMessage::Pong(PongMessage {
            timestamp: Timestamp::now().to_rfc3339(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedMessage {
    pub session_id: String,
    pub connection_id: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMessage {
    pub session: Session,
    pub timestamp: String,
}

impl SessionMessage {
    fn now(session: Session) -> Self {
        Self {
            session,
            timestamp: Timestamp::now().to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceSyncMessage {
    pub presences: Vec<PresenceState>,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceMessage {
    pub presence: PresenceState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub code: String,
    pub message: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PongMessage {
    pub timestamp: String,
}

// ============================================
// Client → Server Messages
// ============================================

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Heartbeat request.
    Ping,

    /// Ask for a fresh `session.snapshot`.
    #[serde(rename = "request.state")]
    RequestState,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{ParticipantId, SessionId};
    use crate::domain::session::{Nickname, DEFAULT_SESSION_TTL};

    fn session() -> Session {
        Session::create(
            SessionId::generate(),
            ParticipantId::generate(),
            Nickname::parse("Host").unwrap(),
            Timestamp::now(),
            DEFAULT_SESSION_TTL,
        )
    }

    #[test]
    fn update_messages_use_dotted_type_names() {
        let snapshot = serde_json::to_value(ServerMessage::snapshot(session())).unwrap();
        let updated = serde_json::to_value(ServerMessage::updated(session())).unwrap();

        assert_eq!(snapshot["type"], "session.snapshot");
        assert_eq!(updated["type"], "session.updated");
        assert!(updated["session"]["participants"].is_object());
    }

    #[test]
    fn connected_message_is_camel_case() {
        let json = serde_json::to_value(ServerMessage::connected("abc", "conn-1")).unwrap();
        assert_eq!(json["type"], "connected");
        assert_eq!(json["sessionId"], "abc");
        assert_eq!(json["connectionId"], "conn-1");
    }

    #[test]
    fn presence_messages_use_dotted_type_names() {
        let state = PresenceState {
            participant_id: ParticipantId::generate(),
            nickname: Nickname::parse("Ada").unwrap(),
            online: false,
            last_seen: Timestamp::now(),
        };
        let sync = serde_json::to_value(ServerMessage::presence_sync(vec![state.clone()])).unwrap();
        let leave = serde_json::to_value(ServerMessage::presence_leave(state)).unwrap();

        assert_eq!(sync["type"], "presence.sync");
        assert_eq!(sync["presences"][0]["nickname"], "Ada");
        assert_eq!(leave["type"], "presence.leave");
        assert_eq!(leave["presence"]["online"], false);
    }

    #[test]
    fn server_messages_read_back_for_watchers() {
        let original = session();
        let json = serde_json::to_string(&ServerMessage::updated(original.clone())).unwrap();

        match serde_json::from_str::<ServerMessage>(&json).unwrap() {
            ServerMessage::SessionUpdated(message) => assert_eq!(message.session, original),
            other => panic!("unexpected message {:?}", other),
        }
        assert!(matches!(
            serde_json::from_str::<ServerMessage>(r#"{"type":"pong","timestamp":"t"}"#),
            Ok(ServerMessage::Pong(_))
        ));
    }

    #[test]
    fn client_messages_parse() {
        assert_eq!(
            serde_json::from_str::<ClientMessage>(r#"{"type":"ping"}"#).unwrap(),
            ClientMessage::Ping
        );
        assert_eq!(
            serde_json::from_str::<ClientMessage>(r#"{"type":"request.state"}"#).unwrap(),
            ClientMessage::RequestState
        );
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"vote"}"#).is_err());
    }
}
