//! Who is currently looking at a session.
//!
//! Presence is per instance: a participant is online while at least one of
//! their live sockets on this process is open. Closing the last one marks
//! them offline and stamps `last_seen`. Observer sockets (no participant id)
//! receive presence changes but are never listed.
//!
//! ```text
//! Room: session-abc
//! ├── members: { p1: online (2 sockets), p2: offline, last seen 12:03 }
//! └── changes: broadcast ──▶ every socket in the room
//! ```
//!
//! A room is forgotten once nobody in it is online and no socket listens.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};

use crate::domain::foundation::{ParticipantId, SessionId, Timestamp};
use crate::domain::session::Nickname;

/// Buffered presence changes per room before slow sockets lag.
pub const PRESENCE_BUFFER: usize = 64;

/// Presence of one participant as sent to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceState {
    pub participant_id: ParticipantId,
    pub nickname: Nickname,
    pub online: bool,
    pub last_seen: Timestamp,
}

/// A participant came online or went offline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceChange {
    Joined(PresenceState),
    Left(PresenceState),
}

/// What a socket receives when it enters a room.
#[derive(Debug)]
pub struct PresenceTicket {
    /// Everyone known to the room at entry, ordered by participant id.
    pub members: Vec<PresenceState>,
    /// Changes committed after `members` was taken.
    pub changes: broadcast::Receiver<PresenceChange>,
}

struct Member {
    state: PresenceState,
    connections: usize,
}

struct Room {
    members: HashMap<ParticipantId, Member>,
    changes: broadcast::Sender<PresenceChange>,
}

impl Room {
    fn new(capacity: usize) -> Self {
        let (changes, _) = broadcast::channel(capacity);
        Self {
            members: HashMap::new(),
            changes,
        }
    }

    fn snapshot(&self) -> Vec<PresenceState> {
        let mut members: Vec<PresenceState> =
            self.members.values().map(|m| m.state.clone()).collect();
        members.sort_by(|a, b| a.participant_id.cmp(&b.participant_id));
        members
    }

    fn is_idle(&self) -> bool {
        self.changes.receiver_count() == 0 && self.members.values().all(|m| m.connections == 0)
    }
}

/// Tracks online participants per session.
pub struct PresenceRegistry {
    rooms: RwLock<HashMap<SessionId, Room>>,
    capacity: usize,
}

impl PresenceRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            capacity,
        }
    }

    /// Enters the room as an observer.
    pub async fn observe(&self, session_id: &SessionId) -> PresenceTicket {
        let mut rooms = self.rooms.write().await;
        let room = rooms
            .entry(session_id.clone())
            .or_insert_with(|| Room::new(self.capacity));
        PresenceTicket {
            members: room.snapshot(),
            changes: room.changes.subscribe(),
        }
    }

    /// Registers one socket for `participant_id`.
    ///
    /// The first socket of a participant broadcasts `Joined` to the sockets
    /// already in the room. The returned ticket lists the participant as
    /// online and does not replay their own join.
    pub async fn connect(
        &self,
        session_id: &SessionId,
        participant_id: &ParticipantId,
        nickname: &Nickname,
        now: Timestamp,
    ) -> PresenceTicket {
        let mut rooms = self.rooms.write().await;
        let room = rooms
            .entry(session_id.clone())
            .or_insert_with(|| Room::new(self.capacity));

        let member = room
            .members
            .entry(participant_id.clone())
            .or_insert_with(|| Member {
                state: PresenceState {
                    participant_id: participant_id.clone(),
                    nickname: nickname.clone(),
                    online: false,
                    last_seen: now,
                },
                connections: 0,
            });
        member.connections += 1;
        member.state.last_seen = now;
        if !member.state.online {
            member.state.online = true;
            // No receivers is fine.
            let _ = room.changes.send(PresenceChange::Joined(member.state.clone()));
        }

        PresenceTicket {
            members: room.snapshot(),
            changes: room.changes.subscribe(),
        }
    }

    /// Records activity from an online participant.
    pub async fn touch(&self, session_id: &SessionId, participant_id: &ParticipantId, now: Timestamp) {
        let mut rooms = self.rooms.write().await;
        if let Some(member) = rooms
            .get_mut(session_id)
            .and_then(|room| room.members.get_mut(participant_id))
        {
            if member.state.online {
                member.state.last_seen = now;
            }
        }
    }

    /// Releases one socket. Drop the ticket's receiver first.
    ///
    /// Closing a participant's last socket marks them offline and broadcasts
    /// `Left`.
    pub async fn disconnect(
        &self,
        session_id: &SessionId,
        participant_id: Option<&ParticipantId>,
        now: Timestamp,
    ) {
        let mut rooms = self.rooms.write().await;
        let Some(room) = rooms.get_mut(session_id) else {
            return;
        };

        if let Some(member) = participant_id.and_then(|id| room.members.get_mut(id)) {
            member.connections = member.connections.saturating_sub(1);
            if member.connections == 0 && member.state.online {
                member.state.online = false;
                member.state.last_seen = now;
                let _ = room.changes.send(PresenceChange::Left(member.state.clone()));
            }
        }

        if room.is_idle() {
            rooms.remove(session_id);
        }
    }

    /// Current presence for a session, ordered by participant id.
    pub async fn members(&self, session_id: &SessionId) -> Vec<PresenceState> {
        self.rooms
            .read()
            .await
            .get(session_id)
            .map(Room::snapshot)
            .unwrap_or_default()
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}

impl Default for PresenceRegistry {
    fn default() -> Self {
        Self::new(PRESENCE_BUFFER)
    }
}
