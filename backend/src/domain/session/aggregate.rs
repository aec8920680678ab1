//! Session aggregate entity.
//!
//! A session is one shared estimation table: a creator, the people who joined,
//! their current votes, and the history of revealed rounds.
//!
//! The aggregate is never mutated in place by callers. Every operation reads
//! an immutable snapshot and produces a new one through the transition
//! function in `transition.rs`.

use crate::domain::foundation::{ParticipantId, SessionId, Timestamp, ValidationError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use super::{Card, Nickname, Participant};

/// Default lifetime of a session.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Snapshot of one revealed round. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRecord {
    pub round: u32,
    pub timestamp: Timestamp,
    /// Only participants who voted appear here.
    pub votes: HashMap<ParticipantId, Card>,
    pub revealed: bool,
}

/// Session aggregate.
///
/// # Invariants
///
/// - `creator_id` is always a key of `participants`
/// - exactly one participant has `is_creator`, and it is the creator
/// - `current_round` starts at 1 and only grows on reset
/// - `revealed` is false after creation and after every reset
/// - usable only while `now < expires_at`
/// - `revision` grows by exactly one with every committed patch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SessionRecord")]
pub struct Session {
    id: SessionId,
    created_at: Timestamp,
    expires_at: Timestamp,
    creator_id: ParticipantId,
    participants: HashMap<ParticipantId, Participant>,
    revealed: bool,
    current_round: u32,
    vote_history: Vec<VoteRecord>,
    revision: u64,
}

/// Unvalidated persisted shape of a session.
///
/// Anything read from outside the process goes through this type and is
/// checked by `Session::try_from` before it is used.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionRecord {
    pub id: SessionId,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
    pub creator_id: ParticipantId,
    pub participants: HashMap<ParticipantId, Participant>,
    pub revealed: bool,
    pub current_round: u32,
    #[serde(default)]
    pub vote_history: Vec<VoteRecord>,
    #[serde(default)]
    pub revision: u64,
}

impl Session {
    /// Starts a new session with the creator as its only participant.
    pub fn create(
        id: SessionId,
        creator_id: ParticipantId,
        nickname: Nickname,
        now: Timestamp,
        ttl: Duration,
    ) -> Self {
        let creator = Participant::creator(creator_id.clone(), nickname, now);
        let mut participants = HashMap::new();
        participants.insert(creator_id.clone(), creator);

        Self {
            id,
            created_at: now,
            expires_at: now.plus(ttl),
            creator_id,
            participants,
            revealed: false,
            current_round: 1,
            vote_history: Vec::new(),
            revision: 0,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn expires_at(&self) -> Timestamp {
        self.expires_at
    }

    pub fn creator_id(&self) -> &ParticipantId {
        &self.creator_id
    }

    pub fn participants(&self) -> &HashMap<ParticipantId, Participant> {
        &self.participants
    }

    pub fn participant(&self, id: &ParticipantId) -> Option<&Participant> {
        self.participants.get(id)
    }

    pub fn is_revealed(&self) -> bool {
        self.revealed
    }

    pub fn current_round(&self) -> u32 {
        self.current_round
    }

    pub fn vote_history(&self) -> &[VoteRecord] {
        &self.vote_history
    }

    /// Returns true once `now` has reached the expiry instant.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        !now.is_before(&self.expires_at)
    }

    /// Returns true if the participant is the session creator.
    pub fn is_creator(&self, id: &ParticipantId) -> bool {
        &self.creator_id == id
    }

    /// Collects the votes currently cast, keyed by participant.
    pub fn current_votes(&self) -> HashMap<ParticipantId, Card> {
        self.participants
            .values()
            .filter_map(|p| p.vote.map(|card| (p.id.clone(), card)))
            .collect()
    }

    /// Number of patches committed to this session. A snapshot with a
    /// higher revision is strictly newer.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Field-group writers (crate-internal; used by transitions and patches)
    // ─────────────────────────────────────────────────────────────────────────

    pub(crate) fn put_participant(&mut self, participant: Participant) {
        self.participants.insert(participant.id.clone(), participant);
    }

    pub(crate) fn set_round_state(
        &mut self,
        revealed: bool,
        current_round: u32,
        vote_history: Vec<VoteRecord>,
    ) {
        self.revealed = revealed;
        self.current_round = current_round;
        self.vote_history = vote_history;
    }

    pub(crate) fn bump_revision(&mut self) {
        self.revision += 1;
    }

    pub(crate) fn start_round(&mut self, current_round: u32) {
        self.revealed = false;
        self.current_round = current_round;
        for participant in self.participants.values_mut() {
            participant.vote = None;
        }
    }
}

impl TryFrom<SessionRecord> for Session {
    type Error = ValidationError;

    fn try_from(record: SessionRecord) -> Result<Self, Self::Error> {
        if record.current_round == 0 {
            return Err(ValidationError::invalid_format(
                "current_round",
                "rounds start at 1",
            ));
        }
        if !record.created_at.is_before(&record.expires_at) {
            return Err(ValidationError::invalid_format(
                "expires_at",
                "must be after created_at",
            ));
        }
        match record.participants.get(&record.creator_id) {
            Some(creator) if creator.is_creator => {}
            _ => {
                return Err(ValidationError::invalid_format(
                    "creator_id",
                    "creator is missing from participants",
                ))
            }
        }
        for (key, participant) in &record.participants {
            if key != &participant.id {
                return Err(ValidationError::invalid_format(
                    "participants",
                    format!("entry {} holds participant {}", key, participant.id),
                ));
            }
            if participant.is_creator && participant.id != record.creator_id {
                return Err(ValidationError::invalid_format(
                    "participants",
                    "more than one creator",
                ));
            }
        }

        Ok(Self {
            id: record.id,
            created_at: record.created_at,
            expires_at: record.expires_at,
            creator_id: record.creator_id,
            participants: record.participants,
            revealed: record.revealed,
            current_round: record.current_round,
            vote_history: record.vote_history,
            revision: record.revision,
        })
    }
}
