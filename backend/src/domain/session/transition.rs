//! The session state machine.
//!
//! `apply` is a pure, total function of (snapshot, operation, clock). It never
//! touches storage; the coordinator persists the returned patch. Because it
//! has no side effects it can be re-run against a freshly read snapshot at
//! any time.
//!
//! | Operation | Requires                           | Rejections                           |
//! |-----------|------------------------------------|--------------------------------------|
//! | Join      | not expired                        | Expired                              |
//! | Vote      | participant present, not revealed  | ParticipantNotFound, AlreadyRevealed |
//! | Reveal    | caller is creator, not revealed    | NotAuthorized, AlreadyRevealed       |
//! | Reset     | caller is creator                  | NotAuthorized                        |
//! | Fetch     | not expired                        | Expired                              |
//!
//! Expiry is checked first for every operation.
//!
//! Every patch records the snapshot state it relied on, so the store can
//! refuse it if another write got there first. The coordinator then re-runs
//! `apply` against the fresher record.

use crate::domain::foundation::{ParticipantId, Timestamp};

use super::{Card, Nickname, Participant, Session, SessionError, SessionPatch, VoteRecord};

/// An operation against an existing session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Join {
        participant_id: ParticipantId,
        nickname: Nickname,
    },
    Vote {
        participant_id: ParticipantId,
        card: Card,
    },
    Reveal {
        participant_id: ParticipantId,
    },
    Reset {
        participant_id: ParticipantId,
    },
    Fetch,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Join { .. } => "join",
            Operation::Vote { .. } => "vote",
            Operation::Reveal { .. } => "reveal",
            Operation::Reset { .. } => "reset",
            Operation::Fetch => "fetch",
        }
    }
}

/// Outcome of a successful operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// The snapshot with the operation applied.
    pub session: Session,
    /// The field group to persist; `None` for read-only operations.
    pub patch: Option<SessionPatch>,
}

impl Transition {
    fn unchanged(session: &Session) -> Self {
        Self {
            session: session.clone(),
            patch: None,
        }
    }

    fn with_patch(session: &Session, patch: SessionPatch) -> Self {
        let mut next = session.clone();
        patch.apply_to(&mut next);
        Self {
            session: next,
            patch: Some(patch),
        }
    }
}

/// Validates `operation` against `session` and computes the result.
pub fn apply(
    session: &Session,
    operation: Operation,
    now: Timestamp,
) -> Result<Transition, SessionError> {
    if session.is_expired(now) {
        return Err(SessionError::Expired);
    }

    match operation {
        Operation::Fetch => Ok(Transition::unchanged(session)),

        Operation::Join {
            participant_id,
            nickname,
        } => {
            if session.participant(&participant_id).is_some() {
                return Err(SessionError::invalid_input("participant already joined"));
            }
            let participant = Participant::member(participant_id, nickname, now);
            Ok(Transition::with_patch(
                session,
                SessionPatch::UpsertParticipant(participant),
            ))
        }

        Operation::Vote {
            participant_id,
            card,
        } => {
            let participant = session
                .participant(&participant_id)
                .ok_or(SessionError::ParticipantNotFound)?;
            if session.is_revealed() {
                return Err(SessionError::AlreadyRevealed);
            }
            let mut updated = participant.clone();
            updated.vote = Some(card);
            Ok(Transition::with_patch(
                session,
                SessionPatch::CastVote {
                    participant: updated,
                    round: session.current_round(),
                },
            ))
        }

        Operation::Reveal { participant_id } => {
            if !session.is_creator(&participant_id) {
                return Err(SessionError::NotAuthorized);
            }
            if session.is_revealed() {
                return Err(SessionError::AlreadyRevealed);
            }
            let mut vote_history = session.vote_history().to_vec();
            vote_history.push(VoteRecord {
                round: session.current_round(),
                timestamp: now,
                votes: session.current_votes(),
                revealed: true,
            });
            Ok(Transition::with_patch(
                session,
                SessionPatch::RoundState {
                    base_revision: session.revision(),
                    revealed: true,
                    current_round: session.current_round(),
                    vote_history,
                },
            ))
        }

        Operation::Reset { participant_id } => {
            if !session.is_creator(&participant_id) {
                return Err(SessionError::NotAuthorized);
            }
            Ok(Transition::with_patch(
                session,
                SessionPatch::ResetRound {
                    current_round: session.current_round() + 1,
                },
            ))
        }
    }
}
