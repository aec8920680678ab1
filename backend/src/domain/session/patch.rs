//! Field-group patches for merge-on-write persistence.
//!
//! A transition never asks the store to overwrite the whole record. It names
//! the one field group it changed, and the store merges that group into
//! whatever is currently stored. Two votes computed from the same stale
//! snapshot therefore touch different participant entries and both survive.
//!
//! Each patch also names the stored state it was computed against. The store
//! refuses a patch whose assumption no longer holds (see [`SessionPatch::admits`]),
//! so a reveal computed before a reset can never drag the round backwards.
//!
//! | Patch               | Lands only if the stored record...        |
//! |---------------------|-------------------------------------------|
//! | `UpsertParticipant` | exists                                    |
//! | `CastVote`          | is still on `round` and not revealed      |
//! | `RoundState`        | is still at `base_revision`               |
//! | `ResetRound`        | is on the round before `current_round`    |

use super::{Participant, Session, VoteRecord};

/// The field group written by a single transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPatch {
    /// Insert one entry of the participants map.
    UpsertParticipant(Participant),

    /// Replace one participant's entry with their new vote for `round`.
    CastVote { participant: Participant, round: u32 },

    /// Replace the round group after a reveal.
    RoundState {
        base_revision: u64,
        revealed: bool,
        current_round: u32,
        vote_history: Vec<VoteRecord>,
    },

    /// Start a new round: clear the vote of every stored participant,
    /// un-reveal, and move to `current_round`.
    ResetRound { current_round: u32 },
}

impl SessionPatch {
    /// Returns true if the stored record still matches what this patch was
    /// computed from.
    pub fn admits(&self, stored: &Session) -> bool {
        match self {
            SessionPatch::UpsertParticipant(_) => true,
            SessionPatch::CastVote { round, .. } => {
                !stored.is_revealed() && stored.current_round() == *round
            }
            SessionPatch::RoundState { base_revision, .. } => stored.revision() == *base_revision,
            SessionPatch::ResetRound { current_round } => {
                stored.current_round().checked_add(1) == Some(*current_round)
            }
        }
    }

    /// Merges this patch into a stored record and bumps its revision.
    ///
    /// Callers check [`admits`](Self::admits) first.
    pub fn apply_to(&self, session: &mut Session) {
        match self {
            SessionPatch::UpsertParticipant(participant)
            | SessionPatch::CastVote { participant, .. } => {
                session.put_participant(participant.clone());
            }
            SessionPatch::RoundState {
                revealed,
                current_round,
                vote_history,
                ..
            } => {
                session.set_round_state(*revealed, *current_round, vote_history.clone());
            }
            SessionPatch::ResetRound { current_round } => {
                session.start_round(*current_round);
            }
        }
        session.bump_revision();
    }

    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            SessionPatch::UpsertParticipant(_) => "upsert_participant",
            SessionPatch::CastVote { .. } => "cast_vote",
            SessionPatch::RoundState { .. } => "round_state",
            SessionPatch::ResetRound { .. } => "reset_round",
        }
    }
}
