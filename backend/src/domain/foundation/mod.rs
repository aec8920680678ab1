//! Foundation module - Shared domain primitives.
//!
//! Identifiers, timestamps, error vocabulary and the state machine trait
//! used across the planning poker domain.

mod errors;
mod ids;
mod state_machine;
mod timestamp;

pub use errors::{ErrorCode, ValidationError};
pub use ids::{ParticipantId, SessionId, PARTICIPANT_ID_LENGTH, SESSION_ID_LENGTH};
pub use state_machine::StateMachine;
pub use timestamp::Timestamp;
