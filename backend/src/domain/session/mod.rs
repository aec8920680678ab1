//! Session domain module.
//!
//! The planning poker data model, the pure state machine that validates and
//! applies operations to it, the field-group patches used to persist those
//! operations, and vote statistics.

mod aggregate;
mod card;
mod errors;
mod participant;
mod patch;
mod statistics;
mod transition;

pub use aggregate::{Session, SessionRecord, VoteRecord, DEFAULT_SESSION_TTL};
pub use card::{Card, UnknownCard};
pub use errors::SessionError;
pub use participant::{Nickname, Participant, MAX_NICKNAME_LENGTH};
pub use patch::SessionPatch;
pub use statistics::VoteStatistics;
pub use transition::{apply, Operation, Transition};
