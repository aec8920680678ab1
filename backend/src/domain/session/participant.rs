//! Session participants and their display names.

use crate::domain::foundation::{ParticipantId, Timestamp, ValidationError};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::Card;

/// Maximum nickname length in characters.
pub const MAX_NICKNAME_LENGTH: usize = 30;

/// A trimmed, non-empty display name of at most 30 characters.
///
/// Longer input is truncated rather than rejected. Uniqueness within a
/// session is not enforced.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Nickname(String);

impl Nickname {
    /// Sanitizes raw user input into a nickname.
    ///
    /// # Errors
    ///
    /// - `EmptyField` if nothing is left after trimming
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::empty_field("nickname"));
        }
        let truncated: String = trimmed.chars().take(MAX_NICKNAME_LENGTH).collect();
        // Truncation can expose trailing whitespace.
        Ok(Self(truncated.trim_end().to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Nickname {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Nickname {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Nickname> for String {
    fn from(nickname: Nickname) -> Self {
        nickname.0
    }
}

/// A member of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: ParticipantId,
    pub nickname: Nickname,
    pub vote: Option<Card>,
    pub joined_at: Timestamp,
    pub is_creator: bool,
}

impl Participant {
    /// Creates the session creator.
    pub fn creator(id: ParticipantId, nickname: Nickname, joined_at: Timestamp) -> Self {
        Self {
            id,
            nickname,
            vote: None,
            joined_at,
            is_creator: true,
        }
    }

    /// Creates an ordinary member.
    pub fn member(id: ParticipantId, nickname: Nickname, joined_at: Timestamp) -> Self {
        Self {
            id,
            nickname,
            vote: None,
            joined_at,
            is_creator: false,
        }
    }

    pub fn has_voted(&self) -> bool {
        self.vote.is_some()
    }
}
