//! Strongly-typed identifier value objects.
//!
//! Session and participant ids are short, URL-safe opaque strings drawn from
//! a CSPRNG. Their formats are fixed so that anything arriving from the
//! outside world can be validated before it reaches the store.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::ValidationError;

/// URL-safe alphabet used for every generated identifier.
const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789_-";

/// Length of a session identifier.
pub const SESSION_ID_LENGTH: usize = 12;

/// Length of a participant identifier.
pub const PARTICIPANT_ID_LENGTH: usize = 16;

fn random_token(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

fn validate_token(field: &str, value: &str, len: usize) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::empty_field(field));
    }
    if value.len() != len {
        return Err(ValidationError::invalid_format(
            field,
            format!("expected {} characters, got {}", len, value.len()),
        ));
    }
    if !value.bytes().all(|b| ALPHABET.contains(&b)) {
        return Err(ValidationError::invalid_format(
            field,
            "only [A-Za-z0-9_-] characters are allowed",
        ));
    }
    Ok(())
}

/// Unique identifier for a planning poker session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    /// Creates a new random SessionId.
    pub fn generate() -> Self {
        Self(random_token(SESSION_ID_LENGTH))
    }

    /// Parses and validates a SessionId.
    pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
        let id = id.into();
        validate_token("session_id", &id, SESSION_ID_LENGTH)?;
        Ok(Self(id))
    }

    /// Returns the inner string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for SessionId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0
    }
}

/// Participant identifier, unique within a session.
///
/// Doubles as the participant's opaque bearer token: whoever presents it acts
/// as that participant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ParticipantId(String);

impl ParticipantId {
    /// Creates a new random ParticipantId.
    pub fn generate() -> Self {
        Self(random_token(PARTICIPANT_ID_LENGTH))
    }

    /// Parses and validates a ParticipantId.
    pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
        let id = id.into();
        validate_token("participant_id", &id, PARTICIPANT_ID_LENGTH)?;
        Ok(Self(id))
    }

    /// Returns the inner string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ParticipantId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ParticipantId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ParticipantId> for String {
    fn from(id: ParticipantId) -> Self {
        id.0
    }
}
