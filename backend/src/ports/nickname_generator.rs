//! Nickname generator port.

use crate::domain::session::Nickname;

/// Supplies a display name when a participant does not choose one.
pub trait NicknameGenerator: Send + Sync {
    fn generate(&self) -> Nickname;
}
