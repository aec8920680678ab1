//! Session store port (Record Store Adapter).
//!
//! A keyed record store holding one session per id. Implementations contain
//! no business rules: they persist what they are given and merge patches
//! atomically per record.

use crate::domain::foundation::SessionId;
use crate::domain::session::{Session, SessionPatch};
use async_trait::async_trait;
use thiserror::Error;

/// Errors returned by session store implementations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("session {0} not found")]
    NotFound(SessionId),

    #[error("session {0} already exists")]
    AlreadyExists(SessionId),

    /// The stored record moved on since the patch was computed.
    #[error("session {0} changed underneath the write")]
    Conflict(SessionId),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A stored record could not be decoded into a valid session.
    #[error("corrupt session record: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        StoreError::Unavailable(message.into())
    }

    pub fn corrupt(message: impl Into<String>) -> Self {
        StoreError::Corrupt(message.into())
    }
}

/// Port for session persistence.
///
/// Implementations must guarantee that `apply` is atomic with respect to
/// other `apply` calls on the same id: the patch is checked against and
/// merged into the record as stored at that instant, never into a caller's
/// stale copy. Each committed patch bumps the record's revision by one.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Read the current record.
    ///
    /// # Errors
    ///
    /// - `NotFound` if no record exists (or it has been reaped)
    /// - `Unavailable` / `Corrupt` on infrastructure problems
    async fn get(&self, id: &SessionId) -> Result<Session, StoreError>;

    /// Store a brand new record.
    ///
    /// # Errors
    ///
    /// - `AlreadyExists` if the id is taken
    async fn insert(&self, session: &Session) -> Result<(), StoreError>;

    /// Merge one field group into the stored record and return the
    /// committed result.
    ///
    /// # Errors
    ///
    /// - `NotFound` if no record exists
    /// - `Conflict` if [`SessionPatch::admits`] refuses the stored record;
    ///   nothing is written
    async fn apply(&self, id: &SessionId, patch: &SessionPatch) -> Result<Session, StoreError>;
}
