//! In-memory session store.
//!
//! Records live in a single map behind an async `RwLock`. Every `apply`
//! takes the write lock, so patches to one session are serialized and
//! checked against the current record before they merge.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::domain::foundation::{SessionId, Timestamp};
use crate::domain::session::{Session, SessionPatch};
use crate::ports::{SessionStore, StoreError};

/// Session store held in process memory.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<SessionId, Session>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes every session whose expiry has passed. Returns how many went.
    pub async fn purge_expired(&self, now: Timestamp) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired(now));
        let purged = before - sessions.len();
        if purged > 0 {
            debug!(purged, "Purged expired sessions");
        }
        purged
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, id: &SessionId) -> Result<Session, StoreError> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    async fn insert(&self, session: &Session) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(session.id()) {
            return Err(StoreError::AlreadyExists(session.id().clone()));
        }
        sessions.insert(session.id().clone(), session.clone());
        Ok(())
    }

    async fn apply(&self, id: &SessionId, patch: &SessionPatch) -> Result<Session, StoreError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        if !patch.admits(session) {
            debug!(session_id = %id, patch = patch.kind(), revision = session.revision(), "Patch refused");
            return Err(StoreError::Conflict(id.clone()));
        }
        patch.apply_to(session);
        Ok(session.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::ParticipantId;
    use crate::domain::session::{self, Card, Nickname, Operation, Participant, DEFAULT_SESSION_TTL};
    use std::sync::Arc;

    fn test_session(created_at: Timestamp) -> Session {
        Session::create(
            SessionId::generate(),
            ParticipantId::generate(),
            Nickname::parse("Host").unwrap(),
            created_at,
            DEFAULT_SESSION_TTL,
        )
    }

    #[tokio::test]
    async fn get_returns_inserted_session() {
        let store = InMemorySessionStore::new();
        let session = test_session(Timestamp::now());
        store.insert(&session).await.unwrap();

        assert_eq!(store.get(session.id()).await.unwrap(), session);
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let store = InMemorySessionStore::new();
        let id = SessionId::generate();

        assert_eq!(store.get(&id).await, Err(StoreError::NotFound(id)));
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_id() {
        let store = InMemorySessionStore::new();
        let session = test_session(Timestamp::now());
        store.insert(&session).await.unwrap();

        assert!(matches!(
            store.insert(&session).await,
            Err(StoreError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn apply_on_missing_session_is_not_found() {
        let store = InMemorySessionStore::new();
        let patch = SessionPatch::ResetRound { current_round: 2 };

        assert!(matches!(
            store.apply(&SessionId::generate(), &patch).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn stale_patches_merge_into_current_record() {
        let store = InMemorySessionStore::new();
        let session = test_session(Timestamp::now());
        store.insert(&session).await.unwrap();

        let a = Participant {
            vote: Some(Card::Two),
            ..Participant::member(
                ParticipantId::generate(),
                Nickname::parse("A").unwrap(),
                Timestamp::now(),
            )
        };
        let b = Participant {
            vote: Some(Card::Five),
            ..Participant::member(
                ParticipantId::generate(),
                Nickname::parse("B").unwrap(),
                Timestamp::now(),
            )
        };

        store
            .apply(session.id(), &SessionPatch::UpsertParticipant(a.clone()))
            .await
            .unwrap();
        let committed = store
            .apply(session.id(), &SessionPatch::UpsertParticipant(b.clone()))
            .await
            .unwrap();

        assert_eq!(committed.participant(&a.id).unwrap().vote, Some(Card::Two));
        assert_eq!(committed.participant(&b.id).unwrap().vote, Some(Card::Five));
        assert_eq!(committed.participants().len(), 3);
        assert_eq!(committed.revision(), 2);
    }

    fn reveal_patch(snapshot: &Session) -> SessionPatch {
        let creator = snapshot.creator_id().clone();
        session::apply(snapshot, Operation::Reveal { participant_id: creator }, Timestamp::now())
            .unwrap()
            .patch
            .unwrap()
    }

    fn reset_patch(snapshot: &Session) -> SessionPatch {
        let creator = snapshot.creator_id().clone();
        session::apply(snapshot, Operation::Reset { participant_id: creator }, Timestamp::now())
            .unwrap()
            .patch
            .unwrap()
    }

    #[tokio::test]
    async fn reveal_computed_before_reset_cannot_rewind_the_round() {
        let store = InMemorySessionStore::new();
        let session = test_session(Timestamp::now());
        store.insert(&session).await.unwrap();

        // Both writers read round 1; the reset commits first.
        let stale_reveal = reveal_patch(&session);
        let after_reset = store.apply(session.id(), &reset_patch(&session)).await.unwrap();
        assert_eq!(after_reset.current_round(), 2);

        assert_eq!(
            store.apply(session.id(), &stale_reveal).await,
            Err(StoreError::Conflict(session.id().clone()))
        );
        let stored = store.get(session.id()).await.unwrap();
        assert_eq!(stored.current_round(), 2);
        assert!(!stored.is_revealed());
        assert_eq!(stored.revision(), 1);
    }

    #[tokio::test]
    async fn vote_computed_before_reveal_is_refused() {
        let store = InMemorySessionStore::new();
        let session = test_session(Timestamp::now());
        store.insert(&session).await.unwrap();
        let creator = session.creator_id().clone();

        let stale_vote = session::apply(
            &session,
            Operation::Vote { participant_id: creator, card: Card::Eight },
            Timestamp::now(),
        )
        .unwrap()
        .patch
        .unwrap();
        store.apply(session.id(), &reveal_patch(&session)).await.unwrap();

        assert!(matches!(
            store.apply(session.id(), &stale_vote).await,
            Err(StoreError::Conflict(_))
        ));
        let stored = store.get(session.id()).await.unwrap();
        assert!(stored.current_votes().is_empty());
    }

    #[tokio::test]
    async fn racing_reveal_and_reset_never_rewind() {
        for _ in 0..50 {
            let store = Arc::new(InMemorySessionStore::new());
            let session = test_session(Timestamp::now());
            store.insert(&session).await.unwrap();
            let (reveal, reset) = (reveal_patch(&session), reset_patch(&session));

            let id = session.id().clone();
            let revealing = {
                let (store, id) = (store.clone(), id.clone());
                tokio::spawn(async move { store.apply(&id, &reveal).await })
            };
            let resetting = {
                let (store, id) = (store.clone(), id.clone());
                tokio::spawn(async move { store.apply(&id, &reset).await })
            };
            let outcomes = [revealing.await.unwrap(), resetting.await.unwrap()];

            // The reset lands in either order; the reveal only if it went first.
            let stored = store.get(&id).await.unwrap();
            let committed = outcomes.iter().filter(|o| o.is_ok()).count() as u64;
            assert!(outcomes[1].is_ok());
            assert_eq!(stored.revision(), committed);
            assert_eq!(stored.current_round(), 2);
            assert!(!stored.is_revealed());
        }
    }

    #[tokio::test]
    async fn purge_expired_removes_only_expired() {
        let store = InMemorySessionStore::new();
        let now = Timestamp::now();
        store.insert(&test_session(now.minus_hours(30))).await.unwrap();
        let fresh = test_session(now);
        store.insert(&fresh).await.unwrap();

        assert_eq!(store.purge_expired(now).await, 1);
        assert_eq!(store.len().await, 1);
        assert!(store.get(fresh.id()).await.is_ok());
    }
}
