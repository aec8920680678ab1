//! SessionCoordinator - entry points for every session operation.
//!
//! Each mutating operation is a read-transform-write against the store:
//!
//! 1. read the current snapshot (retried on transient store failures)
//! 2. run the state machine over it
//! 3. persist only the field group the transition touched
//! 4. publish the committed record
//!
//! There is no transaction around the read and the write. Concurrent writers
//! are reconciled by the store merging field groups, so two votes computed
//! from the same snapshot both land. A patch whose snapshot assumptions no
//! longer hold is refused by the store with `Conflict`; nothing was written,
//! so the coordinator re-reads and re-runs the operation. Failed writes are
//! never retried: a repeated reveal or reset is not a safe no-op.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::domain::foundation::{ParticipantId, SessionId, Timestamp};
use crate::domain::session::{
    self, Card, Nickname, Operation, Session, SessionError, VoteStatistics, DEFAULT_SESSION_TTL,
};
use crate::ports::{ChangeNotifier, NicknameGenerator, SessionFetcher, SessionStore, StoreError};

/// Fresh ids tried before giving up on a create.
const MAX_CREATE_ATTEMPTS: u32 = 3;

/// Refused patches tolerated before an operation gives up.
const MAX_WRITE_CONFLICTS: u32 = 5;

/// Tuning for the coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub session_ttl: Duration,
    /// Total read attempts, including the first.
    pub read_retry_attempts: u32,
    /// Backoff before the second attempt; grows linearly.
    pub read_retry_backoff: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            session_ttl: DEFAULT_SESSION_TTL,
            read_retry_attempts: 3,
            read_retry_backoff: Duration::from_millis(50),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands and results
// ─────────────────────────────────────────────────────────────────────────────

/// Command to open a new session.
#[derive(Debug, Clone, Default)]
pub struct CreateSessionCommand {
    pub nickname: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreateSessionResult {
    pub session_id: SessionId,
    pub participant_id: ParticipantId,
    pub nickname: Nickname,
    pub session: Session,
}

/// Command to join an existing session.
#[derive(Debug, Clone)]
pub struct JoinSessionCommand {
    pub session_id: SessionId,
    pub nickname: Option<String>,
}

#[derive(Debug, Clone)]
pub struct JoinSessionResult {
    pub participant_id: ParticipantId,
    pub nickname: Nickname,
    pub session: Session,
}

/// Command to cast or change a vote. `vote` is the raw card face.
#[derive(Debug, Clone)]
pub struct SubmitVoteCommand {
    pub session_id: SessionId,
    pub participant_id: ParticipantId,
    pub vote: String,
}

/// Command issued by the creator to reveal or reset a round.
#[derive(Debug, Clone)]
pub struct CreatorCommand {
    pub session_id: SessionId,
    pub participant_id: ParticipantId,
}

/// Statistics view of the current round.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundStatistics {
    pub round: u32,
    pub revealed: bool,
    /// `None` until the round is revealed.
    pub statistics: Option<VoteStatistics>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Coordinator
// ─────────────────────────────────────────────────────────────────────────────

/// Orchestrates session operations across the store and the notifier.
pub struct SessionCoordinator {
    store: Arc<dyn SessionStore>,
    notifier: Arc<dyn ChangeNotifier>,
    nicknames: Arc<dyn NicknameGenerator>,
    config: CoordinatorConfig,
}

impl SessionCoordinator {
    pub fn new(
        store: Arc<dyn SessionStore>,
        notifier: Arc<dyn ChangeNotifier>,
        nicknames: Arc<dyn NicknameGenerator>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            store,
            notifier,
            nicknames,
            config,
        }
    }

    /// Exposes the notifier so transports can subscribe clients.
    pub fn notifier(&self) -> Arc<dyn ChangeNotifier> {
        Arc::clone(&self.notifier)
    }

    pub async fn create_session(
        &self,
        cmd: CreateSessionCommand,
    ) -> Result<CreateSessionResult, SessionError> {
        let nickname = self.resolve_nickname(cmd.nickname.as_deref())?;
        let creator_id = ParticipantId::generate();
        let now = Timestamp::now();

        let mut attempt = 1;
        let session = loop {
            let session = Session::create(
                SessionId::generate(),
                creator_id.clone(),
                nickname.clone(),
                now,
                self.config.session_ttl,
            );
            match self.store.insert(&session).await {
                Ok(()) => break session,
                Err(StoreError::AlreadyExists(id)) if attempt < MAX_CREATE_ATTEMPTS => {
                    warn!(session_id = %id, "Session id collision, regenerating");
                    attempt += 1;
                }
                Err(err) => return Err(self.write_failed(session.id(), "create", err)),
            }
        };

        info!(
            session_id = %session.id(),
            participant_id = %creator_id,
            "Session created"
        );
        self.publish(&session).await;

        Ok(CreateSessionResult {
            session_id: session.id().clone(),
            participant_id: creator_id,
            nickname,
            session,
        })
    }

    pub async fn join_session(
        &self,
        cmd: JoinSessionCommand,
    ) -> Result<JoinSessionResult, SessionError> {
        let nickname = self.resolve_nickname(cmd.nickname.as_deref())?;
        let participant_id = ParticipantId::generate();

        let session = self
            .mutate(
                &cmd.session_id,
                Operation::Join {
                    participant_id: participant_id.clone(),
                    nickname: nickname.clone(),
                },
            )
            .await?;

        info!(
            session_id = %cmd.session_id,
            participant_id = %participant_id,
            participants = session.participants().len(),
            "Participant joined"
        );

        Ok(JoinSessionResult {
            participant_id,
            nickname,
            session,
        })
    }

    pub async fn submit_vote(&self, cmd: SubmitVoteCommand) -> Result<Session, SessionError> {
        let card: Card = cmd
            .vote
            .parse()
            .map_err(|e: session::UnknownCard| SessionError::InvalidVote(e.to_string()))?;

        let session = self
            .mutate(
                &cmd.session_id,
                Operation::Vote {
                    participant_id: cmd.participant_id.clone(),
                    card,
                },
            )
            .await?;

        debug!(
            session_id = %cmd.session_id,
            participant_id = %cmd.participant_id,
            round = session.current_round(),
            "Vote recorded"
        );
        Ok(session)
    }

    pub async fn reveal_votes(&self, cmd: CreatorCommand) -> Result<Session, SessionError> {
        let session = self
            .mutate(
                &cmd.session_id,
                Operation::Reveal {
                    participant_id: cmd.participant_id,
                },
            )
            .await?;

        info!(
            session_id = %cmd.session_id,
            round = session.current_round(),
            "Votes revealed"
        );
        Ok(session)
    }

    pub async fn reset_round(&self, cmd: CreatorCommand) -> Result<Session, SessionError> {
        let session = self
            .mutate(
                &cmd.session_id,
                Operation::Reset {
                    participant_id: cmd.participant_id,
                },
            )
            .await?;

        info!(
            session_id = %cmd.session_id,
            round = session.current_round(),
            "Round reset"
        );
        Ok(session)
    }

    pub async fn fetch_session(&self, session_id: &SessionId) -> Result<Session, SessionError> {
        let current = self.read(session_id).await?;
        let transition = session::apply(&current, Operation::Fetch, Timestamp::now())?;
        debug!(session_id = %session_id, "Session fetched");
        Ok(transition.session)
    }

    /// Statistics for the current round, withheld until reveal.
    pub async fn round_statistics(
        &self,
        session_id: &SessionId,
    ) -> Result<RoundStatistics, SessionError> {
        let session = self.fetch_session(session_id).await?;
        let statistics = session
            .is_revealed()
            .then(|| VoteStatistics::from_votes(session.current_votes().values()));

        Ok(RoundStatistics {
            round: session.current_round(),
            revealed: session.is_revealed(),
            statistics,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────────

    async fn mutate(
        &self,
        session_id: &SessionId,
        operation: Operation,
    ) -> Result<Session, SessionError> {
        let name = operation.name();
        let mut conflicts = 0;

        loop {
            // 1. Read current snapshot
            let current = self.read(session_id).await?;

            // 2. Validate and transform
            let transition =
                session::apply(&current, operation.clone(), Timestamp::now()).map_err(|e| {
                    debug!(session_id = %session_id, operation = name, error = %e, "Operation rejected");
                    e
                })?;
            let Some(patch) = transition.patch else {
                return Ok(transition.session);
            };

            // 3. Persist the touched field group
            match self.store.apply(session_id, &patch).await {
                Ok(committed) => {
                    // 4. Broadcast
                    self.publish(&committed).await;
                    return Ok(committed);
                }
                Err(StoreError::Conflict(_)) if conflicts + 1 < MAX_WRITE_CONFLICTS => {
                    conflicts += 1;
                    debug!(
                        session_id = %session_id,
                        operation = name,
                        base_revision = current.revision(),
                        conflicts,
                        "Snapshot went stale, re-running operation"
                    );
                }
                Err(err) => return Err(self.write_failed(session_id, name, err)),
            }
        }
    }

    async fn read(&self, session_id: &SessionId) -> Result<Session, SessionError> {
        let attempts = self.config.read_retry_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.store.get(session_id).await {
                Ok(session) => return Ok(session),
                Err(StoreError::NotFound(_)) => {
                    return Err(SessionError::NotFound(session_id.clone()));
                }
                Err(StoreError::Unavailable(reason)) if attempt < attempts => {
                    warn!(
                        session_id = %session_id,
                        attempt,
                        error = %reason,
                        "Store read failed, retrying"
                    );
                    tokio::time::sleep(self.config.read_retry_backoff * attempt).await;
                    attempt += 1;
                }
                Err(err) => {
                    error!(session_id = %session_id, attempt, error = %err, "Store read failed");
                    return Err(SessionError::store_unavailable(err.to_string()));
                }
            }
        }
    }

    fn write_failed(&self, session_id: &SessionId, operation: &str, err: StoreError) -> SessionError {
        match err {
            StoreError::NotFound(_) => SessionError::NotFound(session_id.clone()),
            other => {
                error!(session_id = %session_id, operation, error = %other, "Store write failed");
                SessionError::store_unavailable(other.to_string())
            }
        }
    }

    async fn publish(&self, session: &Session) {
        if let Err(e) = self.notifier.publish(session).await {
            warn!(session_id = %session.id(), error = %e, "Failed to publish session change");
        }
    }

    fn resolve_nickname(&self, raw: Option<&str>) -> Result<Nickname, SessionError> {
        match raw {
            Some(raw) => Ok(Nickname::parse(raw)?),
            None => Ok(self.nicknames.generate()),
        }
    }
}

#[async_trait]
impl SessionFetcher for SessionCoordinator {
    async fn fetch(&self, id: &SessionId) -> Result<Session, SessionError> {
        self.fetch_session(id).await
    }
}
