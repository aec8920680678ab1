//! Redis-backed session store for multi-instance deployments.
//!
//! Each session is one hash at `<prefix>:session:<id>`:
//!
//! | Field                | Value                                                     |
//! |----------------------|-----------------------------------------------------------|
//! | `meta`               | JSON: id, created_at, expires_at, creator_id, revealed, current_round, revision |
//! | `history`            | JSON array of vote records                                |
//! | `participant:<id>`   | JSON participant                                          |
//!
//! Keeping each participant in its own field is what makes concurrent votes
//! merge: a patch rewrites only the fields of its group. Patches run inside a
//! Lua script so the existence check, the admission guard, the write and the
//! read-back are one atomic step. A refused guard comes back as a `CONFLICT`
//! error reply. Keys expire at the session's `expires_at`.

use std::collections::HashMap;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Script};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::RedisConfig;
use crate::domain::foundation::{ParticipantId, SessionId, Timestamp};
use crate::domain::session::{Participant, Session, SessionPatch, SessionRecord, VoteRecord};
use crate::ports::{SessionStore, StoreError};

const META_FIELD: &str = "meta";
const HISTORY_FIELD: &str = "history";
const PARTICIPANT_PREFIX: &str = "participant:";

/// ARGV[1] = expireat, then field/value pairs.
const INSERT_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
  return 0
end
for i = 2, #ARGV, 2 do
  redis.call('HSET', KEYS[1], ARGV[i], ARGV[i + 1])
end
redis.call('EXPIREAT', KEYS[1], ARGV[1])
return 1
"#;

/// ARGV[1] selects the field group:
/// - `participant`, field, json
/// - `vote`, field, json, round
/// - `round`, base_revision, revealed (1/0), current_round, history json
/// - `reset`, current_round
///
/// Returns HGETALL of the committed record, or an empty list if missing.
const APPLY_SCRIPT: &str = r#"
if redis.call('HEXISTS', KEYS[1], 'meta') == 0 then
  return {}
end
local op = ARGV[1]
local meta = cjson.decode(redis.call('HGET', KEYS[1], 'meta'))
local revision = tonumber(meta.revision) or 0
if op == 'participant' then
  redis.call('HSET', KEYS[1], ARGV[2], ARGV[3])
elseif op == 'vote' then
  if meta.revealed or meta.current_round ~= tonumber(ARGV[4]) then
    return redis.error_reply('CONFLICT vote for a closed round')
  end
  redis.call('HSET', KEYS[1], ARGV[2], ARGV[3])
elseif op == 'round' then
  if revision ~= tonumber(ARGV[2]) then
    return redis.error_reply('CONFLICT revision moved on')
  end
  meta.revealed = ARGV[3] == '1'
  meta.current_round = tonumber(ARGV[4])
  redis.call('HSET', KEYS[1], 'history', ARGV[5])
elseif op == 'reset' then
  if meta.current_round + 1 ~= tonumber(ARGV[2]) then
    return redis.error_reply('CONFLICT round moved on')
  end
  meta.revealed = false
  meta.current_round = tonumber(ARGV[2])
  for _, field in ipairs(redis.call('HKEYS', KEYS[1])) do
    if string.sub(field, 1, 12) == 'participant:' then
      local participant = cjson.decode(redis.call('HGET', KEYS[1], field))
      participant.vote = cjson.null
      redis.call('HSET', KEYS[1], field, cjson.encode(participant))
    end
  end
end
meta.revision = revision + 1
redis.call('HSET', KEYS[1], 'meta', cjson.encode(meta))
return redis.call('HGETALL', KEYS[1])
"#;

/// Error code the apply script uses for a refused guard.
const CONFLICT_CODE: &str = "CONFLICT";

/// Scalar fields of a session, stored together under `meta`.
#[derive(Debug, Serialize, Deserialize)]
struct SessionMeta {
    id: SessionId,
    created_at: Timestamp,
    expires_at: Timestamp,
    creator_id: ParticipantId,
    revealed: bool,
    current_round: u32,
    #[serde(default)]
    revision: u64,
}

/// Session store backed by Redis hashes.
#[derive(Clone)]
pub struct RedisSessionStore {
    conn: MultiplexedConnection,
    key_prefix: String,
    insert_script: Script,
    apply_script: Script,
}

impl RedisSessionStore {
    /// Wraps an existing connection.
    pub fn new(conn: MultiplexedConnection, key_prefix: impl Into<String>) -> Self {
        Self {
            conn,
            key_prefix: key_prefix.into(),
            insert_script: Script::new(INSERT_SCRIPT),
            apply_script: Script::new(APPLY_SCRIPT),
        }
    }

    /// Opens a connection using the configured URL and timeout.
    pub async fn connect(config: &RedisConfig) -> Result<Self, StoreError> {
        let client = redis::Client::open(config.url.as_str())
            .map_err(|e: redis::RedisError| StoreError::unavailable(e.to_string()))?;
        let conn = tokio::time::timeout(config.timeout(), client.get_multiplexed_tokio_connection())
            .await
            .map_err(|_| StoreError::unavailable("timed out connecting to redis"))?
            .map_err(|e: redis::RedisError| StoreError::unavailable(e.to_string()))?;
        Ok(Self::new(conn, config.key_prefix.clone()))
    }

    fn key(&self, id: &SessionId) -> String {
        session_key(&self.key_prefix, id)
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn get(&self, id: &SessionId) -> Result<Session, StoreError> {
        let mut conn = self.conn.clone();
        let fields: HashMap<String, String> = conn
            .hgetall(self.key(id))
            .await
            .map_err(|e: redis::RedisError| StoreError::unavailable(e.to_string()))?;
        if fields.is_empty() {
            return Err(StoreError::NotFound(id.clone()));
        }
        decode_session(fields)
    }

    async fn insert(&self, session: &Session) -> Result<(), StoreError> {
        let key = self.key(session.id());
        let fields = encode_session(session)?;

        let mut invocation = self.insert_script.prepare_invoke();
        invocation
            .key(&key)
            .arg(session.expires_at().as_unix_secs());
        for (field, value) in &fields {
            invocation.arg(field).arg(value);
        }

        let mut conn = self.conn.clone();
        let inserted: i32 = invocation
            .invoke_async(&mut conn)
            .await
            .map_err(|e: redis::RedisError| StoreError::unavailable(e.to_string()))?;
        if inserted == 0 {
            return Err(StoreError::AlreadyExists(session.id().clone()));
        }

        debug!(session_id = %session.id(), key = %key, "Session stored");
        Ok(())
    }

    async fn apply(&self, id: &SessionId, patch: &SessionPatch) -> Result<Session, StoreError> {
        let mut invocation = self.apply_script.prepare_invoke();
        invocation.key(self.key(id));
        for arg in patch_args(patch)? {
            invocation.arg(arg);
        }

        let mut conn = self.conn.clone();
        let fields: HashMap<String, String> = invocation
            .invoke_async(&mut conn)
            .await
            .map_err(|e: redis::RedisError| {
                if e.code() == Some(CONFLICT_CODE) {
                    debug!(session_id = %id, patch = patch.kind(), "Patch refused");
                    StoreError::Conflict(id.clone())
                } else {
                    StoreError::unavailable(e.to_string())
                }
            })?;
        if fields.is_empty() {
            return Err(StoreError::NotFound(id.clone()));
        }

        debug!(session_id = %id, patch = patch.kind(), "Session patched");
        decode_session(fields)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Encoding
// ─────────────────────────────────────────────────────────────────────────────

fn session_key(prefix: &str, id: &SessionId) -> String {
    format!("{}:session:{}", prefix, id)
}

fn participant_field(id: &ParticipantId) -> String {
    format!("{}{}", PARTICIPANT_PREFIX, id)
}

fn to_json<T: Serialize>(value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|e| StoreError::corrupt(e.to_string()))
}

fn encode_session(session: &Session) -> Result<Vec<(String, String)>, StoreError> {
    let meta = SessionMeta {
        id: session.id().clone(),
        created_at: session.created_at(),
        expires_at: session.expires_at(),
        creator_id: session.creator_id().clone(),
        revealed: session.is_revealed(),
        current_round: session.current_round(),
        revision: session.revision(),
    };

    let mut fields = vec![
        (META_FIELD.to_string(), to_json(&meta)?),
        (HISTORY_FIELD.to_string(), to_json(&session.vote_history())?),
    ];
    for participant in session.participants().values() {
        fields.push((participant_field(&participant.id), to_json(participant)?));
    }
    Ok(fields)
}

fn decode_session(fields: HashMap<String, String>) -> Result<Session, StoreError> {
    let mut meta: Option<SessionMeta> = None;
    let mut vote_history: Vec<VoteRecord> = Vec::new();
    let mut participants = HashMap::new();

    for (field, value) in fields {
        if field == META_FIELD {
            meta = Some(
                serde_json::from_str(&value)
                    .map_err(|e| StoreError::corrupt(format!("meta: {}", e)))?,
            );
        } else if field == HISTORY_FIELD {
            vote_history = serde_json::from_str(&value)
                .map_err(|e| StoreError::corrupt(format!("history: {}", e)))?;
        } else if field.starts_with(PARTICIPANT_PREFIX) {
            let participant: Participant = serde_json::from_str(&value)
                .map_err(|e| StoreError::corrupt(format!("{}: {}", field, e)))?;
            participants.insert(participant.id.clone(), participant);
        }
    }

    let meta = meta.ok_or_else(|| StoreError::corrupt("meta field missing"))?;
    Session::try_from(SessionRecord {
        id: meta.id,
        created_at: meta.created_at,
        expires_at: meta.expires_at,
        creator_id: meta.creator_id,
        participants,
        revealed: meta.revealed,
        current_round: meta.current_round,
        vote_history,
        revision: meta.revision,
    })
    .map_err(|e| StoreError::corrupt(e.to_string()))
}

fn patch_args(patch: &SessionPatch) -> Result<Vec<String>, StoreError> {
    Ok(match patch {
        SessionPatch::UpsertParticipant(participant) => vec![
            "participant".to_string(),
            participant_field(&participant.id),
            to_json(participant)?,
        ],
        SessionPatch::CastVote { participant, round } => vec![
            "vote".to_string(),
            participant_field(&participant.id),
            to_json(participant)?,
            round.to_string(),
        ],
        SessionPatch::RoundState {
            base_revision,
            revealed,
            current_round,
            vote_history,
        } => vec![
            "round".to_string(),
            base_revision.to_string(),
            if *revealed { "1" } else { "0" }.to_string(),
            current_round.to_string(),
            to_json(vote_history)?,
        ],
        SessionPatch::ResetRound { current_round } => {
            vec!["reset".to_string(), current_round.to_string()]
        }
    })
}
