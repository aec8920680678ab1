//! Redis pub/sub change notifier.
//!
//! Each session publishes committed snapshots as JSON on its own channel,
//! `<prefix>:session:<id>:changes`. Subscriptions use a dedicated pub/sub
//! connection per subscriber; publishing shares one multiplexed connection.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tracing::{debug, warn};

use crate::config::RedisConfig;
use crate::domain::foundation::SessionId;
use crate::domain::session::Session;
use crate::ports::{
    ChangeNotifier, NotifyError, Subscription, SubscriptionEvent, SubscriptionSink,
    SubscriptionStatus,
};

/// Change notifier shared across server instances through Redis.
#[derive(Clone)]
pub struct RedisChangeNotifier {
    client: redis::Client,
    publisher: MultiplexedConnection,
    key_prefix: String,
    subscribe_timeout: Duration,
}

impl RedisChangeNotifier {
    pub async fn connect(config: &RedisConfig) -> Result<Self, NotifyError> {
        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| NotifyError::Unavailable(e.to_string()))?;
        let publisher = tokio::time::timeout(
            config.timeout(),
            client.get_multiplexed_tokio_connection(),
        )
        .await
        .map_err(|_| NotifyError::Unavailable("timed out connecting to redis".to_string()))?
        .map_err(|e| NotifyError::Unavailable(e.to_string()))?;

        Ok(Self {
            client,
            publisher,
            key_prefix: config.key_prefix.clone(),
            subscribe_timeout: config.timeout(),
        })
    }

    fn channel(&self, session_id: &SessionId) -> String {
        changes_channel(&self.key_prefix, session_id)
    }
}

fn changes_channel(prefix: &str, session_id: &SessionId) -> String {
    format!("{}:session:{}:changes", prefix, session_id)
}

#[async_trait]
impl ChangeNotifier for RedisChangeNotifier {
    async fn publish(&self, session: &Session) -> Result<(), NotifyError> {
        let payload =
            serde_json::to_string(session).map_err(|e| NotifyError::Encoding(e.to_string()))?;
        let mut conn = self.publisher.clone();
        let receivers: i64 = conn
            .publish(self.channel(session.id()), payload)
            .await
            .map_err(|e| NotifyError::Unavailable(e.to_string()))?;
        debug!(session_id = %session.id(), receivers, "Published session snapshot");
        Ok(())
    }

    async fn subscribe(&self, session_id: &SessionId) -> Result<Subscription, NotifyError> {
        let (sink, subscription) = Subscription::channel(session_id.clone());
        let client = self.client.clone();
        let channel = self.channel(session_id);
        let timeout = self.subscribe_timeout;

        tokio::spawn(async move {
            listen(client, channel, timeout, sink).await;
        });

        Ok(subscription)
    }
}

async fn listen(client: redis::Client, channel: String, timeout: Duration, mut sink: SubscriptionSink) {
    let connect = async {
        let mut pubsub = client.get_async_connection().await?.into_pubsub();
        pubsub.subscribe(&channel).await?;
        Ok::<_, redis::RedisError>(pubsub)
    };

    let pubsub = tokio::select! {
        _ = sink.cancelled() => return,
        connected = tokio::time::timeout(timeout, connect) => match connected {
            Ok(Ok(pubsub)) => pubsub,
            Ok(Err(e)) => {
                warn!(channel = %channel, error = %e, "Redis subscribe failed");
                sink.send(SubscriptionEvent::Status(SubscriptionStatus::ChannelError(
                    e.to_string(),
                )))
                .await;
                return;
            }
            Err(_) => {
                warn!(channel = %channel, "Redis subscribe timed out");
                sink.send(SubscriptionEvent::Status(SubscriptionStatus::TimedOut)).await;
                return;
            }
        },
    };

    if !sink
        .send(SubscriptionEvent::Status(SubscriptionStatus::Subscribed))
        .await
    {
        return;
    }

    let mut messages = pubsub.into_on_message();
    loop {
        tokio::select! {
            _ = sink.cancelled() => return,
            message = messages.next() => {
                let Some(message) = message else {
                    sink.send(SubscriptionEvent::Status(SubscriptionStatus::Closed)).await;
                    return;
                };
                let event = match decode_snapshot(message.get_payload_bytes()) {
                    Ok(session) => SubscriptionEvent::Snapshot(session),
                    Err(reason) => {
                        warn!(channel = %channel, error = %reason, "Dropping undecodable snapshot");
                        SubscriptionEvent::Status(SubscriptionStatus::ChannelError(reason))
                    }
                };
                if !sink.send(event).await {
                    return;
                }
            }
        }
    }
}

fn decode_snapshot(payload: &[u8]) -> Result<Session, String> {
    serde_json::from_slice(payload).map_err(|e| format!("invalid snapshot payload: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{ParticipantId, Timestamp};
    use crate::domain::session::{Nickname, DEFAULT_SESSION_TTL};

    #[test]
    fn channel_name_is_namespaced_per_session() {
        let id = SessionId::new("abcDEF123_-x").unwrap();
        assert_eq!(
            changes_channel("poker", &id),
            "poker:session:abcDEF123_-x:changes"
        );
    }

    #[test]
    fn published_payload_decodes_back_to_session() {
        let session = Session::create(
            SessionId::generate(),
            ParticipantId::generate(),
            Nickname::parse("Host").unwrap(),
            Timestamp::now(),
            DEFAULT_SESSION_TTL,
        );
        let payload = serde_json::to_vec(&session).unwrap();

        assert_eq!(decode_snapshot(&payload).unwrap(), session);
    }

    #[test]
    fn malformed_payload_is_reported() {
        let err = decode_snapshot(b"{\"id\":42}").unwrap_err();
        assert!(err.starts_with("invalid snapshot payload"));
    }
}
