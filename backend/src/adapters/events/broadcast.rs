//! In-process change notifier built on per-session broadcast rooms.
//!
//! ```text
//! Room: Xy3...   Room: Q9a...
//! ├── sub-a      ├── sub-d
//! └── sub-b      └── sub-e
//! ```
//!
//! A publish reaches only the room of its session. Rooms are created on the
//! first subscribe and dropped when their last subscriber goes away.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::domain::foundation::SessionId;
use crate::domain::session::Session;
use crate::ports::{
    ChangeNotifier, NotifyError, Subscription, SubscriptionEvent, SubscriptionSink,
    SubscriptionStatus,
};

/// Default buffer per room. Slower subscribers lag beyond this.
const DEFAULT_ROOM_CAPACITY: usize = 128;

struct Rooms {
    rooms: RwLock<HashMap<SessionId, broadcast::Sender<Session>>>,
    capacity: usize,
}

impl Rooms {
    async fn join(&self, session_id: &SessionId) -> broadcast::Receiver<Session> {
        let mut rooms = self.rooms.write().await;
        rooms
            .entry(session_id.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    async fn leave(&self, session_id: &SessionId) {
        let mut rooms = self.rooms.write().await;
        if let Some(sender) = rooms.get(session_id) {
            if sender.receiver_count() == 0 {
                rooms.remove(session_id);
                debug!(session_id = %session_id, "Room closed");
            }
        }
    }
}

/// Change notifier for a single server process.
#[derive(Clone)]
pub struct BroadcastNotifier {
    rooms: Arc<Rooms>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        Self {
            rooms: Arc::new(Rooms {
                rooms: RwLock::new(HashMap::new()),
                capacity,
            }),
        }
    }

    /// Number of sessions with at least one subscriber.
    pub async fn room_count(&self) -> usize {
        self.rooms.rooms.read().await.len()
    }

    pub async fn subscriber_count(&self, session_id: &SessionId) -> usize {
        self.rooms
            .rooms
            .read()
            .await
            .get(session_id)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(DEFAULT_ROOM_CAPACITY)
    }
}

#[async_trait]
impl ChangeNotifier for BroadcastNotifier {
    async fn publish(&self, session: &Session) -> Result<(), NotifyError> {
        let rooms = self.rooms.rooms.read().await;
        if let Some(sender) = rooms.get(session.id()) {
            // No receivers is fine.
            let _ = sender.send(session.clone());
        }
        Ok(())
    }

    async fn subscribe(&self, session_id: &SessionId) -> Result<Subscription, NotifyError> {
        let receiver = self.rooms.join(session_id).await;
        let (sink, subscription) = Subscription::channel(session_id.clone());

        let rooms = Arc::clone(&self.rooms);
        let session_id = session_id.clone();
        tokio::spawn(async move {
            forward(receiver, sink).await;
            rooms.leave(&session_id).await;
        });

        Ok(subscription)
    }
}

async fn forward(mut receiver: broadcast::Receiver<Session>, mut sink: SubscriptionSink) {
    if !sink
        .send(SubscriptionEvent::Status(SubscriptionStatus::Subscribed))
        .await
    {
        return;
    }

    loop {
        tokio::select! {
            _ = sink.cancelled() => return,
            received = receiver.recv() => {
                let event = match received {
                    Ok(session) => SubscriptionEvent::Snapshot(session),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Subscriber lagged behind room");
                        SubscriptionEvent::Status(SubscriptionStatus::ChannelError(format!(
                            "lagged by {} messages",
                            skipped
                        )))
                    }
                    Err(RecvError::Closed) => {
                        sink.send(SubscriptionEvent::Status(SubscriptionStatus::Closed)).await;
                        return;
                    }
                };
                if !sink.send(event).await {
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{ParticipantId, Timestamp};
    use crate::domain::session::{Nickname, DEFAULT_SESSION_TTL};
    use std::time::Duration;

    fn test_session() -> Session {
        Session::create(
            SessionId::generate(),
            ParticipantId::generate(),
            Nickname::parse("Host").unwrap(),
            Timestamp::now(),
            DEFAULT_SESSION_TTL,
        )
    }

    async fn expect_subscribed(subscription: &mut Subscription) {
        assert_eq!(
            subscription.next().await,
            Some(SubscriptionEvent::Status(SubscriptionStatus::Subscribed))
        );
    }

    #[tokio::test]
    async fn subscriber_receives_published_snapshots_in_order() {
        let notifier = BroadcastNotifier::default();
        let first = test_session();
        let mut subscription = notifier.subscribe(first.id()).await.unwrap();
        expect_subscribed(&mut subscription).await;

        notifier.publish(&first).await.unwrap();
        let second = crate::domain::session::apply(
            &first,
            crate::domain::session::Operation::Reset {
                participant_id: first.creator_id().clone(),
            },
            Timestamp::now(),
        )
        .unwrap()
        .session;
        notifier.publish(&second).await.unwrap();

        assert_eq!(subscription.next().await, Some(SubscriptionEvent::Snapshot(first)));
        assert_eq!(subscription.next().await, Some(SubscriptionEvent::Snapshot(second)));
    }

    #[tokio::test]
    async fn publish_only_reaches_its_own_room() {
        let notifier = BroadcastNotifier::default();
        let watched = test_session();
        let other = test_session();
        let mut subscription = notifier.subscribe(watched.id()).await.unwrap();
        expect_subscribed(&mut subscription).await;

        notifier.publish(&other).await.unwrap();
        notifier.publish(&watched).await.unwrap();

        assert_eq!(subscription.next().await, Some(SubscriptionEvent::Snapshot(watched)));
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_ok() {
        let notifier = BroadcastNotifier::default();
        assert!(notifier.publish(&test_session()).await.is_ok());
        assert_eq!(notifier.room_count().await, 0);
    }

    #[tokio::test]
    async fn room_is_dropped_after_last_unsubscribe() {
        let notifier = BroadcastNotifier::default();
        let session = test_session();
        let mut a = notifier.subscribe(session.id()).await.unwrap();
        let mut b = notifier.subscribe(session.id()).await.unwrap();
        expect_subscribed(&mut a).await;
        expect_subscribed(&mut b).await;
        assert_eq!(notifier.subscriber_count(session.id()).await, 2);

        a.unsubscribe();
        a.unsubscribe();
        drop(b);

        for _ in 0..50 {
            if notifier.room_count().await == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(notifier.room_count().await, 0);
    }

    #[tokio::test]
    async fn lagging_subscriber_gets_channel_error() {
        let notifier = BroadcastNotifier::new(1);
        let session = test_session();
        let mut subscription = notifier.subscribe(session.id()).await.unwrap();
        expect_subscribed(&mut subscription).await;

        // Let the forwarder park on the room before flooding it.
        tokio::task::yield_now().await;
        for _ in 0..4 {
            notifier.publish(&session).await.unwrap();
        }

        let mut saw_error = false;
        for _ in 0..4 {
            match subscription.next().await {
                Some(SubscriptionEvent::Status(SubscriptionStatus::ChannelError(_))) => {
                    saw_error = true;
                    break;
                }
                Some(_) => continue,
                None => break,
            }
        }
        assert!(saw_error);
    }
}
