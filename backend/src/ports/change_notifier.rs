//! Change notifier port - best-effort push of committed session snapshots.
//!
//! Publishing and subscribing are keyed by session id. Delivery may be
//! delayed or dropped, but a single subscription never sees events out of
//! commit order.
//!
//! A subscription is an explicit object: a lazy sequence of
//! [`SubscriptionEvent`]s with a synchronous, idempotent `unsubscribe`.
//! Subscribing again yields a fresh sequence.

use crate::domain::foundation::SessionId;
use crate::domain::session::Session;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, watch};

/// Buffered events per subscription before the producer waits.
pub const SUBSCRIPTION_BUFFER: usize = 64;

/// Errors from notifier implementations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotifyError {
    #[error("notifier unavailable: {0}")]
    Unavailable(String),

    #[error("failed to encode snapshot: {0}")]
    Encoding(String),
}

/// Health of a subscription's underlying channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionStatus {
    /// The channel is live; snapshots will follow.
    Subscribed,
    /// The channel reported an error (lag, decode failure, transport error).
    ChannelError(String),
    /// The channel could not be established in time.
    TimedOut,
    /// The channel ended.
    Closed,
}

impl SubscriptionStatus {
    /// True for every status that means push delivery is not working.
    pub fn is_failure(&self) -> bool {
        !matches!(self, SubscriptionStatus::Subscribed)
    }
}

/// One item yielded by a subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionEvent {
    Snapshot(Session),
    Status(SubscriptionStatus),
}

/// Consumer side of a subscription.
#[derive(Debug)]
pub struct Subscription {
    session_id: SessionId,
    events: mpsc::Receiver<SubscriptionEvent>,
    cancel: SubscriptionCanceller,
}

/// Detachable handle that stops a subscription from elsewhere.
#[derive(Debug, Clone)]
pub struct SubscriptionCanceller(Arc<watch::Sender<bool>>);

impl SubscriptionCanceller {
    /// Stops delivery. Takes effect immediately and may be called any number
    /// of times.
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }
}

/// Producer side of a subscription, held by the notifier's forwarding task.
#[derive(Debug, Clone)]
pub struct SubscriptionSink {
    events: mpsc::Sender<SubscriptionEvent>,
    cancelled: watch::Receiver<bool>,
}

impl Subscription {
    /// Creates a connected subscription / sink pair.
    pub fn channel(session_id: SessionId) -> (SubscriptionSink, Subscription) {
        let (events_tx, events_rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        (
            SubscriptionSink {
                events: events_tx,
                cancelled: cancel_rx,
            },
            Subscription {
                session_id,
                events: events_rx,
                cancel: SubscriptionCanceller(Arc::new(cancel_tx)),
            },
        )
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Waits for the next event.
    ///
    /// Returns `None` once unsubscribed or when the producer is gone.
    pub async fn next(&mut self) -> Option<SubscriptionEvent> {
        if !self.is_active() {
            return None;
        }
        self.events.recv().await
    }

    /// Stops delivery. Takes effect immediately and may be called any number
    /// of times.
    pub fn unsubscribe(&self) {
        self.cancel.cancel();
    }

    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Returns a handle that can unsubscribe without owning the subscription.
    pub fn canceller(&self) -> SubscriptionCanceller {
        self.cancel.clone()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl SubscriptionSink {
    /// Sends an event. Returns false if the consumer has gone away.
    pub async fn send(&self, event: SubscriptionEvent) -> bool {
        if self.is_cancelled() {
            return false;
        }
        self.events.send(event).await.is_ok()
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.borrow() || self.events.is_closed()
    }

    /// Resolves once the consumer unsubscribes or drops the subscription.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.cancelled.borrow_and_update() {
                return;
            }
            if self.cancelled.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Port for pushing committed snapshots to subscribers.
#[async_trait]
pub trait ChangeNotifier: Send + Sync {
    /// Broadcast a committed snapshot to every subscriber of its session.
    async fn publish(&self, session: &Session) -> Result<(), NotifyError>;

    /// Open a subscription for one session.
    ///
    /// The subscription reports `Subscribed` once live; later channel
    /// problems arrive as status events rather than errors.
    async fn subscribe(&self, session_id: &SessionId) -> Result<Subscription, NotifyError>;
}
