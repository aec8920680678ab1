//! Propagation manager - keeps a local view of one session fresh.
//!
//! Push is the primary source. When push stays silent past the grace window
//! after subscribing, or the subscription reports any failure, the manager
//! polls the fetcher on a fixed interval until the next push arrives. Failed
//! subscriptions are torn down and reopened after a backoff; push is never
//! given up on.
//!
//! Both sources feed the same reconciliation step: snapshots older than the
//! cached view are dropped, identical ones are ignored, anything else
//! replaces the view and wakes watchers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::PropagationMode;
use crate::domain::foundation::{SessionId, StateMachine, Timestamp};
use crate::domain::session::{Session, SessionError};
use crate::ports::{
    ChangeNotifier, SessionFetcher, Subscription, SubscriptionCanceller, SubscriptionEvent,
    SubscriptionStatus,
};

/// Timing knobs for propagation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropagationConfig {
    /// How long to wait for the first push after subscribing.
    pub grace_window: Duration,
    pub poll_interval: Duration,
    /// Delay before reopening a failed subscription.
    pub resubscribe_backoff: Duration,
}

impl Default for PropagationConfig {
    fn default() -> Self {
        Self {
            grace_window: Duration::from_secs(10),
            poll_interval: Duration::from_secs(2),
            resubscribe_backoff: Duration::from_secs(3),
        }
    }
}

/// Observable state of an attached manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PropagationStatus {
    pub mode: PropagationMode,
    /// True while updates come from polling rather than push.
    pub degraded: bool,
    pub last_push_at: Option<Timestamp>,
    pub last_poll_at: Option<Timestamp>,
    pub last_error: Option<String>,
}

impl PropagationStatus {
    fn subscribing() -> Self {
        Self {
            mode: PropagationMode::Subscribing,
            degraded: false,
            last_push_at: None,
            last_poll_at: None,
            last_error: None,
        }
    }
}

/// State shared between a handle and its driver task.
struct Shared {
    session_id: SessionId,
    view: watch::Sender<Session>,
    status: watch::Sender<PropagationStatus>,
    canceller: Mutex<Option<SubscriptionCanceller>>,
    detached: AtomicBool,
}

impl Shared {
    fn is_detached(&self) -> bool {
        self.detached.load(Ordering::SeqCst)
    }

    fn set_canceller(&self, canceller: Option<SubscriptionCanceller>) {
        *self.canceller.lock().unwrap_or_else(PoisonError::into_inner) = canceller;
    }

    fn take_canceller(&self) -> Option<SubscriptionCanceller> {
        self.canceller
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Applies a snapshot only if its revision is newer than the cached
    /// view's. Returns true if watchers were notified.
    fn reconcile(&self, incoming: Session) -> bool {
        if self.is_detached() {
            return false;
        }
        self.view.send_if_modified(|current| {
            if incoming.revision() <= current.revision() {
                return false;
            }
            *current = incoming;
            true
        })
    }
}

/// Attaches propagation to sessions.
pub struct PropagationManager {
    fetcher: Arc<dyn SessionFetcher>,
    notifier: Arc<dyn ChangeNotifier>,
    config: PropagationConfig,
}

impl PropagationManager {
    pub fn new(
        fetcher: Arc<dyn SessionFetcher>,
        notifier: Arc<dyn ChangeNotifier>,
        config: PropagationConfig,
    ) -> Self {
        Self {
            fetcher,
            notifier,
            config,
        }
    }

    /// Fetches the session once, subscribes, and starts keeping the view
    /// fresh in the background.
    ///
    /// # Errors
    ///
    /// Only the initial fetch can fail; later problems show up in
    /// [`PropagationHandle::status`].
    pub async fn attach(&self, session_id: SessionId) -> Result<PropagationHandle, SessionError> {
        let initial = self.fetcher.fetch(&session_id).await?;

        let (view, _) = watch::channel(initial);
        let (status, _) = watch::channel(PropagationStatus::subscribing());
        let shared = Arc::new(Shared {
            session_id: session_id.clone(),
            view,
            status,
            canceller: Mutex::new(None),
            detached: AtomicBool::new(false),
        });

        let driver = Driver {
            shared: Arc::clone(&shared),
            fetcher: Arc::clone(&self.fetcher),
            notifier: Arc::clone(&self.notifier),
            config: self.config,
            mode: PropagationMode::Subscribing,
            subscription: None,
            grace_deadline: None,
            resubscribe_at: None,
            poll_ticker: None,
        };
        let task = tokio::spawn(driver.run());

        info!(session_id = %session_id, "Propagation attached");
        Ok(PropagationHandle { shared, task })
    }
}

/// Owner's handle to an attached session view. Dropping it detaches.
pub struct PropagationHandle {
    shared: Arc<Shared>,
    task: JoinHandle<()>,
}

impl PropagationHandle {
    pub fn session_id(&self) -> &SessionId {
        &self.shared.session_id
    }

    /// Latest reconciled snapshot.
    pub fn session(&self) -> Session {
        self.shared.view.borrow().clone()
    }

    /// Receiver that wakes whenever the view changes.
    pub fn watch(&self) -> watch::Receiver<Session> {
        self.shared.view.subscribe()
    }

    pub fn status(&self) -> PropagationStatus {
        self.shared.status.borrow().clone()
    }

    /// Stops polling and push delivery before returning. Safe to call
    /// repeatedly.
    pub fn detach(&self) {
        if self.shared.detached.swap(true, Ordering::SeqCst) {
            return;
        }
        self.task.abort();
        if let Some(canceller) = self.shared.take_canceller() {
            canceller.cancel();
        }
        self.shared.status.send_modify(|status| {
            status.mode = PropagationMode::Detached;
            status.degraded = false;
        });
        info!(session_id = %self.shared.session_id, "Propagation detached");
    }
}

impl Drop for PropagationHandle {
    fn drop(&mut self) {
        self.detach();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Driver task
// ─────────────────────────────────────────────────────────────────────────────

struct Driver {
    shared: Arc<Shared>,
    fetcher: Arc<dyn SessionFetcher>,
    notifier: Arc<dyn ChangeNotifier>,
    config: PropagationConfig,
    mode: PropagationMode,
    subscription: Option<Subscription>,
    grace_deadline: Option<Instant>,
    resubscribe_at: Option<Instant>,
    poll_ticker: Option<Interval>,
}

impl Driver {
    async fn run(mut self) {
        self.subscribe().await;

        while !self.shared.is_detached() {
            let grace = self.grace_deadline;
            let resubscribe = self.resubscribe_at;

            tokio::select! {
                event = next_event(&mut self.subscription) => {
                    self.on_event(event);
                }
                _ = sleep_until(grace), if grace.is_some() => {
                    self.on_grace_elapsed();
                }
                _ = tick(&mut self.poll_ticker), if self.poll_ticker.is_some() => {
                    self.poll().await;
                }
                _ = sleep_until(resubscribe), if resubscribe.is_some() => {
                    self.resubscribe_at = None;
                    self.subscribe().await;
                }
            }
        }
    }

    async fn subscribe(&mut self) {
        if let Some(old) = self.subscription.take() {
            old.unsubscribe();
        }

        match self.notifier.subscribe(&self.shared.session_id).await {
            Ok(subscription) => {
                self.shared.set_canceller(Some(subscription.canceller()));
                if self.shared.is_detached() {
                    subscription.unsubscribe();
                    return;
                }
                self.subscription = Some(subscription);
                if self.mode == PropagationMode::Subscribing {
                    self.grace_deadline = Some(Instant::now() + self.config.grace_window);
                }
                debug!(session_id = %self.shared.session_id, mode = %self.mode, "Subscription opened");
            }
            Err(e) => self.on_failure(e.to_string()),
        }
    }

    fn on_event(&mut self, event: Option<SubscriptionEvent>) {
        match event {
            Some(SubscriptionEvent::Snapshot(session)) => self.on_push(session),
            Some(SubscriptionEvent::Status(status)) if status.is_failure() => {
                self.on_failure(describe(&status))
            }
            Some(SubscriptionEvent::Status(_)) => {
                debug!(session_id = %self.shared.session_id, "Push channel live");
            }
            None => {
                self.subscription = None;
                self.on_failure("subscription ended".to_string());
            }
        }
    }

    fn on_push(&mut self, session: Session) {
        self.shared.status.send_modify(|status| {
            status.last_push_at = Some(Timestamp::now());
        });
        if self.shared.reconcile(session) {
            debug!(session_id = %self.shared.session_id, "Applied pushed snapshot");
        }

        if self.mode != PropagationMode::PushActive {
            self.grace_deadline = None;
            self.poll_ticker = None;
            self.set_mode(PropagationMode::PushActive);
        }
    }

    fn on_failure(&mut self, reason: String) {
        warn!(
            session_id = %self.shared.session_id,
            mode = %self.mode,
            error = %reason,
            "Push delivery failed, falling back to polling"
        );
        self.shared.status.send_modify(|status| {
            status.last_error = Some(reason);
        });

        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
        self.shared.set_canceller(None);
        self.grace_deadline = None;
        self.enter_polling();

        if self.resubscribe_at.is_none() {
            self.resubscribe_at = Some(Instant::now() + self.config.resubscribe_backoff);
        }
    }

    fn on_grace_elapsed(&mut self) {
        self.grace_deadline = None;
        if self.mode == PropagationMode::Subscribing {
            warn!(
                session_id = %self.shared.session_id,
                grace_secs = self.config.grace_window.as_secs(),
                "No push received within grace window, polling"
            );
            self.enter_polling();
        }
    }

    fn enter_polling(&mut self) {
        if self.mode == PropagationMode::PollingFallback {
            return;
        }
        let period = self.config.poll_interval;
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.poll_ticker = Some(ticker);
        self.set_mode(PropagationMode::PollingFallback);
    }

    async fn poll(&mut self) {
        match self.fetcher.fetch(&self.shared.session_id).await {
            Ok(session) => {
                self.shared.status.send_modify(|status| {
                    status.last_poll_at = Some(Timestamp::now());
                });
                if self.shared.reconcile(session) {
                    debug!(session_id = %self.shared.session_id, "Applied polled snapshot");
                }
            }
            Err(e) => {
                warn!(session_id = %self.shared.session_id, error = %e, "Poll failed");
                self.shared.status.send_modify(|status| {
                    status.last_error = Some(e.to_string());
                });
            }
        }
    }

    fn set_mode(&mut self, target: PropagationMode) {
        if self.shared.is_detached() {
            return;
        }
        match self.mode.transition_to(target) {
            Ok(mode) => {
                info!(
                    session_id = %self.shared.session_id,
                    from = %self.mode,
                    to = %mode,
                    "Propagation mode changed"
                );
                self.mode = mode;
                self.shared.status.send_modify(|status| {
                    status.mode = mode;
                    status.degraded = mode.is_degraded();
                });
            }
            Err(e) => warn!(session_id = %self.shared.session_id, error = %e, "Ignored mode change"),
        }
    }
}

fn describe(status: &SubscriptionStatus) -> String {
    match status {
        SubscriptionStatus::Subscribed => "subscribed".to_string(),
        SubscriptionStatus::ChannelError(reason) => format!("channel error: {}", reason),
        SubscriptionStatus::TimedOut => "subscription timed out".to_string(),
        SubscriptionStatus::Closed => "subscription closed".to_string(),
    }
}

async fn next_event(subscription: &mut Option<Subscription>) -> Option<SubscriptionEvent> {
    match subscription {
        Some(subscription) => subscription.next().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}
