//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! ## Session Ports
//!
//! - `SessionStore` - Keyed record store with atomic patch merge
//! - `ChangeNotifier` - Best-effort push of committed snapshots
//! - `SessionFetcher` - Poll source for propagation
//!
//! ## Request Ports
//!
//! - `BotDetector` - Rejects automated clients
//! - `NicknameGenerator` - Default display names

mod bot_detector;
mod change_notifier;
mod nickname_generator;
mod session_fetcher;
mod session_store;

pub use bot_detector::BotDetector;
pub use change_notifier::{
    ChangeNotifier, NotifyError, Subscription, SubscriptionCanceller, SubscriptionEvent,
    SubscriptionSink, SubscriptionStatus, SUBSCRIPTION_BUFFER,
};
pub use nickname_generator::NicknameGenerator;
pub use session_fetcher::SessionFetcher;
pub use session_store::{SessionStore, StoreError};
