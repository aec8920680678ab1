//! Change notifier adapters.
//!
//! - `BroadcastNotifier` - in-process rooms, one broadcast channel per session
//! - `RedisChangeNotifier` - Redis pub/sub, for several server instances

mod broadcast;
mod redis;

pub use self::redis::RedisChangeNotifier;
pub use broadcast::BroadcastNotifier;
