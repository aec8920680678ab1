//! Adapters - Implementations of port interfaces.
//!
//! - `store` - session record stores (in-memory, Redis)
//! - `events` - change notifiers (in-process broadcast, Redis pub/sub)
//! - `http` - REST API, bot filter, HTTP poll client
//! - `websocket` - live push endpoint, presence, and the watcher-side client
//! - `bot` - user-agent bot detection
//! - `nickname` - random nickname generation

pub mod bot;
pub mod events;
pub mod http;
pub mod nickname;
pub mod store;
pub mod websocket;

pub use bot::UserAgentBotDetector;
pub use events::{BroadcastNotifier, RedisChangeNotifier};
pub use http::{api_router, HttpSessionFetcher};
pub use nickname::RandomNicknameGenerator;
pub use store::{InMemorySessionStore, RedisSessionStore};
pub use websocket::WebSocketChangeNotifier;
