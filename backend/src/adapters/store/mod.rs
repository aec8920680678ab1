//! Session store adapters.
//!
//! - `InMemorySessionStore` - single-process store for tests and local runs
//! - `RedisSessionStore` - shared store for multi-instance deployments

mod in_memory;
mod redis;

pub use self::redis::RedisSessionStore;
pub use in_memory::InMemorySessionStore;
