//! Bot detector adapters.

mod user_agent;

pub use user_agent::UserAgentBotDetector;
