//! Bot detector port.

/// Decides whether a request comes from an automated client.
pub trait BotDetector: Send + Sync {
    /// `user_agent` is `None` when the header is missing.
    fn is_bot(&self, user_agent: Option<&str>) -> bool;
}
