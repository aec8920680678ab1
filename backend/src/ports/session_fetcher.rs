//! Session fetcher port - the poll source used by propagation.

use crate::domain::foundation::SessionId;
use crate::domain::session::{Session, SessionError};
use async_trait::async_trait;

/// Reads the current snapshot of a session.
///
/// Implemented in-process by the coordinator and over HTTP for remote
/// clients. Errors use the same taxonomy as the coordinator.
#[async_trait]
pub trait SessionFetcher: Send + Sync {
    async fn fetch(&self, id: &SessionId) -> Result<Session, SessionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_fetcher_is_object_safe() {
        fn _accepts_dyn(_fetcher: &dyn SessionFetcher) {}
    }
}
