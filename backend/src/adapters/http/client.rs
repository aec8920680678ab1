//! HTTP poll source for propagation clients running outside the server.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use crate::domain::foundation::SessionId;
use crate::domain::session::{Session, SessionError};
use crate::ports::SessionFetcher;

use super::session::ErrorResponse;

/// Fetches sessions through `GET /api/session/:id`.
#[derive(Debug, Clone)]
pub struct HttpSessionFetcher {
    base_url: String,
    client: Client,
}

impl HttpSessionFetcher {
    /// `base_url` is the server root, e.g. `http://127.0.0.1:8080`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, SessionError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("planning-poker/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SessionError::store_unavailable(format!("http client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn session_url(&self, id: &SessionId) -> String {
        format!("{}/api/session/{}", self.base_url, id)
    }
}

#[async_trait]
impl SessionFetcher for HttpSessionFetcher {
    async fn fetch(&self, id: &SessionId) -> Result<Session, SessionError> {
        let response = self
            .client
            .get(self.session_url(id))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SessionError::store_unavailable("poll request timed out")
                } else {
                    SessionError::store_unavailable(format!("poll request failed: {}", e))
                }
            })?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<Session>()
                .await
                .map_err(|e| SessionError::store_unavailable(format!("invalid session body: {}", e)));
        }

        let body = response.json::<ErrorResponse>().await.ok();
        Err(error_from_status(status, id, body))
    }
}

/// Maps a failed response back onto the session error taxonomy.
fn error_from_status(status: StatusCode, id: &SessionId, body: Option<ErrorResponse>) -> SessionError {
    let code = body.as_ref().map(|b| b.code.as_str());
    let message = body
        .as_ref()
        .map(|b| b.message.clone())
        .unwrap_or_else(|| status.to_string());

    match status {
        StatusCode::NOT_FOUND => SessionError::NotFound(id.clone()),
        StatusCode::GONE => SessionError::Expired,
        StatusCode::FORBIDDEN => match code {
            Some("NOT_AUTHORIZED") => SessionError::NotAuthorized,
            Some("PARTICIPANT_NOT_FOUND") => SessionError::ParticipantNotFound,
            _ => SessionError::Forbidden,
        },
        StatusCode::BAD_REQUEST => match code {
            Some("ALREADY_REVEALED") => SessionError::AlreadyRevealed,
            Some("INVALID_VOTE") => SessionError::InvalidVote(message),
            _ => SessionError::InvalidInput(message),
        },
        _ => SessionError::store_unavailable(format!("server answered {}: {}", status, message)),
    }
}
