//! Session lifetime and read retry settings

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;
use crate::application::CoordinatorConfig;

/// Session configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Hours a session lives after creation
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: u64,

    /// Total attempts for a store read, including the first
    #[serde(default = "default_read_retry_attempts")]
    pub read_retry_attempts: u32,

    /// Base backoff between read attempts in milliseconds
    #[serde(default = "default_read_retry_backoff_ms")]
    pub read_retry_backoff_ms: u64,
}

impl SessionConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_hours * 60 * 60)
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            session_ttl: self.ttl(),
            read_retry_attempts: self.read_retry_attempts,
            read_retry_backoff: Duration::from_millis(self.read_retry_backoff_ms),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.ttl_hours == 0 {
            return Err(ValidationError::InvalidSessionTtl);
        }
        if self.read_retry_attempts == 0 {
            return Err(ValidationError::InvalidRetryAttempts);
        }
        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_hours: default_ttl_hours(),
            read_retry_attempts: default_read_retry_attempts(),
            read_retry_backoff_ms: default_read_retry_backoff_ms(),
        }
    }
}

fn default_ttl_hours() -> u64 {
    24
}

fn default_read_retry_attempts() -> u32 {
    3
}

fn default_read_retry_backoff_ms() -> u64 {
    50
}
