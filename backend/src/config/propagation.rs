//! Propagation manager timings and the poll source used by `watch`

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;
use crate::application::PropagationConfig;

/// Propagation settings
#[derive(Debug, Clone, Deserialize)]
pub struct PropagationSettings {
    /// Seconds to wait for the first push before polling
    #[serde(default = "default_grace_window")]
    pub grace_window_secs: u64,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Seconds before a failed subscription is reopened
    #[serde(default = "default_resubscribe_backoff")]
    pub resubscribe_backoff_secs: u64,

    /// Base URL of the server a `watch` client polls
    #[serde(default = "default_server_url")]
    pub server_url: String,
}

impl PropagationSettings {
    pub fn propagation_config(&self) -> PropagationConfig {
        PropagationConfig {
            grace_window: Duration::from_secs(self.grace_window_secs),
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            resubscribe_backoff: Duration::from_secs(self.resubscribe_backoff_secs),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.poll_interval_secs == 0 {
            return Err(ValidationError::InvalidPollInterval);
        }
        if !self.server_url.starts_with("http://") && !self.server_url.starts_with("https://") {
            return Err(ValidationError::InvalidServerUrl);
        }
        Ok(())
    }
}

impl Default for PropagationSettings {
    fn default() -> Self {
        Self {
            grace_window_secs: default_grace_window(),
            poll_interval_secs: default_poll_interval(),
            resubscribe_backoff_secs: default_resubscribe_backoff(),
            server_url: default_server_url(),
        }
    }
}

fn default_grace_window() -> u64 {
    10
}

fn default_poll_interval() -> u64 {
    2
}

fn default_resubscribe_backoff() -> u64 {
    3
}

fn default_server_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_convert_to_manager_defaults() {
        assert_eq!(
            PropagationSettings::default().propagation_config(),
            PropagationConfig::default()
        );
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let settings = PropagationSettings {
            poll_interval_secs: 0,
            ..Default::default()
        };
        assert_eq!(settings.validate(), Err(ValidationError::InvalidPollInterval));
    }

    #[test]
    fn server_url_must_be_http() {
        let settings = PropagationSettings {
            server_url: "ftp://example.com".to_string(),
            ..Default::default()
        };
        assert_eq!(settings.validate(), Err(ValidationError::InvalidServerUrl));
    }
}
