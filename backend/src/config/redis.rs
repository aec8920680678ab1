//! Redis configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Redis connection settings, shared by the record store and the pub/sub
/// notifier.
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL
    #[serde(default)]
    pub url: String,

    /// Connect and subscribe timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Namespace for every key and channel
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

impl RedisConfig {
    /// Get timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Validate Redis configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.url.is_empty() {
            return Err(ValidationError::MissingRequired("REDIS__URL"));
        }
        if !self.url.starts_with("redis://") && !self.url.starts_with("rediss://") {
            return Err(ValidationError::InvalidRedisUrl);
        }
        if self.key_prefix.trim().is_empty() {
            return Err(ValidationError::EmptyKeyPrefix);
        }
        Ok(())
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            timeout_secs: default_timeout(),
            key_prefix: default_key_prefix(),
        }
    }
}

fn default_timeout() -> u64 {
    5
}

fn default_key_prefix() -> String {
    "poker".to_string()
}
