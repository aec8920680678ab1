//! Record store selection

use serde::Deserialize;
use std::time::Duration;

/// Which record store and change notifier pair the server runs with.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process-local map plus in-process broadcast rooms.
    #[default]
    Memory,
    /// Redis hashes plus Redis pub/sub.
    Redis,
}

/// Store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// How often the memory backend drops expired sessions, in seconds
    #[serde(default = "default_purge_interval")]
    pub purge_interval_secs: u64,
}

impl StoreConfig {
    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval_secs.max(1))
    }

    pub fn requires_redis(&self) -> bool {
        self.backend == StoreBackend::Redis
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            purge_interval_secs: default_purge_interval(),
        }
    }
}

fn default_purge_interval() -> u64 {
    60
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_memory() {
        let config = StoreConfig::default();
        assert_eq!(config.backend, StoreBackend::Memory);
        assert!(!config.requires_redis());
    }

    #[test]
    fn zero_purge_interval_is_clamped() {
        let config = StoreConfig {
            purge_interval_secs: 0,
            ..Default::default()
        };
        assert_eq!(config.purge_interval(), Duration::from_secs(1));
    }
}
