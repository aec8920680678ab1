//! Application configuration module
//!
//! Configuration is loaded from environment variables with the
//! `PLANNING_POKER` prefix; nested values use a double underscore.
//!
//! # Example
//!
//! ```no_run
//! use planning_poker::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//! ```

mod error;
mod propagation;
mod redis;
mod server;
mod session;
mod store;

pub use self::redis::RedisConfig;
pub use error::{ConfigError, ValidationError};
pub use propagation::PropagationSettings;
pub use server::{Environment, ServerConfig};
pub use session::SessionConfig;
pub use store::{StoreBackend, StoreConfig};

use serde::Deserialize;

/// Root application configuration
///
/// Every section has defaults, so an empty environment yields a runnable
/// single-instance server on the memory backend.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub store: StoreConfig,

    /// Only read when `store.backend = redis`
    #[serde(default)]
    pub redis: RedisConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub propagation: PropagationSettings,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// Loads `.env` if present, then reads `PLANNING_POKER__*` variables:
    ///
    /// - `PLANNING_POKER__SERVER__PORT=8080` -> `server.port = 8080`
    /// - `PLANNING_POKER__STORE__BACKEND=redis` -> `store.backend = redis`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if values cannot be parsed into expected types.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("PLANNING_POKER")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// Redis settings are checked only when the Redis backend is selected.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        if self.store.requires_redis() {
            self.redis.validate()?;
        }
        self.session.validate()?;
        self.propagation.validate()?;
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}
