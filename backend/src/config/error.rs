//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid bind address: {0}")]
    InvalidBindAddress(String),

    #[error("Invalid request timeout")]
    InvalidTimeout,

    #[error("Invalid Redis URL format")]
    InvalidRedisUrl,

    #[error("Redis key prefix must not be empty")]
    EmptyKeyPrefix,

    #[error("Session TTL must be at least one hour")]
    InvalidSessionTtl,

    #[error("Read retry attempts must be at least 1")]
    InvalidRetryAttempts,

    #[error("Poll interval must be greater than zero")]
    InvalidPollInterval,

    #[error("Invalid propagation server URL")]
    InvalidServerUrl,
}
