//! Error types for push-relay.

use thiserror::Error;

/// Relay error type.
///
/// Covers startup and per-consumer failures. Per-delivery failures are
/// [`crate::delivery::DeliveryError`] and never leave their task.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file is not valid TOML or has mistyped keys
    #[error("Configuration parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Redis connection or operation error
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// The shared HTTP client could not be built
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Bus did not answer the startup ping
    #[error("Message bus unreachable: {0}")]
    BusUnreachable(String),

    /// Subscribing to a topic failed
    #[error("Failed to subscribe to topic '{topic}': {reason}")]
    Subscribe { topic: String, reason: String },

    /// Admission gate stopped handing out slots
    #[error("Admission gate closed for topic '{0}'")]
    GateClosed(String),

    /// Admission gate capacity must be positive
    #[error("Invalid concurrency {0}: must be greater than zero")]
    InvalidCapacity(i64),
}

/// Result type for relay operations.
pub type RelayResult<T> = Result<T, RelayError>;
