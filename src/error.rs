//! Error types for cache operations.
//!
//! These errors never cross the public [`Cache`](crate::Cache) surface: every
//! operation recovers them locally and returns a safe default. They are
//! visible to backend implementors, to metrics hooks, and to code calling a
//! [`CacheBackend`](crate::CacheBackend) directly.

use thiserror::Error;

/// Errors that can occur inside the caching layer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    /// The backing store is not configured, or the layer is `Failed`/`Disabled`.
    #[error("Cache unavailable: {0}")]
    Unavailable(String),

    /// A value could not be encoded for storage.
    #[error("Cache serialization error: {0}")]
    SerializationError(String),

    /// A stored payload could not be decoded into the requested type.
    #[error("Cache deserialization error: {0}")]
    DeserializationError(String),

    /// A command failed while the store was believed reachable.
    #[error("Cache backend error: {0}")]
    BackendError(String),

    /// The connection to the store was refused, dropped, or could not be acquired.
    #[error("Cache connection error: {0}")]
    ConnectionError(String),

    /// A store call exceeded the configured command timeout.
    #[error("Cache operation timed out: {0}")]
    Timeout(String),

    /// Invalid configuration.
    #[error("Cache configuration error: {0}")]
    ConfigError(String),

    /// The caller passed an argument the layer cannot use (e.g. an empty key).
    #[error("Cache validation error: {0}")]
    ValidationError(String),
}

impl Error {
    /// Whether this error means the connection itself is gone.
    ///
    /// Only these errors move the availability monitor to `Failed`; command
    /// errors and timeouts are recovered per operation.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::ConnectionError(_))
    }
}

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, Error>;
