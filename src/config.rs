//! Cache configuration.
//!
//! A single setting matters for baseline operation: the backing-store
//! address. Its absence puts the cache in the permanent `Disabled` state.

use std::env;
use std::time::Duration;

/// Default time-to-live for cached values.
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Extra lifetime given to tag membership sets over the values they index.
pub const TAG_GRACE_PERIOD: Duration = Duration::from_secs(300);

/// Upper bound on any single backing-store call.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(2);

/// Default Redis connection pool size.
/// Override with the `REDIS_POOL_SIZE` environment variable.
pub const DEFAULT_POOL_SIZE: usize = 16;

/// What to do after the store connection fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconnectPolicy {
    /// Stay `Failed` until the process restarts.
    #[default]
    Never,
    /// Retry the handshake in the background, doubling the delay up to `max`.
    Backoff { initial: Duration, max: Duration },
}

impl ReconnectPolicy {
    /// Backoff starting at 1s, capped at 60s.
    pub fn backoff() -> Self {
        ReconnectPolicy::Backoff {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(60),
        }
    }
}

/// Configuration for a [`Cache`](crate::Cache) backed by Redis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// e.g. `redis://localhost:6379/0`; `None` disables caching.
    pub redis_url: Option<String>,
    pub command_timeout: Duration,
    pub pool_size: usize,
    pub reconnect: ReconnectPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            redis_url: None,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            pool_size: DEFAULT_POOL_SIZE,
            reconnect: ReconnectPolicy::Never,
        }
    }
}

impl CacheConfig {
    /// Configuration pointing at a store address, other settings defaulted.
    pub fn with_url(url: impl Into<String>) -> Self {
        CacheConfig {
            redis_url: Some(url.into()),
            ..Default::default()
        }
    }

    /// Load configuration from environment variables.
    ///
    /// # Environment Variables
    /// - `REDIS_URL` - store address; unset or empty disables caching
    /// - `CACHE_COMMAND_TIMEOUT_MS` - per-call timeout (default: 2000)
    /// - `REDIS_POOL_SIZE` - connection pool size (default: 16)
    pub fn from_env() -> Self {
        Self {
            redis_url: env::var("REDIS_URL")
                .ok()
                .map(|url| url.trim().to_string())
                .filter(|url| !url.is_empty()),
            command_timeout: env::var("CACHE_COMMAND_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_COMMAND_TIMEOUT),
            pool_size: env::var("REDIS_POOL_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_POOL_SIZE),
            reconnect: ReconnectPolicy::Never,
        }
    }

    /// Whether a store address is configured.
    pub fn is_enabled(&self) -> bool {
        self.redis_url.is_some()
    }
}
