//! Builders for caches and for individual writes.

use crate::availability::AvailabilityMonitor;
use crate::backend::CacheBackend;
use crate::cache::Cache;
use crate::config::{CacheConfig, ReconnectPolicy, DEFAULT_COMMAND_TIMEOUT};
use crate::observability::{CacheMetrics, NoOpMetrics, TtlPolicy};
use std::time::Duration;

#[cfg(feature = "redis")]
use crate::backend::RedisBackend;

/// Options for a single `set` or `wrap`.
///
/// # Example
///
/// ```
/// use resilient_cache::SetOptions;
/// use std::time::Duration;
///
/// let options = SetOptions::new()
///     .with_ttl(Duration::from_secs(300))
///     .with_tag("stories")
///     .with_tag("story:7");
/// assert_eq!(options.tags.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// `None` defers to the cache's TTL policy (one hour by default).
    pub ttl: Option<Duration>,
    pub tags: Vec<String>,
}

impl SetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the TTL for this write.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Register the key under one more tag.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Register the key under several tags.
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }
}

/// Fluent builder for a [`Cache`].
///
/// # Example
///
/// ```ignore
/// use resilient_cache::{CacheBuilder, backend::InMemoryBackend, observability::StatsMetrics};
/// use std::time::Duration;
///
/// let stats = StatsMetrics::new();
/// let cache = CacheBuilder::new()
///     .with_metrics(stats.clone())
///     .with_command_timeout(Duration::from_millis(500))
///     .connect(InMemoryBackend::new())
///     .await;
/// assert!(cache.is_enabled());
/// ```
pub struct CacheBuilder {
    metrics: Box<dyn CacheMetrics>,
    ttl_policy: TtlPolicy,
    command_timeout: Duration,
    reconnect: ReconnectPolicy,
}

impl Default for CacheBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheBuilder {
    pub fn new() -> Self {
        CacheBuilder {
            metrics: Box::new(NoOpMetrics),
            ttl_policy: TtlPolicy::default(),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            reconnect: ReconnectPolicy::Never,
        }
    }

    /// Builder carrying the timeout and reconnect settings of `config`.
    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new()
            .with_command_timeout(config.command_timeout)
            .with_reconnect(config.reconnect)
    }

    /// Set custom metrics handler.
    pub fn with_metrics(mut self, metrics: impl CacheMetrics + 'static) -> Self {
        self.metrics = Box::new(metrics);
        self
    }

    /// Set custom TTL policy.
    pub fn with_ttl_policy(mut self, policy: TtlPolicy) -> Self {
        self.ttl_policy = policy;
        self
    }

    /// Bound every backing-store call.
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// A cache with no backing store. Every operation returns its safe default.
    pub fn disabled<B: CacheBackend>(self) -> Cache<B> {
        self.assemble(None, AvailabilityMonitor::disabled())
    }

    /// Attach `backend` and run the connection handshake.
    ///
    /// Never fails: a failed handshake yields a cache in the `Failed` state,
    /// which behaves like a disabled one.
    pub async fn connect<B: CacheBackend>(self, backend: B) -> Cache<B> {
        let cache = self.assemble(Some(backend), AvailabilityMonitor::connecting());
        cache.handshake().await;
        cache
    }

    /// Build a Redis-backed cache from configuration.
    ///
    /// No URL configured → `Disabled`. An unusable URL or a failed handshake
    /// → `Failed`.
    #[cfg(feature = "redis")]
    pub async fn connect_redis(self, config: &CacheConfig) -> Cache<RedisBackend> {
        if !config.is_enabled() {
            return self.disabled();
        }

        match RedisBackend::from_config(config) {
            Ok(backend) => self.connect(backend).await,
            Err(e) => {
                let cache = self.assemble(None, AvailabilityMonitor::connecting());
                cache.connection_lost(&e.to_string());
                cache
            }
        }
    }

    fn assemble<B: CacheBackend>(
        self,
        backend: Option<B>,
        monitor: AvailabilityMonitor,
    ) -> Cache<B> {
        Cache::from_parts(
            backend,
            monitor,
            self.metrics,
            self.ttl_policy,
            self.command_timeout,
            self.reconnect,
        )
    }
}
