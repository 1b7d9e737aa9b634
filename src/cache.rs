//! Cache core - the fail-open facade over a backing store.

use crate::availability::{AvailabilityMonitor, AvailabilityState};
use crate::backend::CacheBackend;
use crate::builder::{CacheBuilder, SetOptions};
use crate::config::ReconnectPolicy;
use crate::error::{Error, Result};
use crate::observability::{CacheMetrics, TtlPolicy};
use crate::serialization;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

#[cfg(feature = "redis")]
use crate::backend::RedisBackend;
#[cfg(feature = "redis")]
use crate::config::CacheConfig;

/// Fail-open cache over a [`CacheBackend`].
///
/// No operation returns an error. When the store is unavailable, or a call
/// fails or times out, the operation logs a warning and returns its safe
/// default (`None`, `false`, `0`, empty list). The only error that reaches
/// callers is a producer's own error from [`Cache::wrap`].
///
/// Cloning is cheap; clones share the backend, availability state and
/// single-flight table.
///
/// # Example
///
/// ```ignore
/// use resilient_cache::{Cache, SetOptions, backend::InMemoryBackend};
///
/// let cache = Cache::connect(InMemoryBackend::new()).await;
/// cache.set("story:1", &story, SetOptions::new().with_tag("stories")).await;
/// let story: Option<Story> = cache.get("story:1").await;
/// cache.invalidate_tag("stories").await;
/// ```
pub struct Cache<B: CacheBackend> {
    pub(crate) inner: Arc<CacheInner<B>>,
}

pub(crate) struct CacheInner<B: CacheBackend> {
    pub(crate) backend: Option<B>,
    pub(crate) monitor: AvailabilityMonitor,
    pub(crate) metrics: Box<dyn CacheMetrics>,
    pub(crate) ttl_policy: TtlPolicy,
    pub(crate) command_timeout: Duration,
    pub(crate) reconnect: ReconnectPolicy,
    /// Per-key locks held by the producer currently filling that key.
    pub(crate) in_flight: DashMap<String, Arc<Mutex<()>>>,
}

impl<B: CacheBackend> Clone for Cache<B> {
    fn clone(&self) -> Self {
        Cache {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: CacheBackend> std::fmt::Debug for Cache<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field(
                "backend",
                &self.inner.backend.as_ref().map(|b| b.provider_name()),
            )
            .field("state", &self.state())
            .field("command_timeout", &self.inner.command_timeout)
            .finish()
    }
}

impl<B: CacheBackend> Cache<B> {
    /// Attach `backend` with default settings and run the handshake.
    pub async fn connect(backend: B) -> Self {
        CacheBuilder::new().connect(backend).await
    }

    /// A cache with no backing store.
    pub fn disabled() -> Self {
        CacheBuilder::new().disabled()
    }

    pub(crate) fn from_parts(
        backend: Option<B>,
        monitor: AvailabilityMonitor,
        metrics: Box<dyn CacheMetrics>,
        ttl_policy: TtlPolicy,
        command_timeout: Duration,
        reconnect: ReconnectPolicy,
    ) -> Self {
        Cache {
            inner: Arc::new(CacheInner {
                backend,
                monitor,
                metrics,
                ttl_policy,
                command_timeout,
                reconnect,
                in_flight: DashMap::new(),
            }),
        }
    }

    /// Whether the backing store is ready for use.
    pub fn is_enabled(&self) -> bool {
        self.inner.monitor.is_available()
    }

    pub fn state(&self) -> AvailabilityState {
        self.inner.monitor.state()
    }

    /// Get backend reference (for advanced use), whatever the current state.
    pub fn backend(&self) -> Option<&B> {
        self.inner.backend.as_ref()
    }

    /// Fetch and decode a value. `None` on miss, decode failure or store error.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let backend = self.ready("GET", key)?;
        let timer = Instant::now();

        match self.call("GET", key, backend.get(key)).await.ok()? {
            Some(payload) => match serialization::decode(&payload) {
                Ok(value) => {
                    self.inner.metrics.record_hit(key, timer.elapsed());
                    debug!("✓ Cache hit for {} in {:?}", key, timer.elapsed());
                    Some(value)
                }
                Err(e) => {
                    warn!("⚠ Cache entry {} could not be decoded: {}", key, e);
                    self.inner.metrics.record_error(key, &e.to_string());
                    None
                }
            },
            None => {
                self.inner.metrics.record_miss(key, timer.elapsed());
                debug!("Cache miss for {}", key);
                None
            }
        }
    }

    /// Encode and store a value, then register it under `options.tags`.
    ///
    /// Returns whether the value was stored. A failed tag registration is
    /// logged and does not undo the write.
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        options: SetOptions,
    ) -> bool {
        let Some(backend) = self.ready("SET", key) else {
            return false;
        };

        let payload = match serialization::encode(value) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("⚠ Value for {} not cached: {}", key, e);
                self.inner.metrics.record_error(key, &e.to_string());
                return false;
            }
        };

        let ttl = options
            .ttl
            .unwrap_or_else(|| self.inner.ttl_policy.ttl_for(key));

        if self
            .call("SET", key, backend.set(key, &payload, ttl))
            .await
            .is_err()
        {
            return false;
        }
        self.inner.metrics.record_set(key);

        if !options.tags.is_empty() {
            self.register_tags(backend, key, &options.tags, ttl).await;
        }

        true
    }

    /// Delete one key. Returns whether it existed.
    pub async fn delete(&self, key: &str) -> bool {
        let Some(backend) = self.ready("DEL", key) else {
            return false;
        };

        self.call("DEL", key, backend.delete(&[key.to_string()]))
            .await
            .map(|removed| removed > 0)
            .unwrap_or(false)
    }

    /// Delete several keys in one store call. Returns how many existed.
    ///
    /// Empty keys are skipped.
    pub async fn delete_many<K: AsRef<str>>(&self, keys: &[K]) -> u64 {
        let Ok(backend) = self.available_backend() else {
            return 0;
        };

        let keys: Vec<String> = keys
            .iter()
            .map(|key| key.as_ref())
            .filter(|key| {
                let valid = validate_key(key).is_ok();
                if !valid {
                    warn!("⚠ Cache DEL skipped an empty key");
                }
                valid
            })
            .map(str::to_string)
            .collect();

        if keys.is_empty() {
            return 0;
        }

        let label = format!("{} keys", keys.len());
        self.call("DEL", &label, backend.delete(&keys))
            .await
            .unwrap_or(0)
    }

    pub async fn exists(&self, key: &str) -> bool {
        let Some(backend) = self.ready("EXISTS", key) else {
            return false;
        };

        self.call("EXISTS", key, backend.exists(key))
            .await
            .unwrap_or(false)
    }

    /// Refresh the TTL of an existing key. `false` if absent or on error.
    pub async fn expire(&self, key: &str, ttl: Duration) -> bool {
        let Some(backend) = self.ready("EXPIRE", key) else {
            return false;
        };

        self.call("EXPIRE", key, backend.expire(key, ttl))
            .await
            .unwrap_or(false)
    }

    /// Keys matching a glob pattern such as `story:*`.
    ///
    /// An error and an empty result look the same to the caller.
    pub async fn list_keys(&self, pattern: &str) -> Vec<String> {
        let Some(backend) = self.ready("KEYS", pattern) else {
            return Vec::new();
        };

        self.call("KEYS", pattern, backend.keys(pattern))
            .await
            .unwrap_or_default()
    }

    /// Remove keys matching `pattern`, or everything when `pattern` is `None`.
    ///
    /// A pattern matching nothing is a successful no-op.
    pub async fn clear(&self, pattern: Option<&str>) -> bool {
        let Some(pattern) = pattern else {
            let Ok(backend) = self.available_backend() else {
                return false;
            };
            let flushed = self.call("FLUSH", "*", backend.flush()).await.is_ok();
            if flushed {
                warn!("⚠ Cache cleared entirely");
            }
            return flushed;
        };

        let Some(backend) = self.ready("CLEAR", pattern) else {
            return false;
        };

        let keys = match self.call("KEYS", pattern, backend.keys(pattern)).await {
            Ok(keys) => keys,
            Err(_) => return false,
        };

        if keys.is_empty() {
            debug!("Cache clear: nothing matches {}", pattern);
            return true;
        }

        match self.call("DEL", pattern, backend.delete(&keys)).await {
            Ok(removed) => {
                info!("✓ Cache cleared {} keys matching {}", removed, pattern);
                true
            }
            Err(_) => false,
        }
    }

    /// The backend, if the store is `Ready`.
    pub(crate) fn available_backend(&self) -> Result<&B> {
        if !self.inner.monitor.is_available() {
            return Err(Error::Unavailable(self.state().to_string()));
        }
        self.inner
            .backend
            .as_ref()
            .ok_or_else(|| Error::Unavailable("no backend attached".to_string()))
    }

    /// The backend, if the store is `Ready` and `key` is usable.
    pub(crate) fn ready(&self, op: &str, key: &str) -> Option<&B> {
        let backend = self.available_backend().ok()?;
        if let Err(e) = validate_key(key) {
            warn!("⚠ Cache {} rejected: {}", op, e);
            self.inner.metrics.record_error(key, &e.to_string());
            return None;
        }
        Some(backend)
    }

    /// Run one store call under the command timeout, logging any failure.
    ///
    /// Connection errors move the cache to `Failed`.
    pub(crate) async fn call<T>(
        &self,
        op: &str,
        key: &str,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let timeout = self.inner.command_timeout;
        let result = match tokio::time::timeout(timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(format!(
                "{} {} exceeded {:?}",
                op, key, timeout
            ))),
        };

        if let Err(e) = &result {
            warn!("⚠ Cache {} failed for {}: {}", op, key, e);
            self.inner.metrics.record_error(key, &e.to_string());
            if e.is_connection_error() {
                self.connection_lost(&e.to_string());
            }
        }

        result
    }

    /// Connection handshake: `Connecting -> Ready | Failed`.
    pub(crate) async fn handshake(&self) {
        let Some(backend) = self.inner.backend.as_ref() else {
            self.connection_lost("no backend attached");
            return;
        };

        match probe(backend, self.inner.command_timeout).await {
            Ok(()) => {
                self.inner.monitor.mark_ready();
                info!("✓ Cache using {} backend", backend.provider_name());
            }
            Err(e) => self.connection_lost(&e.to_string()),
        }
    }

    pub(crate) fn connection_lost(&self, reason: &str) {
        if self.inner.monitor.mark_failed(reason) {
            self.spawn_reconnect();
        }
    }

    fn spawn_reconnect(&self) {
        let ReconnectPolicy::Backoff { initial, max } = self.inner.reconnect else {
            return;
        };
        let Some(backend) = self.inner.backend.clone() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("⚠ No async runtime, cache reconnect not scheduled");
            return;
        };

        let weak = Arc::downgrade(&self.inner);
        runtime.spawn(reconnect_loop(weak, backend, initial, max));
    }
}

#[cfg(feature = "redis")]
impl Cache<RedisBackend> {
    /// Build a Redis-backed cache from configuration.
    ///
    /// No URL configured → permanently `Disabled`, no connection attempt.
    pub async fn from_config(config: &CacheConfig) -> Self {
        CacheBuilder::from_config(config).connect_redis(config).await
    }
}

/// Retry the handshake with exponential backoff until the store is back or
/// the cache is dropped.
async fn reconnect_loop<B: CacheBackend>(
    weak: Weak<CacheInner<B>>,
    backend: B,
    initial: Duration,
    max: Duration,
) {
    let mut delay = initial;

    loop {
        tokio::time::sleep(delay).await;

        let Some(inner) = weak.upgrade() else {
            return;
        };
        if !inner.monitor.begin_reconnect() {
            return;
        }

        match probe(&backend, inner.command_timeout).await {
            Ok(()) => {
                inner.monitor.mark_ready();
                return;
            }
            Err(e) => {
                inner.monitor.mark_failed(&e.to_string());
                delay = (delay * 2).min(max);
                debug!("Cache reconnect failed, next attempt in {:?}", delay);
            }
        }
    }
}

async fn probe<B: CacheBackend>(backend: &B, timeout: Duration) -> Result<()> {
    match tokio::time::timeout(timeout, backend.health_check()).await {
        Ok(Ok(true)) => Ok(()),
        Ok(Ok(false)) => Err(Error::ConnectionError(
            "health check returned an unexpected reply".to_string(),
        )),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(Error::ConnectionError(format!(
            "handshake exceeded {:?}",
            timeout
        ))),
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::ValidationError("cache key must not be empty".to_string()));
    }
    Ok(())
}
