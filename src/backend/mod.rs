//! Backing store abstraction.
//!
//! [`CacheBackend`] is the narrow capability surface the cache consumes from
//! a key-value store. Implementations report failures as
//! [`Error`](crate::error::Error); the
//! [`Cache`](crate::Cache) decides how to degrade.
//!
//! Connection-level failures must be reported as `Error::ConnectionError` so
//! the availability monitor can react; everything else is a command failure.

#[cfg(feature = "inmemory")]
pub mod inmemory;

#[cfg(feature = "redis")]
pub mod redis;

#[cfg(feature = "inmemory")]
pub use inmemory::InMemoryBackend;

#[cfg(feature = "redis")]
pub use self::redis::RedisBackend;

use crate::error::Result;
use std::future::Future;
use std::time::Duration;

/// Capabilities a backing store must provide.
///
/// Values are opaque text produced by [`crate::serialization`]. Set operations
/// (`add_members`, `members`) back the tag index.
pub trait CacheBackend: Send + Sync + Clone + 'static {
    /// Fetch a value. `Ok(None)` on miss.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>>> + Send;

    /// Store a value that expires after `ttl`.
    fn set(&self, key: &str, value: &str, ttl: Duration)
        -> impl Future<Output = Result<()>> + Send;

    /// Delete keys in one call. Returns how many existed.
    fn delete(&self, keys: &[String]) -> impl Future<Output = Result<u64>> + Send;

    fn exists(&self, key: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Set or refresh the expiry of an existing key. `Ok(false)` if absent.
    fn expire(&self, key: &str, ttl: Duration) -> impl Future<Output = Result<bool>> + Send;

    /// Keys matching a glob-style pattern (`*`, `?`, `[...]`).
    fn keys(&self, pattern: &str) -> impl Future<Output = Result<Vec<String>>> + Send;

    /// Add members to the set stored at `set_key`. Returns how many were new.
    fn add_members(
        &self,
        set_key: &str,
        members: &[String],
    ) -> impl Future<Output = Result<u64>> + Send;

    /// Members of the set stored at `set_key`; empty when absent.
    fn members(&self, set_key: &str) -> impl Future<Output = Result<Vec<String>>> + Send;

    /// Remove every key in the store's namespace.
    fn flush(&self) -> impl Future<Output = Result<()>> + Send;

    /// Connection handshake used by the availability monitor.
    fn health_check(&self) -> impl Future<Output = Result<bool>> + Send;

    /// Register `key` in every tag set of `tag_keys` and set each set's expiry.
    ///
    /// The default issues one `add_members` and one `expire` per tag and is
    /// not atomic. Stores with transactional batches should override it.
    fn register_tags(
        &self,
        key: &str,
        tag_keys: &[String],
        ttl: Duration,
    ) -> impl Future<Output = Result<()>> + Send {
        async move {
            let member = [key.to_string()];
            for tag_key in tag_keys {
                self.add_members(tag_key, &member).await?;
                self.expire(tag_key, ttl).await?;
            }
            Ok(())
        }
    }

    /// Name of the backend, for logs.
    fn provider_name(&self) -> &'static str;
}
