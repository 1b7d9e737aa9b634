//! Read-through memoization.
//!
//! `wrap` returns the cached value when present and otherwise runs the
//! caller's producer, caches its result and returns it. The producer's error
//! is the only error the caching layer lets through, unchanged and uncached.
//!
//! Concurrent misses on one key within a cache instance are single-flighted:
//! the first caller runs its producer while the others wait, then re-read the
//! cache and only produce themselves if the value is still missing.

use crate::backend::CacheBackend;
use crate::builder::SetOptions;
use crate::cache::Cache;
use crate::strategy::CacheStrategy;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;

impl<B: CacheBackend> Cache<B> {
    /// Cache-or-compute.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let story: Story = cache
    ///     .wrap("story:7", SetOptions::new().with_tag("stories"), || async {
    ///         repository.find_story(7).await
    ///     })
    ///     .await?;
    /// ```
    ///
    /// # Errors
    ///
    /// Returns the producer's error when it was invoked and failed. Cache
    /// failures never surface here: with the store down, the producer simply
    /// runs every time.
    pub async fn wrap<T, E, F, Fut>(
        &self,
        key: &str,
        options: SetOptions,
        producer: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.wrap_with(key, options, CacheStrategy::Refresh, producer)
            .await
    }

    /// [`wrap`](Cache::wrap) with an explicit strategy.
    pub async fn wrap_with<T, E, F, Fut>(
        &self,
        key: &str,
        options: SetOptions,
        strategy: CacheStrategy,
        producer: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.is_enabled() {
            return producer().await;
        }

        debug!("» Memoized read for {} (strategy: {})", key, strategy);

        match strategy {
            CacheStrategy::Refresh => self.refresh(key, options, producer).await,
            CacheStrategy::Invalidate => {
                self.delete(key).await;
                self.produce_and_store(key, options, producer).await
            }
            CacheStrategy::Bypass => self.produce_and_store(key, options, producer).await,
        }
    }

    async fn refresh<T, E, F, Fut>(
        &self,
        key: &str,
        options: SetOptions,
        producer: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(hit) = self.get::<T>(key).await {
            return Ok(hit);
        }

        let flight = Flight::join(&self.inner.in_flight, key);
        let (_lock, waited) = match flight.lock.try_lock() {
            Ok(guard) => (guard, false),
            Err(_) => {
                debug!("Waiting for in-flight producer of {}", key);
                (flight.lock.lock().await, true)
            }
        };

        // The leader may have filled the key while we waited.
        let filled = if waited { self.get::<T>(key).await } else { None };
        match filled {
            Some(hit) => Ok(hit),
            None => self.produce_and_store(key, options, producer).await,
        }
    }

    async fn produce_and_store<T, E, F, Fut>(
        &self,
        key: &str,
        options: SetOptions,
        producer: F,
    ) -> Result<T, E>
    where
        T: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let value = producer().await?;
        if !self.set(key, &value, options).await {
            debug!("Produced value for {} was not cached", key);
        }
        Ok(value)
    }
}

/// One caller's share of the per-key lock in the single-flight table.
///
/// Dropping it, whether the call finished or was cancelled, removes the
/// table entry once no other caller holds it.
struct Flight<'a> {
    table: &'a DashMap<String, Arc<Mutex<()>>>,
    key: &'a str,
    lock: Arc<Mutex<()>>,
}

impl<'a> Flight<'a> {
    fn join(table: &'a DashMap<String, Arc<Mutex<()>>>, key: &'a str) -> Self {
        let lock = Arc::clone(table.entry(key.to_string()).or_default().value());
        Flight { table, key, lock }
    }
}

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        // The table's copy plus ours.
        self.table.remove_if(self.key, |_, entry| {
            Arc::ptr_eq(entry, &self.lock) && Arc::strong_count(entry) <= 2
        });
    }
}

#[cfg(test)]
mod tests {
    use crate::backend::InMemoryBackend;
    use crate::builder::SetOptions;
    use crate::cache::Cache;
    use crate::strategy::CacheStrategy;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Debug, PartialEq)]
    struct LookupFailed(&'static str);

    #[tokio::test]
    async fn test_hit_skips_producer() {
        let cache = Cache::connect(InMemoryBackend::new()).await;
        cache.set("story:1", &"cached", SetOptions::new()).await;

        let calls = AtomicUsize::new(0);
        let value: Result<String, LookupFailed> = cache
            .wrap("story:1", SetOptions::new(), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok("fresh".to_string())
            })
            .await;

        assert_eq!(value, Ok("cached".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_miss_produces_once_and_caches() {
        let cache = Cache::connect(InMemoryBackend::new()).await;
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value: Result<u32, LookupFailed> = cache
                .wrap("count", SetOptions::new(), || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(42)
                })
                .await;
            assert_eq!(value, Ok(42));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.get::<u32>("count").await, Some(42));
    }

    #[tokio::test]
    async fn test_producer_error_propagates_uncached() {
        let cache = Cache::connect(InMemoryBackend::new()).await;

        let value: Result<u32, LookupFailed> = cache
            .wrap("story:9", SetOptions::new(), || async {
                Err(LookupFailed("database down"))
            })
            .await;

        assert_eq!(value, Err(LookupFailed("database down")));
        assert!(!cache.exists("story:9").await);
    }

    #[tokio::test]
    async fn test_wrap_registers_tags() {
        let cache = Cache::connect(InMemoryBackend::new()).await;
        let options = SetOptions::new()
            .with_ttl(Duration::from_secs(30))
            .with_tag("stories");

        let _: Result<u32, LookupFailed> = cache.wrap("story:1", options, || async { Ok(1) }).await;
        assert_eq!(cache.tag_members("stories").await, vec!["story:1"]);
    }

    #[tokio::test]
    async fn test_disabled_always_produces() {
        let cache: Cache<InMemoryBackend> = Cache::disabled();
        let calls = AtomicUsize::new(0);

        for _ in 0..2 {
            let value: Result<u32, LookupFailed> = cache
                .wrap("k", SetOptions::new(), || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(7)
                })
                .await;
            assert_eq!(value, Ok(7));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalidate_strategy_replaces_value() {
        let cache = Cache::connect(InMemoryBackend::new()).await;
        cache.set("k", &"stale", SetOptions::new()).await;

        let value: Result<String, LookupFailed> = cache
            .wrap_with("k", SetOptions::new(), CacheStrategy::Invalidate, || async {
                Ok("fresh".to_string())
            })
            .await;

        assert_eq!(value, Ok("fresh".to_string()));
        assert_eq!(cache.get::<String>("k").await, Some("fresh".to_string()));
    }

    #[tokio::test]
    async fn test_invalidate_strategy_failure_leaves_key_absent() {
        let cache = Cache::connect(InMemoryBackend::new()).await;
        cache.set("k", &"stale", SetOptions::new()).await;

        let value: Result<String, LookupFailed> = cache
            .wrap_with("k", SetOptions::new(), CacheStrategy::Invalidate, || async {
                Err(LookupFailed("gone"))
            })
            .await;

        assert!(value.is_err());
        assert!(!cache.exists("k").await);
    }

    #[tokio::test]
    async fn test_bypass_strategy_ignores_cached_value() {
        let cache = Cache::connect(InMemoryBackend::new()).await;
        cache.set("k", &1, SetOptions::new()).await;

        let value: Result<u32, LookupFailed> = cache
            .wrap_with("k", SetOptions::new(), CacheStrategy::Bypass, || async { Ok(2) })
            .await;

        assert_eq!(value, Ok(2));
        assert_eq!(cache.get::<u32>("k").await, Some(2));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_misses_are_single_flighted() {
        let cache = Cache::connect(InMemoryBackend::new()).await;
        let calls = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let cache = cache.clone();
                let calls = Arc::clone(&calls);
                tokio::spawn(async move {
                    cache
                        .wrap("hot", SetOptions::new(), || async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            Ok::<_, LookupFailed>(99u32)
                        })
                        .await
                })
            })
            .collect();

        for result in futures::future::join_all(tasks).await {
            assert_eq!(result.expect("task"), Ok(99));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.inner.in_flight.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_wrap_leaves_no_flight_behind() {
        let cache = Cache::connect(InMemoryBackend::new()).await;

        for i in 0..20 {
            let key = format!("slow:{}", i);
            let call = cache.wrap(&key, SetOptions::new(), || async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, LookupFailed>(1u32)
            });
            let outcome = tokio::time::timeout(Duration::from_millis(1), call).await;
            assert!(outcome.is_err());
        }

        assert!(cache.inner.in_flight.is_empty());
        assert!(!cache.exists("slow:0").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_waiter_keeps_the_leaders_flight() {
        let cache = Cache::connect(InMemoryBackend::new()).await;

        let leader = {
            let cache = cache.clone();
            tokio::spawn(async move {
                cache
                    .wrap("hot", SetOptions::new(), || async {
                        tokio::time::sleep(Duration::from_secs(5)).await;
                        Ok::<_, LookupFailed>(7u32)
                    })
                    .await
            })
        };
        tokio::task::yield_now().await;
        assert_eq!(cache.inner.in_flight.len(), 1);

        let waiter = cache.wrap("hot", SetOptions::new(), || async {
            Ok::<_, LookupFailed>(0u32)
        });
        assert!(tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .is_err());
        assert_eq!(cache.inner.in_flight.len(), 1);

        assert_eq!(leader.await.expect("leader"), Ok(7));
        assert!(cache.inner.in_flight.is_empty());
        assert_eq!(cache.get::<u32>("hot").await, Some(7));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_waiters_produce_after_leader_fails() {
        let cache = Cache::connect(InMemoryBackend::new()).await;
        let calls = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let cache = cache.clone();
                let calls = Arc::clone(&calls);
                tokio::spawn(async move {
                    cache
                        .wrap("flaky", SetOptions::new(), || async move {
                            let attempt = calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            if attempt == 0 {
                                Err(LookupFailed("first attempt fails"))
                            } else {
                                Ok(attempt as u32)
                            }
                        })
                        .await
                })
            })
            .collect();

        let failures = futures::future::join_all(tasks)
            .await
            .into_iter()
            .filter(|result| result.as_ref().expect("task").is_err())
            .count();

        // Only the failing leader sees an error; the next waiter produced
        // and the rest read its value.
        assert_eq!(failures, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(cache.exists("flaky").await);
    }
}
