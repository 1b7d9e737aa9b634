//! Metrics hooks and TTL policy.

use crate::config::DEFAULT_TTL;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Receives cache events. Implementations must be cheap; they run inline.
pub trait CacheMetrics: Send + Sync {
    fn record_hit(&self, key: &str, elapsed: Duration);
    fn record_miss(&self, key: &str, elapsed: Duration);
    fn record_set(&self, _key: &str) {}
    /// Any recovered failure: store error, timeout, encode/decode failure.
    fn record_error(&self, key: &str, error: &str);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpMetrics;

impl CacheMetrics for NoOpMetrics {
    fn record_hit(&self, _key: &str, _elapsed: Duration) {}
    fn record_miss(&self, _key: &str, _elapsed: Duration) {}
    fn record_error(&self, _key: &str, _error: &str) {}
}

/// Point-in-time counter values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub errors: u64,
}

impl StatsSnapshot {
    /// Hits over lookups, 0.0 before the first lookup.
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    errors: AtomicU64,
}

/// Counting metrics. Clones share counters, so one clone can be handed to
/// the cache and another kept for reading.
#[derive(Debug, Clone, Default)]
pub struct StatsMetrics {
    counters: Arc<Counters>,
}

impl StatsMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            sets: self.counters.sets.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
        }
    }
}

impl CacheMetrics for StatsMetrics {
    fn record_hit(&self, _key: &str, _elapsed: Duration) {
        self.counters.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_miss(&self, _key: &str, _elapsed: Duration) {
        self.counters.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn record_set(&self, _key: &str) {
        self.counters.sets.fetch_add(1, Ordering::Relaxed);
    }

    fn record_error(&self, _key: &str, _error: &str) {
        self.counters.errors.fetch_add(1, Ordering::Relaxed);
    }
}

/// TTL applied by `set` when the caller does not pass one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TtlPolicy {
    /// Same TTL for every key.
    Fixed(Duration),
    /// TTL chosen by key prefix (the part before the first `:`).
    PerPrefix {
        default: Duration,
        overrides: HashMap<String, Duration>,
    },
}

impl Default for TtlPolicy {
    fn default() -> Self {
        TtlPolicy::Fixed(DEFAULT_TTL)
    }
}

impl TtlPolicy {
    /// Start a per-prefix policy with the given fallback.
    pub fn per_prefix(default: Duration) -> Self {
        TtlPolicy::PerPrefix {
            default,
            overrides: HashMap::new(),
        }
    }

    /// Add a prefix override. A `Fixed` policy becomes `PerPrefix` with the
    /// fixed TTL as its fallback.
    pub fn with_prefix(self, prefix: impl Into<String>, ttl: Duration) -> Self {
        let (default, mut overrides) = match self {
            TtlPolicy::Fixed(default) => (default, HashMap::new()),
            TtlPolicy::PerPrefix { default, overrides } => (default, overrides),
        };
        overrides.insert(prefix.into(), ttl);
        TtlPolicy::PerPrefix { default, overrides }
    }

    /// TTL for a cache key.
    pub fn ttl_for(&self, key: &str) -> Duration {
        match self {
            TtlPolicy::Fixed(ttl) => *ttl,
            TtlPolicy::PerPrefix { default, overrides } => {
                let prefix = key.split(':').next().unwrap_or(key);
                overrides.get(prefix).copied().unwrap_or(*default)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_is_one_hour() {
        assert_eq!(
            TtlPolicy::default().ttl_for("story:1"),
            Duration::from_secs(3600)
        );
    }

    #[test]
    fn test_per_prefix_policy() {
        let policy = TtlPolicy::per_prefix(Duration::from_secs(60))
            .with_prefix("story", Duration::from_secs(600));

        assert_eq!(policy.ttl_for("story:42"), Duration::from_secs(600));
        assert_eq!(policy.ttl_for("story"), Duration::from_secs(600));
        assert_eq!(policy.ttl_for("user:1"), Duration::from_secs(60));
    }

    #[test]
    fn test_fixed_policy_upgrades_to_per_prefix() {
        let policy = TtlPolicy::Fixed(Duration::from_secs(30))
            .with_prefix("stories", Duration::from_secs(5));

        assert_eq!(policy.ttl_for("stories:{}"), Duration::from_secs(5));
        assert_eq!(policy.ttl_for("story:1"), Duration::from_secs(30));
    }

    #[test]
    fn test_stats_metrics_shared_between_clones() {
        let metrics = StatsMetrics::new();
        let handle = metrics.clone();

        metrics.record_hit("a", Duration::ZERO);
        metrics.record_miss("b", Duration::ZERO);
        metrics.record_miss("c", Duration::ZERO);
        metrics.record_set("b");
        metrics.record_error("d", "boom");

        let snapshot = handle.snapshot();
        assert_eq!(
            snapshot,
            StatsSnapshot {
                hits: 1,
                misses: 2,
                sets: 1,
                errors: 1
            }
        );
        assert!((snapshot.hit_rate() - 1.0 / 3.0).abs() < f64::EPSILON);
        assert_eq!(StatsSnapshot::default().hit_rate(), 0.0);
    }
}
