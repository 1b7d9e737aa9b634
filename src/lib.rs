//! # resilient-cache
//!
//! A fail-open, tag-aware caching layer between application services and a
//! key-value store.
//!
//! ## Features
//!
//! - **Fail-Open:** A missing, failed or slow store degrades to cache misses, never to errors
//! - **Tag Invalidation:** Register keys under tags and drop whole groups at once
//! - **Read-Through:** `wrap` memoizes any async producer, with single-flight on concurrent misses
//! - **Backend Agnostic:** In-memory and Redis backends behind one `CacheBackend` trait
//! - **Explicit State:** Each cache owns its backend and availability state, no globals
//!
//! ## Quick Start
//!
//! ```ignore
//! use resilient_cache::{Cache, CacheKeyBuilder, SetOptions, backend::InMemoryBackend};
//!
//! #[derive(Clone, Serialize, Deserialize)]
//! struct Story {
//!     id: u64,
//!     title: String,
//! }
//!
//! let cache = Cache::connect(InMemoryBackend::new()).await;
//!
//! let key = CacheKeyBuilder::entity("story", 7);
//! let story: Story = cache
//!     .wrap(&key, SetOptions::new().with_tag("stories"), || async {
//!         repository.find_story(7).await
//!     })
//!     .await?;
//!
//! // After an edit:
//! cache.invalidate_tag("stories").await;
//! ```
//!
//! With Redis (feature `redis`), build from configuration; an unset
//! `REDIS_URL` yields a permanently disabled cache:
//!
//! ```ignore
//! let cache = Cache::from_config(&CacheConfig::from_env()).await;
//! ```

#[macro_use]
extern crate log;

pub mod availability;
pub mod backend;
pub mod builder;
pub mod cache;
pub mod config;
pub mod entity;
pub mod error;
pub mod key;
pub mod memoize;
pub mod observability;
pub mod serialization;
pub mod strategy;
pub mod tags;

// Re-exports for convenience
pub use availability::AvailabilityState;
pub use backend::CacheBackend;
pub use builder::{CacheBuilder, SetOptions};
pub use cache::Cache;
pub use config::{CacheConfig, ReconnectPolicy};
pub use entity::CacheEntity;
pub use error::{Error, Result};
pub use key::CacheKeyBuilder;
pub use strategy::CacheStrategy;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
