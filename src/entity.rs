//! Trait for domain entities that know their own cache key.

use std::fmt::Display;

/// Implemented by entities cached under a fixed prefix.
///
/// # Example
///
/// ```
/// use resilient_cache::{CacheEntity, CacheKeyBuilder};
///
/// pub struct Story {
///     pub id: u64,
///     pub slug: String,
/// }
///
/// impl CacheEntity for Story {
///     type Key = u64;
///
///     fn cache_key(&self) -> Self::Key {
///         self.id
///     }
///
///     fn cache_prefix() -> &'static str {
///         "story"
///     }
/// }
///
/// let story = Story { id: 7, slug: "hello".into() };
/// assert_eq!(CacheKeyBuilder::for_entity(&story), "story:7");
/// ```
pub trait CacheEntity {
    /// Type of the entity's id (typically a number, String or UUID)
    type Key: Display;

    /// The entity's id, e.g. `Story.id` → `7`.
    fn cache_key(&self) -> Self::Key;

    /// Namespace for keys of this entity type, e.g. `"story"`.
    /// Final cache key format: `"{prefix}:{key}"`
    fn cache_prefix() -> &'static str;

    /// Prefix for collections (lists, searches) of this entity.
    /// Defaults to `"{prefix}:list"`.
    fn collection_prefix() -> String {
        format!("{}:list", Self::cache_prefix())
    }
}
