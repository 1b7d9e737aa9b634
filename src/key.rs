//! Cache key construction.
//!
//! Pure functions; the cache never calls them itself. Services use them so
//! that readers and invalidators agree on key names.

use crate::entity::CacheEntity;
use crate::error::Result;
use crate::serialization;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt::Display;

/// Prefix of tag membership set keys.
pub const TAG_PREFIX: &str = "tag";

/// Builds cache keys from domain identifiers.
pub struct CacheKeyBuilder;

impl CacheKeyBuilder {
    /// `"{prefix}:{id}"` for an entity type.
    pub fn build<T: CacheEntity>(id: &T::Key) -> String {
        Self::entity(T::cache_prefix(), id)
    }

    /// Key of an entity instance.
    pub fn for_entity<T: CacheEntity>(entity: &T) -> String {
        Self::build::<T>(&entity.cache_key())
    }

    /// `"{prefix}:{id}"`, e.g. `story:42`.
    pub fn entity(prefix: &str, id: impl Display) -> String {
        format!("{}:{}", prefix, id)
    }

    /// `"{prefix}:slug:{slug}"`, e.g. `story:slug:hello-world`.
    pub fn slug(prefix: &str, slug: &str) -> String {
        format!("{}:slug:{}", prefix, slug)
    }

    /// `"{prefix}:{filter}"` with the filter serialized canonically.
    ///
    /// Object fields are sorted at every level, so two filters with the same
    /// content always produce the same key whatever their field order.
    ///
    /// # Errors
    ///
    /// Returns `Error::SerializationError` if the filter cannot be serialized.
    pub fn collection<F: Serialize + ?Sized>(prefix: &str, filter: &F) -> Result<String> {
        let value = serde_json::to_value(filter)
            .map_err(|e| crate::error::Error::SerializationError(e.to_string()))?;
        let canonical = serialization::encode(&canonicalize(value))?;
        Ok(format!("{}:{}", prefix, canonical))
    }

    /// Collection key for an entity type.
    pub fn collection_for<T: CacheEntity, F: Serialize + ?Sized>(filter: &F) -> Result<String> {
        Self::collection(&T::collection_prefix(), filter)
    }

    /// `"tag:{name}"`, the membership set of a tag.
    pub fn tag(name: &str) -> String {
        format!("{}:{}", TAG_PREFIX, name)
    }
}

fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut fields: Vec<(String, Value)> = map.into_iter().collect();
            fields.sort_by(|(a, _), (b, _)| a.cmp(b));
            Value::Object(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, canonicalize(v)))
                    .collect::<Map<String, Value>>(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}
