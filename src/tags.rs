//! Tag index: group invalidation of cache entries.
//!
//! Each tag is a set stored at `tag:<name>` holding the keys written under
//! it. Sets live `TAG_GRACE_PERIOD` longer than the values they index, so a
//! set may still list keys that already expired; deleting those is harmless.
//!
//! Atomicity: the value write and its tag registration are two store calls.
//! If the process dies between them the value exists without its tag and
//! will only leave the cache by TTL. Invalidation deletes the members and the
//! set in one call and is safe to retry.

use crate::backend::CacheBackend;
use crate::cache::Cache;
use crate::config::TAG_GRACE_PERIOD;
use crate::key::CacheKeyBuilder;
use std::time::Duration;

impl<B: CacheBackend> Cache<B> {
    /// Add `key` to every tag set and refresh each set's expiry to
    /// `ttl + TAG_GRACE_PERIOD`. Failures are logged only.
    pub(crate) async fn register_tags(
        &self,
        backend: &B,
        key: &str,
        tags: &[String],
        ttl: Duration,
    ) {
        let tag_keys: Vec<String> = tags.iter().map(|tag| CacheKeyBuilder::tag(tag)).collect();
        let tag_ttl = ttl + TAG_GRACE_PERIOD;

        if self
            .call("TAG", key, backend.register_tags(key, &tag_keys, tag_ttl))
            .await
            .is_ok()
        {
            debug!("✓ Cache key {} tagged with {:?}", key, tags);
        }
    }

    /// Delete every key registered under `tag`, then the tag set itself.
    ///
    /// An empty or absent tag is a successful no-op. Returns `false` when the
    /// store is unavailable or a call fails.
    pub async fn invalidate_tag(&self, tag: &str) -> bool {
        let tag_key = CacheKeyBuilder::tag(tag);
        let Some(backend) = self.ready("INVALIDATE", &tag_key) else {
            return false;
        };

        let mut doomed = match self.call("SMEMBERS", &tag_key, backend.members(&tag_key)).await {
            Ok(members) => members,
            Err(_) => return false,
        };

        if doomed.is_empty() {
            debug!("Tag {} has no members", tag);
            return true;
        }

        let members = doomed.len();
        doomed.push(tag_key.clone());

        match self.call("DEL", &tag_key, backend.delete(&doomed)).await {
            Ok(_) => {
                info!("✓ Invalidated tag {} ({} keys)", tag, members);
                true
            }
            Err(_) => false,
        }
    }

    /// Invalidate several tags, one after another.
    ///
    /// Best effort: a failure on one tag does not stop the others. Returns
    /// `true` only if every tag was invalidated.
    pub async fn invalidate_tags<S: AsRef<str>>(&self, tags: &[S]) -> bool {
        let mut all_ok = true;
        for tag in tags {
            if !self.invalidate_tag(tag.as_ref()).await {
                warn!("⚠ Tag {} could not be invalidated", tag.as_ref());
                all_ok = false;
            }
        }
        all_ok
    }

    /// Keys currently registered under `tag`. May include expired keys.
    pub async fn tag_members(&self, tag: &str) -> Vec<String> {
        let tag_key = CacheKeyBuilder::tag(tag);
        let Some(backend) = self.ready("SMEMBERS", &tag_key) else {
            return Vec::new();
        };

        self.call("SMEMBERS", &tag_key, backend.members(&tag_key))
            .await
            .unwrap_or_default()
    }
}
