//! In-process backing store.
//!
//! Mirrors the Redis semantics the cache relies on: per-key expiry, string and
//! set values, glob key matching. Useful for tests and single-instance
//! deployments.

use super::CacheBackend;
use crate::error::{Error, Result};
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Shortest expiry a write can get; matches Redis' whole-second `EX`.
const MIN_TTL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
enum Stored {
    Text(String),
    Members(HashSet<String>),
}

#[derive(Debug, Clone)]
struct StoredEntry {
    value: Stored,
    expires_at: Option<Instant>,
}

impl StoredEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// DashMap-backed store. Cloning shares the underlying map.
///
/// Expiry is evaluated lazily on access against `tokio::time::Instant`, so
/// tests running with a paused clock can advance past a TTL.
#[derive(Clone, Default)]
pub struct InMemoryBackend {
    store: Arc<DashMap<String, StoredEntry>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.store.iter().filter(|e| !e.is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remaining time to live of a key, `None` if absent or persistent.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.store
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .and_then(|entry| entry.expires_at)
            .map(|at| at.saturating_duration_since(now))
    }

    /// Expiry instant for `ttl`, truncated to whole seconds and at least
    /// [`MIN_TTL`] as Redis applies it.
    fn expiry(ttl: Duration) -> Instant {
        Instant::now() + Duration::from_secs(ttl.as_secs()).max(MIN_TTL)
    }

    /// Drop the key if it has expired; true when a live entry remains.
    fn purge_if_expired(&self, key: &str) -> bool {
        let now = Instant::now();
        self.store.remove_if(key, |_, entry| entry.is_expired(now));
        self.store.contains_key(key)
    }
}

impl CacheBackend for InMemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        if !self.purge_if_expired(key) {
            debug!("✓ InMemory GET {} -> MISS", key);
            return Ok(None);
        }

        match self.store.get(key).map(|entry| entry.value.clone()) {
            Some(Stored::Text(value)) => {
                debug!("✓ InMemory GET {} -> HIT", key);
                Ok(Some(value))
            }
            Some(Stored::Members(_)) => Err(Error::BackendError(format!(
                "WRONGTYPE GET against a set at key {}",
                key
            ))),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.store.insert(
            key.to_string(),
            StoredEntry {
                value: Stored::Text(value.to_string()),
                expires_at: Some(Self::expiry(ttl)),
            },
        );
        debug!("✓ InMemory SET {} (TTL: {:?})", key, ttl);
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<u64> {
        let now = Instant::now();
        let removed = keys
            .iter()
            .filter_map(|key| self.store.remove(key))
            .filter(|(_, entry)| !entry.is_expired(now))
            .count() as u64;

        debug!("✓ InMemory DELETE {} keys ({} existed)", keys.len(), removed);
        Ok(removed)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.purge_if_expired(key))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        if !self.purge_if_expired(key) {
            return Ok(false);
        }

        match self.store.get_mut(key) {
            Some(mut entry) => {
                entry.expires_at = Some(Self::expiry(ttl));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let glob = Glob::new(pattern);
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .store
            .iter()
            .filter(|entry| !entry.is_expired(now) && glob.matches(entry.key()))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn add_members(&self, set_key: &str, members: &[String]) -> Result<u64> {
        self.purge_if_expired(set_key);

        let mut entry = self
            .store
            .entry(set_key.to_string())
            .or_insert_with(|| StoredEntry {
                value: Stored::Members(HashSet::new()),
                expires_at: None,
            });

        match &mut entry.value {
            Stored::Members(set) => Ok(members
                .iter()
                .filter(|member| set.insert((*member).clone()))
                .count() as u64),
            Stored::Text(_) => Err(Error::BackendError(format!(
                "WRONGTYPE SADD against a string at key {}",
                set_key
            ))),
        }
    }

    async fn members(&self, set_key: &str) -> Result<Vec<String>> {
        if !self.purge_if_expired(set_key) {
            return Ok(Vec::new());
        }

        match self.store.get(set_key).map(|entry| entry.value.clone()) {
            Some(Stored::Members(set)) => {
                let mut members: Vec<String> = set.into_iter().collect();
                members.sort();
                Ok(members)
            }
            Some(Stored::Text(_)) => Err(Error::BackendError(format!(
                "WRONGTYPE SMEMBERS against a string at key {}",
                set_key
            ))),
            None => Ok(Vec::new()),
        }
    }

    async fn flush(&self) -> Result<()> {
        self.store.clear();
        warn!("⚠ InMemory FLUSH executed - all cache cleared!");
        Ok(())
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn provider_name(&self) -> &'static str {
        "inmemory"
    }
}

/// Redis-style glob matching: `*`, `?`, `[abc]`, `[^a]`, `[a-z]` and `\`
/// escapes.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    Glob::new(pattern).matches(text)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Star,
    Any,
    Class(Vec<char>),
    Literal(char),
}

impl Token {
    fn matches(&self, c: char) -> bool {
        match self {
            Token::Star | Token::Any => true,
            Token::Class(body) => class_contains(body, c),
            Token::Literal(literal) => *literal == c,
        }
    }
}

/// A parsed glob pattern, matched in O(pattern * text) without recursion.
#[derive(Debug, Clone)]
struct Glob {
    tokens: Vec<Token>,
}

impl Glob {
    fn new(pattern: &str) -> Self {
        let chars: Vec<char> = pattern.chars().collect();
        let mut tokens = Vec::with_capacity(chars.len());
        let mut i = 0;

        while i < chars.len() {
            match chars[i] {
                '*' => {
                    // Consecutive stars match the same as one.
                    if tokens.last() != Some(&Token::Star) {
                        tokens.push(Token::Star);
                    }
                    i += 1;
                }
                '?' => {
                    tokens.push(Token::Any);
                    i += 1;
                }
                '[' => match match_class(&chars[i + 1..]) {
                    Some((body, after)) => {
                        tokens.push(Token::Class(body.to_vec()));
                        i = chars.len() - after.len();
                    }
                    // Unterminated class: treat '[' literally.
                    None => {
                        tokens.push(Token::Literal('['));
                        i += 1;
                    }
                },
                '\\' if i + 1 < chars.len() => {
                    tokens.push(Token::Literal(chars[i + 1]));
                    i += 2;
                }
                literal => {
                    tokens.push(Token::Literal(literal));
                    i += 1;
                }
            }
        }

        Glob { tokens }
    }

    fn matches(&self, text: &str) -> bool {
        let text: Vec<char> = text.chars().collect();
        let tokens = &self.tokens;
        let (mut p, mut t) = (0, 0);
        // Last star seen and the text position it is currently absorbing up to.
        let mut star: Option<(usize, usize)> = None;

        while t < text.len() {
            match tokens.get(p) {
                Some(Token::Star) => {
                    star = Some((p, t));
                    p += 1;
                    continue;
                }
                Some(token) if token.matches(text[t]) => {
                    p += 1;
                    t += 1;
                    continue;
                }
                _ => {}
            }

            match star {
                Some((star_p, star_t)) => {
                    star = Some((star_p, star_t + 1));
                    p = star_p + 1;
                    t = star_t + 1;
                }
                None => return false,
            }
        }

        tokens[p..].iter().all(|token| *token == Token::Star)
    }
}

/// Split `abc]rest` into the class body and the pattern after `]`.
fn match_class(pattern: &[char]) -> Option<(&[char], &[char])> {
    let mut i = 0;
    while i < pattern.len() {
        match pattern[i] {
            '\\' => i += 2,
            ']' if i > 0 => return Some((&pattern[..i], &pattern[i + 1..])),
            _ => i += 1,
        }
    }
    None
}

fn class_contains(class: &[char], c: char) -> bool {
    let (negated, class) = match class.split_first() {
        Some(('^', rest)) => (true, rest),
        _ => (false, class),
    };

    let mut found = false;
    let mut i = 0;
    while i < class.len() {
        let current = if class[i] == '\\' && i + 1 < class.len() {
            i += 1;
            class[i]
        } else {
            class[i]
        };

        if i + 2 < class.len() && class[i + 1] == '-' {
            let (lo, hi) = (current.min(class[i + 2]), current.max(class[i + 2]));
            found |= (lo..=hi).contains(&c);
            i += 3;
        } else {
            found |= current == c;
            i += 1;
        }
    }

    found != negated
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn keys(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_set_get_delete() {
        let backend = InMemoryBackend::new();
        backend
            .set("story:1", "\"one\"", Duration::from_secs(60))
            .await
            .expect("set");

        assert_eq!(
            backend.get("story:1").await.expect("get"),
            Some("\"one\"".to_string())
        );
        assert!(backend.exists("story:1").await.expect("exists"));

        let removed = backend
            .delete(&keys(&["story:1", "story:2"]))
            .await
            .expect("delete");
        assert_eq!(removed, 1);
        assert_eq!(backend.get("story:1").await.expect("get"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let backend = InMemoryBackend::new();
        backend
            .set("short", "1", Duration::from_secs(5))
            .await
            .expect("set");
        assert_eq!(backend.ttl("short"), Some(Duration::from_secs(5)));

        tokio::time::advance(Duration::from_secs(6)).await;

        assert_eq!(backend.get("short").await.expect("get"), None);
        assert!(!backend.exists("short").await.expect("exists"));
        assert!(backend.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expire_refreshes_ttl() {
        let backend = InMemoryBackend::new();
        backend
            .set("k", "1", Duration::from_secs(5))
            .await
            .expect("set");

        assert!(backend
            .expire("k", Duration::from_secs(100))
            .await
            .expect("expire"));
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(backend.exists("k").await.expect("exists"));

        assert!(!backend
            .expire("missing", Duration::from_secs(1))
            .await
            .expect("expire"));
    }

    #[tokio::test]
    async fn test_sets() {
        let backend = InMemoryBackend::new();
        let added = backend
            .add_members("tag:news", &keys(&["a", "b", "a"]))
            .await
            .expect("sadd");
        assert_eq!(added, 2);

        assert_eq!(
            backend.members("tag:news").await.expect("smembers"),
            keys(&["a", "b"])
        );
        assert!(backend
            .members("tag:absent")
            .await
            .expect("smembers")
            .is_empty());
    }

    #[tokio::test]
    async fn test_wrong_type_is_backend_error() {
        let backend = InMemoryBackend::new();
        backend
            .set("plain", "1", Duration::from_secs(60))
            .await
            .expect("set");

        let err = backend
            .add_members("plain", &keys(&["x"]))
            .await
            .expect_err("string is not a set");
        assert!(matches!(err, Error::BackendError(_)));
    }

    #[tokio::test]
    async fn test_keys_and_flush() {
        let backend = InMemoryBackend::new();
        for key in ["story:1", "story:2", "user:1"] {
            backend
                .set(key, "1", Duration::from_secs(60))
                .await
                .expect("set");
        }

        assert_eq!(
            backend.keys("story:*").await.expect("keys"),
            keys(&["story:1", "story:2"])
        );

        backend.flush().await.expect("flush");
        assert!(backend.keys("*").await.expect("keys").is_empty());
    }

    #[test]
    fn test_glob_match() {
        assert!(glob_match("story:*", "story:1"));
        assert!(glob_match("story:*", "story:"));
        assert!(!glob_match("story:*", "stories:1"));
        assert!(glob_match("h?llo", "hello"));
        assert!(!glob_match("h?llo", "hllo"));
        assert!(glob_match("h[ae]llo", "hallo"));
        assert!(!glob_match("h[ae]llo", "hillo"));
        assert!(glob_match("h[^e]llo", "hallo"));
        assert!(!glob_match("h[^e]llo", "hello"));
        assert!(glob_match("h[a-c]llo", "hbllo"));
        assert!(glob_match("literal\\*", "literal*"));
        assert!(!glob_match("literal\\*", "literally"));
        assert!(glob_match("*", ""));
        assert!(glob_match("a*b*c", "aXXbYYc"));
        assert!(!glob_match("a*b*c", "aXXbYY"));
        assert!(glob_match("*c", "abcbc"));
        assert!(glob_match("[unterminated", "[unterminated"));
        assert!(glob_match("[]x]", "]"));
        assert!(glob_match("trailing\\", "trailing\\"));
    }

    #[test]
    fn test_glob_match_does_not_backtrack_exponentially() {
        let key = "a".repeat(40);
        let started = std::time::Instant::now();

        assert!(!glob_match("*a*a*a*a*a*a*a*a*ab", &key));
        assert!(glob_match("*a*a*a*a*a*a*a*a*a", &key));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_keys_with_many_stars() {
        let backend = InMemoryBackend::new();
        backend
            .set(&"a".repeat(40), "1", Duration::from_secs(60))
            .await
            .expect("set");

        assert!(backend
            .keys("*a*a*a*a*a*a*a*a*ab")
            .await
            .expect("keys")
            .is_empty());
        assert_eq!(backend.keys("*a*a*a").await.expect("keys").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_is_at_least_one_second() {
        let backend = InMemoryBackend::new();
        backend
            .set("zero", "1", Duration::ZERO)
            .await
            .expect("set");
        assert_eq!(backend.ttl("zero"), Some(Duration::from_secs(1)));
        assert!(backend.exists("zero").await.expect("exists"));

        backend
            .set("fraction", "1", Duration::from_millis(2500))
            .await
            .expect("set");
        assert_eq!(backend.ttl("fraction"), Some(Duration::from_secs(2)));

        assert!(backend
            .expire("zero", Duration::ZERO)
            .await
            .expect("expire"));
        assert_eq!(backend.ttl("zero"), Some(Duration::from_secs(1)));
    }

    proptest! {
        #[test]
        fn prop_plain_keys_match_themselves(key in "[a-z0-9:_]{0,24}") {
            prop_assert!(glob_match(&key, &key));
            let prefix_pattern = format!("{}*", key);
            let extended = format!("{}:suffix", key);
            prop_assert!(glob_match(&prefix_pattern, &extended));
        }
    }
}
