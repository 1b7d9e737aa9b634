//! Read-through strategies for [`Cache::wrap_with`](crate::Cache::wrap_with).

use std::fmt;
use std::str::FromStr;

/// How a memoized read treats the cached value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheStrategy {
    /// Serve from cache; on miss produce, store and return.
    #[default]
    Refresh,
    /// Drop the cached value, then produce, store and return.
    Invalidate,
    /// Skip the cache read; produce, store and return.
    Bypass,
}

impl fmt::Display for CacheStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheStrategy::Refresh => write!(f, "refresh"),
            CacheStrategy::Invalidate => write!(f, "invalidate"),
            CacheStrategy::Bypass => write!(f, "bypass"),
        }
    }
}

impl FromStr for CacheStrategy {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "refresh" => Ok(CacheStrategy::Refresh),
            "invalidate" => Ok(CacheStrategy::Invalidate),
            "bypass" => Ok(CacheStrategy::Bypass),
            other => Err(crate::error::Error::ValidationError(format!(
                "unknown cache strategy: {}",
                other
            ))),
        }
    }
}
