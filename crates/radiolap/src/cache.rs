//! Bounded response cache for the session gateway.
//!
//! Raw JSON responses are memoized by [`CacheKey`] for the lifetime of the
//! process. There is no TTL; the least recently used entry is evicted once
//! capacity is reached.

use std::fmt;
use std::num::NonZeroUsize;

use lru::LruCache;
use serde::Serialize;
use serde_json::Value;
use tracing::trace;

use crate::gateway::Endpoint;

/// Default number of cached responses.
pub const DEFAULT_CAPACITY: usize = 128;

/// Identity of an upstream request: endpoint plus ordered query parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    endpoint: Endpoint,
    params: Vec<(&'static str, String)>,
}

impl CacheKey {
    /// Key for an endpoint without parameters.
    #[must_use]
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            params: Vec::new(),
        }
    }

    /// Append a query parameter.
    #[must_use]
    pub fn with(mut self, name: &'static str, value: impl ToString) -> Self {
        self.params.push((name, value.to_string()));
        self
    }

    /// The endpoint this key addresses.
    #[must_use]
    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    /// Query parameters in insertion order.
    #[must_use]
    pub fn params(&self) -> &[(&'static str, String)] {
        &self.params
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.endpoint.path())?;
        for (i, (name, value)) in self.params.iter().enumerate() {
            let sep = if i == 0 { '?' } else { '&' };
            write!(f, "{sep}{name}={value}")?;
        }
        Ok(())
    }
}

/// Cache hit/miss/eviction counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that missed.
    pub misses: u64,
    /// Entries dropped to make room.
    pub evictions: u64,
}

impl CacheStats {
    /// Hit rate in `[0.0, 1.0]`; `0.0` before any lookup.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// LRU cache of raw upstream responses.
#[derive(Debug)]
pub struct ResponseCache {
    entries: LruCache<CacheKey, Value>,
    stats: CacheStats,
}

impl ResponseCache {
    /// Create a cache holding at most `capacity` responses.
    #[must_use]
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: LruCache::new(capacity),
            stats: CacheStats::default(),
        }
    }

    /// Look up a response, marking it most recently used.
    pub fn get(&mut self, key: &CacheKey) -> Option<Value> {
        if let Some(value) = self.entries.get(key) {
            self.stats.hits += 1;
            trace!(%key, "cache hit");
            Some(value.clone())
        } else {
            self.stats.misses += 1;
            None
        }
    }

    /// Store a response, evicting the least recently used entry when full.
    pub fn insert(&mut self, key: CacheKey, value: Value) {
        if let Some((evicted, _)) = self.entries.push(key.clone(), value) {
            if evicted != key {
                self.stats.evictions += 1;
                trace!(key = %evicted, "cache eviction");
            }
        }
    }

    /// Whether `key` is cached, without touching recency.
    #[must_use]
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains(key)
    }

    /// Number of cached responses.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of cached responses.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }

    /// Counters since creation.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Drop every entry. Counters are kept.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(NonZeroUsize::new(DEFAULT_CAPACITY).unwrap_or(NonZeroUsize::MIN))
    }
}
