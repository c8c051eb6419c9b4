//! In-memory TTL cache shared by every adapter.
//!
//! Entries are valid while `now - written_at < ttl`. Expired entries read as
//! absent and are only dropped on overwrite or an explicit [`CacheStore::clear_expired`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::{HistoryRange, ProviderId};

/// TTLs chosen by data volatility.
pub struct CacheTtl;

impl CacheTtl {
    pub const QUOTE: Duration = Duration::from_secs(30);
    pub const INTRADAY_HISTORY: Duration = Duration::from_secs(5 * 60);
    pub const DAILY_HISTORY: Duration = Duration::from_secs(60 * 60);
    pub const FUNDAMENTALS: Duration = Duration::from_secs(24 * 60 * 60);
    pub const PROFILE: Duration = Duration::from_secs(24 * 60 * 60);
    pub const NEWS: Duration = Duration::from_secs(10 * 60);
    pub const SEARCH: Duration = Duration::from_secs(60 * 60);
    pub const ECONOMIC_SERIES: Duration = Duration::from_secs(12 * 60 * 60);
    pub const FILINGS: Duration = Duration::from_secs(6 * 60 * 60);
    pub const REFERENCE_DATA: Duration = Duration::from_secs(24 * 60 * 60);

    pub const fn history(range: HistoryRange) -> Duration {
        if range.is_intraday() {
            Self::INTRADAY_HISTORY
        } else {
            Self::DAILY_HISTORY
        }
    }
}

/// Build a cache key of the form `provider:operation:part1:part2`.
pub fn cache_key(provider: ProviderId, operation: &str, parts: &[&str]) -> String {
    let mut key = format!("{}:{operation}", provider.as_str());
    for part in parts {
        key.push(':');
        key.push_str(&part.to_ascii_lowercase());
    }
    key
}

#[derive(Debug, Clone)]
struct CacheEntry {
    body: String,
    written_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_valid(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.written_at) < self.ttl
    }
}

#[derive(Debug)]
struct CacheInner {
    map: HashMap<String, CacheEntry>,
    default_ttl: Duration,
}

impl CacheInner {
    fn new(default_ttl: Duration) -> Self {
        Self {
            map: HashMap::new(),
            default_ttl,
        }
    }

    fn get(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        self.map
            .get(key)
            .filter(|entry| entry.is_valid(now))
            .map(|entry| entry.body.clone())
    }

    fn put(&mut self, key: String, body: String, ttl_override: Option<Duration>) {
        let ttl = ttl_override.unwrap_or(self.default_ttl);
        self.map.insert(
            key,
            CacheEntry {
                body,
                written_at: Instant::now(),
                ttl,
            },
        );
    }

    fn clear_expired(&mut self) {
        let now = Instant::now();
        self.map.retain(|_, entry| entry.is_valid(now));
    }

    fn clear(&mut self) {
        self.map.clear();
    }

    fn len(&self) -> usize {
        self.map.len()
    }
}

/// Thread-safe in-memory cache. Cloning shares the underlying map.
#[derive(Debug, Clone)]
pub struct CacheStore {
    inner: Arc<tokio::sync::RwLock<CacheInner>>,
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::with_default_ttl()
    }
}

impl CacheStore {
    /// Create a new cache store with a default TTL.
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            inner: Arc::new(tokio::sync::RwLock::new(CacheInner::new(default_ttl))),
        }
    }

    /// Create a cache store with a default TTL of 5 minutes.
    pub fn with_default_ttl() -> Self {
        Self::new(Duration::from_secs(300))
    }

    /// Create a disabled cache: writes are dropped and every read misses.
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Get a cached value for the given key if it exists and hasn't expired.
    pub async fn get(&self, key: &str) -> Option<String> {
        let store = self.inner.read().await;
        store.get(key)
    }

    /// Typed read. A body that no longer decodes is treated as a miss.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let body = self.get(key).await;
        let Some(body) = body else {
            debug!(key, "cache miss");
            return None;
        };

        match serde_json::from_str(&body) {
            Ok(value) => {
                debug!(key, "cache hit");
                Some(value)
            }
            Err(error) => {
                warn!(key, %error, "cached entry failed to decode; treating as miss");
                None
            }
        }
    }

    /// Put a value into the cache with the given key.
    ///
    /// If `ttl_override` is provided, it will be used instead of the default TTL.
    /// If the cache is disabled (TTL is ZERO), this is a no-op.
    pub async fn put(&self, key: String, body: String, ttl_override: Option<Duration>) {
        let mut store = self.inner.write().await;

        if store.default_ttl == Duration::ZERO {
            return;
        }

        store.put(key, body, ttl_override);
    }

    /// Typed write with an explicit TTL.
    pub async fn put_json<T: Serialize>(&self, key: String, value: &T, ttl: Duration) {
        match serde_json::to_string(value) {
            Ok(body) => self.put(key, body, Some(ttl)).await,
            Err(error) => warn!(key, %error, "value could not be serialized for caching"),
        }
    }

    /// Remove expired entries from the cache.
    pub async fn clear_expired(&self) {
        let mut store = self.inner.write().await;
        store.clear_expired();
    }

    /// Clear all entries from the cache.
    pub async fn clear(&self) {
        let mut store = self.inner.write().await;
        store.clear();
    }

    /// Get the number of entries in the cache (including expired entries).
    pub async fn len(&self) -> usize {
        let store = self.inner.read().await;
        store.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Check if the cache is disabled (TTL is ZERO).
    pub async fn is_disabled(&self) -> bool {
        let store = self.inner.read().await;
        store.default_ttl == Duration::ZERO
    }
}
