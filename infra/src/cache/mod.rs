//! Key/value cache with per-entry time-to-live
//!
//! Every backend upholds the same contract: an entry is never returned once
//! its TTL has elapsed, the last write to a key wins, and a backend outage
//! reads as a miss instead of an error.

mod memory;
mod redis_backend;

pub use self::memory::{CacheEntry, InMemoryCache};
pub use self::redis_backend::RedisCache;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::warn;

/// Cache key prefixes
pub mod keys {
    pub const PROFILE: &str = "registry:profile";
    pub const PROFILE_LAST_KNOWN: &str = "registry:profile:last";
    pub const REGISTRY_SEARCH: &str = "registry:search";
    pub const SCREENING: &str = "sanctions:screening";
    pub const SCREENING_LAST_KNOWN: &str = "sanctions:screening:last";
    pub const ASSESSMENT: &str = "risk:assessment";
}

/// TTL-bounded key/value store
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Read a live entry; expired entries and backend failures read as `None`
    async fn get(&self, key: &str) -> Option<String>;

    /// Write an entry that expires after `ttl`
    async fn set(&self, key: &str, value: String, ttl: Duration);

    /// Drop an entry
    async fn invalidate(&self, key: &str);

    /// Snapshot of hit/miss counters
    fn metrics(&self) -> CacheMetrics;

    /// Backend name for logs and health output
    fn backend(&self) -> &'static str;
}

/// Read and deserialize a JSON payload. Undecodable payloads count as a miss.
pub async fn get_json<T: DeserializeOwned>(cache: &dyn CacheStore, key: &str) -> Option<T> {
    let raw = cache.get(key).await?;
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Failed to deserialize cached entry {}: {}", key, e);
            None
        }
    }
}

/// Serialize and store a JSON payload
pub async fn set_json<T: Serialize + ?Sized>(
    cache: &dyn CacheStore,
    key: &str,
    value: &T,
    ttl: Duration,
) {
    match serde_json::to_string(value) {
        Ok(json) => cache.set(key, json, ttl).await,
        Err(e) => warn!("Failed to serialize cache entry {}: {}", key, e),
    }
}

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
}

impl CacheMetrics {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64) / (total as f64) * 100.0
        }
    }
}

/// Lock-free counters shared by the backends
#[derive(Default, Debug)]
pub(crate) struct MetricsRecorder {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
}

impl MetricsRecorder {
    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_set(&self) {
        self.sets.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> CacheMetrics {
        CacheMetrics {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
        }
    }
}
