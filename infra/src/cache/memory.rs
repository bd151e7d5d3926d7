use super::{CacheMetrics, CacheStore, MetricsRecorder};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

/// Upper bound on a TTL so `Instant` arithmetic cannot overflow
const MAX_TTL: Duration = Duration::from_secs(10 * 365 * 24 * 3600);

/// Stored value with its monotonic expiry
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: String,
    pub expires_at: Instant,
}

impl CacheEntry {
    pub fn new(value: String, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl.min(MAX_TTL),
        }
    }

    /// An entry whose expiry is now or in the past is gone
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// In-process TTL cache
///
/// Entries are shared as `Arc`s so a reader only holds the shard lock long
/// enough to clone a pointer. Expiry is checked on every read against the
/// monotonic clock; [`InMemoryCache::purge_expired`] only reclaims memory.
#[derive(Default)]
pub struct InMemoryCache {
    entries: DashMap<String, Arc<CacheEntry>>,
    metrics: MetricsRecorder,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, including expired ones not yet reclaimed
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every expired entry, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let purged = before.saturating_sub(self.entries.len());
        if purged > 0 {
            debug!("Purged {} expired cache entries", purged);
        }
        purged
    }

    /// Purge expired entries every `interval`
    pub fn start_purge_task(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(interval);
            loop {
                interval.tick().await;
                self.purge_expired();
            }
        })
    }

    fn lookup(&self, key: &str) -> Option<String> {
        let entry = self.entries.get(key).map(|e| Arc::clone(e.value()))?;

        if entry.is_expired(Instant::now()) {
            // Only evict the exact entry we saw; a concurrent writer may have
            // replaced it with a fresh one.
            self.entries
                .remove_if(key, |_, current| Arc::ptr_eq(current, &entry));
            return None;
        }

        Some(entry.value.clone())
    }
}

#[async_trait]
impl CacheStore for InMemoryCache {
    async fn get(&self, key: &str) -> Option<String> {
        match self.lookup(key) {
            Some(value) => {
                self.metrics.record_hit();
                Some(value)
            }
            None => {
                self.metrics.record_miss();
                None
            }
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) {
        self.entries
            .insert(key.to_string(), Arc::new(CacheEntry::new(value, ttl)));
        self.metrics.record_set();
    }

    async fn invalidate(&self, key: &str) {
        if self.entries.remove(key).is_some() {
            self.metrics.record_delete();
        }
    }

    fn metrics(&self) -> CacheMetrics {
        self.metrics.snapshot()
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
