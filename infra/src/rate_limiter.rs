//! Outbound rate limiting
//!
//! One token bucket per upstream provider, optionally sub-keyed by caller
//! identity. A denied acquire reports the exact wait until the next token so
//! callers can apply their own timeout policy instead of retrying blindly.

use crate::error::{InfraError, Result};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Slack for float drift between a computed wait and the refill it buys
const TOKEN_EPSILON: f64 = 1e-6;

/// Token bucket configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BucketConfig {
    /// Maximum burst
    pub capacity: u32,

    /// Token refill rate (tokens per second)
    pub refill_per_second: f64,
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            capacity: 10,
            refill_per_second: 5.0,
        }
    }
}

impl BucketConfig {
    pub fn new(capacity: u32, refill_per_second: f64) -> Self {
        Self {
            capacity,
            refill_per_second,
        }
    }

    fn validate(&self, name: &str) -> Result<()> {
        if self.capacity == 0 {
            return Err(InfraError::InvalidConfig(format!(
                "rate limit bucket '{}' must have a capacity of at least 1",
                name
            )));
        }
        if !(self.refill_per_second.is_finite() && self.refill_per_second > 0.0) {
            return Err(InfraError::InvalidConfig(format!(
                "rate limit bucket '{}' must refill at a positive rate",
                name
            )));
        }
        Ok(())
    }
}

/// Rate limiter configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimiterConfig {
    /// Bucket used for providers without their own entry
    pub default: BucketConfig,

    /// Per-provider buckets, keyed by provider name
    pub providers: HashMap<String, BucketConfig>,
}

impl RateLimiterConfig {
    pub fn bucket_for(&self, provider: &str) -> &BucketConfig {
        self.providers.get(provider).unwrap_or(&self.default)
    }

    pub fn validate(&self) -> Result<()> {
        self.default.validate("default")?;
        for (name, bucket) in &self.providers {
            bucket.validate(name)?;
        }
        Ok(())
    }
}

/// Rate limiter result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitResult {
    /// Token taken, request may proceed
    Allowed,

    /// Bucket empty
    Denied {
        /// Wait until the next token is available
        retry_after: Duration,
    },
}

impl RateLimitResult {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitResult::Allowed)
    }
}

/// Token bucket rate limiter
#[derive(Debug)]
struct TokenBucket {
    /// Current token count
    tokens: f64,

    /// Maximum tokens (burst size)
    capacity: f64,

    /// Token refill rate (per second)
    refill_rate: f64,

    /// Last refill timestamp
    last_refill: Instant,
}

impl TokenBucket {
    fn new(config: &BucketConfig) -> Self {
        Self {
            tokens: config.capacity as f64,
            capacity: config.capacity as f64,
            refill_rate: config.refill_per_second,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }

    fn try_consume(&mut self) -> bool {
        self.refill();

        if self.tokens + TOKEN_EPSILON >= 1.0 {
            self.tokens = (self.tokens - 1.0).max(0.0);
            true
        } else {
            false
        }
    }

    /// Idle for at least `max_age` and refilled to capacity, so dropping it
    /// loses nothing: a new bucket starts full
    fn is_idle(&self, now: Instant, max_age: Duration) -> bool {
        let idle = now.saturating_duration_since(self.last_refill);
        idle >= max_age && self.tokens + idle.as_secs_f64() * self.refill_rate >= self.capacity
    }

    /// Time until one whole token is available, rounded up to the microsecond
    fn time_until_ready(&self) -> Duration {
        let deficit = 1.0 - self.tokens;
        if deficit <= TOKEN_EPSILON {
            return Duration::ZERO;
        }
        let micros = (deficit / self.refill_rate * 1_000_000.0).ceil() as u64;
        Duration::from_micros(micros.max(1))
    }
}

/// Keyed token-bucket rate limiter
///
/// Buckets are created lazily on first use and live in a sharded map, so
/// acquiring for one provider never waits on another provider's bucket.
pub struct RateLimiter {
    config: RateLimiterConfig,
    buckets: DashMap<String, TokenBucket>,
}

impl RateLimiter {
    /// Create new rate limiter
    pub fn new(config: RateLimiterConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            buckets: DashMap::new(),
        })
    }

    /// Bucket key for a provider, optionally sub-keyed by caller
    pub fn bucket_key(provider: &str, caller: Option<&str>) -> String {
        match caller {
            Some(caller) => format!("{}:{}", provider, caller),
            None => provider.to_string(),
        }
    }

    /// Try to take one token. Never blocks.
    pub fn acquire(&self, provider: &str, caller: Option<&str>) -> RateLimitResult {
        let key = Self::bucket_key(provider, caller);
        let mut bucket = self
            .buckets
            .entry(key)
            .or_insert_with(|| TokenBucket::new(self.config.bucket_for(provider)));

        if bucket.try_consume() {
            RateLimitResult::Allowed
        } else {
            let retry_after = bucket.time_until_ready();
            debug!(
                "Rate limit reached for {} (caller: {:?}), retry after {:?}",
                provider, caller, retry_after
            );
            RateLimitResult::Denied { retry_after }
        }
    }

    /// Acquire a token, sleeping for as long as `max_wait` allows.
    ///
    /// Fails with [`InfraError::RateLimited`] as soon as the required wait
    /// would exceed the remaining budget.
    pub async fn acquire_within(
        &self,
        provider: &str,
        caller: Option<&str>,
        max_wait: Duration,
    ) -> Result<()> {
        let deadline = Instant::now() + max_wait;

        loop {
            match self.acquire(provider, caller) {
                RateLimitResult::Allowed => return Ok(()),
                RateLimitResult::Denied { retry_after } => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if retry_after > remaining {
                        warn!(
                            "Rate limit wait of {:?} for {} exceeds budget of {:?}",
                            retry_after, provider, remaining
                        );
                        return Err(InfraError::RateLimited {
                            key: Self::bucket_key(provider, caller),
                            retry_after,
                        });
                    }
                    tokio::time::sleep(retry_after).await;
                }
            }
        }
    }

    /// Tokens currently available for a key, after refill
    pub fn available(&self, provider: &str, caller: Option<&str>) -> f64 {
        let key = Self::bucket_key(provider, caller);
        match self.buckets.get_mut(&key) {
            Some(mut bucket) => {
                bucket.refill();
                bucket.tokens
            }
            None => self.config.bucket_for(provider).capacity as f64,
        }
    }

    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    /// Number of live buckets
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Drop buckets unused for `max_age` that have refilled completely.
    /// Returns how many were removed.
    pub fn cleanup(&self, max_age: Duration) -> usize {
        let now = Instant::now();
        let before = self.buckets.len();
        self.buckets.retain(|_, bucket| !bucket.is_idle(now, max_age));
        let removed = before.saturating_sub(self.buckets.len());

        if removed > 0 {
            info!(
                "Rate limiter cleanup: removed {} idle buckets, {} left",
                removed,
                self.buckets.len()
            );
        }
        removed
    }

    /// Start cleanup task
    pub fn start_cleanup_task(self: Arc<Self>, interval: Duration, max_age: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(interval);
            loop {
                interval.tick().await;
                self.cleanup(max_age);
            }
        })
    }
}
