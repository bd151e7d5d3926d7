//! Shared infrastructure for the compliance engine
//!
//! TTL cache stores, per-provider token-bucket rate limiting and PII
//! redaction helpers used by the screening and scoring crates.

#![forbid(unsafe_code)]

pub mod cache;
pub mod error;
pub mod rate_limiter;
pub mod redaction;

pub use cache::{CacheMetrics, CacheStore, InMemoryCache, RedisCache};
pub use error::{InfraError, Result};
pub use rate_limiter::{BucketConfig, RateLimitResult, RateLimiter, RateLimiterConfig};
pub use redaction::{hash_identifier, redact_pii};
