//! Engine configuration
//!
//! One immutable value, built once at startup and handed to every component.

use crate::error::{Error, Result};
use crate::scoring::ScoringWeights;
use compliance_infra::RateLimiterConfig;
use compliance_service::{MatcherConfig, ScreenerConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Cache lifetimes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheTtlConfig {
    /// Company profile TTL
    pub profile_seconds: u64,

    /// How long the last known profile stays available as a fallback
    pub profile_stale_retention_seconds: u64,

    /// Upper bound on the assessment TTL
    pub assessment_seconds: u64,

    /// Registry search result TTL
    pub search_seconds: u64,
}

impl Default for CacheTtlConfig {
    fn default() -> Self {
        Self {
            profile_seconds: 24 * 3600,
            profile_stale_retention_seconds: 30 * 24 * 3600,
            assessment_seconds: 3600,
            search_seconds: 15 * 60,
        }
    }
}

/// Registry access settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Digits in a registry number
    pub registry_number_len: usize,

    /// Timeout for one registry call
    pub timeout_ms: u64,

    /// Longest wait for a rate-limit token before giving up
    pub max_rate_limit_wait_ms: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            registry_number_len: 8,
            timeout_ms: 10_000,
            max_rate_limit_wait_ms: 2_000,
        }
    }
}

/// Risk engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Name matcher
    pub matcher: MatcherConfig,

    /// Sanctions screener
    pub screener: ScreenerConfig,

    /// Risk factor weights
    pub scoring: ScoringWeights,

    /// Cache lifetimes
    pub cache_ttl: CacheTtlConfig,

    /// Outbound rate limits per provider
    pub rate_limits: RateLimiterConfig,

    /// Registry access
    pub registry: RegistryConfig,
}

impl EngineConfig {
    /// Validate every section and the TTL ordering between them
    pub fn validate(&self) -> Result<()> {
        self.matcher.validate()?;
        self.screener.validate()?;
        self.scoring.validate()?;
        self.rate_limits.validate()?;

        let ttl = &self.cache_ttl;
        if ttl.profile_seconds == 0 || ttl.assessment_seconds == 0 || ttl.search_seconds == 0 {
            return Err(Error::InvalidConfig("cache TTLs must be positive".to_string()));
        }
        if self.screener.ttl_seconds >= ttl.profile_seconds {
            return Err(Error::InvalidConfig(format!(
                "screening TTL ({}s) must be shorter than the profile TTL ({}s)",
                self.screener.ttl_seconds, ttl.profile_seconds
            )));
        }
        if ttl.profile_stale_retention_seconds < ttl.profile_seconds {
            return Err(Error::InvalidConfig(
                "profile stale retention must not be shorter than the profile TTL".to_string(),
            ));
        }

        if self.registry.registry_number_len == 0 {
            return Err(Error::InvalidConfig(
                "registry number length must be positive".to_string(),
            ));
        }
        if self.registry.timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "registry timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Profile TTL
    pub fn profile_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl.profile_seconds)
    }

    /// Assessment TTL: never longer than either input it was computed from
    pub fn assessment_ttl(&self) -> Duration {
        let seconds = self
            .cache_ttl
            .assessment_seconds
            .min(self.cache_ttl.profile_seconds)
            .min(self.screener.ttl_seconds);
        Duration::from_secs(seconds)
    }
}
