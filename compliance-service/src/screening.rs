use crate::error::{ComplianceError, Result};
use crate::matcher::{NameMatcher, NormalizedName};
use crate::sanctions::SanctionsSource;
use crate::types::{
    EntityType, MatchCandidate, MatchKind, SanctionsEntry, ScreeningResult, ScreeningStatus,
};
use chrono::Utc;
use compliance_infra::cache::{get_json, keys, set_json};
use compliance_infra::{redact_pii, CacheStore, RateLimiter};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Longest accepted query name, in characters
pub const MAX_NAME_LENGTH: usize = 200;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenerConfig {
    /// Sanctions lists, most authoritative first
    pub source_priority: Vec<String>,

    /// Screening result TTL
    pub ttl_seconds: u64,

    /// How long the last known result stays available as a stale fallback
    pub stale_retention_seconds: u64,

    /// Timeout for one sanctions source fetch
    pub fetch_timeout_ms: u64,

    /// Longest wait for a rate-limit token before giving up
    pub max_rate_limit_wait_ms: u64,

    /// Candidates kept per result
    pub max_candidates: usize,
}

impl Default for ScreenerConfig {
    fn default() -> Self {
        Self {
            source_priority: vec![
                "un_sc_sanctions".to_string(),
                "eu_fsf".to_string(),
                "us_ofac_sdn".to_string(),
                "gb_hmt_sanctions".to_string(),
            ],
            ttl_seconds: 3600,
            stale_retention_seconds: 7 * 24 * 3600,
            fetch_timeout_ms: 10_000,
            max_rate_limit_wait_ms: 2_000,
            max_candidates: 25,
        }
    }
}

impl ScreenerConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    pub fn validate(&self) -> Result<()> {
        if self.ttl_seconds == 0 {
            return Err(ComplianceError::ConfigError(
                "screening TTL must be positive".to_string(),
            ));
        }
        if self.stale_retention_seconds < self.ttl_seconds {
            return Err(ComplianceError::ConfigError(
                "stale retention must not be shorter than the screening TTL".to_string(),
            ));
        }
        if self.fetch_timeout_ms == 0 {
            return Err(ComplianceError::ConfigError(
                "sanctions fetch timeout must be positive".to_string(),
            ));
        }
        if self.max_candidates == 0 {
            return Err(ComplianceError::ConfigError(
                "max_candidates must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Sanctions screener
///
/// Normalizes the query, serves from the screening cache when it can and
/// otherwise fetches candidates through the rate limiter, ranks them with the
/// [`NameMatcher`] and caches the result. When the source cannot answer the
/// last known result is served as stale; with nothing to fall back on the
/// result is indeterminate, never a clean "no hit".
pub struct SanctionsScreener {
    source: Arc<dyn SanctionsSource>,
    matcher: Arc<NameMatcher>,
    cache: Arc<dyn CacheStore>,
    limiter: Arc<RateLimiter>,
    config: ScreenerConfig,
}

impl SanctionsScreener {
    pub fn new(
        source: Arc<dyn SanctionsSource>,
        matcher: Arc<NameMatcher>,
        cache: Arc<dyn CacheStore>,
        limiter: Arc<RateLimiter>,
        config: ScreenerConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            source,
            matcher,
            cache,
            limiter,
            config,
        })
    }

    pub fn matcher(&self) -> &NameMatcher {
        &self.matcher
    }

    pub fn config(&self) -> &ScreenerConfig {
        &self.config
    }

    pub fn provider(&self) -> &str {
        self.source.name()
    }

    /// Screen a name against the sanctions source
    pub async fn screen(&self, name: &str, hint: Option<EntityType>) -> Result<ScreeningResult> {
        self.screen_as(name, hint, None).await
    }

    /// Screen on behalf of a caller, whose identity sub-keys the rate limit
    pub async fn screen_as(
        &self,
        name: &str,
        hint: Option<EntityType>,
        caller: Option<&str>,
    ) -> Result<ScreeningResult> {
        let normalized = self.normalize_query(name)?;
        self.screen_normalized(name, normalized, hint, caller).await
    }

    /// Screen a name taken from an upstream record rather than from a caller.
    ///
    /// The caller input limits do not apply: a long name is screened as is,
    /// and a name with nothing searchable in it yields an indeterminate result
    /// instead of an error.
    pub async fn screen_record(
        &self,
        name: &str,
        hint: Option<EntityType>,
        caller: Option<&str>,
    ) -> Result<ScreeningResult> {
        let normalized = self.matcher.normalize(name.trim());
        if normalized.is_empty() {
            warn!(
                "Record name {} has no searchable characters, screening is indeterminate",
                redact_pii(name)
            );
            return Ok(ScreeningResult::indeterminate(name.trim(), "", hint));
        }
        self.screen_normalized(name, normalized, hint, caller).await
    }

    async fn screen_normalized(
        &self,
        name: &str,
        normalized: NormalizedName,
        hint: Option<EntityType>,
        caller: Option<&str>,
    ) -> Result<ScreeningResult> {
        let key = Self::cache_key(keys::SCREENING, &normalized, hint);

        if let Some(mut cached) = get_json::<ScreeningResult>(&*self.cache, &key).await {
            debug!("Screening cache hit for {}", redact_pii(&normalized.text));
            cached.cached = true;
            return Ok(cached);
        }

        match self.fetch(name, caller).await {
            Ok(entries) => {
                let result = self.rank(name, &normalized, hint, entries);
                info!(
                    "Screened {}: {} candidates, hit: {}",
                    redact_pii(name),
                    result.candidates.len(),
                    result.hit
                );

                let last_known = Self::cache_key(keys::SCREENING_LAST_KNOWN, &normalized, hint);
                set_json(&*self.cache, &key, &result, self.config.ttl()).await;
                set_json(
                    &*self.cache,
                    &last_known,
                    &result,
                    Duration::from_secs(self.config.stale_retention_seconds),
                )
                .await;

                Ok(result)
            }
            Err(e) if e.is_unavailable() => {
                warn!(
                    "Sanctions source {} unavailable for {}: {}",
                    self.source.name(),
                    redact_pii(name),
                    e
                );
                Ok(self.fallback(name, &normalized, hint).await)
            }
            Err(e) => Err(e),
        }
    }

    /// Drop the cached result for a name so the next screen re-fetches.
    /// The last known result is kept as a fallback. Names with nothing
    /// searchable in them have no cache entry.
    pub async fn invalidate(&self, name: &str, hint: Option<EntityType>) -> Result<()> {
        let normalized = self.matcher.normalize(name.trim());
        if normalized.is_empty() {
            return Ok(());
        }
        self.cache
            .invalidate(&Self::cache_key(keys::SCREENING, &normalized, hint))
            .await;
        Ok(())
    }

    fn normalize_query(&self, name: &str) -> Result<NormalizedName> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(ComplianceError::InvalidInput("name is empty".to_string()));
        }
        if trimmed.chars().count() > MAX_NAME_LENGTH {
            return Err(ComplianceError::InvalidInput(format!(
                "name longer than {} characters",
                MAX_NAME_LENGTH
            )));
        }

        let normalized = self.matcher.normalize(trimmed);
        if normalized.is_empty() {
            return Err(ComplianceError::InvalidInput(
                "name has no searchable characters".to_string(),
            ));
        }
        Ok(normalized)
    }

    fn cache_key(prefix: &str, normalized: &NormalizedName, hint: Option<EntityType>) -> String {
        let scope = hint.map(|h| h.as_str()).unwrap_or("any");
        format!("{}:{}:{}", prefix, scope, normalized.text)
    }

    async fn fetch(&self, name: &str, caller: Option<&str>) -> Result<Vec<SanctionsEntry>> {
        let provider = self.source.name();
        let max_wait = Duration::from_millis(self.config.max_rate_limit_wait_ms);

        // Caller bucket first so a denied caller does not spend a provider token
        if caller.is_some() {
            self.limiter.acquire_within(provider, caller, max_wait).await?;
        }
        self.limiter.acquire_within(provider, None, max_wait).await?;

        let timeout = Duration::from_millis(self.config.fetch_timeout_ms);
        match tokio::time::timeout(timeout, self.source.fetch_candidates(Some(name.trim()))).await {
            Ok(result) => result,
            Err(_) => Err(ComplianceError::Timeout(timeout)),
        }
    }

    async fn fallback(
        &self,
        name: &str,
        normalized: &NormalizedName,
        hint: Option<EntityType>,
    ) -> ScreeningResult {
        let last_known = Self::cache_key(keys::SCREENING_LAST_KNOWN, normalized, hint);

        match get_json::<ScreeningResult>(&*self.cache, &last_known).await {
            Some(mut stale) => {
                stale.status = ScreeningStatus::Stale;
                stale.cached = true;
                stale
            }
            None => ScreeningResult::indeterminate(name.trim(), &normalized.text, hint),
        }
    }

    fn rank(
        &self,
        query: &str,
        normalized: &NormalizedName,
        hint: Option<EntityType>,
        entries: Vec<SanctionsEntry>,
    ) -> ScreeningResult {
        let mut seen = HashSet::new();

        let mut candidates: Vec<MatchCandidate> = entries
            .into_iter()
            .filter(|entry| hint.map_or(true, |h| entry.entity_type == h))
            .filter(|entry| seen.insert((entry.source_list.clone(), entry.id.clone())))
            .map(|entry| self.matcher.best_match(normalized, &entry))
            .filter(|candidate| self.matcher.is_match(candidate.score))
            .collect();

        candidates.sort_by(|a, b| self.compare_candidates(a, b));
        candidates.truncate(self.config.max_candidates);

        ScreeningResult {
            query: query.trim().to_string(),
            normalized_query: normalized.text.clone(),
            entity_type: hint,
            hit: !candidates.is_empty(),
            candidates,
            status: ScreeningStatus::Complete,
            cached: false,
            screened_at: Utc::now(),
        }
    }

    /// Score descending, exact token-set before fuzzy, source priority,
    /// then canonical name
    fn compare_candidates(&self, a: &MatchCandidate, b: &MatchCandidate) -> Ordering {
        b.score
            .total_cmp(&a.score)
            .then_with(|| kind_rank(a.kind).cmp(&kind_rank(b.kind)))
            .then_with(|| {
                self.priority(&a.entry.source_list)
                    .cmp(&self.priority(&b.entry.source_list))
            })
            .then_with(|| a.entry.canonical_name.cmp(&b.entry.canonical_name))
            .then_with(|| a.entry.source_list.cmp(&b.entry.source_list))
            .then_with(|| a.entry.id.cmp(&b.entry.id))
    }

    fn priority(&self, list: &str) -> usize {
        self.config
            .source_priority
            .iter()
            .position(|s| s == list)
            .unwrap_or(usize::MAX)
    }
}

fn kind_rank(kind: MatchKind) -> u8 {
    match kind {
        MatchKind::ExactTokenSet => 0,
        MatchKind::Fuzzy => 1,
    }
}
