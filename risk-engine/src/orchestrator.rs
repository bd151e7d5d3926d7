//! Aggregation orchestrator
//!
//! Resolves the query to a registry number, loads the profile (cache, then
//! registry, then last known profile), screens the legal name and scores
//! the pair. Only fully fresh assessments are cached; degraded ones are
//! recomputed on the next request so they recover as soon as upstreams do.

use crate::config::EngineConfig;
use crate::error::{Error, RegistryError, Result};
use crate::registry::{CompanyQuery, RegistryClient};
use crate::scoring::RiskScorer;
use crate::types::{CompanyProfile, RegistryMatch, RiskAssessment};
use compliance_infra::cache::{get_json, keys, set_json};
use compliance_infra::{redact_pii, CacheStore, InfraError, RateLimiter};
use compliance_service::{EntityType, SanctionsScreener, ScreeningResult, ScreeningStatus};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Where a profile came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProfileOrigin {
    Registry,
    Cache,
    LastKnown,
}

/// Risk aggregator
pub struct RiskAggregator {
    registry: Arc<dyn RegistryClient>,
    screener: Arc<SanctionsScreener>,
    scorer: RiskScorer,
    cache: Arc<dyn CacheStore>,
    limiter: Arc<RateLimiter>,
    config: Arc<EngineConfig>,
}

impl RiskAggregator {
    /// Create new aggregator
    pub fn new(
        registry: Arc<dyn RegistryClient>,
        screener: Arc<SanctionsScreener>,
        cache: Arc<dyn CacheStore>,
        limiter: Arc<RateLimiter>,
        config: Arc<EngineConfig>,
    ) -> Result<Self> {
        config.validate()?;
        let scorer = RiskScorer::new(config.scoring.clone())?;

        Ok(Self {
            registry,
            screener,
            scorer,
            cache,
            limiter,
            config,
        })
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Cache store shared by all components
    pub fn cache(&self) -> &dyn CacheStore {
        &*self.cache
    }

    /// Assess a registry number or company name
    pub async fn assess(&self, query: &str) -> Result<RiskAssessment> {
        self.assess_as(query, None).await
    }

    /// Assess on behalf of a caller, whose identity sub-keys the rate limits
    pub async fn assess_as(&self, query: &str, caller: Option<&str>) -> Result<RiskAssessment> {
        let query = CompanyQuery::parse(query, self.config.registry.registry_number_len)?;
        let registry_number = self.resolve(&query, caller).await?;

        let assessment_key = format!("{}:{}", keys::ASSESSMENT, registry_number);
        if let Some(assessment) = get_json::<RiskAssessment>(&*self.cache, &assessment_key).await {
            debug!("Assessment cache hit for {}", registry_number);
            return Ok(assessment);
        }

        let (profile, origin) = self.load_profile(&registry_number, caller).await?;
        let screening = self
            .screener
            .screen_record(&profile.legal_name, Some(EntityType::Organization), caller)
            .await?;

        let mut assessment = self.scorer.score(&profile, &screening);
        assessment.stale = assessment.stale || origin == ProfileOrigin::LastKnown;
        assessment.provenance = vec![
            self.profile_provenance(&registry_number, origin),
            self.screening_provenance(&screening),
        ];

        info!(
            "Assessed {}: score {} ({:?}), stale: {}, indeterminate: {}",
            registry_number,
            assessment.score,
            assessment.risk_level,
            assessment.stale,
            assessment.indeterminate
        );

        if !assessment.stale && !assessment.indeterminate {
            set_json(
                &*self.cache,
                &assessment_key,
                &assessment,
                self.config.assessment_ttl(),
            )
            .await;
        }

        Ok(assessment)
    }

    /// Screen a name directly
    pub async fn screen(
        &self,
        name: &str,
        hint: Option<EntityType>,
        caller: Option<&str>,
    ) -> Result<ScreeningResult> {
        Ok(self.screener.screen_as(name, hint, caller).await?)
    }

    /// Drop cached profile, screening and assessment for a query so the next
    /// assessment fetches everything again
    pub async fn refresh(&self, query: &str) -> Result<()> {
        let query = CompanyQuery::parse(query, self.config.registry.registry_number_len)?;

        let registry_number = match &query {
            CompanyQuery::RegistryNumber(number) => number.clone(),
            CompanyQuery::Name(name) => {
                let key = self.search_key(name);
                let registry_number = self.resolve(&query, None).await?;
                self.cache.invalidate(&key).await;
                registry_number
            }
        };

        let profile_key = format!("{}:{}", keys::PROFILE, registry_number);
        let last_known_key = format!("{}:{}", keys::PROFILE_LAST_KNOWN, registry_number);
        let known = match get_json::<CompanyProfile>(&*self.cache, &profile_key).await {
            Some(profile) => Some(profile),
            None => get_json::<CompanyProfile>(&*self.cache, &last_known_key).await,
        };
        if let Some(profile) = known {
            self.screener
                .invalidate(&profile.legal_name, Some(EntityType::Organization))
                .await?;
        }

        self.cache.invalidate(&profile_key).await;
        self.cache
            .invalidate(&format!("{}:{}", keys::ASSESSMENT, registry_number))
            .await;

        info!("Refreshed cached data for {}", registry_number);
        Ok(())
    }

    async fn resolve(&self, query: &CompanyQuery, caller: Option<&str>) -> Result<String> {
        match query {
            CompanyQuery::RegistryNumber(number) => Ok(number.clone()),
            CompanyQuery::Name(name) => self.resolve_name(name, caller).await,
        }
    }

    fn search_key(&self, name: &str) -> String {
        let normalized = self.screener.matcher().normalize(name);
        format!("{}:{}", keys::REGISTRY_SEARCH, normalized.text)
    }

    /// Pick the registry hit whose name matches best; ties go to the lowest number
    async fn resolve_name(&self, name: &str, caller: Option<&str>) -> Result<String> {
        if self.screener.matcher().normalize(name).is_empty() {
            return Err(Error::Invalid(
                "company name has no searchable characters".to_string(),
            ));
        }
        let key = self.search_key(name);

        let hits = match get_json::<Vec<RegistryMatch>>(&*self.cache, &key).await {
            Some(hits) => hits,
            None => {
                let hits = self
                    .call_registry(caller, self.registry.search(name))
                    .await
                    .map_err(Error::from)?;
                if !hits.is_empty() {
                    set_json(
                        &*self.cache,
                        &key,
                        &hits,
                        Duration::from_secs(self.config.cache_ttl.search_seconds),
                    )
                    .await;
                }
                hits
            }
        };

        let matcher = self.screener.matcher();
        let query = matcher.normalize(name);
        let best = hits
            .iter()
            .map(|hit| {
                let score = matcher
                    .score_normalized(&query, &matcher.normalize(&hit.name))
                    .0;
                (score, hit)
            })
            .max_by(|(sa, a), (sb, b)| {
                sa.total_cmp(sb)
                    .then_with(|| b.registry_number.cmp(&a.registry_number))
            })
            .map(|(_, hit)| hit.registry_number.clone());

        match best {
            Some(number) => {
                debug!("Resolved {} to {}", redact_pii(name), number);
                Ok(number)
            }
            None => Err(Error::NotFound(name.to_string())),
        }
    }

    async fn load_profile(
        &self,
        registry_number: &str,
        caller: Option<&str>,
    ) -> Result<(CompanyProfile, ProfileOrigin)> {
        let key = format!("{}:{}", keys::PROFILE, registry_number);
        if let Some(profile) = get_json::<CompanyProfile>(&*self.cache, &key).await {
            return Ok((profile, ProfileOrigin::Cache));
        }

        let fetched = self
            .call_registry(caller, self.registry.fetch_profile(registry_number))
            .await;

        let last_known = format!("{}:{}", keys::PROFILE_LAST_KNOWN, registry_number);
        match fetched {
            Ok(profile) => {
                set_json(&*self.cache, &key, &profile, self.config.profile_ttl()).await;
                set_json(
                    &*self.cache,
                    &last_known,
                    &profile,
                    Duration::from_secs(self.config.cache_ttl.profile_stale_retention_seconds),
                )
                .await;
                Ok((profile, ProfileOrigin::Registry))
            }
            Err(RegistryError::NotFound(number)) => {
                info!("No registry entry for {}", number);
                Err(Error::NotFound(number))
            }
            Err(e) => {
                warn!("Registry lookup for {} failed: {}", registry_number, e);
                match get_json::<CompanyProfile>(&*self.cache, &last_known).await {
                    Some(profile) => Ok((profile, ProfileOrigin::LastKnown)),
                    None => Err(Error::from(e)),
                }
            }
        }
    }

    /// Run one registry call under the rate limiter and the registry timeout.
    /// `call` is not polled until a token has been granted.
    async fn call_registry<T>(
        &self,
        caller: Option<&str>,
        call: impl Future<Output = std::result::Result<T, RegistryError>>,
    ) -> std::result::Result<T, RegistryError> {
        let provider = self.registry.name();
        let max_wait = Duration::from_millis(self.config.registry.max_rate_limit_wait_ms);
        let rate_limited = |e: InfraError| RegistryError::Unavailable(e.to_string());

        if caller.is_some() {
            self.limiter
                .acquire_within(provider, caller, max_wait)
                .await
                .map_err(rate_limited)?;
        }
        self.limiter
            .acquire_within(provider, None, max_wait)
            .await
            .map_err(rate_limited)?;

        let timeout = Duration::from_millis(self.config.registry.timeout_ms);
        match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(RegistryError::Unavailable(format!(
                "{} timed out after {:?}",
                provider, timeout
            ))),
        }
    }

    fn profile_provenance(&self, registry_number: &str, origin: ProfileOrigin) -> String {
        let kind = match origin {
            ProfileOrigin::Registry => "profile",
            ProfileOrigin::Cache => "cache",
            ProfileOrigin::LastKnown => "stale",
        };
        format!("{}:{}:{}", self.registry.name(), kind, registry_number)
    }

    fn screening_provenance(&self, screening: &ScreeningResult) -> String {
        match screening.status {
            ScreeningStatus::Indeterminate => "sanctions:unavailable".to_string(),
            ScreeningStatus::Stale => "sanctions:stale".to_string(),
            ScreeningStatus::Complete if screening.cached => "sanctions:cache".to_string(),
            ScreeningStatus::Complete => format!("sanctions:{}", self.screener.provider()),
        }
    }
}

impl std::fmt::Debug for RiskAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RiskAggregator")
            .field("registry", &self.registry.name())
            .field("screening_provider", &self.screener.provider())
            .field("cache", &self.cache.backend())
            .finish()
    }
}
