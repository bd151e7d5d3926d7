//! End-to-end assessment scenarios with scripted upstreams

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use compliance_infra::cache::keys;
use compliance_infra::{CacheStore, InMemoryCache, RateLimiter};
use compliance_service::error::Result as SourceResult;
use compliance_service::{
    ComplianceError, EntityType, NameMatcher, SanctionsEntry, SanctionsScreener, SanctionsSource,
};
use risk_engine::scoring::factors;
use risk_engine::{
    Address, CompanyProfile, CompanyStatus, EngineConfig, Error, IndustryCode, Officer,
    RegistryClient, RegistryError, RegistryMatch, RiskAggregator,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct StubRegistry {
    profiles: HashMap<String, CompanyProfile>,
    available: AtomicBool,
    delay: Option<Duration>,
    profile_calls: AtomicUsize,
    search_calls: AtomicUsize,
}

impl StubRegistry {
    fn new(profiles: Vec<CompanyProfile>) -> Self {
        Self {
            profiles: profiles
                .into_iter()
                .map(|p| (p.registry_number.clone(), p))
                .collect(),
            available: AtomicBool::new(true),
            delay: None,
            profile_calls: AtomicUsize::new(0),
            search_calls: AtomicUsize::new(0),
        }
    }

    fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), RegistryError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(RegistryError::Unavailable("503 Service Unavailable".to_string()))
        }
    }
}

#[async_trait]
impl RegistryClient for StubRegistry {
    fn name(&self) -> &str {
        "kvk"
    }

    async fn fetch_profile(&self, registry_number: &str) -> Result<CompanyProfile, RegistryError> {
        self.profile_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.check()?;
        self.profiles
            .get(registry_number)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(registry_number.to_string()))
    }

    async fn search(&self, name: &str) -> Result<Vec<RegistryMatch>, RegistryError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        let needle = name.to_lowercase();
        let first_word = needle.split_whitespace().next().unwrap_or_default().to_string();
        Ok(self
            .profiles
            .values()
            .filter(|p| p.legal_name.to_lowercase().contains(&first_word))
            .map(|p| RegistryMatch {
                registry_number: p.registry_number.clone(),
                name: p.legal_name.clone(),
            })
            .collect())
    }
}

struct StubSanctions {
    entries: Vec<SanctionsEntry>,
    available: AtomicBool,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl StubSanctions {
    fn new(entries: Vec<SanctionsEntry>) -> Self {
        Self {
            entries,
            available: AtomicBool::new(true),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SanctionsSource for StubSanctions {
    fn name(&self) -> &str {
        "opensanctions"
    }

    async fn fetch_candidates(&self, _name_hint: Option<&str>) -> SourceResult<Vec<SanctionsEntry>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if !self.available.load(Ordering::SeqCst) {
            return Err(ComplianceError::SourceUnavailable("timeout".to_string()));
        }
        Ok(self.entries.clone())
    }
}

fn profile(number: &str, name: &str, status: CompanyStatus) -> CompanyProfile {
    CompanyProfile {
        registry_number: number.to_string(),
        legal_name: name.to_string(),
        legal_form: Some("Besloten Vennootschap".to_string()),
        trade_names: vec![name.to_string()],
        status,
        registration_date: NaiveDate::from_ymd_opt(2015, 3, 2),
        address: Some(Address {
            city: Some("Amsterdam".to_string()),
            ..Address::default()
        }),
        industry_codes: vec![IndustryCode {
            code: "6420".to_string(),
            description: Some("Financiële holdings".to_string()),
            primary: true,
        }],
        officers: vec![Officer {
            name: "A. de Vries".to_string(),
            role: "bestuurder".to_string(),
        }],
    }
}

fn sanctioned(name: &str) -> SanctionsEntry {
    SanctionsEntry {
        id: "NK-1".to_string(),
        source_list: "eu_fsf".to_string(),
        canonical_name: name.to_string(),
        aliases: BTreeSet::new(),
        entity_type: EntityType::Organization,
        countries: BTreeSet::from(["RU".to_string()]),
        programs: BTreeSet::from(["sanction".to_string()]),
        last_updated: Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap(),
    }
}

fn registry() -> Arc<StubRegistry> {
    let mut petrolux = profile("69599076", "Petrolux Trading BV", CompanyStatus::Dissolved);
    petrolux.officers.clear();

    Arc::new(StubRegistry::new(vec![
        profile("68750110", "Test BV Donald", CompanyStatus::Active),
        profile("68750111", "Test BV Donald Holding", CompanyStatus::Active),
        petrolux,
    ]))
}

fn sanctions() -> Arc<StubSanctions> {
    Arc::new(StubSanctions::new(vec![
        sanctioned("Petrolux Trading Ltd"),
        sanctioned("Rosneft Oil Company"),
    ]))
}

fn aggregator_with(
    registry: Arc<StubRegistry>,
    sanctions: Arc<StubSanctions>,
    cache: Arc<dyn CacheStore>,
    config: EngineConfig,
) -> RiskAggregator {
    let config = Arc::new(config);
    let limiter = Arc::new(RateLimiter::new(config.rate_limits.clone()).unwrap());
    let matcher = Arc::new(NameMatcher::new(config.matcher.clone()).unwrap());
    let screener = Arc::new(
        SanctionsScreener::new(
            sanctions,
            matcher,
            Arc::clone(&cache),
            Arc::clone(&limiter),
            config.screener.clone(),
        )
        .unwrap(),
    );

    RiskAggregator::new(registry, screener, cache, limiter, config).unwrap()
}

fn aggregator(registry: Arc<StubRegistry>, sanctions: Arc<StubSanctions>) -> RiskAggregator {
    aggregator_with(
        registry,
        sanctions,
        Arc::new(InMemoryCache::new()),
        EngineConfig::default(),
    )
}

#[tokio::test]
async fn test_clean_active_company_scores_baseline() {
    let registry = registry();
    let aggregator = aggregator(Arc::clone(&registry), sanctions());

    let assessment = aggregator.assess("68750110").await.unwrap();
    assert!(assessment.score <= dec!(10));
    assert!(!assessment.screening.hit);
    assert!(!assessment.stale);
    assert!(!assessment.indeterminate);
    assert_eq!(assessment.factor_total(), assessment.score);
    assert_eq!(
        assessment.provenance,
        vec!["kvk:profile:68750110", "sanctions:opensanctions"]
    );

    // Served from the assessment cache
    let again = aggregator.assess("6875 0110").await.unwrap();
    assert_eq!(again, assessment);
    assert_eq!(registry.profile_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_dissolved_sanctioned_company_is_clamped() {
    let aggregator = aggregator(registry(), sanctions());

    let assessment = aggregator.assess("69599076").await.unwrap();
    assert!(assessment.screening.hit);
    assert_eq!(assessment.score, dec!(100));
    assert_eq!(assessment.factor_total(), dec!(100));
    let clamp = assessment.factor(factors::CLAMP_ADJUSTMENT).unwrap();
    assert_eq!(clamp.raw_value, dec!(102.5));
    assert!(clamp.contribution < Decimal::ZERO);
}

#[tokio::test]
async fn test_unknown_company_is_not_found() {
    let sanctions = sanctions();
    let aggregator = aggregator(registry(), Arc::clone(&sanctions));

    assert!(matches!(
        aggregator.assess("12345678").await,
        Err(Error::NotFound(_))
    ));
    // No partial score: screening never ran
    assert_eq!(sanctions.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_malformed_queries_are_invalid() {
    let aggregator = aggregator(registry(), sanctions());

    for query in ["", "1234", "123456789", "???"] {
        assert!(
            matches!(aggregator.assess(query).await, Err(Error::Invalid(_))),
            "query {:?}",
            query
        );
    }
}

#[tokio::test]
async fn test_sanctions_outage_is_indeterminate_not_clean() {
    let sanctions = sanctions();
    sanctions.available.store(false, Ordering::SeqCst);
    let aggregator = aggregator(registry(), Arc::clone(&sanctions));

    let assessment = aggregator.assess("68750110").await.unwrap();
    assert!(assessment.indeterminate);
    assert!(assessment.stale);
    let penalty = assessment.factor(factors::SANCTIONS_INDETERMINATE).unwrap();
    assert_eq!(penalty.contribution, dec!(25));
    assert_eq!(assessment.provenance[1], "sanctions:unavailable");

    // Degraded assessments are not cached
    sanctions.available.store(true, Ordering::SeqCst);
    let recovered = aggregator.assess("68750110").await.unwrap();
    assert!(!recovered.indeterminate);
    assert!(!recovered.stale);
    assert_eq!(recovered.provenance[0], "kvk:cache:68750110");
}

#[tokio::test(start_paused = true)]
async fn test_registry_outage_serves_last_known_profile() {
    let registry = registry();
    let aggregator = aggregator(Arc::clone(&registry), sanctions());

    let fresh = aggregator.assess("68750110").await.unwrap();
    assert!(!fresh.stale);

    tokio::time::advance(Duration::from_secs(25 * 3600)).await;
    registry.set_available(false);

    let stale = aggregator.assess("68750110").await.unwrap();
    assert!(stale.stale);
    assert_eq!(stale.provenance[0], "kvk:stale:68750110");
    assert_eq!(stale.score, fresh.score);
}

#[tokio::test]
async fn test_registry_outage_without_cache_is_unavailable() {
    let registry = registry();
    registry.set_available(false);
    let aggregator = aggregator(registry, sanctions());

    assert!(matches!(
        aggregator.assess("68750110").await,
        Err(Error::Unavailable(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_slow_registry_times_out() {
    let mut slow = StubRegistry::new(vec![profile("68750110", "Test BV Donald", CompanyStatus::Active)]);
    slow.delay = Some(Duration::from_secs(120));
    let aggregator = aggregator(Arc::new(slow), sanctions());

    assert!(matches!(
        aggregator.assess("68750110").await,
        Err(Error::Unavailable(_))
    ));
}

#[tokio::test]
async fn test_name_query_resolves_best_match() {
    let registry = registry();
    let aggregator = aggregator(Arc::clone(&registry), sanctions());

    let assessment = aggregator.assess("Test B.V. Donald").await.unwrap();
    assert_eq!(assessment.company_id, "68750110");

    // Search results are cached
    aggregator.refresh("68750110").await.unwrap();
    aggregator.assess("test bv donald").await.unwrap();
    assert_eq!(registry.search_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_name_without_registry_hits_is_not_found() {
    let aggregator = aggregator(registry(), sanctions());
    assert!(matches!(
        aggregator.assess("Nonexistent Widgets").await,
        Err(Error::NotFound(_))
    ));
}

#[tokio::test]
async fn test_refresh_refetches_everything() {
    let registry = registry();
    let sanctions = sanctions();
    let aggregator = aggregator(Arc::clone(&registry), Arc::clone(&sanctions));

    aggregator.assess("68750110").await.unwrap();
    aggregator.refresh("68750110").await.unwrap();
    let refreshed = aggregator.assess("68750110").await.unwrap();

    assert_eq!(registry.profile_calls.load(Ordering::SeqCst), 2);
    assert_eq!(sanctions.calls.load(Ordering::SeqCst), 2);
    assert_eq!(refreshed.provenance[0], "kvk:profile:68750110");
}

#[tokio::test]
async fn test_assessment_is_deterministic() {
    let a = aggregator(registry(), sanctions())
        .assess("69599076")
        .await
        .unwrap();
    let b = aggregator(registry(), sanctions())
        .assess("69599076")
        .await
        .unwrap();

    assert_eq!(a.score, b.score);
    assert_eq!(a.factors, b.factors);
    assert_eq!(a.screening.candidates, b.screening.candidates);
}

#[tokio::test]
async fn test_direct_screening() {
    let aggregator = aggregator(registry(), sanctions());

    let result = aggregator.screen("Tesla", None, None).await.unwrap();
    assert!(!result.hit);
    assert!(result.candidates.is_empty());

    assert!(matches!(
        aggregator.screen("", None, None).await,
        Err(Error::Invalid(_))
    ));
}

#[tokio::test]
async fn test_overlong_legal_name_is_still_screened() {
    let long_name = format!("Stichting {}", "Beheer ".repeat(30));
    assert!(long_name.chars().count() > 200);
    let registry = Arc::new(StubRegistry::new(vec![profile(
        "68750112",
        long_name.trim(),
        CompanyStatus::Active,
    )]));
    let aggregator = aggregator(registry, sanctions());

    let assessment = aggregator.assess("68750112").await.unwrap();
    assert!(!assessment.indeterminate);
    assert!(!assessment.screening.hit);
    assert_eq!(assessment.provenance[1], "sanctions:opensanctions");

    aggregator.refresh("68750112").await.unwrap();
}

#[tokio::test]
async fn test_unsearchable_legal_name_is_indeterminate() {
    let registry = Arc::new(StubRegistry::new(vec![profile(
        "68750113",
        "+++",
        CompanyStatus::Active,
    )]));
    let sanctions = sanctions();
    let aggregator = aggregator(registry, Arc::clone(&sanctions));

    let assessment = aggregator.assess("68750113").await.unwrap();
    assert!(assessment.indeterminate);
    assert!(assessment.stale);
    assert_eq!(
        assessment.factor(factors::SANCTIONS_INDETERMINATE).unwrap().contribution,
        dec!(25)
    );
    assert_eq!(sanctions.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_registry_call_leaves_cache_untouched() {
    let mut slow = StubRegistry::new(vec![profile("68750110", "Test BV Donald", CompanyStatus::Active)]);
    slow.delay = Some(Duration::from_secs(1));
    let cache: Arc<dyn CacheStore> = Arc::new(InMemoryCache::new());
    let aggregator = aggregator_with(
        Arc::new(slow),
        sanctions(),
        Arc::clone(&cache),
        EngineConfig::default(),
    );

    let cancelled =
        tokio::time::timeout(Duration::from_millis(100), aggregator.assess("68750110")).await;
    assert!(cancelled.is_err());

    for key in [
        format!("{}:68750110", keys::PROFILE),
        format!("{}:68750110", keys::PROFILE_LAST_KNOWN),
        format!("{}:68750110", keys::ASSESSMENT),
    ] {
        assert!(cache.get(&key).await.is_none(), "{}", key);
    }

    let assessment = aggregator.assess("68750110").await.unwrap();
    assert!(!assessment.stale);
    assert_eq!(assessment.provenance[0], "kvk:profile:68750110");
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_screening_leaves_cache_untouched() {
    let mut slow = StubSanctions::new(vec![sanctioned("Petrolux Trading Ltd")]);
    slow.delay = Some(Duration::from_secs(1));
    let slow = Arc::new(slow);
    let cache: Arc<dyn CacheStore> = Arc::new(InMemoryCache::new());
    let aggregator = aggregator_with(
        registry(),
        Arc::clone(&slow),
        Arc::clone(&cache),
        EngineConfig::default(),
    );

    let cancelled =
        tokio::time::timeout(Duration::from_millis(100), aggregator.assess("68750110")).await;
    assert!(cancelled.is_err());
    assert_eq!(slow.calls.load(Ordering::SeqCst), 1);

    for key in [
        format!("{}:organization:test bv donald", keys::SCREENING),
        format!("{}:organization:test bv donald", keys::SCREENING_LAST_KNOWN),
        format!("{}:68750110", keys::ASSESSMENT),
    ] {
        assert!(cache.get(&key).await.is_none(), "{}", key);
    }

    let assessment = aggregator.assess("68750110").await.unwrap();
    assert!(!assessment.indeterminate);
    assert!(!assessment.stale);
    assert!(cache
        .get(&format!("{}:68750110", keys::ASSESSMENT))
        .await
        .is_some());
}
