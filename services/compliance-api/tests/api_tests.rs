//! HTTP surface tests against an in-process app with a stub registry

use actix_web::http::StatusCode;
use actix_web::{test, web, App};
use async_trait::async_trait;
use chrono::NaiveDate;
use compliance_api::handlers::{configure_routes, CLIENT_ID_HEADER};
use compliance_api::{metrics, AppState};
use compliance_infra::{InMemoryCache, RateLimiter};
use compliance_service::{NameMatcher, SanctionsListStore, SanctionsScreener};
use prometheus::Registry;
use risk_engine::{
    Address, CompanyProfile, CompanyStatus, EngineConfig, IndustryCode, Officer, RegistryClient,
    RegistryError, RegistryMatch, RiskAggregator,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

const SANCTIONS_CSV: &str = "\
id,name,aliases,entity_type,countries,programs,last_updated
os-1,Petrolux Trading Ltd,Petrolux Handels GmbH,organization,RU,EU-RUS,2024-01-15
os-2,Ivan Petrov,,person,RU,EU-RUS,2024-01-15
";

struct StubRegistry {
    profiles: HashMap<String, CompanyProfile>,
    available: AtomicBool,
    profile_calls: AtomicUsize,
}

#[async_trait]
impl RegistryClient for StubRegistry {
    fn name(&self) -> &str {
        "kvk"
    }

    async fn fetch_profile(&self, registry_number: &str) -> Result<CompanyProfile, RegistryError> {
        self.profile_calls.fetch_add(1, Ordering::SeqCst);
        if !self.available.load(Ordering::SeqCst) {
            return Err(RegistryError::Unavailable("503 Service Unavailable".to_string()));
        }
        self.profiles
            .get(registry_number)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(registry_number.to_string()))
    }

    async fn search(&self, name: &str) -> Result<Vec<RegistryMatch>, RegistryError> {
        let needle = name.to_lowercase();
        Ok(self
            .profiles
            .values()
            .filter(|p| p.legal_name.to_lowercase().contains(&needle))
            .map(|p| RegistryMatch {
                registry_number: p.registry_number.clone(),
                name: p.legal_name.clone(),
            })
            .collect())
    }
}

fn profile(number: &str, name: &str) -> CompanyProfile {
    CompanyProfile {
        registry_number: number.to_string(),
        legal_name: name.to_string(),
        legal_form: Some("Besloten Vennootschap".to_string()),
        trade_names: vec![],
        status: CompanyStatus::Active,
        registration_date: NaiveDate::from_ymd_opt(2015, 3, 2),
        address: Some(Address {
            city: Some("Amsterdam".to_string()),
            ..Address::default()
        }),
        industry_codes: vec![IndustryCode {
            code: "6420".to_string(),
            description: None,
            primary: true,
        }],
        officers: vec![Officer {
            name: "J. de Vries".to_string(),
            role: "Bestuurder".to_string(),
        }],
    }
}

fn setup() -> (web::Data<AppState>, Arc<StubRegistry>) {
    let store = SanctionsListStore::new("local");
    store.load_csv("eu_fsf", SANCTIONS_CSV.as_bytes()).unwrap();
    setup_with(store)
}

fn setup_with(store: SanctionsListStore) -> (web::Data<AppState>, Arc<StubRegistry>) {
    let config = EngineConfig::default();
    let registry = Arc::new(StubRegistry {
        profiles: [
            profile("68750110", "Test BV Donald"),
            profile("69599076", "Petrolux Trading BV"),
        ]
        .into_iter()
        .map(|p| (p.registry_number.clone(), p))
        .collect(),
        available: AtomicBool::new(true),
        profile_calls: AtomicUsize::new(0),
    });

    let cache = Arc::new(InMemoryCache::new());
    let limiter = Arc::new(RateLimiter::new(config.rate_limits.clone()).unwrap());
    let matcher = Arc::new(NameMatcher::new(config.matcher.clone()).unwrap());
    let screener = Arc::new(
        SanctionsScreener::new(
            Arc::new(store),
            matcher,
            cache.clone(),
            limiter.clone(),
            config.screener.clone(),
        )
        .unwrap(),
    );
    let aggregator = Arc::new(
        RiskAggregator::new(
            registry.clone(),
            screener,
            cache,
            limiter,
            Arc::new(config),
        )
        .unwrap(),
    );

    let prometheus = Registry::new();
    metrics::register_metrics(&prometheus).unwrap();

    let state = web::Data::new(AppState::new(
        aggregator,
        prometheus,
        "test-key".to_string(),
    ));
    (state, registry)
}

macro_rules! app {
    ($state:expr) => {
        test::init_service(App::new().app_data($state.clone()).configure(configure_routes)).await
    };
}

#[actix_web::test]
async fn test_health_check() {
    let (state, _) = setup();
    let app = app!(state);

    let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["cache_backend"], "memory");
}

#[actix_web::test]
async fn test_assess_clean_company() {
    let (state, _) = setup();
    let app = app!(state);

    let req = test::TestRequest::get()
        .uri("/api/v1/risk/68750110")
        .insert_header((CLIENT_ID_HEADER, "client-42"))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(body["company_id"], "68750110");
    assert_eq!(body["risk_level"], "low");
    assert_eq!(body["indeterminate"], false);
    assert_eq!(body["stale"], false);
    assert_eq!(body["screening"]["hit"], false);
    assert_eq!(body["provenance"][0], "kvk:profile:68750110");
}

#[actix_web::test]
async fn test_assess_sanctioned_company() {
    let (state, _) = setup();
    let app = app!(state);

    let req = test::TestRequest::get()
        .uri("/api/v1/risk/69599076")
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(body["risk_level"], "medium");
    assert_eq!(body["screening"]["hit"], true);
    assert_eq!(body["screening"]["candidates"][0]["entry"]["id"], "os-1");
}

#[actix_web::test]
async fn test_assess_by_name() {
    let (state, _) = setup();
    let app = app!(state);

    let req = test::TestRequest::get()
        .uri("/api/v1/risk/Test%20BV%20Donald")
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(body["company_id"], "68750110");
}

#[actix_web::test]
async fn test_invalid_identifier_is_bad_request() {
    let (state, _) = setup();
    let app = app!(state);

    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/api/v1/risk/1234").to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "VALIDATION_ERROR");
}

#[actix_web::test]
async fn test_unknown_company_is_not_found() {
    let (state, _) = setup();
    let app = app!(state);

    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/api/v1/risk/99999999").to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "NOT_FOUND");
}

#[actix_web::test]
async fn test_registry_outage_without_cache_is_unavailable() {
    let (state, registry) = setup();
    registry.available.store(false, Ordering::SeqCst);
    let app = app!(state);

    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/api/v1/risk/68750110").to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "UPSTREAM_UNAVAILABLE");
}

#[actix_web::test]
async fn test_refresh_refetches_profile() {
    let (state, registry) = setup();
    let app = app!(state);

    let get = || test::TestRequest::get().uri("/api/v1/risk/68750110").to_request();

    let resp = test::call_service(&app, get()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let resp = test::call_service(&app, get()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(registry.profile_calls.load(Ordering::SeqCst), 1);

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/v1/risk/68750110/refresh")
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = test::call_service(&app, get()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(registry.profile_calls.load(Ordering::SeqCst), 2);
}

#[actix_web::test]
async fn test_screen_name() {
    let (state, _) = setup();
    let app = app!(state);

    let req = test::TestRequest::get()
        .uri("/api/v1/sanctions/screen?name=Petrolux%20Handels%20GmbH&entity_type=organization")
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(body["hit"], true);
    assert_eq!(body["status"], "complete");
    assert_eq!(body["candidates"][0]["matched_field"]["field"], "alias");
}

#[actix_web::test]
async fn test_screen_rejects_bad_parameters() {
    let (state, _) = setup();
    let app = app!(state);

    for uri in [
        "/api/v1/sanctions/screen",
        "/api/v1/sanctions/screen?name=Ivan%20Petrov&entity_type=vessel",
        "/api/v1/sanctions/screen?name=%20%20",
    ] {
        let resp = test::call_service(&app, test::TestRequest::get().uri(uri).to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{}", uri);
    }
}

#[actix_web::test]
async fn test_metrics_endpoint() {
    let (state, _) = setup();
    let app = app!(state);

    test::call_service(
        &app,
        test::TestRequest::get().uri("/api/v1/risk/68750110").to_request(),
    )
    .await;

    let resp = test::call_service(&app, test::TestRequest::get().uri("/metrics").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body = test::read_body(resp).await;
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("http_requests_total"));
    assert!(text.contains("risk_assessments_total"));
    assert!(text.contains("cache_misses"));
}

#[actix_web::test]
async fn test_unanswered_screening_is_reported_stale() {
    // No list loaded: the sanctions source cannot answer
    let (state, _) = setup_with(SanctionsListStore::new("local"));
    let app = app!(state);

    let req = test::TestRequest::get()
        .uri("/api/v1/risk/68750110")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["indeterminate"], true);
    assert_eq!(body["stale"], true);
    assert_eq!(body["screening"]["status"], "indeterminate");
    assert_eq!(body["provenance"][1], "sanctions:unavailable");
}
