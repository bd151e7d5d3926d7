use crate::errors::ApiError;
use crate::metrics::{
    metrics_handler as render_metrics, record_cache, ASSESSMENTS_TOTAL, ASSESSMENT_DURATION,
    HTTP_REQUESTS_TOTAL, SCREENINGS_TOTAL,
};
use actix_web::{web, HttpRequest, HttpResponse, ResponseError};
use compliance_infra::hash_identifier;
use compliance_service::{EntityType, ScreeningStatus};
use prometheus::Registry;
use risk_engine::RiskAggregator;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// Optional caller identity; hashed before use
pub const CLIENT_ID_HEADER: &str = "x-client-id";

pub struct AppState {
    pub aggregator: Arc<RiskAggregator>,
    pub registry: Registry,
    pub caller_hash_key: String,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(aggregator: Arc<RiskAggregator>, registry: Registry, caller_hash_key: String) -> Self {
        Self {
            aggregator,
            registry,
            caller_hash_key,
            started_at: Instant::now(),
        }
    }

    fn caller(&self, req: &HttpRequest) -> Option<String> {
        req.headers()
            .get(CLIENT_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| hash_identifier(&self.caller_hash_key, value))
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub cache_backend: String,
}

#[derive(Debug, Deserialize)]
pub struct ScreenParams {
    pub name: Option<String>,
    pub entity_type: Option<String>,
}

fn record_request(method: &str, path: &str, response: &Result<HttpResponse, ApiError>) {
    let status = match response {
        Ok(resp) => resp.status(),
        Err(e) => e.status_code(),
    };
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, status.as_str()])
        .inc();
}

// ===== Health Check =====
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        cache_backend: state.aggregator.cache().backend().to_string(),
    })
}

// ===== Metrics =====
pub async fn metrics(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    record_cache(state.aggregator.cache().metrics());
    let body = render_metrics(&state.registry).map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(body))
}

// ===== Assess Company =====
pub async fn assess_company(
    req: HttpRequest,
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let identifier = path.into_inner();
    let caller = state.caller(&req);
    let started = Instant::now();

    let result = state
        .aggregator
        .assess_as(&identifier, caller.as_deref())
        .await;

    let outcome = match &result {
        Ok(a) if a.indeterminate => "indeterminate",
        Ok(a) if a.stale => "stale",
        Ok(_) => "complete",
        Err(risk_engine::Error::NotFound(_)) => "not_found",
        Err(risk_engine::Error::Invalid(_)) => "invalid",
        Err(_) => "unavailable",
    };
    ASSESSMENTS_TOTAL.with_label_values(&[outcome]).inc();
    ASSESSMENT_DURATION
        .with_label_values(&[outcome])
        .observe(started.elapsed().as_secs_f64());

    let response = result
        .map(|assessment| HttpResponse::Ok().json(assessment))
        .map_err(ApiError::from);
    record_request("GET", "/api/v1/risk/{identifier}", &response);
    response
}

// ===== Refresh Company =====
pub async fn refresh_company(
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let identifier = path.into_inner();

    let response = state
        .aggregator
        .refresh(&identifier)
        .await
        .map(|_| HttpResponse::Ok().json(serde_json::json!({ "refreshed": identifier })))
        .map_err(ApiError::from);
    record_request("POST", "/api/v1/risk/{identifier}/refresh", &response);
    response
}

// ===== Screen Name =====
pub async fn screen_name(
    req: HttpRequest,
    query: web::Query<ScreenParams>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let response = screen(&req, query.into_inner(), &state).await;
    record_request("GET", "/api/v1/sanctions/screen", &response);
    response
}

async fn screen(
    req: &HttpRequest,
    params: ScreenParams,
    state: &AppState,
) -> Result<HttpResponse, ApiError> {
    let name = params
        .name
        .ok_or_else(|| ApiError::Validation("query parameter 'name' is required".to_string()))?;
    let hint = params
        .entity_type
        .as_deref()
        .map(str::parse::<EntityType>)
        .transpose()
        .map_err(ApiError::Validation)?;

    let caller = state.caller(req);
    let result = state
        .aggregator
        .screen(&name, hint, caller.as_deref())
        .await?;

    let status = match result.status {
        ScreeningStatus::Complete => "complete",
        ScreeningStatus::Stale => "stale",
        ScreeningStatus::Indeterminate => "indeterminate",
    };
    SCREENINGS_TOTAL.with_label_values(&[status]).inc();

    Ok(HttpResponse::Ok().json(result))
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/risk/{identifier}", web::get().to(assess_company))
            .route("/risk/{identifier}/refresh", web::post().to(refresh_company))
            .route("/sanctions/screen", web::get().to(screen_name)),
    )
    .route("/health", web::get().to(health_check))
    .route("/metrics", web::get().to(metrics));
}
