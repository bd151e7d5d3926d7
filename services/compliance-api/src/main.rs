use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use compliance_api::{config::Config, handlers, metrics, AppState};
use compliance_infra::{CacheStore, InMemoryCache, RateLimiter, RedisCache};
use compliance_service::{
    NameMatcher, OpenSanctionsClient, SanctionsListStore, SanctionsScreener, SanctionsSource,
};
use dotenv::dotenv;
use prometheus::Registry;
use risk_engine::{KvkClient, RegistryClient, RiskAggregator};
use std::fs::File;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .json()
        .init();

    info!("Starting Compliance API...");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    config.engine.validate()?;
    info!("Configuration loaded successfully");

    let registry = Registry::new();
    metrics::register_metrics(&registry)?;

    // Initialize components
    let cache = build_cache(&config).await;
    let limiter = Arc::new(RateLimiter::new(config.engine.rate_limits.clone())?);
    Arc::clone(&limiter).start_cleanup_task(
        config.maintenance.interval(),
        config.maintenance.bucket_idle(),
    );
    let matcher = Arc::new(NameMatcher::new(config.engine.matcher.clone())?);
    let source = build_sanctions_source(&config)?;
    let screener = Arc::new(SanctionsScreener::new(
        source,
        matcher,
        cache.clone(),
        limiter.clone(),
        config.engine.screener.clone(),
    )?);

    let kvk: Arc<dyn RegistryClient> = Arc::new(KvkClient::new(config.kvk.clone())?);
    let aggregator = Arc::new(RiskAggregator::new(
        kvk,
        screener,
        cache,
        limiter,
        Arc::new(config.engine.clone()),
    )?);
    info!("Risk components initialized: {:?}", aggregator);

    let state = web::Data::new(AppState::new(
        aggregator,
        registry,
        config.security.caller_hash_key.clone(),
    ));
    let server_config = config.server.clone();

    info!(
        "Starting HTTP server on {}:{}",
        server_config.host, server_config.port
    );

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allow_any_method()
                    .allow_any_header()
                    .max_age(3600),
            )
            .wrap(middleware::Logger::default())
            .configure(handlers::configure_routes)
    })
    .workers(server_config.workers)
    .bind((server_config.host, server_config.port))?
    .run()
    .await?;

    Ok(())
}

/// Redis when configured and reachable, the in-process cache otherwise
async fn build_cache(config: &Config) -> Arc<dyn CacheStore> {
    if let Some(url) = &config.redis.url {
        let op_timeout = Duration::from_millis(config.redis.op_timeout_ms);
        match RedisCache::connect(url, op_timeout).await {
            Ok(cache) => {
                info!("Using Redis cache");
                return Arc::new(cache);
            }
            Err(e) => warn!("Redis unavailable, falling back to in-memory cache: {}", e),
        }
    }
    let cache = Arc::new(InMemoryCache::new());
    Arc::clone(&cache).start_purge_task(config.maintenance.interval());
    cache
}

/// OpenSanctions when an API key is set, the local list otherwise
fn build_sanctions_source(config: &Config) -> anyhow::Result<Arc<dyn SanctionsSource>> {
    if config.opensanctions.api_key.is_some() {
        let client = OpenSanctionsClient::new(
            config.opensanctions.clone(),
            config.engine.screener.source_priority.clone(),
        )?;
        return Ok(Arc::new(client));
    }

    let store = SanctionsListStore::new(config.sanctions.list_name.clone());
    match &config.sanctions.csv_path {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("Failed to open sanctions list {}", path))?;
            let loaded = store.load_csv(&config.sanctions.list_name, file)?;
            info!("Loaded {} sanctions entries from {}", loaded, path);
        }
        None => warn!("No sanctions source configured; screenings will be indeterminate"),
    }
    Ok(Arc::new(store))
}
