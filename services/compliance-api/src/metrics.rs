use compliance_infra::CacheMetrics;
use lazy_static::lazy_static;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

lazy_static! {
    // HTTP metrics
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"]
    ).expect("metric can be created");

    // Business metrics
    pub static ref ASSESSMENTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("risk_assessments_total", "Risk assessments by outcome"),
        &["outcome"]
    ).expect("metric can be created");

    pub static ref ASSESSMENT_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new("risk_assessment_duration_seconds", "Risk assessment duration in seconds")
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0]),
        &["outcome"]
    ).expect("metric can be created");

    pub static ref SCREENINGS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("sanctions_screenings_total", "Sanctions screenings by status"),
        &["status"]
    ).expect("metric can be created");

    // Cache metrics, copied from the store's counters on every scrape
    pub static ref CACHE_HITS: IntGauge = IntGauge::new(
        "cache_hits",
        "Cache hits since start"
    ).expect("metric can be created");

    pub static ref CACHE_MISSES: IntGauge = IntGauge::new(
        "cache_misses",
        "Cache misses since start"
    ).expect("metric can be created");
}

/// Register all metrics with the given registry
pub fn register_metrics(registry: &Registry) -> prometheus::Result<()> {
    registry.register(Box::new(HTTP_REQUESTS_TOTAL.clone()))?;

    registry.register(Box::new(ASSESSMENTS_TOTAL.clone()))?;
    registry.register(Box::new(ASSESSMENT_DURATION.clone()))?;
    registry.register(Box::new(SCREENINGS_TOTAL.clone()))?;

    registry.register(Box::new(CACHE_HITS.clone()))?;
    registry.register(Box::new(CACHE_MISSES.clone()))?;

    Ok(())
}

pub fn record_cache(metrics: CacheMetrics) {
    CACHE_HITS.set(metrics.hits as i64);
    CACHE_MISSES.set(metrics.misses as i64);
}

/// Generate metrics output in Prometheus text format
pub fn metrics_handler(registry: &Registry) -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
