use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;

// Declare the static OnceCell to hold the Metrics.
static METRICS_INSTANCE: OnceCell<Arc<Metrics>> = OnceCell::const_new();

/// Lazily builds the process-wide metrics registry.
pub async fn get_metrics() -> &'static Arc<Metrics> {
    METRICS_INSTANCE
        .get_or_init(|| async {
            info!("Initializing Metrics ...");
            Arc::new(Metrics::new().expect("static metric definitions must register"))
        })
        .await
}

#[derive(Clone)]
pub struct Metrics {
    pub registry: Registry,

    // Client: token fetch
    pub token_fetch_attempts: IntCounterVec,
    pub token_fetch_failures: IntCounterVec,
    pub token_fetch_duration: HistogramVec,
    pub token_expiry_unix: IntGaugeVec,
    pub token_refresh_runs: IntCounterVec,

    // Client: passive sink
    pub sink_requests: IntCounterVec,
    pub sink_duration: HistogramVec,

    // Issuer
    pub issued_tokens: IntCounter,
    pub issuance_failures: IntCounterVec,

    // Config/runtime
    pub up: IntGauge,
}

impl Metrics {
    fn new() -> prometheus::Result<Self> {
        let registry = Registry::new_custom(Some("m2mauth".into()), None)?;

        let metrics = Self {
            // Fetch
            token_fetch_attempts: IntCounterVec::new(Opts::new("token_fetch_attempts_total", "Token endpoint attempts by outcome"), &["client", "outcome"])?,
            token_fetch_failures: IntCounterVec::new(Opts::new("token_fetch_failures_total", "Failed token fetches by reason"), &["client", "reason"])?,
            token_fetch_duration: HistogramVec::new(HistogramOpts::new("token_fetch_duration_seconds", "Token fetch duration seconds, retries included").buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]), &["client"])?,
            token_expiry_unix: IntGaugeVec::new(Opts::new("token_expiry_unix_seconds", "Expiry of the cached token"), &["client"])?,
            token_refresh_runs: IntCounterVec::new(Opts::new("token_refresh_runs_total", "Background refresh checks by result"), &["result"])?,

            // Sink
            sink_requests: IntCounterVec::new(Opts::new("sink_requests_total", "Token sink requests"), &["path", "result"])?,
            sink_duration: HistogramVec::new(HistogramOpts::new("sink_request_duration_seconds", "Token sink request time").buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]), &["path"])?,

            // Issuer
            issued_tokens: IntCounter::new("issued_tokens_total", "Tokens issued")?,
            issuance_failures: IntCounterVec::new(Opts::new("issuance_failures_total", "Rejected token requests by error code"), &["error"])?,

            up: IntGauge::new("up", "1 if service is healthy")?,

            registry,
        };

        // Register all metrics in the registry
        let reg = &metrics.registry;
        reg.register(Box::new(metrics.token_fetch_attempts.clone()))?;
        reg.register(Box::new(metrics.token_fetch_failures.clone()))?;
        reg.register(Box::new(metrics.token_fetch_duration.clone()))?;
        reg.register(Box::new(metrics.token_expiry_unix.clone()))?;
        reg.register(Box::new(metrics.token_refresh_runs.clone()))?;
        reg.register(Box::new(metrics.sink_requests.clone()))?;
        reg.register(Box::new(metrics.sink_duration.clone()))?;
        reg.register(Box::new(metrics.issued_tokens.clone()))?;
        reg.register(Box::new(metrics.issuance_failures.clone()))?;
        reg.register(Box::new(metrics.up.clone()))?;

        Ok(metrics)
    }
}
