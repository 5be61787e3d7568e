use anyhow::{Context, Result};
use axum::Router;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::settings::SettingsConfig;
use crate::observability::metrics::{get_metrics, Metrics};
use crate::observability::routes::MetricsState;
use crate::server::token_endpoint::IssuerState;
use crate::sinks::sink_http::SinkHttpState;

#[derive(Clone)]
pub struct AppState {
    pub metrics_state: MetricsState,
    pub issuer_state: Option<IssuerState>,
    pub sink_http_state: Option<SinkHttpState>,
}

impl AppState {
    pub fn new(
        metrics: &Metrics,
        issuer_state: Option<IssuerState>,
        sink_http_state: Option<SinkHttpState>,
    ) -> Self {
        Self {
            metrics_state: MetricsState::new(metrics.registry.clone()),
            issuer_state,
            sink_http_state,
        }
    }
}

/// One router for everything this process serves.
pub fn build_router(settings_config: &SettingsConfig, state: AppState) -> Router {
    let mut router = Router::new().merge(state.metrics_state.router(&settings_config.metrics));
    if let Some(issuer_state) = &state.issuer_state {
        router = router.merge(issuer_state.router());
    }
    if let Some(sink_http_state) = &state.sink_http_state {
        router = router.merge(sink_http_state.router());
    }
    router.with_state(state)
}

/// Serve until `shutdown` is cancelled.
pub async fn start(
    settings_config: &SettingsConfig,
    state: AppState,
    shutdown: CancellationToken,
) -> Result<()> {
    let metrics = get_metrics().await;
    let app = build_router(settings_config, state);

    if !app.has_routes() {
        info!("nothing to serve over HTTP");
        shutdown.cancelled().await;
        return Ok(());
    }

    let bind_addr = format!("{}:{}", settings_config.server.host, settings_config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;
    info!("listening on {}", listener.local_addr()?);

    metrics.up.set(1);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    metrics.up.set(0);

    Ok(())
}
