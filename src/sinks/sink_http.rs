use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::observability::metrics::get_metrics;
use crate::server::server::AppState;
use crate::sinks::auth_header::AuthHeader;
use crate::sources::oauth2::ClientCredentialsSource;

static ERROR_MSG: &'static str = "error";
static SUCCESS_MSG: &'static str = "success";

/// Passive sink: co-located processes read the managed token over HTTP.
#[derive(Clone)]
pub struct SinkHttpState {
    path: String,
    auth_header: AuthHeader<ClientCredentialsSource>,
}

impl SinkHttpState {
    pub fn new(path: &str, auth_header: AuthHeader<ClientCredentialsSource>) -> Self {
        let path = if path.starts_with('/') {
            path.to_owned()
        } else {
            format!("/{}", path)
        };
        Self { path, auth_header }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn router(&self) -> Router<AppState> {
        info!("served token sink path: {}", &self.path);
        Router::new().route(&self.path, get(handle_token_request))
    }
}

async fn handle_token_request(State(state): State<AppState>) -> Response {
    let Some(sink) = state.sink_http_state.as_ref() else {
        return (StatusCode::NOT_FOUND, "not found").into_response();
    };
    let metrics = get_metrics().await;
    let start = Instant::now();

    let result = sink.auth_header.cache().current_token().await;
    metrics
        .sink_duration
        .with_label_values(&[sink.path.as_str()])
        .observe(start.elapsed().as_secs_f64());

    match result {
        Ok(token) => {
            metrics.sink_requests.with_label_values(&[sink.path.as_str(), SUCCESS_MSG]).inc();
            Json(json!({
                "header": sink.auth_header.header_name().as_str(),
                "value": format!("Bearer {}", token),
            }))
            .into_response()
        }
        Err(e) => {
            warn!("token sink {} has no token to serve: {}", sink.path, e);
            metrics.sink_requests.with_label_values(&[sink.path.as_str(), ERROR_MSG]).inc();
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}
