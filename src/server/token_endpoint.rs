use axum::{
    extract::{rejection::FormRejection, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Form, Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::issuer::service::{IssuanceService, TokenRequest, TokenResult, INVALID_REQUEST};
use crate::observability::metrics::get_metrics;
use crate::server::server::AppState;

#[derive(Clone)]
pub struct IssuerState {
    service: IssuanceService,
    token_path: String,
}

impl IssuerState {
    pub fn new(service: IssuanceService, token_path: &str) -> Self {
        let token_path = if token_path.starts_with('/') {
            token_path.to_owned()
        } else {
            format!("/{}", token_path)
        };
        Self { service, token_path }
    }

    pub fn router(&self) -> Router<AppState> {
        info!("served token endpoint path: {}", &self.token_path);
        Router::new().route(&self.token_path, post(handle_token_request))
    }
}

/// `application/x-www-form-urlencoded` body of a token request.
#[derive(Debug, Default, Deserialize)]
pub struct TokenForm {
    pub grant_type: Option<String>,
    pub scope: Option<String>,
}

async fn handle_token_request(
    State(state): State<AppState>,
    headers: HeaderMap,
    form: Result<Form<TokenForm>, FormRejection>,
) -> Response {
    let Some(issuer) = state.issuer_state.as_ref() else {
        return (StatusCode::NOT_FOUND, "not found").into_response();
    };

    let form = match form {
        Ok(Form(form)) => form,
        Err(rejection) => {
            debug!("token request body rejected: {}", rejection);
            get_metrics()
                .await
                .issuance_failures
                .with_label_values(&[INVALID_REQUEST])
                .inc();
            return token_result_response(TokenResult::Error {
                http_status: StatusCode::BAD_REQUEST.as_u16(),
                error_code: INVALID_REQUEST,
            });
        }
    };

    let request = TokenRequest {
        authorization: headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned),
        grant_type: form.grant_type.unwrap_or_default(),
        scope: form.scope,
    };

    let result = issuer.service.handle(&request);

    let metrics = get_metrics().await;
    match &result {
        TokenResult::Success { .. } => metrics.issued_tokens.inc(),
        TokenResult::Error { error_code, .. } => {
            metrics.issuance_failures.with_label_values(&[*error_code]).inc()
        }
    }

    token_result_response(result)
}

/// Map a [`TokenResult`] onto the OAuth2 token response.
pub fn token_result_response(result: TokenResult) -> Response {
    match result {
        TokenResult::Success {
            access_token,
            token_type,
            expires_in,
            scope,
            ..
        } => (
            StatusCode::OK,
            [(header::CACHE_CONTROL, HeaderValue::from_static("no-store"))],
            Json(json!({
                "access_token": access_token,
                "token_type": token_type,
                "expires_in": expires_in,
                "scope": scope,
            })),
        )
            .into_response(),
        TokenResult::Error {
            http_status,
            error_code,
        } => {
            let status = StatusCode::from_u16(http_status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            let mut response = (status, Json(json!({ "error": error_code }))).into_response();
            if status == StatusCode::UNAUTHORIZED {
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Basic"));
            }
            response
        }
    }
}
