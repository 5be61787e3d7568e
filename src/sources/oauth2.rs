use std::fmt;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use http::header::AUTHORIZATION;
use reqwest::Client;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cache::token::TokenPayload;
use crate::helpers::time::get_instant;
use crate::observability::metrics::get_metrics;
use crate::resilience::retry::RetrySettings;
use crate::sources::{FetchError, FetchToken};
use crate::utils::constants::{DEFAULT_REQUEST_TIMEOUT_MS, GRANT_TYPE_CLIENT_CREDENTIALS};

/// Credentials presented to the token endpoint.
#[derive(Clone)]
pub struct ClientCredentials {
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub scopes: Vec<String>,
}

impl fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("scopes", &self.scopes)
            .finish()
    }
}

impl ClientCredentials {
    /// Space-joined scope parameter, absent when no scope is configured.
    pub fn joined_scope(&self) -> Option<String> {
        let scopes: Vec<&str> = self
            .scopes
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect();
        (!scopes.is_empty()).then(|| scopes.join(" "))
    }
}

/// `Basic base64(id:secret)` header value.
pub fn basic_authorization(client_id: &str, client_secret: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{client_id}:{client_secret}")))
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<i64>,
    #[allow(dead_code)]
    token_type: Option<String>,
    #[allow(dead_code)]
    scope: Option<String>,
}

/// Parse a 2xx body. Unreadable JSON is transient, a readable body without
/// a usable token is a protocol violation.
pub(crate) fn parse_token_response(body: &str) -> Result<TokenPayload, FetchError> {
    let response: TokenResponse = serde_json::from_str(body)
        .map_err(|e| FetchError::Transient(format!("unreadable token response: {e}")))?;

    let access_token = response
        .access_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| FetchError::Malformed("missing access_token".to_owned()))?;
    let expires_in = response
        .expires_in
        .ok_or_else(|| FetchError::Malformed("missing expires_in".to_owned()))?;

    TokenPayload::new(access_token, expires_in).map_err(|e| FetchError::Malformed(e.to_string()))
}

/// Client-credentials grant against a single token endpoint.
#[derive(Debug, Clone)]
pub struct ClientCredentialsSource {
    client: Client,
    credentials: ClientCredentials,
    authorization: String,
    scope: Option<String>,
    request_timeout: Duration,
    retry: RetrySettings,
    cancel: CancellationToken,
}

impl ClientCredentialsSource {
    pub fn new(client: Client, credentials: ClientCredentials) -> Self {
        let authorization = basic_authorization(&credentials.client_id, &credentials.client_secret);
        let scope = credentials.joined_scope();
        Self {
            client,
            credentials,
            authorization,
            scope,
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            retry: RetrySettings::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_retry(mut self, retry: RetrySettings) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    /// Fetches abort with [`FetchError::Cancelled`] once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn client_id(&self) -> &str {
        &self.credentials.client_id
    }

    async fn request_token(&self) -> Result<TokenPayload, FetchError> {
        let mut form: Vec<(&str, &str)> = vec![("grant_type", GRANT_TYPE_CLIENT_CREDENTIALS)];
        if let Some(scope) = &self.scope {
            form.push(("scope", scope.as_str()));
        }

        let response = self
            .client
            .post(&self.credentials.token_url)
            .timeout(self.request_timeout)
            .header(AUTHORIZATION, &self.authorization)
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        debug!("token endpoint answered {}", status);

        if status.is_success() {
            let body = response.text().await?;
            return parse_token_response(&body);
        }

        let body = response.text().await.unwrap_or_default();
        if status.is_server_error() {
            Err(FetchError::Transient(format!("HTTP {} - {}", status.as_u16(), body)))
        } else {
            Err(FetchError::Rejected {
                status: status.as_u16(),
                body,
            })
        }
    }
}

impl FetchToken for ClientCredentialsSource {
    async fn fetch_token(&self) -> Result<TokenPayload, FetchError> {
        let metrics = get_metrics().await;
        let start = get_instant();
        let client_id = self.credentials.client_id.as_str();

        let result = self
            .retry
            .run_with_retry(&self.cancel, || async move {
                let attempt = self.request_token().await;
                let outcome = match &attempt {
                    Ok(_) => "success",
                    Err(e) => e.reason(),
                };
                metrics.token_fetch_attempts.with_label_values(&[client_id, outcome]).inc();
                attempt
            })
            .await;

        metrics.token_fetch_duration.with_label_values(&[client_id]).observe(start.elapsed().as_secs_f64());
        match &result {
            Ok(payload) => {
                metrics.token_expiry_unix.with_label_values(&[client_id]).set(payload.expires_at().timestamp());
                info!(
                    "client '{}' obtained token valid for {}s",
                    client_id,
                    payload.expires_in()
                );
            }
            Err(e) => {
                metrics.token_fetch_failures.with_label_values(&[client_id, e.reason()]).inc();
            }
        }
        result
    }
}
