use std::collections::BTreeSet;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, error, info};

use crate::issuer::client_store::ClientStore;
use crate::issuer::signer::TokenSigner;
use crate::utils::constants::{GRANT_TYPE_CLIENT_CREDENTIALS, TOKEN_TYPE_BEARER};

pub const INVALID_REQUEST: &str = "invalid_request";
pub const UNSUPPORTED_GRANT_TYPE: &str = "unsupported_grant_type";
pub const INVALID_CLIENT: &str = "invalid_client";
pub const INVALID_SCOPE: &str = "invalid_scope";
pub const SERVER_ERROR: &str = "server_error";

/// What to do with requested scopes the client was never provisioned for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopePolicy {
    /// Drop them and grant the rest.
    #[default]
    Partial,
    /// Reject the whole request with `invalid_scope`.
    Strict,
}

/// Inbound token request.
#[derive(Debug, Clone, Default)]
pub struct TokenRequest {
    /// Raw `Authorization` header value.
    pub authorization: Option<String>,
    pub grant_type: String,
    pub scope: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenResult {
    Success {
        access_token: String,
        token_type: &'static str,
        expires_in: u64,
        scope: String,
        expires_at: DateTime<Utc>,
    },
    Error {
        http_status: u16,
        error_code: &'static str,
    },
}

impl TokenResult {
    fn error(http_status: u16, error_code: &'static str) -> Self {
        TokenResult::Error { http_status, error_code }
    }
}

/// Decode `Basic base64(id:secret)`, splitting on the first colon.
pub fn parse_basic(authorization: Option<&str>) -> Option<(String, String)> {
    let encoded = authorization?.strip_prefix("Basic ")?.trim();
    let raw = STANDARD.decode(encoded).ok()?;
    let decoded = String::from_utf8(raw).ok()?;
    let (id, secret) = decoded.split_once(':')?;
    if id.is_empty() {
        return None;
    }
    Some((id.to_owned(), secret.to_owned()))
}

/// Whitespace-separated scopes, blanks discarded. `None` when nothing was asked.
fn requested_scopes(scope: Option<&str>) -> Option<BTreeSet<String>> {
    let requested: BTreeSet<String> = scope?.split_whitespace().map(str::to_owned).collect();
    (!requested.is_empty()).then_some(requested)
}

/// Client-credentials token endpoint logic. Keeps no state between calls.
#[derive(Clone)]
pub struct IssuanceService {
    store: Arc<dyn ClientStore>,
    signer: Arc<dyn TokenSigner>,
    scope_policy: ScopePolicy,
}

impl IssuanceService {
    pub fn new(store: Arc<dyn ClientStore>, signer: Arc<dyn TokenSigner>) -> Self {
        Self {
            store,
            signer,
            scope_policy: ScopePolicy::default(),
        }
    }

    pub fn with_scope_policy(mut self, scope_policy: ScopePolicy) -> Self {
        self.scope_policy = scope_policy;
        self
    }

    pub fn handle(&self, request: &TokenRequest) -> TokenResult {
        if request.grant_type != GRANT_TYPE_CLIENT_CREDENTIALS {
            debug!("rejecting grant type '{}'", request.grant_type);
            return TokenResult::error(400, UNSUPPORTED_GRANT_TYPE);
        }

        let Some((client_id, client_secret)) = parse_basic(request.authorization.as_deref()) else {
            return TokenResult::error(401, INVALID_CLIENT);
        };

        if !self.store.authenticate(&client_id, &client_secret) {
            info!("client authentication failed");
            return TokenResult::error(401, INVALID_CLIENT);
        }

        let allowed = self.store.allowed_scopes(&client_id);
        let granted: BTreeSet<String> = match requested_scopes(request.scope.as_deref()) {
            None => allowed,
            Some(requested) => {
                if self.scope_policy == ScopePolicy::Strict && !requested.is_subset(&allowed) {
                    info!("client '{}' requested scopes outside its grant", client_id);
                    return TokenResult::error(400, INVALID_SCOPE);
                }
                requested.intersection(&allowed).cloned().collect()
            }
        };

        match self.signer.issue(&client_id, &granted) {
            Ok(issued) => {
                let scope = granted.into_iter().collect::<Vec<_>>().join(" ");
                info!("issued token for client '{}' with scope '{}'", client_id, scope);
                TokenResult::Success {
                    access_token: issued.token,
                    token_type: TOKEN_TYPE_BEARER,
                    expires_in: issued.expires_in_seconds,
                    scope,
                    expires_at: issued.expires_at,
                }
            }
            Err(e) => {
                error!("token signing failed for client '{}': {}", client_id, e);
                TokenResult::error(500, SERVER_ERROR)
            }
        }
    }
}
