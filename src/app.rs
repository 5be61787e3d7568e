//! Builds the configured sides of the service and runs them until shutdown.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::cache::token_cache::TokenCache;
use crate::config::sources::{ClientConfig, IssuerConfig, KeysConfig, ServiceConfig};
use crate::issuer::client_store::{ClientRecord, InMemoryClientStore};
use crate::issuer::keys::{RsaKeyPair, DEFAULT_KEY_BITS};
use crate::issuer::service::IssuanceService;
use crate::issuer::signer::RsaTokenSigner;
use crate::observability::metrics::get_metrics;
use crate::resilience::retry::RetrySettings;
use crate::server::server::{self, AppState};
use crate::server::token_endpoint::IssuerState;
use crate::sinks::auth_header::AuthHeader;
use crate::sinks::sink_http::SinkHttpState;
use crate::sources::executor::token_refresh::TokenRefresher;
use crate::sources::oauth2::{ClientCredentials, ClientCredentialsSource};
use crate::utils::constants::{
    DEFAULT_REFRESH_INTERVAL_SECONDS, DEFAULT_REQUEST_TIMEOUT_MS, DEFAULT_SKEW_SECONDS, DEFAULT_TOKEN_PATH,
};

/// Token-consuming side, ready to use.
pub struct ClientRuntime {
    pub auth_header: AuthHeader<ClientCredentialsSource>,
    pub refresh_interval: Duration,
}

impl ClientRuntime {
    pub fn cache(&self) -> &Arc<TokenCache<ClientCredentialsSource>> {
        self.auth_header.cache()
    }
}

/// Resolve secrets and assemble source, cache and header decorator.
/// Fetches stop with a cancellation error once `cancel` fires.
pub fn build_client(config: &ClientConfig, http: Client, cancel: CancellationToken) -> Result<ClientRuntime> {
    let credentials = ClientCredentials {
        token_url: config.token_url.clone(),
        client_id: config.client_id.resolve().context("client.client_id")?,
        client_secret: config.client_secret.resolve().context("client.client_secret")?,
        scopes: config.scopes.clone(),
    };
    info!("client configured: {:?}", credentials);

    let source = ClientCredentialsSource::new(http, credentials)
        .with_retry(RetrySettings::from(config.retry.as_ref()))
        .with_request_timeout(Duration::from_millis(
            config.request_timeout_ms.unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS),
        ))
        .with_cancellation(cancel);

    let skew = Duration::from_secs(config.skew_seconds.unwrap_or(DEFAULT_SKEW_SECONDS));
    let cache = Arc::new(TokenCache::with_skew(source, skew));
    let auth_header = AuthHeader::new(cache, config.header_name.as_deref())
        .context("client.header_name")?;

    Ok(ClientRuntime {
        auth_header,
        refresh_interval: Duration::from_secs(
            config.refresh_interval_seconds.unwrap_or(DEFAULT_REFRESH_INTERVAL_SECONDS),
        ),
    })
}

/// Resolve key material and provisioned clients into an issuance service.
pub fn build_issuance_service(config: &IssuerConfig) -> Result<IssuanceService> {
    let keys = match &config.keys {
        KeysConfig::Pem { public_pem, private_pem } => RsaKeyPair::from_pem(
            &public_pem.resolve().context("issuer.keys.public_pem")?,
            &private_pem.resolve().context("issuer.keys.private_pem")?,
        )?,
        KeysConfig::Ephemeral { bits } => RsaKeyPair::generate(bits.unwrap_or(DEFAULT_KEY_BITS))?,
    };

    let mut signer = RsaTokenSigner::new(
        keys,
        config.issuer.clone(),
        config.audience.clone(),
        Duration::from_secs(config.token_ttl_seconds),
    );
    if let Some(key_id) = &config.key_id {
        signer = signer.with_key_id(key_id.clone());
    }

    let records = config
        .clients
        .iter()
        .map(|client| -> Result<ClientRecord> {
            let secret = client
                .secret
                .resolve()
                .with_context(|| format!("issuer.clients['{}'].secret", client.id))?;
            Ok(ClientRecord::new(client.id.trim(), secret, client.scopes.iter().map(|s| s.trim())))
        })
        .collect::<Result<Vec<_>>>()?;
    let store = InMemoryClientStore::new(records);
    info!("issuer '{}' configured with {} clients", config.issuer, store.len());

    Ok(IssuanceService::new(Arc::new(store), Arc::new(signer)).with_scope_policy(config.scope_policy))
}

/// Cancel `shutdown` once `signal` resolves. A signal listener that fails
/// leaves the service running instead of stopping it.
pub async fn cancel_on_signal<F>(signal: F, shutdown: CancellationToken)
where
    F: Future<Output = std::io::Result<()>>,
{
    match signal.await {
        Ok(()) => {
            info!("shutdown requested");
            shutdown.cancel();
        }
        Err(e) => error!("failed to listen for shutdown signal: {}", e),
    }
}

/// Run every configured side until `shutdown` is cancelled.
pub async fn run_app(service_config: Arc<ServiceConfig>, shutdown: CancellationToken) -> Result<()> {
    let metrics = get_metrics().await;

    let issuer_state = match &service_config.issuer {
        Some(issuer) => {
            let service = build_issuance_service(issuer)?;
            let token_path = issuer.token_path.as_deref().unwrap_or(DEFAULT_TOKEN_PATH);
            Some(IssuerState::new(service, token_path))
        }
        None => None,
    };

    let mut refresher = None;
    let mut sink_http_state = None;
    if let Some(client) = &service_config.client {
        let http = Client::builder().build().context("failed to build HTTP client")?;
        let runtime = build_client(client, http, shutdown.child_token())?;

        // first check right away so the token is warm before anyone asks
        refresher = Some(TokenRefresher::start_with_delay(
            runtime.cache().clone(),
            Duration::ZERO,
            runtime.refresh_interval,
        ));
        sink_http_state = client
            .sink
            .as_ref()
            .map(|sink| SinkHttpState::new(&sink.path, runtime.auth_header.clone()));
    }

    let state = AppState::new(metrics, issuer_state, sink_http_state);
    let served = server::start(&service_config.settings, state, shutdown.clone()).await;

    if let Some(refresher) = refresher {
        refresher.shutdown().await;
    }
    info!("service stopped");
    served
}
