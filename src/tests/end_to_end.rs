// Both sides over real HTTP:
//  - issuer router served by axum, client fetching from it
//  - downstream httpmock asserting the injected header
//  - whole app started from YAML and shut down through its cancellation token

use std::sync::Arc;
use std::time::Duration;

use http::StatusCode;
use httpmock::Method::GET;
use httpmock::MockServer;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::app::{cancel_on_signal, run_app};
use crate::cache::token_cache::TokenCache;
use crate::config::proc_loader::parse_config;
use crate::config::settings::SettingsConfig;
use crate::issuer::client_store::{ClientRecord, InMemoryClientStore};
use crate::issuer::service::IssuanceService;
use crate::issuer::signer::RsaTokenSigner;
use crate::observability::metrics::get_metrics;
use crate::server::server::{build_router, AppState};
use crate::server::token_endpoint::IssuerState;
use crate::sinks::auth_header::AuthHeader;
use crate::sources::oauth2::{basic_authorization, ClientCredentials, ClientCredentialsSource};
use crate::tests::common::{build_reqwest_client, spawn_axum, test_keys, JoinHandle};

const TTL_SECONDS: u64 = 900;

fn rsa_signer() -> RsaTokenSigner {
    RsaTokenSigner::new(
        test_keys(),
        "https://auth.internal",
        "internal-services",
        Duration::from_secs(TTL_SECONDS),
    )
}

async fn spawn_issuer() -> (JoinHandle<()>, String) {
    let store = InMemoryClientStore::new([ClientRecord::new("c1", "s1", ["read", "write"])]);
    let service = IssuanceService::new(Arc::new(store), Arc::new(rsa_signer()));
    let issuer_state = IssuerState::new(service, "oauth2/token");

    let mut settings = SettingsConfig::default();
    settings.metrics.is_enabled = true;
    let state = AppState::new(get_metrics().await, Some(issuer_state), None);

    let (handle, addr) = spawn_axum(build_router(&settings, state)).await;
    (handle, format!("http://{}", addr))
}

fn client_source(base_url: &str, secret: &str, scopes: &[&str]) -> ClientCredentialsSource {
    ClientCredentialsSource::new(
        build_reqwest_client(),
        ClientCredentials {
            token_url: format!("{}/oauth2/token", base_url),
            client_id: "c1".to_owned(),
            client_secret: secret.to_owned(),
            scopes: scopes.iter().map(|s| s.to_string()).collect(),
        },
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn issued_token_is_partial_grant_with_configured_ttl() -> anyhow::Result<()> {
    let (handle, base_url) = spawn_issuer().await;

    let response = build_reqwest_client()
        .post(format!("{}/oauth2/token", base_url))
        .header("Authorization", basic_authorization("c1", "s1"))
        .form(&[("grant_type", "client_credentials"), ("scope", "read admin")])
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["cache-control"], "no-store");
    let json: Value = response.json().await?;
    assert_eq!(json["token_type"], "Bearer");
    assert_eq!(json["scope"], "read");
    assert_eq!(json["expires_in"], TTL_SECONDS);

    let claims = rsa_signer().verify(json["access_token"].as_str().unwrap())?;
    assert_eq!(claims.sub, "c1");
    assert_eq!(claims.scp, vec!["read".to_owned()]);

    handle.abort();
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn error_results_map_to_oauth2_responses() -> anyhow::Result<()> {
    let (handle, base_url) = spawn_issuer().await;
    let http = build_reqwest_client();
    let url = format!("{}/oauth2/token", base_url);

    let bad_secret = http
        .post(&url)
        .header("Authorization", basic_authorization("c1", "nope"))
        .form(&[("grant_type", "client_credentials")])
        .send()
        .await?;
    assert_eq!(bad_secret.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(bad_secret.headers()["www-authenticate"], "Basic");
    let json: Value = bad_secret.json().await?;
    assert_eq!(json["error"], "invalid_client");

    let bad_grant = http
        .post(&url)
        .header("Authorization", basic_authorization("c1", "s1"))
        .form(&[("grant_type", "password")])
        .send()
        .await?;
    assert_eq!(bad_grant.status(), StatusCode::BAD_REQUEST);
    let json: Value = bad_grant.json().await?;
    assert_eq!(json["error"], "unsupported_grant_type");

    let metrics = http.get(format!("{}/metrics", base_url)).send().await?.text().await?;
    assert!(metrics.contains("m2mauth_issuance_failures_total"));

    handle.abort();
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unparseable_token_body_is_invalid_request() -> anyhow::Result<()> {
    let (handle, base_url) = spawn_issuer().await;
    let http = build_reqwest_client();
    let url = format!("{}/oauth2/token", base_url);

    let as_json = http
        .post(&url)
        .header("Authorization", basic_authorization("c1", "s1"))
        .header("Content-Type", "application/json")
        .body(r#"{"grant_type":"client_credentials"}"#)
        .send()
        .await?;
    assert_eq!(as_json.status(), StatusCode::BAD_REQUEST);
    let json: Value = as_json.json().await?;
    assert_eq!(json, serde_json::json!({ "error": "invalid_request" }));

    let bad_field = http
        .post(&url)
        .header("Authorization", basic_authorization("c1", "s1"))
        .header("Content-Type", "application/x-www-form-urlencoded")
        .body("grant_type=client_credentials&grant_type=password")
        .send()
        .await?;
    assert_eq!(bad_field.status(), StatusCode::BAD_REQUEST);
    let json: Value = bad_field.json().await?;
    assert_eq!(json["error"], "invalid_request");

    let metrics = http.get(format!("{}/metrics", base_url)).send().await?.text().await?;
    assert!(metrics.contains(r#"error="invalid_request""#), "{metrics}");

    handle.abort();
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn client_fetches_from_issuer_and_decorates_downstream_calls() -> anyhow::Result<()> {
    // -------------------------------
    // 1. Issuer and downstream service
    // -------------------------------
    let (handle, base_url) = spawn_issuer().await;
    let downstream = MockServer::start_async().await;
    let downstream_mock = downstream.mock(|when, then| {
        when.method(GET)
            .path("/orders")
            .header_exists("x-internal-auth");
        then.status(200).body("ok");
    });

    // -------------------------------
    // 2. Client side: cache + header decorator
    // -------------------------------
    let cache = Arc::new(TokenCache::new(client_source(&base_url, "s1", &["read", "write"])));
    let auth = AuthHeader::new(cache.clone(), Some("X-Internal-Auth"))?;

    let request = auth.add(build_reqwest_client().get(downstream.url("/orders"))).await?;
    let response = request.send().await?;
    assert_eq!(response.status(), StatusCode::OK);
    downstream_mock.assert();

    // -------------------------------
    // 3. Header carries the cached, verifiable token
    // -------------------------------
    let value = auth.header_value().await?;
    let token = value.to_str()?.strip_prefix("Bearer ").unwrap().to_owned();
    let claims = rsa_signer().verify(&token)?;
    assert_eq!(claims.scp, vec!["read".to_owned(), "write".to_owned()]);
    assert_eq!(cache.current_payload().unwrap().expires_in(), TTL_SECONDS);

    handle.abort();
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn client_with_wrong_secret_is_rejected_once() -> anyhow::Result<()> {
    let (handle, base_url) = spawn_issuer().await;
    let cache = TokenCache::new(client_source(&base_url, "wrong", &[]));

    let err = cache.current_token().await.unwrap_err();
    assert!(err.to_string().contains("401"), "got {}", err);

    handle.abort();
    Ok(())
}

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn app_serves_issuer_and_sink_until_shutdown() -> anyhow::Result<()> {
    // -------------------------------
    // 1. One process acting as issuer and as its own client
    // -------------------------------
    let port = free_port();
    let yaml = format!(
        r#"
settings:
  server:
    host: 127.0.0.1
    port: "{port}"
  metrics:
    is_enabled: true
  logging:
    level: debug
    format: compact
client:
  token_url: "http://127.0.0.1:{port}/oauth2/token"
  client_id:
    value: c1
  client_secret:
    value: s1
  scopes: [read]
  refresh_interval_seconds: 1
  retry:
    attempts: 3
    base_delay_ms: 50
    max_delay_ms: 200
  sink:
    path: /token
issuer:
  issuer: https://auth.internal
  audience: internal-services
  token_ttl_seconds: 300
  keys:
    type: ephemeral
  clients:
    - id: c1
      secret:
        value: s1
      scopes: [read, write]
"#
    );
    let service_config = Arc::new(parse_config(yaml).await?);

    let shutdown = CancellationToken::new();
    let app_task = tokio::spawn(run_app(service_config, shutdown.clone()));

    // -------------------------------
    // 2. Poll the sink until the refresher has warmed the cache
    // -------------------------------
    let http = build_reqwest_client();
    let sink_url = format!("http://127.0.0.1:{port}/token");
    let mut served = None;
    for _ in 0..100 {
        if let Ok(response) = http.get(&sink_url).send().await {
            if response.status() == StatusCode::OK {
                served = Some(response.json::<Value>().await?);
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    let served = served.expect("sink should serve a token");
    assert_eq!(served["header"], "secured-authorization");
    assert!(served["value"].as_str().unwrap().starts_with("Bearer "));

    // -------------------------------
    // 3. Graceful shutdown
    // -------------------------------
    shutdown.cancel();
    let result = tokio::time::timeout(Duration::from_secs(10), app_task).await??;
    assert!(result.is_ok());

    Ok(())
}

#[tokio::test]
async fn failed_signal_listener_leaves_service_running() {
    let shutdown = CancellationToken::new();
    let signal = async { Err(std::io::Error::other("no signal handler")) };

    cancel_on_signal(signal, shutdown.clone()).await;

    assert!(!shutdown.is_cancelled());
}

#[tokio::test]
async fn received_signal_cancels_shutdown_token() {
    let shutdown = CancellationToken::new();

    cancel_on_signal(async { Ok(()) }, shutdown.clone()).await;

    assert!(shutdown.is_cancelled());
}
