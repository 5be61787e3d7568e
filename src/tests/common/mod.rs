// tests/common/mod.rs
pub use axum::Router;
pub use serde_json::json;
pub use tokio::task::JoinHandle;

use std::collections::{BTreeSet, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;

use crate::cache::token::TokenPayload;
use crate::issuer::client_store::{ClientStore, InMemoryClientStore};
use crate::issuer::keys::RsaKeyPair;
use crate::issuer::signer::{Issued, SignError, TokenSigner};
use crate::sources::{FetchError, FetchToken};

/// Spawn an Axum router on an ephemeral port and return (JoinHandle, SocketAddr)
pub async fn spawn_axum(router: Router) -> (JoinHandle<()>, SocketAddr) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind failed");
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.expect("server failed");
    });
    (handle, addr)
}

pub fn build_reqwest_client() -> Client {
    Client::builder()
        .timeout(std::time::Duration::from_secs(5))
        .build()
        .expect("reqwest client")
}

/// One RSA key pair shared by every test in the binary; generation is slow.
pub fn test_keys() -> RsaKeyPair {
    static KEYS: OnceLock<RsaKeyPair> = OnceLock::new();
    KEYS.get_or_init(|| RsaKeyPair::generate(2048).expect("test key pair"))
        .clone()
}

/// Fetcher replaying scripted results, counting how often it was asked.
/// Once the script runs out every call yields `fallback`.
pub struct ScriptedFetcher {
    script: Mutex<VecDeque<Result<TokenPayload, FetchError>>>,
    fallback: Result<TokenPayload, FetchError>,
    delay: Duration,
    calls: Arc<AtomicUsize>,
}

impl ScriptedFetcher {
    pub fn always(result: Result<TokenPayload, FetchError>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: result,
            delay: Duration::ZERO,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn sequence(
        script: Vec<Result<TokenPayload, FetchError>>,
        fallback: Result<TokenPayload, FetchError>,
    ) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Self::always(fallback)
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

impl FetchToken for ScriptedFetcher {
    async fn fetch_token(&self) -> Result<TokenPayload, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }
}

pub fn payload(token: &str, expires_in: i64) -> TokenPayload {
    TokenPayload::new(token.to_owned(), expires_in).unwrap()
}

pub fn payload_at(token: &str, expires_in: i64, obtained_at: DateTime<Utc>) -> TokenPayload {
    TokenPayload::obtained_at(token.to_owned(), expires_in, obtained_at).unwrap()
}

/// Signer that records what it was asked to sign instead of doing crypto.
pub struct FakeSigner {
    pub ttl_seconds: u64,
    pub fail: bool,
    pub issued: Mutex<Vec<(String, BTreeSet<String>)>>,
}

impl FakeSigner {
    pub fn new(ttl_seconds: u64) -> Self {
        Self {
            ttl_seconds,
            fail: false,
            issued: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(60)
        }
    }
}

impl TokenSigner for FakeSigner {
    fn issue(&self, client_id: &str, scopes: &BTreeSet<String>) -> Result<Issued, SignError> {
        if self.fail {
            return Err(SignError::Signing("no key".to_owned()));
        }
        self.issued
            .lock()
            .unwrap()
            .push((client_id.to_owned(), scopes.clone()));
        let scope = scopes.iter().cloned().collect::<Vec<_>>().join(",");
        Ok(Issued {
            token: format!("signed:{client_id}:{scope}"),
            expires_in_seconds: self.ttl_seconds,
            expires_at: Utc::now() + chrono::Duration::seconds(self.ttl_seconds as i64),
        })
    }
}

/// Store wrapper counting every query that reaches it.
pub struct CountingStore {
    pub inner: InMemoryClientStore,
    pub queries: AtomicUsize,
}

impl CountingStore {
    pub fn new(inner: InMemoryClientStore) -> Self {
        Self {
            inner,
            queries: AtomicUsize::new(0),
        }
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

impl ClientStore for CountingStore {
    fn authenticate(&self, client_id: &str, client_secret: &str) -> bool {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.inner.authenticate(client_id, client_secret)
    }

    fn allowed_scopes(&self, client_id: &str) -> BTreeSet<String> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.inner.allowed_scopes(client_id)
    }
}
