use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::cache::token::TokenPayload;
use crate::observability::metrics::get_metrics;
use crate::sources::{FetchError, FetchToken};
use crate::utils::constants::DEFAULT_SKEW_SECONDS;

/// Single-slot token cache in front of a [`FetchToken`] source.
///
/// Reading a fresh payload never takes the fetch lock. Only the
/// fetch-and-store sequence is serialized, so at most one fetch runs per
/// expiry cycle no matter how many callers observe the stale slot at once.
pub struct TokenCache<F: FetchToken> {
    fetcher: F,
    skew: Duration,
    slot: watch::Sender<Option<Arc<TokenPayload>>>,
    /// Guards the fetch; holds the error of the last failed fetch.
    fetch_lock: Mutex<Option<FetchError>>,
    /// Bumped, under `fetch_lock`, every time a fetch completes.
    fetch_epoch: AtomicU64,
}

impl<F: FetchToken> TokenCache<F> {
    pub fn new(fetcher: F) -> Self {
        Self::with_skew(fetcher, Duration::from_secs(DEFAULT_SKEW_SECONDS))
    }

    pub fn with_skew(fetcher: F, skew: Duration) -> Self {
        let (slot, _) = watch::channel(None);
        Self {
            fetcher,
            skew,
            slot,
            fetch_lock: Mutex::new(None),
            fetch_epoch: AtomicU64::new(0),
        }
    }

    pub fn skew(&self) -> Duration {
        self.skew
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Payload currently held, fresh or not.
    pub fn current_payload(&self) -> Option<Arc<TokenPayload>> {
        self.slot.borrow().clone()
    }

    /// Watch payload replacements.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<TokenPayload>>> {
        self.slot.subscribe()
    }

    fn fresh_payload(&self) -> Option<Arc<TokenPayload>> {
        let now = Utc::now();
        self.current_payload().filter(|p| p.is_fresh(self.skew, now))
    }

    pub(crate) fn store(&self, payload: TokenPayload) {
        self.slot.send_replace(Some(Arc::new(payload)));
    }

    /// Token to present downstream.
    ///
    /// Blocks for at most one fetch when the slot is cold or stale. Errors
    /// only when no usable payload exists: a payload past its skew but not
    /// yet expired is still served if the refresh fails.
    pub async fn current_token(&self) -> Result<String, FetchError> {
        if let Some(payload) = self.fresh_payload() {
            return Ok(payload.access_token().to_owned());
        }

        let seen_epoch = self.fetch_epoch.load(Ordering::Acquire);
        let mut last_failure = self.fetch_lock.lock().await;

        // another caller refreshed while we waited for the lock
        if let Some(payload) = self.fresh_payload() {
            return Ok(payload.access_token().to_owned());
        }

        // the fetch we queued behind failed, do not repeat it
        if self.fetch_epoch.load(Ordering::Acquire) != seen_epoch {
            if let Some(err) = last_failure.clone() {
                debug!("reusing failure of the fetch completed while waiting");
                return self.fall_back_to_unexpired(err);
            }
        }

        let result = self.fetcher.fetch_token().await;
        self.fetch_epoch.fetch_add(1, Ordering::AcqRel);
        match result {
            Ok(payload) => {
                let token = payload.access_token().to_owned();
                self.store(payload);
                *last_failure = None;
                Ok(token)
            }
            Err(err) => {
                *last_failure = Some(err.clone());
                self.fall_back_to_unexpired(err)
            }
        }
    }

    fn fall_back_to_unexpired(&self, err: FetchError) -> Result<String, FetchError> {
        match self.current_payload().filter(|p| !p.is_expired(Utc::now())) {
            Some(payload) => {
                warn!("token refresh failed, serving cached token until it expires: {}", err);
                Ok(payload.access_token().to_owned())
            }
            None => Err(err),
        }
    }

    /// Best-effort refresh. Never fails: on error the previous payload stays
    /// in place and the next cycle (or `current_token`) tries again.
    pub async fn refresh_if_needed(&self) {
        let metrics = get_metrics().await;
        if self.fresh_payload().is_some() {
            metrics.token_refresh_runs.with_label_values(&["skipped"]).inc();
            return;
        }

        let mut last_failure = self.fetch_lock.lock().await;
        if self.fresh_payload().is_some() {
            metrics.token_refresh_runs.with_label_values(&["skipped"]).inc();
            return;
        }

        let result = self.fetcher.fetch_token().await;
        self.fetch_epoch.fetch_add(1, Ordering::AcqRel);
        match result {
            Ok(payload) => {
                info!("token refreshed in background, expires at {}", payload.expires_at());
                self.store(payload);
                *last_failure = None;
                metrics.token_refresh_runs.with_label_values(&["refreshed"]).inc();
            }
            Err(err) => {
                warn!("failed to refresh token: {}", err);
                *last_failure = Some(err);
                metrics.token_refresh_runs.with_label_values(&["failed"]).inc();
            }
        }
    }
}
