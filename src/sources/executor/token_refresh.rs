use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cache::token_cache::TokenCache;
use crate::sources::FetchToken;

/// Periodic driver of [`TokenCache::refresh_if_needed`].
///
/// Runs with a fixed delay between the end of one refresh and the start of
/// the next. Stopping cancels the task: an in-flight refresh is dropped at its
/// next suspension point, which also releases the cache's fetch lock.
pub struct TokenRefresher {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl TokenRefresher {
    /// First run after one `interval`, then every `interval`.
    pub fn start<F: FetchToken>(cache: Arc<TokenCache<F>>, interval: Duration) -> Self {
        Self::start_with_delay(cache, interval, interval)
    }

    pub fn start_with_delay<F: FetchToken>(
        cache: Arc<TokenCache<F>>,
        initial_delay: Duration,
        interval: Duration,
    ) -> Self {
        let cancel = CancellationToken::new();
        let stop = cancel.clone();

        let handle = tokio::spawn(async move {
            info!(
                "token refresher started, first check in {:?}, then every {:?}",
                initial_delay, interval
            );
            let mut delay = initial_delay;
            loop {
                tokio::select! {
                    biased;
                    _ = stop.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
                debug!("token refresh check");
                tokio::select! {
                    biased;
                    _ = stop.cancelled() => break,
                    _ = cache.refresh_if_needed() => {}
                }
                delay = interval;
            }
            info!("token refresher stopped");
        });

        Self {
            cancel,
            handle: Some(handle),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the task and wait for it to exit. No refresh runs afterwards.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for TokenRefresher {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
