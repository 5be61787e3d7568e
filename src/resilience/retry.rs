use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::config::settings::RetryConfig;
use crate::sources::FetchError;
use crate::utils::constants::{DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_BASE_DELAY_MS, DEFAULT_RETRY_MAX_DELAY_MS};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrySettings {
    pub attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_RETRY_ATTEMPTS,
            base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_RETRY_MAX_DELAY_MS,
        }
    }
}

impl From<Option<&RetryConfig>> for RetrySettings {
    fn from(retry: Option<&RetryConfig>) -> Self {
        Self {
            attempts: retry.and_then(|r| r.attempts).unwrap_or(DEFAULT_RETRY_ATTEMPTS),
            base_delay_ms: retry.and_then(|r| r.base_delay_ms).unwrap_or(DEFAULT_RETRY_BASE_DELAY_MS),
            max_delay_ms: retry.and_then(|r| r.max_delay_ms).unwrap_or(DEFAULT_RETRY_MAX_DELAY_MS),
        }
    }
}

impl RetrySettings {
    /// Run `operation` until it succeeds, fails permanently or the attempt
    /// budget is spent. The delay doubles after every transient failure,
    /// capped at `max_delay_ms`.
    ///
    /// Cancelling `cancel` aborts the pending attempt or backoff sleep and
    /// yields [`FetchError::Cancelled`].
    pub async fn run_with_retry<F, Fut, T>(
        &self,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, FetchError>>,
    {
        let attempts = self.attempts.max(1);
        let mut delay = self.base_delay_ms;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(FetchError::Cancelled),
                res = operation() => res,
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(FetchError::Cancelled) => {
                    warn!("attempt {attempt}/{attempts} interrupted");
                    return Err(FetchError::Cancelled);
                }
                Err(e) if !e.is_transient() => {
                    error!("attempt {attempt}/{attempts} failed permanently: {e}");
                    return Err(e);
                }
                Err(e) if attempt < attempts => {
                    warn!("attempt {attempt}/{attempts} failed: {e}, next attempt in {delay}ms");
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            warn!("backoff interrupted after attempt {attempt}/{attempts}");
                            return Err(FetchError::Cancelled);
                        }
                        _ = sleep(Duration::from_millis(delay)) => {}
                    }
                    delay = delay.saturating_mul(2).min(self.max_delay_ms);
                }
                Err(e) => {
                    error!("all {attempt} attempts failed: {e}");
                    return Err(FetchError::Exhausted {
                        attempts: attempt,
                        last: e.to_string(),
                    });
                }
            }
        }
    }
}
