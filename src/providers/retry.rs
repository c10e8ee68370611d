//! Bounded exponential backoff for throttled providers.
//!
//! [`Retrying`] wraps any [`ProviderClient`] and re-issues a request only when
//! the inner client reports [`FailureKind::RateLimited`]. Every other failure
//! is returned immediately so the fallback chain can move on to the next
//! provider.
//!
//! ```text
//! delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
//! ```

use super::ProviderClient;
use crate::error::{FailureKind, ProviderError};
use crate::models::{GenerationRequest, Payload};
use async_trait::async_trait;
use rand::{Rng, rng};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::{sleep, timeout};
use tracing::{error, instrument, warn};

const MAX_JITTER_MS: u64 = 250;

pub struct Retrying {
    inner: Arc<dyn ProviderClient>,
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl Retrying {
    pub fn new(inner: Arc<dyn ProviderClient>, max_retries: u32, base_delay: Duration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: Duration::from_secs(30),
        }
    }

    /// Backoff before retry number `attempt` (1-based), without jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    async fn attempt(&self, request: &GenerationRequest) -> Result<Payload, ProviderError> {
        let limit = self.inner.timeout();
        match timeout(limit, self.inner.generate(request)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::transport(format!("timed out after {}s", limit.as_secs()))),
        }
    }
}

impl fmt::Debug for Retrying {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Retrying")
            .field("provider", &self.inner.id())
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

#[async_trait]
impl ProviderClient for Retrying {
    fn id(&self) -> &str {
        self.inner.id()
    }

    /// Room for every attempt plus the worst-case backoff between them.
    fn timeout(&self) -> Duration {
        let attempts = self.inner.timeout().saturating_mul(self.max_retries + 1);
        let backoff = (1..=self.max_retries)
            .map(|a| self.backoff(a) + Duration::from_millis(MAX_JITTER_MS))
            .fold(Duration::ZERO, |acc, d| acc.saturating_add(d));
        attempts.saturating_add(backoff)
    }

    #[instrument(level = "info", skip_all, fields(provider = %self.inner.id()))]
    async fn generate(&self, request: &GenerationRequest) -> Result<Payload, ProviderError> {
        let total_t0 = Instant::now();
        let mut attempt = 0u32;

        loop {
            let attempt_t0 = Instant::now();
            match self.attempt(request).await {
                Ok(payload) => return Ok(payload),
                Err(e) if e.kind != FailureKind::RateLimited => return Err(e),
                Err(e) => {
                    attempt += 1;
                    let attempt_dt = attempt_t0.elapsed();
                    let total_dt = total_t0.elapsed();

                    if attempt > self.max_retries {
                        error!(
                            attempt,
                            max = self.max_retries,
                            elapsed_ms_attempt = attempt_dt.as_millis() as u64,
                            elapsed_ms_total = total_dt.as_millis() as u64,
                            error = %e,
                            "Still rate limited after retries"
                        );
                        return Err(e);
                    }

                    let jitter_ms: u64 = rng().random_range(0..=MAX_JITTER_MS);
                    let delay = self.backoff(attempt) + Duration::from_millis(jitter_ms);

                    warn!(
                        attempt,
                        max = self.max_retries,
                        elapsed_ms_attempt = attempt_dt.as_millis() as u64,
                        elapsed_ms_total = total_dt.as_millis() as u64,
                        ?delay,
                        error = %e,
                        "Rate limited; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}
