//! Completion deadline and retry wrapper.
//!
//! Every attempt runs under a hard timeout. Transient failures (timeouts,
//! network errors, rate limits) are retried with exponential backoff;
//! anything else is returned immediately. A rate limit's `Retry-After`
//! stretches the delay, up to `backoff_max`.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use voltwise_core::error::ProviderError;
use voltwise_core::provider::*;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based): `base * 2^attempt`, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.backoff_base
            .checked_mul(factor)
            .unwrap_or(self.backoff_max)
            .min(self.backoff_max)
    }

    /// Delay before retrying after `error`.
    pub fn delay_for(&self, attempt: u32, error: &ProviderError) -> Duration {
        let backoff = self.backoff(attempt);
        match error {
            ProviderError::RateLimited { retry_after_secs } => backoff
                .max(Duration::from_secs(*retry_after_secs))
                .min(self.backoff_max),
            _ => backoff,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            max_retries: 2,
            backoff_base: Duration::from_millis(250),
            backoff_max: Duration::from_secs(4),
        }
    }
}

pub struct RetryingProvider {
    inner: Arc<dyn Provider>,
    policy: RetryPolicy,
}

impl RetryingProvider {
    pub fn new(inner: Arc<dyn Provider>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[async_trait]
impl Provider for RetryingProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let total = self.policy.max_retries + 1;
        let mut attempt = 0;

        loop {
            let attempt_future = self.inner.complete(request.clone());
            let outcome = match tokio::time::timeout(self.policy.timeout, attempt_future).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout(format!(
                    "Provider '{}' timed out after {}s",
                    self.inner.name(),
                    self.policy.timeout.as_secs()
                ))),
            };

            match outcome {
                Ok(response) => {
                    if attempt > 0 {
                        info!(
                            provider = %self.inner.name(),
                            attempt = attempt + 1,
                            "Completion succeeded after retry"
                        );
                    }
                    return Ok(response);
                }
                Err(e) if e.is_transient() && attempt < self.policy.max_retries => {
                    let delay = self.policy.delay_for(attempt, &e);
                    warn!(
                        provider = %self.inner.name(),
                        attempt = attempt + 1,
                        total,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Completion failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(
                        provider = %self.inner.name(),
                        attempt = attempt + 1,
                        error = %e,
                        "Completion failed"
                    );
                    return Err(e);
                }
            }
        }
    }
}
