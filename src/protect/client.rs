//! The single protected entry point for generative calls.
//!
//! `generate` composes, in order: cost-ceiling gate, rate-limiter admission,
//! circuit-breaker gate, retry-wrapped upstream call, cost recording. Every
//! failure leaves here as exactly one [`GenerateError`] classification;
//! raw transport errors never propagate upward.

use std::sync::Arc;

use thiserror::Error;
use tokio::time::sleep;

use crate::error::ErrorCategory;
use crate::upstream::{GenerateRequest, GenerateResponse, Upstream, UpstreamError};

use super::breaker::CircuitBreaker;
use super::cost::{CostExceeded, CostGuard, CostLedger};
use super::limiter::RateLimiter;
use super::retry::RetryPolicy;

/// Classified outcome of a protected call.
#[derive(Debug, Error)]
pub enum GenerateError {
    /// The shared rate budget is exhausted; back off and resubmit.
    #[error("rate limiter rejected the call")]
    RateLimited,

    /// Upstream is considered unhealthy; nothing was sent.
    #[error("circuit breaker is open")]
    BreakerOpen,

    /// Transient failures outlived the retry budget; carries the last one.
    #[error("retries exhausted: {0}")]
    RetryExhausted(#[source] UpstreamError),

    /// The per-job cost ceiling was reached.
    #[error("{0}")]
    CostExceeded(CostExceeded),

    /// A non-retryable upstream failure (auth, malformed response, 4xx).
    #[error("upstream call failed: {0}")]
    Upstream(#[source] UpstreamError),
}

impl GenerateError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            GenerateError::RateLimited => ErrorCategory::RateLimited,
            GenerateError::BreakerOpen => ErrorCategory::BreakerOpen,
            GenerateError::RetryExhausted(_) => ErrorCategory::RetryExhausted,
            GenerateError::CostExceeded(_) => ErrorCategory::CostExceeded,
            GenerateError::Upstream(_) => ErrorCategory::Other,
        }
    }
}

/// Wraps one upstream client with the full protection stack. The limiter and
/// breaker are shared process-wide; the cost guard belongs to one job.
pub struct ProtectedClient<U: Upstream> {
    upstream: Arc<U>,
    limiter: Arc<RateLimiter>,
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
    cost: CostGuard,
}

impl<U: Upstream> ProtectedClient<U> {
    pub fn new(
        upstream: Arc<U>,
        limiter: Arc<RateLimiter>,
        breaker: Arc<CircuitBreaker>,
        retry: RetryPolicy,
        cost: CostGuard,
    ) -> Self {
        Self {
            upstream,
            limiter,
            breaker,
            retry,
            cost,
        }
    }

    /// Issue one protected generative call.
    pub async fn generate(&self, req: &GenerateRequest) -> Result<GenerateResponse, GenerateError> {
        // The ceiling check comes first and is never retried.
        self.cost.check().map_err(GenerateError::CostExceeded)?;

        // Non-blocking admission; denial means "retry later", so it is
        // surfaced immediately for the caller to back off on.
        if !self.limiter.acquire() {
            return Err(GenerateError::RateLimited);
        }

        let mut attempt: u32 = 1;
        loop {
            self.breaker.admit().map_err(|_| GenerateError::BreakerOpen)?;

            match self.upstream.generate(req).await {
                Ok(resp) => {
                    self.breaker.record_success();
                    // The breaching call's response is discarded so that no
                    // further calls can be issued for this job.
                    self.cost
                        .record(&req.model, resp.usage)
                        .map_err(GenerateError::CostExceeded)?;
                    return Ok(resp);
                }
                Err(e) => {
                    self.breaker.record_failure();
                    if self.retry.should_retry(attempt, &e) {
                        sleep(self.retry.delay_for_attempt(attempt)).await;
                        attempt += 1;
                        continue;
                    }
                    return if e.is_transient() {
                        Err(GenerateError::RetryExhausted(e))
                    } else {
                        Err(GenerateError::Upstream(e))
                    };
                }
            }
        }
    }

    /// Snapshot of the job's accrued cost.
    pub fn ledger(&self) -> CostLedger {
        self.cost.ledger()
    }

    /// Suggested wait before re-attempting after a `RateLimited` rejection.
    pub fn limiter_backoff(&self) -> std::time::Duration {
        self.limiter.suggested_backoff()
    }

    /// Cooldown of the shared breaker, the wait after a `BreakerOpen`.
    pub fn breaker_cooldown(&self) -> std::time::Duration {
        self.breaker.cooldown()
    }
}
