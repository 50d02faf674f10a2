//! Upstream attempt execution with retry support
//!
//! One attempt is: acquire a fresh credential, then send the prompt. Both the
//! streaming and the aggregate handler drive attempts through
//! [`retry_with_policy`], which retries retryable failures after a constant
//! delay.

use crate::config::RetryConfig;
use crate::error::{AppError, AppResult};
use crate::handlers::AppState;
use crate::metrics::Metrics;
use crate::middleware::RequestId;
use std::future::Future;
use std::time::Duration;

/// Retry behaviour for upstream attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt
    max_retry_count: usize,
    /// Constant sleep before every retry
    retry_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retry_count: usize, retry_delay: Duration) -> Self {
        Self {
            max_retry_count,
            retry_delay,
        }
    }

    /// Get the number of retries after the first attempt
    pub fn max_retry_count(&self) -> usize {
        self.max_retry_count
    }

    /// Get the delay slept before each retry
    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    /// Total number of attempts, including the first
    pub fn max_attempts(&self) -> usize {
        self.max_retry_count.saturating_add(1)
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(config.max_retry_count, config.retry_delay())
    }
}

/// Run `attempt` until it succeeds, fails non-retryably, or the policy is spent
///
/// Attempts are numbered from 0. Before attempt `n > 0` the policy's delay is
/// slept. Each outcome is recorded in `duckbridge_upstream_attempts_total`.
///
/// # Errors
///
/// Returns the first non-retryable error, or the last error once every
/// attempt has failed.
pub async fn retry_with_policy<T, F, Fut>(
    policy: RetryPolicy,
    request_id: RequestId,
    metrics: &Metrics,
    mut attempt: F,
) -> AppResult<T>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let mut last_error = None;

    for n in 0..policy.max_attempts() {
        if n > 0 {
            tokio::time::sleep(policy.retry_delay()).await;
        }

        match attempt(n).await {
            Ok(value) => {
                metrics.record_attempt("success");
                if n > 0 {
                    tracing::info!(
                        request_id = %request_id,
                        attempt = n,
                        max_retry_count = policy.max_retry_count(),
                        "Upstream attempt succeeded after retry"
                    );
                }
                return Ok(value);
            }
            Err(e) => {
                metrics.record_attempt(e.kind());

                if !e.is_retryable() {
                    tracing::warn!(
                        request_id = %request_id,
                        attempt = n,
                        error = %e,
                        "Upstream attempt failed with non-retryable error"
                    );
                    return Err(e);
                }

                tracing::warn!(
                    request_id = %request_id,
                    attempt = n,
                    max_retry_count = policy.max_retry_count(),
                    error_kind = e.kind(),
                    error = %e,
                    "Upstream attempt failed"
                );
                last_error = Some(e);
            }
        }
    }

    let error = last_error
        .unwrap_or_else(|| AppError::Internal("retry loop made no attempts".to_string()));
    tracing::error!(
        request_id = %request_id,
        attempts = policy.max_attempts(),
        error = %error,
        "All upstream attempts failed"
    );
    Err(error)
}

/// One upstream attempt: fresh credential, then the chat request
///
/// Returns the committed 2xx response with its body unread.
pub async fn open_upstream(
    state: &AppState,
    prompt: &str,
    model: &str,
    request_id: RequestId,
) -> AppResult<reqwest::Response> {
    let credential = state.credentials().acquire(request_id).await?;
    state
        .upstream()
        .send(prompt, model, &credential, request_id)
        .await
}
