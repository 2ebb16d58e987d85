use std::future::Future;
use std::time::Duration;

use domain::workflow::error::ActivityError;
use ports::secondary::metrics_port::MetricsPort;

/// Retry policy attached to an activity invocation. Plain data.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first. Zero is treated as one.
    pub maximum_attempts: u32,
    /// Delay before the first retry.
    pub initial_interval: Duration,
    /// Multiplier applied to the delay after each retry.
    pub backoff_coefficient: f64,
    /// Upper bound on any single delay.
    pub maximum_interval: Duration,
    /// `ActivityError::error_type()` names that are never retried.
    pub non_retryable_errors: Vec<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            maximum_attempts: 3,
            initial_interval: Duration::from_secs(1),
            backoff_coefficient: 2.0,
            maximum_interval: Duration::from_secs(10),
            non_retryable_errors: vec!["validation".to_string(), "not_found".to_string()],
        }
    }
}

impl RetryPolicy {
    /// Delay after the `retry`-th failed attempt (0-based), capped at
    /// `maximum_interval`.
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let secs = self.initial_interval.as_secs_f64() * self.backoff_coefficient.powi(exponent);
        if !secs.is_finite() || secs >= self.maximum_interval.as_secs_f64() {
            return self.maximum_interval;
        }
        Duration::from_secs_f64(secs.max(0.0))
    }

    /// Cancellation is never retried; other errors unless allowlisted.
    pub fn is_retryable(&self, error: &ActivityError) -> bool {
        if matches!(error, ActivityError::Cancelled) {
            return false;
        }
        let kind = error.error_type();
        !self.non_retryable_errors.iter().any(|t| t == kind)
    }
}

/// Per-invocation options: timeout for a single attempt plus the retry
/// policy.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityOptions {
    pub start_to_close_timeout: Duration,
    pub retry_policy: RetryPolicy,
}

impl ActivityOptions {
    pub fn new(start_to_close_timeout: Duration, retry_policy: RetryPolicy) -> Self {
        Self {
            start_to_close_timeout,
            retry_policy,
        }
    }
}

fn attempt_label(error: &ActivityError) -> &'static str {
    match error {
        ActivityError::Timeout(_) => "timeout",
        ActivityError::Cancelled => "cancelled",
        _ => "failure",
    }
}

/// Execute an async operation with retry and exponential backoff.
///
/// `f` is called up to `maximum_attempts` times. Errors named in the
/// policy's non-retryable list fail immediately. Every attempt is counted
/// in `audit_activity_attempts_total`.
pub async fn retry_with_backoff<T, F, Fut>(
    activity: &str,
    policy: &RetryPolicy,
    metrics: &dyn MetricsPort,
    mut f: F,
) -> Result<T, ActivityError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ActivityError>>,
{
    let max_attempts = policy.maximum_attempts.max(1);
    let mut attempt = 1;

    loop {
        let error = match f().await {
            Ok(value) => {
                metrics.record_activity_attempt(activity, "success");
                return Ok(value);
            }
            Err(e) => e,
        };
        metrics.record_activity_attempt(activity, attempt_label(&error));

        if !policy.is_retryable(&error) {
            tracing::warn!(activity, attempt, error = %error, "activity failed with non-retryable error");
            return Err(error);
        }
        if attempt >= max_attempts {
            tracing::warn!(activity, attempt, error = %error, "activity retries exhausted");
            return Err(error);
        }

        let delay = policy.backoff_for(attempt - 1);
        tracing::debug!(
            activity,
            attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            error = %error,
            "activity attempt failed, retrying"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
