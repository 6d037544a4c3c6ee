//! Retry with exponential backoff and jitter
//!
//! Wraps a step's attempt closure. Only transient execution errors are
//! retried; denials and validation failures short-circuit immediately. The
//! attempt count is returned so the runner can surface retries in the
//! run report.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use super::types::RetryPolicy;
use crate::error::CoreError;

/// Result of an attempt chain plus how many attempts it took.
pub struct RetryOutcome<T> {
    pub result: Result<T, CoreError>,
    pub attempts: u32,
}

impl<T> RetryOutcome<T> {
    /// Retries performed beyond the first attempt.
    pub fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}

/// Run `attempt` under the given policy.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut attempt: F) -> RetryOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CoreError>>,
{
    let attempts_allowed = policy.attempts.max(1);
    let mut attempts = 0;

    loop {
        attempts += 1;
        match attempt().await {
            Ok(value) => {
                return RetryOutcome {
                    result: Ok(value),
                    attempts,
                }
            }
            Err(e) => {
                let exhausted = attempts >= attempts_allowed;
                if exhausted || !e.is_retryable() {
                    return RetryOutcome {
                        result: Err(e),
                        attempts,
                    };
                }
                tokio::time::sleep(delay_for(policy, attempts)).await;
            }
        }
    }
}

/// Delay before attempt `n + 1`: `base · factor^(n-1) · (1 + uniform(0, jitter))`.
fn delay_for(policy: &RetryPolicy, completed_attempts: u32) -> Duration {
    let exponent = completed_attempts.saturating_sub(1) as i32;
    let base = policy.base_delay_ms as f64 * policy.factor.powi(exponent);
    let jitter = if policy.jitter > 0.0 {
        1.0 + rand::thread_rng().gen_range(0.0..policy.jitter)
    } else {
        1.0
    };
    Duration::from_millis((base * jitter) as u64)
}
