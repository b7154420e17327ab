//! Bounded exponential-backoff retry for transient failures.
//!
//! Backoff doubles from the configured base up to the cap, honors a
//! rate-limit `retry_after` hint when it exceeds the computed delay, and adds
//! proportional jitter so parallel sync units do not thunder in lockstep.
//! Non-retryable errors fail immediately without consuming attempts.

use std::future::Future;
use std::time::Duration;

use metrics::counter;
use rand::Rng;
use tracing::warn;

use crate::config::RetryPolicyConfig;
use crate::error::{SyncError, SyncErrorKind};
use crate::source::EntityKind;

/// Delay before the next attempt, given how many attempts already failed.
pub fn calculate_backoff(
    policy: &RetryPolicyConfig,
    attempts: u32,
    retry_after_secs: Option<u64>,
) -> Duration {
    let exponential = policy
        .base_seconds
        .saturating_mul(2u64.saturating_pow(attempts));
    let capped = exponential.min(policy.max_seconds);
    let seconds = retry_after_secs.map_or(capped, |hint| capped.max(hint));

    let jitter = if policy.jitter_factor > 0.0 && seconds > 0 {
        rand::thread_rng().gen_range(0.0..(policy.jitter_factor * seconds as f64))
    } else {
        0.0
    };
    Duration::from_secs_f64(seconds as f64 + jitter)
}

#[derive(Clone)]
pub struct RetryController {
    policy: RetryPolicyConfig,
}

impl RetryController {
    pub fn new(policy: RetryPolicyConfig) -> Self {
        Self { policy }
    }

    /// Drive `operation` to completion, retrying transient failures up to the
    /// configured attempt budget.
    pub async fn run<T, F, Fut>(
        &self,
        entity: EntityKind,
        operation: &str,
        mut attempt: F,
    ) -> Result<T, SyncError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SyncError>>,
    {
        let mut failed_attempts: u32 = 0;
        loop {
            let err = match attempt().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !err.is_retryable() || failed_attempts + 1 >= self.policy.max_attempts {
                return Err(err);
            }

            let retry_after = match err.kind {
                SyncErrorKind::RateLimited { retry_after_secs } => retry_after_secs,
                _ => None,
            };
            let delay = calculate_backoff(&self.policy, failed_attempts, retry_after);
            failed_attempts += 1;
            warn!(
                entity = %entity,
                operation,
                attempt = failed_attempts,
                max_attempts = self.policy.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "transient failure, backing off before retry"
            );
            counter!(
                "revsync_retries_total",
                "entity" => entity.as_str(),
                "operation" => operation.to_string()
            )
            .increment(1);
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy() -> RetryPolicyConfig {
        RetryPolicyConfig {
            max_attempts: 5,
            base_seconds: 5,
            max_seconds: 900,
            jitter_factor: 0.0,
        }
    }

    #[test]
    fn backoff_doubles_from_base() {
        let policy = policy();
        assert_eq!(calculate_backoff(&policy, 0, None), Duration::from_secs(5));
        assert_eq!(calculate_backoff(&policy, 1, None), Duration::from_secs(10));
        assert_eq!(calculate_backoff(&policy, 3, None), Duration::from_secs(40));
    }

    #[test]
    fn backoff_is_capped() {
        let policy = policy();
        assert_eq!(
            calculate_backoff(&policy, 20, None),
            Duration::from_secs(900)
        );
    }

    #[test]
    fn retry_after_hint_wins_when_larger() {
        let policy = policy();
        assert_eq!(
            calculate_backoff(&policy, 0, Some(120)),
            Duration::from_secs(120)
        );
        // A hint below the computed backoff does not shorten the delay.
        assert_eq!(
            calculate_backoff(&policy, 3, Some(1)),
            Duration::from_secs(40)
        );
    }

    #[test]
    fn jitter_stays_proportional() {
        let policy = RetryPolicyConfig {
            jitter_factor: 0.1,
            ..policy()
        };
        for _ in 0..50 {
            let delay = calculate_backoff(&policy, 0, None);
            assert!(delay >= Duration::from_secs(5));
            assert!(delay < Duration::from_secs_f64(5.5));
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let controller = RetryController::new(RetryPolicyConfig {
            base_seconds: 0,
            ..policy()
        });
        let calls = AtomicU32::new(0);

        let result = controller
            .run(EntityKind::Calls, "read", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(SyncError::transient("connection reset"))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_failure_is_not_retried() {
        let controller = RetryController::new(policy());
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = controller
            .run(EntityKind::Emails, "write", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(SyncError::permanent("constraint violation")) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn attempt_budget_is_exhausted() {
        let controller = RetryController::new(RetryPolicyConfig {
            base_seconds: 0,
            max_attempts: 3,
            ..policy()
        });
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = controller
            .run(EntityKind::Speakers, "read", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(SyncError::transient("still down")) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
