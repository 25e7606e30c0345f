//! Bounded retry with linear backoff for remote operations.
//!
//! Every remote-mutating call site (push, fetch, review requests) goes through
//! [`retry_with_backoff`], parameterized by a [`RetryPolicy`].

use crate::error::{Result, SyncError};
use std::future::Future;
use std::time::Duration;

/// Upper bound on attempts accepted from the environment or CLI
pub const MAX_ATTEMPTS_LIMIT: u32 = 10;

/// Retry behavior for remote operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Backoff unit; attempt `n` waits `n * unit` before the next try
    pub backoff_unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_unit: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Policy with an explicit attempt count and backoff unit
    pub fn new(max_attempts: u32, backoff_unit: Duration) -> Self {
        Self {
            max_attempts: max_attempts.clamp(1, MAX_ATTEMPTS_LIMIT),
            backoff_unit,
        }
    }

    /// Parse a number from an environment variable, clamped to `max`
    fn parse_env(var_name: &str, default: u64, max: u64) -> u64 {
        std::env::var(var_name)
            .ok()
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(|v| v.min(max))
            .unwrap_or(default)
    }

    /// Create policy from `RELEASE_SYNC_RETRIES` / `RELEASE_SYNC_BACKOFF_SECS`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let attempts = Self::parse_env(
            "RELEASE_SYNC_RETRIES",
            u64::from(defaults.max_attempts),
            u64::from(MAX_ATTEMPTS_LIMIT),
        );
        let backoff = Self::parse_env(
            "RELEASE_SYNC_BACKOFF_SECS",
            defaults.backoff_unit.as_secs(),
            60,
        );
        Self::new(attempts as u32, Duration::from_secs(backoff))
    }

    /// Wait applied after failed attempt number `attempt` (1-based)
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.backoff_unit.saturating_mul(attempt)
    }
}

/// Retry an async operation with linearly increasing backoff.
///
/// The closure receives the 1-based attempt number. Unrecoverable errors are
/// returned immediately; recoverable ones are retried until the policy runs
/// out, at which point [`SyncError::RetryExhausted`] is returned.
pub async fn retry_with_backoff<F, Fut, T>(
    policy: &RetryPolicy,
    operation_name: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    log::info!("{} succeeded on attempt {}", operation_name, attempt);
                }
                return Ok(value);
            }
            Err(e) if !e.is_recoverable() => {
                log::error!("{} failed with unrecoverable error: {}", operation_name, e);
                return Err(e);
            }
            Err(e) if attempt >= max_attempts => {
                log::error!("{} failed after {} attempt(s): {}", operation_name, attempt, e);
                return Err(SyncError::RetryExhausted {
                    operation: operation_name.to_string(),
                    attempts: attempt,
                    last_error: e.to_string(),
                }
                .into());
            }
            Err(e) => {
                let wait = policy.backoff_for(attempt);
                log::warn!(
                    "{} failed (attempt {}/{}): {}; retrying in {:.1}s",
                    operation_name,
                    attempt,
                    max_attempts,
                    e,
                    wait.as_secs_f64()
                );
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
        }
    }
}
