// Copyright (c) 2025 - Cowboy AI, Inc.
//! Retry with exponential backoff
//!
//! The projection consumer wraps every read-store write in
//! [`retry_with_backoff`]. Only [`ProjectionError::TargetUnavailable`] is worth
//! retrying; an inconsistency or a bad event fails on the first attempt. When
//! the attempts run out the consumer naks the delivery and the broker
//! redelivers it later.
//!
//! With the defaults a write is tried at 0 ms, 100 ms and 300 ms.
//!
//! [`ProjectionError::TargetUnavailable`]: crate::projection::ProjectionError::TargetUnavailable

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Attempts and backoff for transient read-store failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Attempts per delivery, the first one included
    pub max_attempts: u32,
    /// Pause after the first failure; doubled after each further failure
    pub initial_backoff: Duration,
    /// Upper bound for the pause
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    /// Pause before attempt `attempt + 1`, `attempt` counting from 1
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Run `operation` until it succeeds, fails permanently, or runs out of attempts
///
/// `is_retryable` decides which errors are transient. `context` names the
/// operation in logs. The last error is returned when every attempt failed.
pub async fn retry_with_backoff<F, Fut, T, E, P>(
    operation: F,
    is_retryable: P,
    config: &RetryConfig,
    context: &str,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempt = 1;

    loop {
        let error = match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(context = %context, attempt = attempt, "Recovered after retry");
                }
                return Ok(value);
            }
            Err(e) => e,
        };

        if !is_retryable(&error) {
            return Err(error);
        }
        if attempt >= config.max_attempts {
            warn!(
                context = %context,
                attempts = attempt,
                error = %error,
                "Giving up after transient failures"
            );
            return Err(error);
        }

        let backoff = config.backoff_after(attempt);
        warn!(
            context = %context,
            attempt = attempt,
            max_attempts = config.max_attempts,
            backoff_ms = backoff.as_millis() as u64,
            error = %error,
            "Transient failure, backing off"
        );
        sleep(backoff).await;
        attempt += 1;
    }
}
