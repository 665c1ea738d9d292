//! Retry logic with exponential backoff and jitter.
//!
//! Each failure is classified by the caller into a [`RetryDecision`]:
//! stop, retry on the normal schedule, or retry on a slowed schedule
//! (used for rate limiting, optionally with a server-provided floor).

use crate::config::NetworkConfig;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first one).
    pub max_attempts: u32,
    /// Initial delay between retries.
    pub base_delay: Duration,
    /// Maximum delay cap.
    pub max_delay: Duration,
    /// Exponential base (typically 2.0 for doubling).
    pub exponential_base: f64,
    /// Multiplier applied to the delay for [`RetryDecision::Slow`].
    pub slow_factor: f64,
    /// Whether to add random jitter to delays.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: NetworkConfig::MAX_RETRIES,
            base_delay: NetworkConfig::RETRY_BASE_DELAY,
            max_delay: NetworkConfig::RETRY_MAX_DELAY,
            exponential_base: 2.0,
            slow_factor: NetworkConfig::RATE_LIMIT_BACKOFF_FACTOR,
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of attempts. At least one attempt is always made.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_slow_factor(mut self, factor: f64) -> Self {
        self.slow_factor = factor.max(1.0);
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        self.scaled_delay(attempt, 1.0)
    }

    /// Delay for `decision` after the given attempt, or `None` when the
    /// decision is to stop.
    pub fn delay_for(&self, attempt: u32, decision: RetryDecision) -> Option<Duration> {
        match decision {
            RetryDecision::Stop => None,
            RetryDecision::Retry => Some(self.calculate_delay(attempt)),
            RetryDecision::Slow { at_least } => {
                let delay = self.scaled_delay(attempt, self.slow_factor);
                Some(match at_least {
                    Some(floor) => delay.max(floor.min(self.max_delay)),
                    None => delay,
                })
            }
        }
    }

    fn scaled_delay(&self, attempt: u32, factor: f64) -> Duration {
        // base * factor * (exponential_base ^ attempt), capped
        let multiplier = self.exponential_base.powi(attempt as i32) * factor;
        let delay_secs = self.base_delay.as_secs_f64() * multiplier;
        let capped_secs = delay_secs.min(self.max_delay.as_secs_f64());

        let final_secs = if self.jitter {
            // Jitter factor between 0.5 and 1.5 keeps the mean delay but
            // never collapses it to zero.
            let mut rng = rand::rng();
            let jitter_factor = rng.random_range(0.5..1.5);
            (capped_secs * jitter_factor).min(self.max_delay.as_secs_f64())
        } else {
            capped_secs
        };

        Duration::from_secs_f64(final_secs)
    }
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Give up and return the error.
    Stop,
    /// Retry on the normal backoff schedule.
    Retry,
    /// Retry on a slowed schedule, waiting at least `at_least` if given.
    Slow { at_least: Option<Duration> },
}

/// Statistics about a retry operation.
#[derive(Debug, Clone, Default)]
pub struct RetryStats {
    /// Number of attempts made.
    pub attempts: u32,
    /// Total delay accumulated.
    pub total_delay: Duration,
    /// Whether the operation ultimately succeeded.
    pub success: bool,
    /// Whether the last error was retryable but attempts ran out.
    pub exhausted: bool,
    /// Last error message if failed.
    pub last_error: Option<String>,
}

/// Retry an async operation with exponential backoff.
///
/// `classify` decides, per error, whether and how fast to retry.
/// Returns the final result together with statistics about the attempts.
pub async fn retry_async<F, Fut, T, E>(
    config: &RetryConfig,
    mut operation: F,
    classify: impl Fn(&E) -> RetryDecision,
) -> (Result<T, E>, RetryStats)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut stats = RetryStats::default();
    let mut attempt = 0;

    loop {
        stats.attempts = attempt + 1;

        let e = match operation().await {
            Ok(value) => {
                stats.success = true;
                if attempt > 0 {
                    debug!("Operation succeeded after {} attempts", attempt + 1);
                }
                return (Ok(value), stats);
            }
            Err(e) => e,
        };

        stats.last_error = Some(e.to_string());

        let Some(delay) = config.delay_for(attempt, classify(&e)) else {
            debug!("Error is not retryable: {}", e);
            return (Err(e), stats);
        };

        if attempt + 1 >= config.max_attempts {
            warn!(
                "All {} retry attempts exhausted. Last error: {}",
                config.max_attempts, e
            );
            stats.exhausted = true;
            return (Err(e), stats);
        }

        stats.total_delay += delay;
        warn!(
            "Attempt {}/{} failed: {}. Retrying in {:?}",
            attempt + 1,
            config.max_attempts,
            e,
            delay
        );

        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
