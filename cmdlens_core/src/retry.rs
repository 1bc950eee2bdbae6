//! Retry Logic with Exponential Backoff
//!
//! Retries are opt-in. The explainer uses them only for backend calls that
//! failed before delivering any text; command execution is never retried.
//!
//! ## Key Features
//!
//! - **Exponential Backoff**: Delays between retries grow exponentially (100ms, 200ms, 400ms...)
//! - **Max Delay Cap**: Prevents unbounded delay growth
//! - **Jitter**: Optional randomization to prevent thundering herd
//! - **Typed Classification**: The error type decides whether it is transient
//!
//! ## Usage
//!
//! ```rust,ignore
//! use cmdlens_core::retry::{RetryConfig, execute_with_retry};
//!
//! let config = RetryConfig::default();
//! let text = execute_with_retry(&config, || async { client.explain(&prompt).await }).await;
//! ```

use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Retry policy strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryPolicy {
    /// Delays grow exponentially: initial_delay * backoff_factor^attempt
    #[default]
    ExponentialBackoff,
    /// Fixed delay between all retries
    FixedDelay,
    /// No delay between retries
    Immediate,
}

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (not counting initial try)
    pub max_retries: u32,
    /// Initial delay before first retry
    pub initial_delay: Duration,
    /// Maximum delay cap (prevents unbounded growth)
    pub max_delay: Duration,
    /// Multiplier for each subsequent retry delay
    pub backoff_factor: f64,
    /// The retry policy to use
    pub policy: RetryPolicy,
    /// Whether to add jitter to delays
    pub jitter_enabled: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_factor: 2.0,
            policy: RetryPolicy::ExponentialBackoff,
            jitter_enabled: false,
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_jitter(mut self, enabled: bool) -> Self {
        self.jitter_enabled = enabled;
        self
    }

    /// Calculate the delay for a given retry attempt (0-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = match self.policy {
            RetryPolicy::ExponentialBackoff => {
                let multiplier = self.backoff_factor.powi(attempt as i32);
                let delay_us = self.initial_delay.as_micros() as f64 * multiplier;
                Duration::from_micros(delay_us as u64)
            }
            RetryPolicy::FixedDelay => self.initial_delay,
            RetryPolicy::Immediate => Duration::ZERO,
        };

        std::cmp::min(delay, self.max_delay)
    }

    /// Calculate delay with optional jitter (±50% of base delay)
    pub fn delay_for_attempt_with_jitter(&self, attempt: u32) -> Duration {
        let base_delay = self.delay_for_attempt(attempt);

        if !self.jitter_enabled {
            return base_delay;
        }

        let base_us = base_delay.as_micros() as f64;
        let jitter_range = base_us * 0.5;
        // Too small to spread; also keeps the sampled range non-empty.
        if jitter_range < 1.0 {
            return base_delay;
        }
        let jitter = rand::rng().random_range(-jitter_range..jitter_range);
        let jittered_us = (base_us + jitter).max(0.0);

        Duration::from_micros(jittered_us as u64)
    }
}

/// Errors that know whether trying again could help.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Execute an async operation with retry logic.
///
/// Non-retryable errors are returned immediately. After the last attempt the
/// final error is returned.
pub async fn execute_with_retry<F, Fut, T, E>(config: &RetryConfig, operation: F) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + std::fmt::Display,
{
    let total_attempts = 1 + config.max_retries;
    let mut attempt = 0;

    loop {
        let err = match operation().await {
            Ok(result) => return Ok(result),
            Err(err) => err,
        };

        if !err.is_retryable() {
            tracing::debug!("Non-retryable error on attempt {}: {}", attempt + 1, err);
            return Err(err);
        }

        let retries_remaining = total_attempts.saturating_sub(attempt + 1);
        if retries_remaining == 0 {
            return Err(err);
        }

        let delay = if config.jitter_enabled {
            config.delay_for_attempt_with_jitter(attempt)
        } else {
            config.delay_for_attempt(attempt)
        };

        tracing::debug!(
            "Retryable error on attempt {} ({}ms delay, {} retries left): {}",
            attempt + 1,
            delay.as_millis(),
            retries_remaining,
            err
        );

        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
