//! Retry utilities.
//!
//! Exponential backoff with an optional random jitter, used by the dispatcher
//! between executions of a transiently failing model call.

use rand::Rng;
use std::time::Duration;

/// Retry policy for transient failures.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Retries allowed after the first execution (0 means no retries)
    pub max_attempts: u32,

    /// Delay before the first retry
    pub initial_delay: Duration,

    /// Upper bound on any single delay, jitter included
    pub max_delay: Duration,

    /// Growth factor between consecutive delays
    pub backoff_multiplier: f64,

    /// Add up to a quarter of the computed delay at random
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Backoff state for one retried operation.
///
/// Execution 0 is the first call; [`next_attempt`](Self::next_attempt) moves to
/// the next retry, whose delay is `initial * multiplier^(retry - 1)`, capped.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    config: RetryConfig,
    execution: u32,
}

impl ExponentialBackoff {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            execution: 0,
        }
    }

    /// Delay before the current execution, without jitter.
    pub fn base_delay(&self) -> Duration {
        if self.execution == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(self.execution - 1).unwrap_or(i32::MAX);
        let delay_ms = self.config.initial_delay.as_millis() as f64
            * self.config.backoff_multiplier.powi(exponent);

        Duration::from_millis(delay_ms.min(u64::MAX as f64) as u64).min(self.config.max_delay)
    }

    /// Delay before the current execution, jittered if configured. Never
    /// exceeds `max_delay`.
    pub fn delay(&self) -> Duration {
        let base = self.base_delay();
        if !self.config.jitter || base.is_zero() {
            return base;
        }

        let spread_ms = (base.as_millis() / 4) as u64;
        let extra = rand::thread_rng().gen_range(0..=spread_ms);
        (base + Duration::from_millis(extra)).min(self.config.max_delay)
    }

    pub fn next_attempt(&mut self) {
        self.execution += 1;
    }

    /// Whether the current execution is still within the retry budget.
    pub fn has_attempts_remaining(&self) -> bool {
        self.execution <= self.config.max_attempts
    }
}
