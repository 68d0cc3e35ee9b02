//! Retry configuration and delay calculation.

use std::time::Duration;

use rand::Rng;

/// Configuration for retry and structured-repair behaviour.
///
/// Uses exponential backoff with optional jitter:
///
/// ```rust
/// # use kiln::RetryConfig;
/// # use std::time::Duration;
/// let config = RetryConfig::new()
///     .max_attempts(5)
///     .max_repair_attempts(2)
///     .initial_delay(Duration::from_millis(200))
///     .jitter(true);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of sampler calls (including the initial one).
    /// 1 = no retry. Default: 3.
    pub max_attempts: u32,
    /// Maximum structured-repair passes after a parse or validation
    /// failure. Bounded by `max_attempts - 1` in practice. Default: 2.
    pub max_repair_attempts: u32,
    /// Base delay before the first retry. Default: 500ms.
    pub initial_delay: Duration,
    /// Maximum delay between retries (caps exponential growth). Default: 30s.
    pub max_delay: Duration,
    /// Whether to add random jitter to delays. Default: true.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            max_repair_attempts: 2,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a config that disables retries (single attempt).
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            max_repair_attempts: 0,
            ..Self::default()
        }
    }

    /// Set maximum attempts (including the initial call).
    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    /// Set maximum structured-repair passes.
    pub fn max_repair_attempts(mut self, n: u32) -> Self {
        self.max_repair_attempts = n;
        self
    }

    /// Set the base delay before the first retry.
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the maximum delay between retries.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Enable or disable jitter.
    pub fn jitter(mut self, enabled: bool) -> Self {
        self.jitter = enabled;
        self
    }

    /// Attempt budget, never below one call.
    pub(crate) fn attempt_budget(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Calculate the delay for a given retry number (0-indexed).
    ///
    /// Uses exponential backoff: `initial_delay * 2^retry`, capped at `max_delay`.
    /// Does NOT include jitter; see [`effective_delay()`](Self::effective_delay)
    /// for the full calculation.
    pub fn delay_for_attempt(&self, retry: u32) -> Duration {
        let delay = self
            .initial_delay
            .saturating_mul(2u32.saturating_pow(retry));
        delay.min(self.max_delay)
    }

    /// Calculate the delay actually waited before retry `retry`.
    ///
    /// With jitter enabled the delay is drawn uniformly from
    /// `[delay / 2, delay]`, so concurrent callers that failed together do
    /// not retry in lockstep.
    pub fn effective_delay(&self, retry: u32) -> Duration {
        let delay = self.delay_for_attempt(retry);
        if !self.jitter || delay.is_zero() {
            return delay;
        }
        let factor = rand::thread_rng().gen_range(0.5..=1.0);
        delay.mul_f64(factor)
    }
}
