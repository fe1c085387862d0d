//! Retry policy: fixed interval by default, optional exponential backoff and
//! an optional cap on consecutive attempts.

use std::time::Duration;

/// Default delay between a session ending and the next connect attempt.
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_secs(5);

/// Configuration for the retry policy.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Delay before the first retry.
    pub interval: Duration,
    /// Multiplier applied per consecutive failure (1.0 = fixed interval).
    pub multiplier: f64,
    /// Upper bound for the grown delay.
    pub max_interval: Duration,
    /// Give up after this many consecutive failures (`None` = never).
    pub max_retries: Option<u32>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::fixed(DEFAULT_RECONNECT_INTERVAL)
    }
}

impl RetryConfig {
    /// Same delay every time, retry forever.
    pub fn fixed(interval: Duration) -> Self {
        Self {
            interval,
            multiplier: 1.0,
            max_interval: interval,
            max_retries: None,
        }
    }

    /// Delay grows by `multiplier` per consecutive failure, capped at `max_interval`.
    pub fn exponential(interval: Duration, max_interval: Duration, multiplier: f64) -> Self {
        Self {
            interval,
            multiplier,
            max_interval,
            max_retries: None,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }
}

/// Stateless retry policy: computes the next delay given the attempt number.
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    pub config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Delay before the `attempt`-th consecutive retry (1-based).
    /// Returns `None` once `attempt` exceeds `max_retries`.
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if !self.should_retry(attempt) {
            return None;
        }
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base_ms = self.config.interval.as_millis() as f64 * self.config.multiplier.powi(exponent);
        let cap_ms = self.config.max_interval.max(self.config.interval).as_millis() as f64;
        Some(Duration::from_millis(base_ms.min(cap_ms) as u64))
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        self.config.max_retries.map_or(true, |max| attempt <= max)
    }
}
