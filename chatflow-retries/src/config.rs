//! Retry configuration.

use crate::error::Retryable;
use std::time::Duration;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
    /// Wait strategy.
    pub wait: WaitStrategy,
    /// Retry condition.
    pub retry_on: RetryCondition,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::for_streaming()
    }
}

impl RetryConfig {
    /// Create a new default config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set max retries.
    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    /// Set the wait strategy.
    pub fn wait(mut self, strategy: WaitStrategy) -> Self {
        self.wait = strategy;
        self
    }

    /// Use exponential backoff.
    pub fn exponential(mut self, initial: Duration, max: Duration) -> Self {
        self.wait = WaitStrategy::ExponentialBackoff {
            initial,
            max,
            multiplier: 2.0,
        };
        self
    }

    /// Use fixed delay.
    pub fn fixed(mut self, delay: Duration) -> Self {
        self.wait = WaitStrategy::Fixed(delay);
        self
    }

    /// Set retry condition.
    pub fn retry_on(mut self, condition: RetryCondition) -> Self {
        self.retry_on = condition;
        self
    }

    /// Defaults for streaming sessions: 3 retries, waits of
    /// `min(1s * 2^n, 10s)` for the n-th retry (0-based).
    pub fn for_streaming() -> Self {
        Self {
            max_retries: 3,
            wait: WaitStrategy::ExponentialBackoff {
                initial: Duration::from_secs(1),
                max: Duration::from_secs(10),
                multiplier: 2.0,
            },
            retry_on: RetryCondition::default(),
        }
    }

    /// Create config that never retries.
    pub fn no_retry() -> Self {
        Self::for_streaming().max_retries(0)
    }
}

/// Strategy for waiting between retries.
#[derive(Debug, Clone)]
pub enum WaitStrategy {
    /// Fixed delay.
    Fixed(Duration),
    /// Exponential backoff.
    ExponentialBackoff {
        /// Initial delay.
        initial: Duration,
        /// Maximum delay.
        max: Duration,
        /// Multiplier for each attempt.
        multiplier: f64,
    },
}

impl WaitStrategy {
    /// Calculate the wait duration for a given retry (1-indexed).
    pub fn calculate(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        match self {
            WaitStrategy::Fixed(d) => *d,
            WaitStrategy::ExponentialBackoff {
                initial,
                max,
                multiplier,
            } => {
                let delay = initial.as_secs_f64() * multiplier.powi(exponent);
                Duration::from_secs_f64(delay.min(max.as_secs_f64()))
            }
        }
    }
}

/// Condition for retrying.
///
/// By default every failure that classifies itself as retryable is retried.
/// Status codes listed in `never_on_status_codes` are surfaced immediately.
#[derive(Debug, Clone, Default)]
pub struct RetryCondition {
    /// HTTP status codes that are never retried.
    pub never_on_status_codes: Vec<u16>,
}

impl RetryCondition {
    /// Create a new condition that retries every transient failure.
    pub fn new() -> Self {
        Self::default()
    }

    /// Never retry these status codes.
    pub fn never_on_status(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.never_on_status_codes.extend(codes);
        self
    }

    /// Never retry client errors (4xx) other than 408 and 429.
    pub fn never_on_client_errors(self) -> Self {
        self.never_on_status((400..=499).filter(|c| *c != 408 && *c != 429))
    }

    /// Check if an error should be retried.
    pub fn should_retry<E: Retryable + ?Sized>(&self, error: &E) -> bool {
        if let Some(status) = error.status() {
            if self.never_on_status_codes.contains(&status) {
                return false;
            }
        }
        error.is_retryable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RetryableError;

    #[test]
    fn test_default_config() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 3);
        assert!(config.retry_on.never_on_status_codes.is_empty());
    }

    #[test]
    fn test_streaming_backoff_schedule() {
        let config = RetryConfig::for_streaming();
        let waits: Vec<_> = (1..=6).map(|n| config.wait.calculate(n)).collect();
        assert_eq!(
            waits,
            [1000, 2000, 4000, 8000, 10000, 10000].map(Duration::from_millis)
        );
    }

    #[test]
    fn test_wait_strategy_fixed() {
        let strategy = WaitStrategy::Fixed(Duration::from_secs(1));
        assert_eq!(strategy.calculate(1), Duration::from_secs(1));
        assert_eq!(strategy.calculate(3), Duration::from_secs(1));
    }

    #[test]
    fn test_custom_exponential_backoff() {
        let config = RetryConfig::new().exponential(Duration::from_millis(100), Duration::from_millis(300));
        let waits: Vec<_> = (1..=4).map(|n| config.wait.calculate(n)).collect();
        assert_eq!(waits, [100, 200, 300, 300].map(Duration::from_millis));
    }

    #[test]
    fn test_retry_condition() {
        let condition = RetryCondition::new();
        assert!(condition.should_retry(&RetryableError::http(500, "")));
        assert!(condition.should_retry(&RetryableError::http(401, "")));

        let strict = RetryCondition::new().never_on_client_errors();
        assert!(!strict.should_retry(&RetryableError::http(401, "")));
        assert!(strict.should_retry(&RetryableError::http(429, "")));
        assert!(strict.should_retry(&RetryableError::Timeout));
    }
}
