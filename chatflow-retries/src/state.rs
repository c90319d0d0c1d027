//! Retry bookkeeping for a long-lived operation.
//!
//! Unlike a closure-based retry helper, a streaming session has to interleave
//! retries with cancellation and partial delivery, so the caller owns the loop
//! and consults [`RetryState`] at each failure.

use crate::config::RetryConfig;
use crate::error::Retryable;
use std::time::Duration;

/// State of a retrying operation.
#[derive(Debug, Clone, Default)]
pub struct RetryState {
    /// Number of retries performed so far (0 during the first attempt).
    pub attempt: u32,
    /// Last error message.
    pub last_error: Option<String>,
    /// Total time spent waiting.
    pub total_wait_time: Duration,
    /// History of attempts.
    pub history: Vec<AttemptInfo>,
}

/// Information about a single attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptInfo {
    /// Retry number of this attempt (0 for the first one).
    pub attempt: u32,
    /// Whether it succeeded.
    pub success: bool,
    /// Error message if failed.
    pub error: Option<String>,
    /// Time waited after this attempt before the next one.
    pub wait_time: Duration,
}

impl RetryState {
    /// Create a fresh state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide whether the failure of the current attempt may be retried.
    ///
    /// Returns the delay to wait before the next attempt, or `None` once the
    /// budget is exhausted or the error is not retryable.
    pub fn next_delay<E: Retryable + ?Sized>(
        &self,
        config: &RetryConfig,
        error: &E,
    ) -> Option<Duration> {
        if self.attempt >= config.max_retries || !config.retry_on.should_retry(error) {
            return None;
        }
        Some(config.wait.calculate(self.attempt + 1))
    }

    /// Record a failed attempt and, if `wait` is set, advance to the next one.
    pub fn record_failure(&mut self, error: &impl std::fmt::Display, wait: Option<Duration>) {
        let message = error.to_string();
        self.history.push(AttemptInfo {
            attempt: self.attempt,
            success: false,
            error: Some(message.clone()),
            wait_time: wait.unwrap_or(Duration::ZERO),
        });
        self.last_error = Some(message);
        if let Some(wait) = wait {
            self.total_wait_time += wait;
            self.attempt += 1;
        }
    }

    /// Record a successful attempt.
    pub fn record_success(&mut self) {
        self.history.push(AttemptInfo {
            attempt: self.attempt,
            success: true,
            error: None,
            wait_time: Duration::ZERO,
        });
    }

    /// Total number of attempts recorded.
    pub fn attempts(&self) -> usize {
        self.history.len()
    }
}
