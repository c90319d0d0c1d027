//! # chatflow-retries
//!
//! Retry policy and bookkeeping for chatflow streaming sessions.
//!
//! ## Core Concepts
//!
//! - **[`RetryConfig`]**: How many retries, how long to wait, and which failures qualify
//! - **[`WaitStrategy`]**: Delay between attempts
//! - **[`RetryCondition`]**: Filter on top of each error's own classification
//! - **[`Retryable`]**: Trait implemented by errors the retry machinery inspects
//! - **[`RetryState`]**: Per-operation attempt counter and history
//!
//! ## Example
//!
//! ```rust
//! use chatflow_retries::{RetryConfig, RetryState, RetryableError};
//! use std::time::Duration;
//!
//! let config = RetryConfig::for_streaming();
//! let mut state = RetryState::new();
//! let error = RetryableError::Timeout;
//!
//! let wait = state.next_delay(&config, &error);
//! assert_eq!(wait, Some(Duration::from_secs(1)));
//! state.record_failure(&error, wait);
//! assert_eq!(state.attempt, 1);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod state;
pub mod transport;

// Re-exports
pub use config::{RetryCondition, RetryConfig, WaitStrategy};
pub use error::{RetryResult, Retryable, RetryableError};
pub use state::{AttemptInfo, RetryState};
pub use transport::check_response;

/// Prelude for common imports.
pub mod prelude {
    pub use crate::{RetryConfig, RetryResult, RetryState, Retryable, RetryableError, WaitStrategy};
}
