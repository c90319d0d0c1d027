//! Retry error types.

use thiserror::Error;

/// Classification shared by every error the retry machinery looks at.
pub trait Retryable {
    /// Whether this failure is transient and may be retried.
    fn is_retryable(&self) -> bool;

    /// HTTP status behind the failure, if any.
    fn status(&self) -> Option<u16> {
        None
    }
}

/// Failures observed while establishing an HTTP exchange.
#[derive(Debug, Error)]
pub enum RetryableError {
    /// Non-success HTTP status.
    #[error("HTTP error {status}: {body}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// Timeout.
    #[error("Timeout")]
    Timeout,

    /// Connection error.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Other error.
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl RetryableError {
    /// Create an HTTP error.
    pub fn http(status: u16, body: impl Into<String>) -> Self {
        Self::Http {
            status,
            body: body.into(),
        }
    }

    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }
}

impl Retryable for RetryableError {
    /// Every non-success status counts as a transport failure.
    fn is_retryable(&self) -> bool {
        !matches!(self, Self::Other(_))
    }

    fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Result type for retry operations.
pub type RetryResult<T> = Result<T, RetryableError>;
