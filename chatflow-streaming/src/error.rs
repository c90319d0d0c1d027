//! Streaming errors.

use chatflow_retries::{Retryable, RetryableError};
use std::time::Duration;
use thiserror::Error;

/// Errors that can end a streaming session.
#[derive(Debug, Clone, Error)]
pub enum StreamError {
    /// No credential available to authenticate the request.
    #[error("Authentication failed: no credential available")]
    MissingCredential,

    /// Non-success HTTP status.
    #[error("HTTP error {status}: {body}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// Connection could not be established.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Reading the response body failed.
    #[error("Receive error: {0}")]
    Receive(String),

    /// No activity before the deadline.
    #[error("Timeout after {0:?} without activity")]
    Timeout(Duration),

    /// Body ended before a terminal frame.
    #[error("Connection closed before the stream completed")]
    ConnectionClosed,

    /// The server signaled an error frame.
    #[error("Server error: {0}")]
    Server(String),

    /// A frame grew past the buffer limit without a delimiter.
    #[error("Frame buffer exceeded {0} bytes")]
    BufferOverflow(usize),

    /// The request cannot be sent as given.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl StreamError {
    /// Whether this is a transport-level failure, eligible for retry.
    ///
    /// Server-signaled errors, missing credentials, and protocol violations
    /// are terminal.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Http { .. }
                | Self::Connection(_)
                | Self::Receive(_)
                | Self::Timeout(_)
                | Self::ConnectionClosed
        )
    }
}

impl Retryable for StreamError {
    fn is_retryable(&self) -> bool {
        self.is_transport()
    }

    fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<RetryableError> for StreamError {
    fn from(err: RetryableError) -> Self {
        match err {
            RetryableError::Http { status, body } => Self::Http { status, body },
            RetryableError::Connection(msg) => Self::Connection(msg),
            RetryableError::Timeout => Self::Connection("request timed out".to_string()),
            RetryableError::Other(err) => Self::Other(err.to_string()),
        }
    }
}

/// Result type for streaming operations.
pub type StreamResult<T> = Result<T, StreamError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StreamError::Timeout(Duration::from_secs(30));
        assert_eq!(err.to_string(), "Timeout after 30s without activity");
        assert_eq!(
            StreamError::Server("quota".into()).to_string(),
            "Server error: quota"
        );
    }

    #[test]
    fn test_transport_classification() {
        assert!(StreamError::Timeout(Duration::from_secs(1)).is_transport());
        assert!(StreamError::ConnectionClosed.is_transport());
        assert!(StreamError::Connection("refused".into()).is_transport());
        assert!(StreamError::Http {
            status: 404,
            body: String::new(),
        }
        .is_transport());

        assert!(!StreamError::MissingCredential.is_transport());
        assert!(!StreamError::Server("nope".into()).is_transport());
        assert!(!StreamError::BufferOverflow(10).is_transport());
    }

    #[test]
    fn test_from_retryable_error() {
        let err: StreamError = RetryableError::http(502, "bad gateway").into();
        assert!(matches!(err, StreamError::Http { status: 502, .. }));
        assert_eq!(err.status(), Some(502));

        let err: StreamError = RetryableError::Other(anyhow::anyhow!("weird")).into();
        assert!(!err.is_retryable());
    }
}
