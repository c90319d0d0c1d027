//! Error types for chatflow-core.

use thiserror::Error;

use crate::identifier::ConversationKey;

/// Errors raised by the conversation store.
#[derive(Error, Debug)]
pub enum CoreError {
    /// The operation needs the conversation to be idle.
    #[error("A streaming session is active for conversation '{key}'")]
    SessionActive {
        /// Key of the busy conversation.
        key: String,
    },
}

impl CoreError {
    /// Create a session-active error for a key.
    pub fn session_active(key: &ConversationKey) -> Self {
        Self::SessionActive {
            key: key.to_string(),
        }
    }
}

/// Result type alias using CoreError.
pub type CoreResult<T> = std::result::Result<T, CoreError>;
