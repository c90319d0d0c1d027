//! Conversation messages.
//!
//! A [`Message`] is appended to while it is streaming and becomes immutable
//! once finalized. Only the store in this crate can mutate a message; callers
//! receive clones.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identifier::now_utc;

/// Prefix used when an error annotation is appended to partial content.
pub const ERROR_ANNOTATION_PREFIX: &str = "\n\n[error] ";

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Message typed by the user.
    User,
    /// Message generated by the assistant.
    Assistant,
    /// Message produced by the client itself (e.g. error notices).
    System,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        };
        f.write_str(s)
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    role: Role,
    content: String,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    streaming: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl Message {
    /// Create a finalized message.
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: now_utc(),
            streaming: false,
            error: None,
        }
    }

    /// Create a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create a finalized assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create a system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub(crate) fn streaming_assistant() -> Self {
        Self {
            streaming: true,
            ..Self::assistant(String::new())
        }
    }

    /// Author of the message.
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Text content.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Creation time.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Whether tokens are still being appended.
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// Error recorded when the stream producing this message failed.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Whether this is an assistant message that is still streaming.
    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        self.role == Role::Assistant && self.streaming
    }

    pub(crate) fn push_str(&mut self, text: &str) -> bool {
        if !self.streaming {
            return false;
        }
        self.content.push_str(text);
        true
    }

    pub(crate) fn finalize(&mut self) {
        self.streaming = false;
    }

    pub(crate) fn annotate_error(&mut self, message: &str) {
        self.content.push_str(ERROR_ANNOTATION_PREFIX);
        self.content.push_str(message);
        self.error = Some(message.to_string());
        self.streaming = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors() {
        assert_eq!(Message::user("hi").role(), Role::User);
        assert_eq!(Message::assistant("hey").content(), "hey");
        assert!(!Message::system("note").is_streaming());
    }

    #[test]
    fn test_streaming_message_is_append_only_until_finalized() {
        let mut msg = Message::streaming_assistant();
        assert!(msg.is_in_flight());
        assert!(msg.push_str("Hel"));
        assert!(msg.push_str("lo"));
        msg.finalize();
        assert!(!msg.push_str("!"));
        assert_eq!(msg.content(), "Hello");
    }

    #[test]
    fn test_error_annotation() {
        let mut msg = Message::streaming_assistant();
        msg.push_str("partial");
        msg.annotate_error("boom");
        assert_eq!(msg.content(), "partial\n\n[error] boom");
        assert_eq!(msg.error(), Some("boom"));
        assert!(!msg.is_streaming());
    }

    #[test]
    fn test_role_serde() {
        let json = serde_json::to_string(&Role::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
        let msg: Message = serde_json::from_str(
            r#"{"role":"user","content":"hi","timestamp":"2024-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(msg.role(), Role::User);
        assert!(!msg.is_streaming());
    }
}
