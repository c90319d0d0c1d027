//! Identifiers for conversations and streaming sessions.
//!
//! A [`ConversationKey`] partitions independent conversations; a [`SessionId`]
//! names one streaming session writing into a conversation.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Generate a unique session ID.
///
/// Returns a UUID v4 string prefixed with "sess_".
///
/// # Example
///
/// ```rust
/// use chatflow_core::identifier::generate_session_id;
///
/// let id = generate_session_id();
/// assert!(id.starts_with("sess_"));
/// assert_eq!(id.len(), 37); // "sess_" + 32 hex chars
/// ```
#[must_use]
pub fn generate_session_id() -> String {
    format!("sess_{}", Uuid::new_v4().simple())
}

/// Get the current UTC timestamp.
#[must_use]
pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}

/// Opaque key addressing one conversation.
///
/// Keys built with [`ConversationKey::scoped`] also remember the workspace and
/// agent identifiers, which the transport needs to build the request path.
/// Two scoped keys are equal only when both identifiers match, even if their
/// joined strings coincide, and a scoped key never equals an opaque one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ConversationKey {
    key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    scope: Option<(String, String)>,
}

impl ConversationKey {
    /// Create a key from an opaque string.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            scope: None,
        }
    }

    /// Create a key for a workspace/agent pair.
    ///
    /// ```rust
    /// use chatflow_core::ConversationKey;
    ///
    /// let key = ConversationKey::scoped("acme", "support-bot");
    /// assert_eq!(key.as_str(), "acme:support-bot");
    /// assert_eq!(key.workspace(), Some("acme"));
    /// ```
    #[must_use]
    pub fn scoped(workspace: impl Into<String>, agent: impl Into<String>) -> Self {
        let workspace = workspace.into();
        let agent = agent.into();
        Self {
            key: format!("{}:{}", workspace, agent),
            scope: Some((workspace, agent)),
        }
    }

    /// Get the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.key
    }

    /// Workspace identifier, if the key was scoped.
    #[must_use]
    pub fn workspace(&self) -> Option<&str> {
        self.scope.as_ref().map(|(w, _)| w.as_str())
    }

    /// Agent identifier, if the key was scoped.
    #[must_use]
    pub fn agent(&self) -> Option<&str> {
        self.scope.as_ref().map(|(_, a)| a.as_str())
    }
}

impl std::fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key)
    }
}

impl From<&str> for ConversationKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ConversationKey {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Type-safe wrapper for a streaming session ID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Create a new session ID.
    #[must_use]
    pub fn new() -> Self {
        Self(generate_session_id())
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
