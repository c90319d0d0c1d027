//! Applies protocol events to one conversation.
//!
//! A [`ConversationSink`] is bound to a single (key, session) pair. All writes
//! go through the shared [`ConversationStore`], which rejects them once the
//! session has been cancelled or replaced.

use crate::error::StreamError;
use crate::events::ProtocolEvent;
use chatflow_core::{ConversationKey, ConversationStore, SessionId};
use tracing::{debug, trace};

/// Session-scoped writer into the conversation store.
#[derive(Debug, Clone)]
pub struct ConversationSink {
    store: ConversationStore,
    key: ConversationKey,
    session: SessionId,
}

impl ConversationSink {
    /// Bind a sink to a conversation and session.
    pub fn new(store: ConversationStore, key: ConversationKey, session: SessionId) -> Self {
        Self {
            store,
            key,
            session,
        }
    }

    /// Conversation key.
    pub fn key(&self) -> &ConversationKey {
        &self.key
    }

    /// Session id.
    pub fn session(&self) -> &SessionId {
        &self.session
    }

    /// Take ownership of the conversation, record the prompt, and open an
    /// empty assistant message. Returns the displaced session, if any.
    pub fn begin(&self, prompt: Option<&str>) -> Option<SessionId> {
        let displaced = self.store.claim(&self.key, &self.session, prompt);
        debug!(key = %self.key, session = %self.session, displaced = ?displaced, "Sink claimed conversation");
        displaced
    }

    /// Open a fresh assistant message for a retry attempt.
    pub fn restart(&self) -> bool {
        self.store.restart(&self.key, &self.session)
    }

    /// Apply a protocol event. Returns `false` if the write was rejected.
    pub fn apply(&self, event: &ProtocolEvent) -> bool {
        let applied = match event {
            ProtocolEvent::Token(text) => self.store.append(&self.key, &self.session, text),
            ProtocolEvent::Done => self.store.complete(&self.key, &self.session),
            ProtocolEvent::Error(message) => self.store.fail(&self.key, &self.session, message),
        };
        if !applied {
            trace!(key = %self.key, session = %self.session, "Sink write rejected");
        }
        applied
    }

    /// Record a failure surfaced by the controller.
    ///
    /// Server-signaled errors are recorded with the server's own message.
    pub fn fail(&self, error: &StreamError) -> bool {
        let message = match error {
            StreamError::Server(message) => message.clone(),
            other => other.to_string(),
        };
        self.store.fail(&self.key, &self.session, &message)
    }

    /// Finalize after cancellation, keeping partial content.
    pub fn cancel(&self) -> bool {
        self.store.release(&self.key, &self.session)
    }
}
