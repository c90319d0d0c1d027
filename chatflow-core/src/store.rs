//! Keyed conversation store.
//!
//! The store maps each [`ConversationKey`] to its own [`Conversation`] plus the
//! id of the streaming session that currently owns the in-flight message.
//! The outer map lock is held only long enough to look up or insert an entry;
//! each conversation is guarded by its own lock, so sessions on different
//! keys never contend on conversation state.
//!
//! Every session-scoped write takes the writer's [`SessionId`] and is
//! rejected once that session no longer owns the key. This is what keeps a
//! cancelled or replaced session from touching the conversation afterward.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::conversation::Conversation;
use crate::errors::{CoreError, CoreResult};
use crate::identifier::{ConversationKey, SessionId};
use crate::messages::{Message, Role};

#[derive(Debug, Default)]
struct ConversationEntry {
    conversation: Conversation,
    owner: Option<SessionId>,
}

impl ConversationEntry {
    fn owned_by(&self, session: &SessionId) -> bool {
        self.owner.as_ref() == Some(session)
    }

    /// Make sure the last message is an empty streaming assistant message.
    fn open_placeholder(&mut self) {
        match self.conversation.last_mut() {
            Some(last) if last.is_in_flight() && last.content().is_empty() => {}
            Some(last) if last.is_in_flight() => {
                last.finalize();
                self.conversation.push(Message::streaming_assistant());
            }
            _ => self.conversation.push(Message::streaming_assistant()),
        }
    }

    /// Finalize the in-flight message as-is, dropping it if it never got content.
    fn close_placeholder(&mut self) {
        let empty = match self.conversation.last_mut() {
            Some(last) if last.is_in_flight() => {
                last.finalize();
                last.content().is_empty()
            }
            _ => false,
        };
        if empty {
            self.conversation.pop();
        }
    }
}

/// Shared, cloneable store of conversations keyed by [`ConversationKey`].
#[derive(Debug, Clone, Default)]
pub struct ConversationStore {
    entries: Arc<RwLock<HashMap<ConversationKey, Arc<Mutex<ConversationEntry>>>>>,
}

impl ConversationStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, key: &ConversationKey) -> Arc<Mutex<ConversationEntry>> {
        if let Some(entry) = self.entries.read().get(key) {
            return Arc::clone(entry);
        }
        Arc::clone(self.entries.write().entry(key.clone()).or_default())
    }

    fn existing(&self, key: &ConversationKey) -> Option<Arc<Mutex<ConversationEntry>>> {
        self.entries.read().get(key).cloned()
    }

    /// Replace the history of a conversation, e.g. after loading it from the
    /// history endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::SessionActive`] while a session owns the key.
    pub fn load_history(&self, key: &ConversationKey, messages: Vec<Message>) -> CoreResult<()> {
        let entry = self.entry(key);
        let mut entry = entry.lock();
        if entry.owner.is_some() {
            return Err(CoreError::session_active(key));
        }
        entry.conversation = Conversation::from_messages(messages);
        Ok(())
    }

    /// Append a user message.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::SessionActive`] while a session owns the key, since
    /// the in-flight assistant message must stay last.
    pub fn push_user_message(
        &self,
        key: &ConversationKey,
        content: impl Into<String>,
    ) -> CoreResult<()> {
        let entry = self.entry(key);
        let mut entry = entry.lock();
        if entry.owner.is_some() {
            return Err(CoreError::session_active(key));
        }
        entry.conversation.push(Message::user(content));
        Ok(())
    }

    /// Snapshot of a conversation.
    #[must_use]
    pub fn conversation(&self, key: &ConversationKey) -> Option<Conversation> {
        self.existing(key)
            .map(|entry| entry.lock().conversation.clone())
    }

    /// Snapshot of a conversation's messages (empty if unknown).
    #[must_use]
    pub fn messages(&self, key: &ConversationKey) -> Vec<Message> {
        self.conversation(key)
            .map(|c| c.messages().to_vec())
            .unwrap_or_default()
    }

    /// Session currently owning the key.
    #[must_use]
    pub fn owner(&self, key: &ConversationKey) -> Option<SessionId> {
        self.existing(key).and_then(|entry| entry.lock().owner.clone())
    }

    /// Whether a session currently owns the key.
    #[must_use]
    pub fn is_streaming(&self, key: &ConversationKey) -> bool {
        self.owner(key).is_some()
    }

    /// All known keys.
    #[must_use]
    pub fn keys(&self) -> Vec<ConversationKey> {
        self.entries.read().keys().cloned().collect()
    }

    /// Forget a conversation.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::SessionActive`] while a session owns the key.
    pub fn remove(&self, key: &ConversationKey) -> CoreResult<Option<Conversation>> {
        let mut entries = self.entries.write();
        if let Some(entry) = entries.get(key) {
            if entry.lock().owner.is_some() {
                return Err(CoreError::session_active(key));
            }
        }
        Ok(entries
            .remove(key)
            .map(|entry| std::mem::take(&mut entry.lock().conversation)))
    }

    /// Hand the key to `session`, record its prompt, and open its in-flight
    /// assistant message.
    ///
    /// A previous owner is displaced: its in-flight message is finalized with
    /// whatever content it already has. Returns the displaced owner.
    pub fn claim(
        &self,
        key: &ConversationKey,
        session: &SessionId,
        prompt: Option<&str>,
    ) -> Option<SessionId> {
        let entry = self.entry(key);
        let mut entry = entry.lock();
        let previous = entry.owner.take();
        if previous.is_some() {
            entry.close_placeholder();
        }
        if let Some(prompt) = prompt {
            entry.conversation.push(Message::user(prompt));
        }
        entry.owner = Some(session.clone());
        entry.open_placeholder();
        previous.filter(|p| p != session)
    }

    /// Open a fresh in-flight message for a new attempt of an owning session.
    ///
    /// An empty placeholder left by the previous attempt is reused; partial
    /// content from it is kept as a finalized message. Returns `false` if the
    /// session no longer owns the key.
    pub fn restart(&self, key: &ConversationKey, session: &SessionId) -> bool {
        let entry = self.entry(key);
        let mut entry = entry.lock();
        if !entry.owned_by(session) {
            return false;
        }
        entry.open_placeholder();
        true
    }

    /// Append text to the last message. Returns `false` if rejected.
    pub fn append(&self, key: &ConversationKey, session: &SessionId, text: &str) -> bool {
        let Some(entry) = self.existing(key) else {
            return false;
        };
        let mut entry = entry.lock();
        if !entry.owned_by(session) {
            return false;
        }
        match entry.conversation.last_mut() {
            Some(last) if last.role() == Role::Assistant => last.push_str(text),
            _ => false,
        }
    }

    /// Finalize the in-flight message after a successful stream and release
    /// the key. Returns `false` if the session no longer owns the key.
    pub fn complete(&self, key: &ConversationKey, session: &SessionId) -> bool {
        let Some(entry) = self.existing(key) else {
            return false;
        };
        let mut entry = entry.lock();
        if !entry.owned_by(session) {
            return false;
        }
        if let Some(last) = entry.conversation.last_mut() {
            if last.is_in_flight() {
                last.finalize();
            }
        }
        entry.owner = None;
        true
    }

    /// Record a failure and release the key.
    ///
    /// Partial content is kept and annotated with the error; an empty
    /// placeholder is replaced by a system message carrying the error.
    /// Returns `false` if the session no longer owns the key.
    pub fn fail(&self, key: &ConversationKey, session: &SessionId, error: &str) -> bool {
        let Some(entry) = self.existing(key) else {
            return false;
        };
        let mut entry = entry.lock();
        if !entry.owned_by(session) {
            return false;
        }
        let partial = match entry.conversation.last() {
            Some(last) if last.is_in_flight() => Some(!last.content().is_empty()),
            _ => None,
        };
        match partial {
            Some(true) => {
                if let Some(last) = entry.conversation.last_mut() {
                    last.annotate_error(error);
                }
            }
            Some(false) => {
                entry.conversation.pop();
                entry.conversation.push(Message::system(error));
            }
            None => entry.conversation.push(Message::system(error)),
        }
        entry.owner = None;
        true
    }

    /// Stop a session without reporting an error and release the key.
    ///
    /// Partial content is kept as-is; an empty placeholder is dropped.
    /// Returns `false` if the session no longer owns the key.
    pub fn release(&self, key: &ConversationKey, session: &SessionId) -> bool {
        let Some(entry) = self.existing(key) else {
            return false;
        };
        let mut entry = entry.lock();
        if !entry.owned_by(session) {
            return false;
        }
        entry.close_placeholder();
        entry.owner = None;
        true
    }
}
