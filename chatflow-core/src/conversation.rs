//! Ordered message history of one conversation.

use serde::{Deserialize, Serialize};

use crate::messages::Message;

/// An ordered sequence of messages.
///
/// Messages are only ever appended (or, for an empty streaming placeholder,
/// removed from the end); existing messages are never reordered.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    /// Create an empty conversation.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a conversation from existing history.
    #[must_use]
    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    /// All messages, oldest first.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// The most recent message.
    #[must_use]
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Number of messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the conversation has no messages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Concatenated content of all messages, one per line.
    #[must_use]
    pub fn transcript(&self) -> String {
        self.messages
            .iter()
            .map(|m| format!("{}: {}", m.role(), m.content()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub(crate) fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub(crate) fn last_mut(&mut self) -> Option<&mut Message> {
        self.messages.last_mut()
    }

    pub(crate) fn pop(&mut self) -> Option<Message> {
        self.messages.pop()
    }
}

impl From<Vec<Message>> for Conversation {
    fn from(messages: Vec<Message>) -> Self {
        Self::from_messages(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preserves_insertion_order() {
        let mut conv = Conversation::new();
        conv.push(Message::user("one"));
        conv.push(Message::assistant("two"));
        conv.push(Message::user("three"));

        let contents: Vec<_> = conv.messages().iter().map(|m| m.content()).collect();
        assert_eq!(contents, ["one", "two", "three"]);
        assert_eq!(conv.last().map(|m| m.content()), Some("three"));
    }

    #[test]
    fn test_transcript() {
        let conv = Conversation::from(vec![Message::user("hi"), Message::assistant("hello")]);
        assert_eq!(conv.transcript(), "user: hi\nassistant: hello");
    }
}
