//! # chatflow-core
//!
//! Core types for the chatflow streaming client.
//!
//! - **Messages**: [`Message`] and [`Role`]
//! - **Conversations**: ordered [`Conversation`] history
//! - **Store**: the keyed [`ConversationStore`] shared by streaming sessions
//! - **Identifiers**: [`ConversationKey`] and [`SessionId`]
//! - **Errors**: [`CoreError`]
//!
//! ## Example
//!
//! ```rust
//! use chatflow_core::{ConversationKey, ConversationStore, SessionId};
//!
//! let store = ConversationStore::new();
//! let key = ConversationKey::scoped("acme", "support-bot");
//!
//! let session = SessionId::new();
//! store.claim(&key, &session, Some("Where is my order?"));
//! store.append(&key, &session, "Let me check.");
//! store.complete(&key, &session);
//!
//! let messages = store.messages(&key);
//! assert_eq!(messages[1].content(), "Let me check.");
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod conversation;
pub mod errors;
pub mod identifier;
pub mod messages;
pub mod store;

// Re-exports for convenience
pub use conversation::Conversation;
pub use errors::{CoreError, CoreResult};
pub use identifier::{now_utc, ConversationKey, SessionId};
pub use messages::{Message, Role, ERROR_ANNOTATION_PREFIX};
pub use store::ConversationStore;
