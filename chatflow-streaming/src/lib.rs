//! # chatflow-streaming
//!
//! Incremental delivery of assistant responses into keyed conversations.
//!
//! A response arrives as a chunked body of `data: {...}` frames. This crate
//! decodes those frames, drives the request with a timeout, retries, and
//! cancellation, and writes each token into the conversation that started
//! the request.
//!
//! ## Core Concepts
//!
//! - **[`FrameParser`]**: Decode frames from arbitrarily split chunks
//! - **[`SessionController`]**: Connect, read, retry, and finalize one session
//! - **[`ConversationSink`]**: Session-scoped writes into a [`ConversationStore`]
//! - **[`StreamClient`]**: Callback and pull façades over the controller
//!
//! ## Example - Callbacks
//!
//! ```ignore
//! use chatflow_streaming::prelude::*;
//!
//! let config = ClientConfig::from_env()?;
//! let client = StreamClient::from_config(&config, EnvCredential::default());
//! let key = ConversationKey::scoped("acme", "support-bot");
//!
//! let handle = client.start(
//!     key,
//!     "Where is my order?",
//!     StreamCallbacks::new()
//!         .on_token(|t| print!("{t}"))
//!         .on_complete(|| println!())
//!         .on_error(|e| eprintln!("failed: {e}")),
//! );
//! let report = handle.wait().await?;
//! ```
//!
//! ## Example - Pull
//!
//! ```ignore
//! use futures::StreamExt;
//!
//! let mut tokens = client.stream(key, "Summarize this ticket");
//! while let Some(token) = tokens.next().await {
//!     print!("{}", token?);
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod events;
pub mod frame;
pub mod session;
pub mod sink;
pub mod transport;

#[cfg(test)]
mod testing;

// Re-exports
pub use chatflow_core::{Conversation, ConversationKey, ConversationStore, Message, Role, SessionId};
pub use client::{
    CancelHandle, StreamCallbacks, StreamClient, StreamHandle, TokenStream, TOKEN_BUFFER,
};
pub use config::{ClientConfig, StreamConfig, DEFAULT_TIMEOUT};
pub use credentials::{CredentialProvider, EnvCredential, StaticCredential};
pub use error::{StreamError, StreamResult};
pub use events::ProtocolEvent;
pub use frame::{FrameParser, MAX_BUFFER_SIZE};
pub use session::{
    DeliveryGate, SessionController, SessionObserver, SessionOutcome, SessionReport, SessionState,
};
pub use sink::ConversationSink;
pub use transport::{ByteStream, HttpTransport, StreamRequest, StreamTransport};

/// Prelude for common imports.
pub mod prelude {
    pub use crate::{
        ClientConfig, ConversationKey, EnvCredential, ProtocolEvent, SessionOutcome,
        StaticCredential, StreamCallbacks, StreamClient, StreamConfig, StreamError, StreamRequest,
        StreamResult, TokenStream,
    };
}
