//! # chatflow - Streaming Assistant Responses for CRM Conversations
//!
//! chatflow sends a user's message to an assistant endpoint and streams the
//! reply back token by token into the conversation it belongs to. Every
//! conversation is addressed by a [`ConversationKey`], and sessions on
//! different keys run independently.
//!
//! ## Quick Start
//!
//! ```ignore
//! use chatflow::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ClientConfig::from_env()?;
//!     let client = StreamClient::from_config(&config, EnvCredential::default());
//!     let key = ConversationKey::scoped("acme", "support-bot");
//!
//!     let text = client.stream(key, "Where is my order?").collect_text().await?;
//!     println!("{}", text);
//!     Ok(())
//! }
//! ```
//!
//! ## Key Features
//!
//! - **Fragmentation-safe framing**: chunks may split frames anywhere
//! - **Retries** with exponential backoff (1 s, 2 s, 4 s, capped at 10 s)
//! - **Inactivity timeout** re-armed on every chunk
//! - **Cancellation** that stops all writes as soon as it returns
//! - **Two façades**: callbacks ([`StreamClient::start`]) or a token stream
//!   ([`StreamClient::stream`])
//!
//! ## Architecture
//!
//! - [`chatflow_core`] - Messages, conversations, and the keyed store
//! - [`chatflow_retries`] - Retry policy and attempt bookkeeping
//! - [`chatflow_streaming`] - Frame parsing, transport, sessions, and client
//!
//! ## Configuration
//!
//! | Variable | Meaning | Default |
//! |----------|---------|---------|
//! | `CHATFLOW_API_BASE_URL` | API base URL | required |
//! | `CHATFLOW_API_TOKEN` | Bearer token read by [`EnvCredential`] | required |
//! | `CHATFLOW_TIMEOUT_SECONDS` | Inactivity timeout | `30` |
//! | `CHATFLOW_MAX_RETRIES` | Retries after transport failures | `3` |

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

// ============================================================================
// Crate Re-exports
// ============================================================================

/// Core types: messages, conversations, and the keyed store.
pub use chatflow_core as core;

/// Retry policy and bookkeeping.
pub use chatflow_retries as retries;

/// Streaming sessions and the public client.
pub use chatflow_streaming as streaming;

// ============================================================================
// Type Re-exports
// ============================================================================

pub use chatflow_core::{
    Conversation, ConversationKey, ConversationStore, CoreError, CoreResult, Message, Role,
    SessionId,
};

pub use chatflow_retries::{RetryCondition, RetryConfig, RetryState, WaitStrategy};

pub use chatflow_streaming::{
    CancelHandle, ClientConfig, CredentialProvider, EnvCredential, HttpTransport, SessionOutcome,
    SessionReport, SessionState, StaticCredential, StreamCallbacks, StreamClient, StreamConfig,
    StreamError, StreamHandle, StreamRequest, StreamResult, StreamTransport, TokenStream,
};

// ============================================================================
// Prelude Module
// ============================================================================

/// Convenient prelude for common imports.
///
/// ```ignore
/// use chatflow::prelude::*;
/// ```
pub mod prelude {
    // Conversations
    pub use crate::core::{Conversation, ConversationKey, ConversationStore, Message, Role};

    // Client
    pub use crate::streaming::{
        ClientConfig, EnvCredential, SessionOutcome, StaticCredential, StreamCallbacks,
        StreamClient, StreamConfig, StreamError, StreamHandle, StreamRequest, StreamResult,
        TokenStream,
    };

    // Retries
    pub use crate::retries::{RetryConfig, WaitStrategy};
}

// ============================================================================
// Version Information
// ============================================================================

/// Returns the current version of chatflow.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use url::Url;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const BODY: &str = "data: {\"token\":\"Your order \"}\n\n\
                        : keep-alive\n\n\
                        data: {\"token\":\"ships today\"}\n\n\
                        data: {\"done\":true}\n\n";

    fn http_client(server: &MockServer, credential: StaticCredential) -> StreamClient {
        let config = ClientConfig::new(Url::parse(&server.uri()).unwrap());
        StreamClient::from_config(&config, credential)
    }

    #[test]
    fn test_version() {
        assert_eq!(version(), env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_end_to_end_over_http() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/workspaces/acme/agents/bot/chat/stream"))
            .and(header("authorization", "Bearer secret"))
            .and(header("accept", "text/event-stream"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(BODY),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = http_client(&server, StaticCredential::new("secret"));
        let key = ConversationKey::scoped("acme", "bot");

        let tokens: Vec<String> = client
            .stream(key.clone(), "Where is my order?")
            .map(|t| t.unwrap())
            .collect()
            .await;
        assert_eq!(tokens, ["Your order ", "ships today"]);

        let conversation = client.conversation(&key).unwrap();
        let messages = conversation.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role(), Role::User);
        assert_eq!(messages[1].content(), "Your order ships today");
        assert!(!messages[1].is_streaming());
    }

    #[tokio::test]
    async fn test_http_error_is_retried_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string(BODY))
            .mount(&server)
            .await;

        let client = http_client(&server, StaticCredential::new("secret")).with_config(
            StreamConfig::default().retry(RetryConfig::for_streaming().fixed(Duration::from_millis(10))),
        );
        let retries = std::sync::Arc::new(std::sync::atomic::AtomicU32::new(0));
        let seen = retries.clone();

        let report = client
            .start(
                ConversationKey::scoped("acme", "bot"),
                "hi",
                StreamCallbacks::new().on_retry(move |_, _| {
                    seen.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                }),
            )
            .wait()
            .await
            .unwrap();

        assert!(report.outcome.is_completed());
        assert_eq!(retries.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(report.retries.attempts(), 2);
    }

    #[tokio::test]
    async fn test_missing_credential_never_sends() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string(BODY))
            .expect(0)
            .mount(&server)
            .await;

        let client = http_client(&server, StaticCredential::none());
        let mut stream = client.stream(ConversationKey::scoped("acme", "bot"), "hi");

        assert!(matches!(
            stream.next().await,
            Some(Err(StreamError::MissingCredential))
        ));
        assert!(stream.next().await.is_none());
    }
}
