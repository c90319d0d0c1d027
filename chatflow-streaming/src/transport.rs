//! Network side of a streaming session.
//!
//! A [`StreamTransport`] performs one exchange per call: it sends the request
//! and hands back the raw response body as a byte stream. Timeouts, retries,
//! and cancellation are layered on top by the session controller, so
//! implementations must not retry on their own.

use crate::error::{StreamError, StreamResult};
use async_trait::async_trait;
use bytes::Bytes;
use chatflow_core::ConversationKey;
use chatflow_retries::{check_response, RetryableError};
use futures::{Stream, StreamExt};
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tracing::debug;
use url::Url;

/// Raw response body.
pub type ByteStream = Pin<Box<dyn Stream<Item = StreamResult<Bytes>> + Send>>;

/// JSON body of a streaming request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRequest {
    /// The user's message.
    pub message: String,
}

impl StreamRequest {
    /// Create a request for a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<&str> for StreamRequest {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for StreamRequest {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

/// Opens one streaming exchange.
#[async_trait]
pub trait StreamTransport: Send + Sync {
    /// Send the request and return the response body.
    ///
    /// Failures to connect and non-success statuses must be reported as
    /// transport errors (see [`StreamError::is_transport`]).
    async fn open(
        &self,
        key: &ConversationKey,
        request: &StreamRequest,
        credential: &str,
    ) -> StreamResult<ByteStream>;
}

/// HTTP implementation of [`StreamTransport`] on top of reqwest.
///
/// Posts to `{base_url}/workspaces/{workspace}/agents/{agent}/chat/stream`.
/// The reqwest client carries no request timeout; the session deadline
/// governs instead.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: Url,
}

impl HttpTransport {
    /// Create a transport with a default client.
    pub fn new(base_url: Url) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    /// Create a transport with a custom client.
    pub fn with_client(client: Client, base_url: Url) -> Self {
        Self { client, base_url }
    }

    /// Base URL of the API.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build the endpoint URL for a conversation.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::InvalidRequest`] if the key was not built with
    /// [`ConversationKey::scoped`].
    pub fn endpoint(&self, key: &ConversationKey) -> StreamResult<Url> {
        let (Some(workspace), Some(agent)) = (key.workspace(), key.agent()) else {
            return Err(StreamError::InvalidRequest(format!(
                "conversation key '{}' has no workspace/agent scope",
                key
            )));
        };

        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| StreamError::Configuration(format!("cannot-be-a-base URL: {}", self.base_url)))?
            .pop_if_empty()
            .extend(["workspaces", workspace, "agents", agent, "chat", "stream"]);
        Ok(url)
    }
}

#[async_trait]
impl StreamTransport for HttpTransport {
    async fn open(
        &self,
        key: &ConversationKey,
        request: &StreamRequest,
        credential: &str,
    ) -> StreamResult<ByteStream> {
        let url = self.endpoint(key)?;
        debug!(url = %url, key = %key, "Opening stream");

        let response = self
            .client
            .post(url)
            .bearer_auth(credential)
            .header(header::ACCEPT, "text/event-stream")
            .json(request)
            .send()
            .await
            .map_err(RetryableError::from)?;

        let response = check_response(response).await?;

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| StreamError::Receive(e.to_string())));
        Ok(Box::pin(body))
    }
}
