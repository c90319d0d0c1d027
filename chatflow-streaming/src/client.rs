//! Public streaming API.
//!
//! [`StreamClient`] offers two façades over the same [`SessionController`]:
//!
//! - **Callbacks**: [`StreamClient::start`] takes [`StreamCallbacks`] and returns
//!   a [`StreamHandle`] for cancellation and awaiting the outcome.
//! - **Pull**: [`StreamClient::stream`] returns a [`TokenStream`], a
//!   `futures::Stream` of tokens that cancels its session when dropped.
//!
//! Starting a session on a key that already has one cancels the old session
//! and hands the conversation to the new one.
//!
//! The pull façade reads through a bounded channel. When the consumer falls
//! behind, the session stops reading the response until there is room.

use crate::config::{ClientConfig, StreamConfig};
use crate::credentials::CredentialProvider;
use crate::error::{StreamError, StreamResult};
use crate::session::{
    DeliveryGate, SessionController, SessionObserver, SessionReport, SessionState,
};
use crate::sink::ConversationSink;
use crate::transport::{HttpTransport, StreamRequest, StreamTransport};
use async_trait::async_trait;
use chatflow_core::{Conversation, ConversationKey, ConversationStore, SessionId};
use futures::{ready, Stream, StreamExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Tokens a [`TokenStream`] buffers before the session waits for the consumer.
pub const TOKEN_BUFFER: usize = 64;

struct ActiveSession {
    session: SessionId,
    cancel: CancellationToken,
    gate: DeliveryGate,
}

type ActiveSessions = Arc<Mutex<HashMap<ConversationKey, ActiveSession>>>;

fn deregister(active: &ActiveSessions, key: &ConversationKey, session: &SessionId) {
    let mut active = active.lock();
    if active.get(key).is_some_and(|a| &a.session == session) {
        active.remove(key);
    }
}

/// Streaming client bound to a transport, a credential source, and a store.
///
/// Cloning is cheap; clones share the store and the set of active sessions.
#[derive(Clone)]
pub struct StreamClient {
    transport: Arc<dyn StreamTransport>,
    credentials: Arc<dyn CredentialProvider>,
    store: ConversationStore,
    config: StreamConfig,
    active: ActiveSessions,
}

impl fmt::Debug for StreamClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamClient")
            .field("config", &self.config)
            .field("active", &self.active.lock().len())
            .finish_non_exhaustive()
    }
}

impl StreamClient {
    /// Create a client with a fresh store and default configuration.
    pub fn new(
        transport: impl StreamTransport + 'static,
        credentials: impl CredentialProvider + 'static,
    ) -> Self {
        Self::from_parts(Arc::new(transport), Arc::new(credentials))
    }

    /// Create a client from shared parts.
    pub fn from_parts(
        transport: Arc<dyn StreamTransport>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        Self {
            transport,
            credentials,
            store: ConversationStore::new(),
            config: StreamConfig::default(),
            active: Arc::default(),
        }
    }

    /// Create an HTTP client from a [`ClientConfig`].
    pub fn from_config(
        config: &ClientConfig,
        credentials: impl CredentialProvider + 'static,
    ) -> Self {
        Self::new(HttpTransport::new(config.base_url.clone()), credentials)
            .with_config(config.stream_config())
    }

    /// Use an existing conversation store.
    #[must_use]
    pub fn with_store(mut self, store: ConversationStore) -> Self {
        self.store = store;
        self
    }

    /// Set the delivery configuration.
    #[must_use]
    pub fn with_config(mut self, config: StreamConfig) -> Self {
        self.config = config;
        self
    }

    /// The conversation store.
    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    /// The delivery configuration.
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Start a session and report its events through callbacks.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(
        &self,
        key: impl Into<ConversationKey>,
        request: impl Into<StreamRequest>,
        callbacks: StreamCallbacks,
    ) -> StreamHandle {
        self.launch(key.into(), request.into(), callbacks)
    }

    /// Start a session and consume its tokens as a stream.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn stream(
        &self,
        key: impl Into<ConversationKey>,
        request: impl Into<StreamRequest>,
    ) -> TokenStream {
        let (tx, rx) = mpsc::channel(TOKEN_BUFFER);
        let observer = ChannelObserver { tx, permit: None };
        let handle = self.launch(key.into(), request.into(), observer);
        TokenStream {
            rx,
            canceller: handle.canceller(),
            state: handle.state.clone(),
            attempt: 0,
            finished: false,
        }
    }

    /// Cancel the active session for `key`. Returns `false` if there was none.
    pub fn cancel(&self, key: &ConversationKey) -> bool {
        let Some(entry) = self.active.lock().remove(key) else {
            return false;
        };
        let delivery = entry.gate.hold();
        entry.cancel.cancel();
        self.store.release(key, &entry.session);
        drop(delivery);
        debug!(key = %key, session = %entry.session, "Session cancelled by key");
        true
    }

    /// Whether a session is active for `key`.
    pub fn is_active(&self, key: &ConversationKey) -> bool {
        self.active.lock().contains_key(key)
    }

    /// Snapshot of the conversation for `key`.
    pub fn conversation(&self, key: &ConversationKey) -> Option<Conversation> {
        self.store.conversation(key)
    }

    fn launch<O>(&self, key: ConversationKey, request: StreamRequest, observer: O) -> StreamHandle
    where
        O: SessionObserver + 'static,
    {
        let session = SessionId::new();
        let cancel = CancellationToken::new();
        let gate = DeliveryGate::new();
        let sink = ConversationSink::new(self.store.clone(), key.clone(), session.clone());

        // Registration and claim happen under one lock so concurrent starts
        // on a key resolve to a single owner.
        let previous = {
            let mut active = self.active.lock();
            let previous = active.insert(
                key.clone(),
                ActiveSession {
                    session: session.clone(),
                    cancel: cancel.clone(),
                    gate: gate.clone(),
                },
            );
            if let Some(previous) = &previous {
                previous.cancel.cancel();
            }
            sink.begin(Some(&request.message));
            previous
        };
        if let Some(previous) = previous {
            // Outside the map lock: a callback of the old session may be
            // starting or cancelling sessions itself.
            drop(previous.gate.hold());
            debug!(key = %key, session = %previous.session, "Replaced active session");
        }

        let controller = SessionController::new(
            Arc::clone(&self.transport),
            Arc::clone(&self.credentials),
            sink,
            request,
            self.config.clone(),
            cancel.clone(),
            gate.clone(),
        );
        let state = controller.state_handle();

        let active = Arc::clone(&self.active);
        let task_key = key.clone();
        let task_session = session.clone();
        let task = tokio::spawn(async move {
            let mut observer = observer;
            let report = controller.run(&mut observer).await;
            deregister(&active, &task_key, &task_session);
            report
        });

        StreamHandle {
            canceller: CancelHandle {
                token: cancel,
                gate,
                store: self.store.clone(),
                active: Arc::clone(&self.active),
                key,
                session,
            },
            state,
            task,
        }
    }
}

/// Cancels one session. Cheap to clone and safe to call more than once.
///
/// Once `cancel` returns, the session no longer writes to the conversation
/// and delivers no further callbacks.
#[derive(Clone)]
pub struct CancelHandle {
    token: CancellationToken,
    gate: DeliveryGate,
    store: ConversationStore,
    active: ActiveSessions,
    key: ConversationKey,
    session: SessionId,
}

impl fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelHandle")
            .field("key", &self.key)
            .field("session", &self.session)
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}

impl CancelHandle {
    /// Cancel the session.
    ///
    /// Waits for a callback that is already running to return.
    pub fn cancel(&self) {
        {
            let _delivery = self.gate.hold();
            if self.token.is_cancelled() {
                return;
            }
            self.token.cancel();
            self.store.release(&self.key, &self.session);
        }
        deregister(&self.active, &self.key, &self.session);
        debug!(key = %self.key, session = %self.session, "Session cancelled");
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Handle to a session started with [`StreamClient::start`].
///
/// Dropping the handle does not cancel the session.
#[derive(Debug)]
pub struct StreamHandle {
    canceller: CancelHandle,
    state: Arc<Mutex<SessionState>>,
    task: JoinHandle<SessionReport>,
}

impl StreamHandle {
    /// Cancel the session.
    pub fn cancel(&self) {
        self.canceller.cancel();
    }

    /// A detachable cancel function for this session.
    pub fn canceller(&self) -> CancelHandle {
        self.canceller.clone()
    }

    /// Conversation key.
    pub fn key(&self) -> &ConversationKey {
        &self.canceller.key
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Wait for the session to finish.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Other`] if the session task panicked, typically
    /// inside a callback.
    pub async fn wait(self) -> StreamResult<SessionReport> {
        self.task
            .await
            .map_err(|e| StreamError::Other(format!("session task failed: {}", e)))
    }
}

type TokenFn = Box<dyn FnMut(&str) + Send>;
type CompleteFn = Box<dyn FnOnce() + Send>;
type ErrorFn = Box<dyn FnOnce(StreamError) + Send>;
type RetryFn = Box<dyn FnMut(u32, Duration) + Send>;

/// Callbacks for [`StreamClient::start`]. Every callback is optional.
#[derive(Default)]
pub struct StreamCallbacks {
    on_token: Option<TokenFn>,
    on_complete: Option<CompleteFn>,
    on_error: Option<ErrorFn>,
    on_retry: Option<RetryFn>,
}

impl fmt::Debug for StreamCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamCallbacks")
            .field("on_token", &self.on_token.is_some())
            .field("on_complete", &self.on_complete.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_retry", &self.on_retry.is_some())
            .finish()
    }
}

impl StreamCallbacks {
    /// Create an empty set of callbacks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Called for each token, in order.
    #[must_use]
    pub fn on_token(mut self, f: impl FnMut(&str) + Send + 'static) -> Self {
        self.on_token = Some(Box::new(f));
        self
    }

    /// Called once when the stream completes.
    #[must_use]
    pub fn on_complete(mut self, f: impl FnOnce() + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(f));
        self
    }

    /// Called once when the stream fails.
    #[must_use]
    pub fn on_error(mut self, f: impl FnOnce(StreamError) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    /// Called before each retry with the retry number and the wait.
    #[must_use]
    pub fn on_retry(mut self, f: impl FnMut(u32, Duration) + Send + 'static) -> Self {
        self.on_retry = Some(Box::new(f));
        self
    }
}

impl SessionObserver for StreamCallbacks {
    fn on_token(&mut self, token: &str) {
        if let Some(f) = self.on_token.as_mut() {
            f(token);
        }
    }

    fn on_retry(&mut self, attempt: u32, wait: Duration, _error: &StreamError) {
        if let Some(f) = self.on_retry.as_mut() {
            f(attempt, wait);
        }
    }

    fn on_complete(&mut self) {
        if let Some(f) = self.on_complete.take() {
            f();
        }
    }

    fn on_error(&mut self, error: StreamError) {
        if let Some(f) = self.on_error.take() {
            f(error);
        }
    }
}

#[derive(Debug)]
enum Delivery {
    Token(String),
    Retry,
    Failed(StreamError),
}

struct ChannelObserver {
    tx: mpsc::Sender<Delivery>,
    permit: Option<mpsc::OwnedPermit<Delivery>>,
}

impl ChannelObserver {
    fn send(&mut self, item: Delivery) {
        match self.permit.take() {
            Some(permit) => {
                permit.send(item);
            }
            None => {
                let _ = self.tx.try_send(item);
            }
        }
    }
}

#[async_trait]
impl SessionObserver for ChannelObserver {
    async fn ready(&mut self) {
        if self.permit.is_none() {
            // Fails only once the stream is dropped, which cancels the session.
            self.permit = self.tx.clone().reserve_owned().await.ok();
        }
    }

    fn on_token(&mut self, token: &str) {
        self.send(Delivery::Token(token.to_owned()));
    }

    fn on_retry(&mut self, _attempt: u32, _wait: Duration, _error: &StreamError) {
        self.send(Delivery::Retry);
    }

    // The channel closes when the session task drops the observer.
    fn on_complete(&mut self) {}

    fn on_error(&mut self, error: StreamError) {
        self.send(Delivery::Failed(error));
    }
}

/// Tokens of one session, pulled as a stream.
///
/// Yields each token in order and ends after the `done` frame. On failure it
/// yields the error once and then ends. Dropping the stream before it ends
/// cancels the session.
///
/// A failed attempt that gets retried leaves its tokens in their own message;
/// [`attempt`](Self::attempt) tells which attempt a token came from.
#[derive(Debug)]
pub struct TokenStream {
    rx: mpsc::Receiver<Delivery>,
    canceller: CancelHandle,
    state: Arc<Mutex<SessionState>>,
    attempt: u32,
    finished: bool,
}

impl TokenStream {
    /// Cancel the session. The stream ends without an error.
    pub fn cancel(&self) {
        self.canceller.cancel();
    }

    /// Conversation key.
    pub fn key(&self) -> &ConversationKey {
        &self.canceller.key
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Retry number of the attempt that produced the last yielded token
    /// (0 for the first attempt).
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Drain the stream and return the text of the final attempt.
    ///
    /// Tokens of attempts that failed and were retried are left out, matching
    /// the assistant message the session completed.
    ///
    /// # Errors
    ///
    /// Returns the session's error if it failed.
    pub async fn collect_text(mut self) -> StreamResult<String> {
        let mut text = String::new();
        let mut attempt = self.attempt;
        while let Some(token) = self.next().await {
            let token = token?;
            if self.attempt != attempt {
                attempt = self.attempt;
                text.clear();
            }
            text.push_str(&token);
        }
        Ok(text)
    }
}

impl Stream for TokenStream {
    type Item = StreamResult<String>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match ready!(self.rx.poll_recv(cx)) {
                Some(Delivery::Token(token)) => return Poll::Ready(Some(Ok(token))),
                Some(Delivery::Retry) => self.attempt += 1,
                Some(Delivery::Failed(error)) => return Poll::Ready(Some(Err(error))),
                None => {
                    self.finished = true;
                    return Poll::Ready(None);
                }
            }
        }
    }
}

impl Drop for TokenStream {
    fn drop(&mut self) {
        if !self.finished {
            self.canceller.cancel();
        }
    }
}
