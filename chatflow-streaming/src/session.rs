//! Transport controller for one streaming session.
//!
//! A [`SessionController`] drives a single request from connect to a terminal
//! outcome. It is an explicit loop over phases:
//!
//! ```text
//! Idle -> Connecting -> Streaming -> Completed
//!              ^            |     \-> Failed
//!              |            v
//!              +------- Retrying ---> Failed
//! ```
//!
//! The connect, each chunk read, and each backoff sleep are raced against the
//! session's [`CancellationToken`]. The connect and every read also run under
//! the inactivity deadline from [`StreamConfig::timeout`].
//!
//! Every write to the conversation and the observer call that reports it
//! happen while the session's [`DeliveryGate`] is held. Cancelling through the
//! same gate therefore waits for a delivery in progress, and nothing is
//! delivered after it returns.

use crate::config::StreamConfig;
use crate::credentials::CredentialProvider;
use crate::error::{StreamError, StreamResult};
use crate::events::ProtocolEvent;
use crate::frame::FrameParser;
use crate::sink::ConversationSink;
use crate::transport::{ByteStream, StreamRequest, StreamTransport};
use async_trait::async_trait;
use chatflow_retries::RetryState;
use futures::StreamExt;
use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Created, not yet running.
    #[default]
    Idle,
    /// Opening the request.
    Connecting,
    /// Reading the response body.
    Streaming,
    /// Waiting before the next attempt.
    Retrying,
    /// Finished after a `done` frame.
    Completed,
    /// Finished with an error.
    Failed,
    /// Stopped by the caller or replaced by a newer session.
    Cancelled,
}

impl SessionState {
    /// Whether the session has finished.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Streaming => "streaming",
            Self::Retrying => "retrying",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// How a session ended.
#[derive(Debug, Clone)]
pub enum SessionOutcome {
    /// The server finished the response.
    Completed,
    /// The session failed; the error was reported to the observer.
    Failed(StreamError),
    /// The session was cancelled; nothing was reported.
    Cancelled,
}

impl SessionOutcome {
    /// Whether the session completed successfully.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Whether the session was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// The failure, if any.
    #[must_use]
    pub fn error(&self) -> Option<&StreamError> {
        match self {
            Self::Failed(error) => Some(error),
            _ => None,
        }
    }

    /// Terminal state matching this outcome.
    #[must_use]
    pub fn state(&self) -> SessionState {
        match self {
            Self::Completed => SessionState::Completed,
            Self::Failed(_) => SessionState::Failed,
            Self::Cancelled => SessionState::Cancelled,
        }
    }
}

/// Summary returned when a session finishes.
#[derive(Debug, Clone)]
pub struct SessionReport {
    /// How the session ended.
    pub outcome: SessionOutcome,
    /// Attempt history.
    pub retries: RetryState,
    /// Tokens delivered to the observer.
    pub tokens: usize,
}

/// Serializes delivery with cancellation for one session.
///
/// The lock is reentrant, so a callback may cancel its own session.
#[derive(Debug, Clone, Default)]
pub struct DeliveryGate(Arc<ReentrantMutex<()>>);

impl DeliveryGate {
    /// Create a gate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until no delivery is in progress and hold off new ones until the
    /// guard is dropped.
    pub fn hold(&self) -> ReentrantMutexGuard<'_, ()> {
        self.0.lock()
    }
}

/// Receives session events in order.
///
/// `on_token` is called for each delivered token. After the last token,
/// exactly one of `on_complete` or `on_error` is called, unless the session
/// was cancelled, in which case neither is.
#[async_trait]
pub trait SessionObserver: Send {
    /// Wait until the observer can take another event.
    ///
    /// Awaited before each token, retry, and error, so a slow consumer slows
    /// down reading instead of buffering without bound.
    async fn ready(&mut self) {}

    /// A token was appended to the conversation.
    fn on_token(&mut self, token: &str);

    /// A transport failure will be retried after `wait`.
    fn on_retry(&mut self, _attempt: u32, _wait: Duration, _error: &StreamError) {}

    /// The stream completed.
    fn on_complete(&mut self);

    /// The stream failed.
    fn on_error(&mut self, error: StreamError);
}

enum Phase {
    Connecting,
    Streaming(ByteStream),
    Retrying(StreamError),
    Finished(SessionOutcome),
}

/// Drives one session to its outcome.
pub struct SessionController {
    transport: Arc<dyn StreamTransport>,
    credentials: Arc<dyn CredentialProvider>,
    sink: ConversationSink,
    request: StreamRequest,
    config: StreamConfig,
    cancel: CancellationToken,
    gate: DeliveryGate,
    state: Arc<Mutex<SessionState>>,
    retry: RetryState,
    tokens: usize,
}

impl fmt::Debug for SessionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionController")
            .field("sink", &self.sink)
            .field("request", &self.request)
            .field("config", &self.config)
            .field("state", &*self.state.lock())
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl SessionController {
    /// Create a controller. The sink must already have begun the session.
    ///
    /// Whoever cancels `cancel` must do so while holding `gate`.
    pub fn new(
        transport: Arc<dyn StreamTransport>,
        credentials: Arc<dyn CredentialProvider>,
        sink: ConversationSink,
        request: StreamRequest,
        config: StreamConfig,
        cancel: CancellationToken,
        gate: DeliveryGate,
    ) -> Self {
        Self {
            transport,
            credentials,
            sink,
            request,
            config,
            cancel,
            gate,
            state: Arc::new(Mutex::new(SessionState::Idle)),
            retry: RetryState::new(),
            tokens: 0,
        }
    }

    /// Shared view of the current state, updated as the session runs.
    pub fn state_handle(&self) -> Arc<Mutex<SessionState>> {
        Arc::clone(&self.state)
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Run the session to completion, reporting events to `observer`.
    pub async fn run<O>(mut self, observer: &mut O) -> SessionReport
    where
        O: SessionObserver + ?Sized,
    {
        info!(key = %self.sink.key(), session = %self.sink.session(), "Session started");

        let outcome = match self.credential() {
            Ok(credential) => self.drive(&credential, observer).await,
            Err(e) => SessionOutcome::Failed(e),
        };
        if matches!(outcome, SessionOutcome::Failed(_)) {
            // finish() re-checks cancellation.
            let _ = self.observer_ready(observer).await;
        }
        self.finish(outcome, observer)
    }

    /// Wait for the observer to accept an event. Returns `false` if the
    /// session was cancelled first.
    async fn observer_ready<O>(&self, observer: &mut O) -> bool
    where
        O: SessionObserver + ?Sized,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = observer.ready() => true,
        }
    }

    fn credential(&self) -> StreamResult<String> {
        match self.credentials.credential() {
            Some(credential) if !credential.trim().is_empty() => Ok(credential),
            _ => Err(StreamError::MissingCredential),
        }
    }

    fn set_state(&self, state: SessionState) {
        let mut current = self.state.lock();
        if *current != state {
            debug!(key = %self.sink.key(), from = %*current, to = %state, "Session state changed");
            *current = state;
        }
    }

    async fn drive<O>(&mut self, credential: &str, observer: &mut O) -> SessionOutcome
    where
        O: SessionObserver + ?Sized,
    {
        let mut phase = Phase::Connecting;
        loop {
            phase = match phase {
                Phase::Connecting => {
                    self.set_state(SessionState::Connecting);
                    self.connect(credential).await
                }
                Phase::Streaming(body) => {
                    self.set_state(SessionState::Streaming);
                    self.read(body, observer).await
                }
                Phase::Retrying(error) => {
                    self.set_state(SessionState::Retrying);
                    self.backoff(error, observer).await
                }
                Phase::Finished(outcome) => return outcome,
            };
        }
    }

    async fn connect(&mut self, credential: &str) -> Phase {
        let timeout = self.config.timeout;
        debug!(key = %self.sink.key(), attempt = self.retry.attempt, "Connecting");

        let opened = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Phase::Finished(SessionOutcome::Cancelled),
            opened = tokio::time::timeout(
                timeout,
                self.transport.open(self.sink.key(), &self.request, credential),
            ) => opened,
        };

        match opened {
            Ok(Ok(body)) => Phase::Streaming(body),
            Ok(Err(e)) => Phase::Retrying(e),
            Err(_) => Phase::Retrying(StreamError::Timeout(timeout)),
        }
    }

    async fn read<O>(&mut self, mut body: ByteStream, observer: &mut O) -> Phase
    where
        O: SessionObserver + ?Sized,
    {
        let timeout = self.config.timeout;
        let mut parser = FrameParser::new();

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Phase::Finished(SessionOutcome::Cancelled),
                next = tokio::time::timeout(timeout, body.next()) => next,
            };

            let chunk = match next {
                Ok(Some(Ok(chunk))) => chunk,
                Ok(Some(Err(e))) => return Phase::Retrying(e),
                Ok(None) => {
                    if let Some(event) = parser.finish() {
                        if let Some(phase) = self.deliver(event, observer).await {
                            return phase;
                        }
                    }
                    return Phase::Retrying(StreamError::ConnectionClosed);
                }
                Err(_) => return Phase::Retrying(StreamError::Timeout(timeout)),
            };

            let events = match parser.feed(&chunk) {
                Ok(events) => events,
                Err(e) => return Phase::Retrying(e),
            };
            for event in events {
                if let Some(phase) = self.deliver(event, observer).await {
                    return phase;
                }
            }
        }
    }

    async fn deliver<O>(&mut self, event: ProtocolEvent, observer: &mut O) -> Option<Phase>
    where
        O: SessionObserver + ?Sized,
    {
        if matches!(event, ProtocolEvent::Token(_)) && !self.observer_ready(observer).await {
            return Some(Phase::Finished(SessionOutcome::Cancelled));
        }
        self.dispatch(event, observer)
    }

    /// Apply one event. Returns the next phase if the event ends the attempt.
    fn dispatch<O>(&mut self, event: ProtocolEvent, observer: &mut O) -> Option<Phase>
    where
        O: SessionObserver + ?Sized,
    {
        match &event {
            ProtocolEvent::Token(text) => {
                let _delivery = self.gate.hold();
                // A rejected write means the session was cancelled or replaced.
                if self.cancel.is_cancelled() || !self.sink.apply(&event) {
                    return Some(Phase::Finished(SessionOutcome::Cancelled));
                }
                self.tokens += 1;
                observer.on_token(text);
                None
            }
            ProtocolEvent::Done => Some(Phase::Finished(SessionOutcome::Completed)),
            ProtocolEvent::Error(message) => Some(Phase::Finished(SessionOutcome::Failed(
                StreamError::Server(message.clone()),
            ))),
        }
    }

    async fn backoff<O>(&mut self, error: StreamError, observer: &mut O) -> Phase
    where
        O: SessionObserver + ?Sized,
    {
        if self.cancel.is_cancelled() {
            return Phase::Finished(SessionOutcome::Cancelled);
        }

        let Some(wait) = self.retry.next_delay(&self.config.retry, &error) else {
            self.retry.record_failure(&error, None);
            return Phase::Finished(SessionOutcome::Failed(error));
        };
        self.retry.record_failure(&error, Some(wait));

        warn!(
            key = %self.sink.key(),
            session = %self.sink.session(),
            attempt = self.retry.attempt,
            wait_ms = wait.as_millis() as u64,
            error = %error,
            "Transport failure, retrying"
        );
        if !self.observer_ready(observer).await {
            return Phase::Finished(SessionOutcome::Cancelled);
        }
        {
            let _delivery = self.gate.hold();
            if self.cancel.is_cancelled() {
                return Phase::Finished(SessionOutcome::Cancelled);
            }
            observer.on_retry(self.retry.attempt, wait, &error);
        }

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Phase::Finished(SessionOutcome::Cancelled),
            _ = tokio::time::sleep(wait) => {}
        }

        if !self.sink.restart() {
            return Phase::Finished(SessionOutcome::Cancelled);
        }
        Phase::Connecting
    }

    fn finish<O>(mut self, outcome: SessionOutcome, observer: &mut O) -> SessionReport
    where
        O: SessionObserver + ?Sized,
    {
        let gate = self.gate.clone();
        let delivery = gate.hold();
        let cancelled = self.cancel.is_cancelled();
        let outcome = match outcome {
            SessionOutcome::Completed if !cancelled && self.sink.apply(&ProtocolEvent::Done) => {
                self.retry.record_success();
                observer.on_complete();
                SessionOutcome::Completed
            }
            SessionOutcome::Failed(error) if !cancelled && self.sink.fail(&error) => {
                warn!(key = %self.sink.key(), session = %self.sink.session(), error = %error, "Session failed");
                observer.on_error(error.clone());
                SessionOutcome::Failed(error)
            }
            _ => {
                self.sink.cancel();
                SessionOutcome::Cancelled
            }
        };
        drop(delivery);

        self.set_state(outcome.state());
        info!(
            key = %self.sink.key(),
            session = %self.sink.session(),
            outcome = %outcome.state(),
            tokens = self.tokens,
            attempts = self.retry.attempts(),
            "Session finished"
        );

        SessionReport {
            outcome,
            retries: self.retry,
            tokens: self.tokens,
        }
    }
}
