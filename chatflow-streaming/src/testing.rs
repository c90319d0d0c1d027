//! Scripted transport and recording observer shared by the unit tests.

use crate::error::{StreamError, StreamResult};
use crate::session::SessionObserver;
use crate::transport::{ByteStream, StreamRequest, StreamTransport};
use async_trait::async_trait;
use bytes::Bytes;
use chatflow_core::ConversationKey;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

/// One step of a scripted response body.
pub(crate) enum Step {
    Chunk(&'static str),
    Fail(StreamError),
    Pause(Duration),
    Hang,
}

/// What a single `open` call does.
pub(crate) enum Script {
    Refuse(StreamError),
    HangConnect,
    Body(Vec<Step>),
}

#[derive(Default)]
pub(crate) struct ScriptedTransport {
    scripts: Mutex<HashMap<String, VecDeque<Script>>>,
    opens: Mutex<Vec<(String, String)>>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with(self, key: &str, scripts: impl IntoIterator<Item = Script>) -> Self {
        self.scripts
            .lock()
            .entry(key.to_string())
            .or_default()
            .extend(scripts);
        self
    }

    pub(crate) fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Number of `open` calls made for a key.
    pub(crate) fn opens(&self, key: &str) -> usize {
        self.opens.lock().iter().filter(|(k, _)| k == key).count()
    }

    pub(crate) fn credentials(&self) -> Vec<String> {
        self.opens.lock().iter().map(|(_, c)| c.clone()).collect()
    }
}

#[async_trait]
impl StreamTransport for ScriptedTransport {
    async fn open(
        &self,
        key: &ConversationKey,
        _request: &StreamRequest,
        credential: &str,
    ) -> StreamResult<ByteStream> {
        self.opens
            .lock()
            .push((key.as_str().to_string(), credential.to_string()));
        let script = self
            .scripts
            .lock()
            .get_mut(key.as_str())
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Script::Refuse(StreamError::Connection("no script".into())));

        match script {
            Script::Refuse(error) => Err(error),
            Script::HangConnect => std::future::pending().await,
            Script::Body(steps) => Ok(Box::pin(futures::stream::unfold(
                steps.into_iter(),
                |mut steps| async move {
                    loop {
                        let Some(step) = steps.next() else {
                            return None;
                        };
                        match step {
                            Step::Chunk(text) => {
                                return Some((Ok(Bytes::from_static(text.as_bytes())), steps))
                            }
                            Step::Fail(error) => return Some((Err(error), steps)),
                            Step::Pause(wait) => tokio::time::sleep(wait).await,
                            Step::Hang => std::future::pending::<()>().await,
                        }
                    }
                },
            ))),
        }
    }
}

/// Observer that records every callback as a short string.
#[derive(Debug, Clone, Default)]
pub(crate) struct Recorder {
    pub(crate) events: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub(crate) fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }
}

impl SessionObserver for Recorder {
    fn on_token(&mut self, token: &str) {
        self.events.lock().push(format!("token:{token}"));
    }

    fn on_retry(&mut self, attempt: u32, wait: Duration, _error: &StreamError) {
        self.events
            .lock()
            .push(format!("retry:{attempt}:{}", wait.as_millis()));
    }

    fn on_complete(&mut self) {
        self.events.lock().push("complete".to_string());
    }

    fn on_error(&mut self, error: StreamError) {
        self.events.lock().push(format!("error:{error}"));
    }
}

pub(crate) fn token(text: &'static str) -> Step {
    // Leaked once per test; keeps the script steps `'static`.
    Step::Chunk(Box::leak(
        format!("data: {{\"token\":\"{text}\"}}\n\n").into_boxed_str(),
    ))
}

pub(crate) fn done() -> Step {
    Step::Chunk("data: {\"done\":true}\n\n")
}

pub(crate) fn server_error(message: &'static str) -> Step {
    Step::Chunk(Box::leak(
        format!("data: {{\"error\":\"{message}\"}}\n\n").into_boxed_str(),
    ))
}
