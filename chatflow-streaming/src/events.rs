//! Protocol events decoded from the response body.

/// One event of the streaming protocol.
///
/// Values are produced by [`FrameParser`](crate::frame::FrameParser) from
/// `data: {...}` frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolEvent {
    /// A fragment of generated text.
    Token(String),
    /// The server finished the response.
    Done,
    /// The server reported an error; terminal and never retried.
    Error(String),
}

impl ProtocolEvent {
    /// Whether this event ends the stream.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error(_))
    }
}
