//! Frame parsing for the streaming response body.
//!
//! The body is a sequence of frames terminated by a blank line:
//!
//! ```text
//! data: {"token":"Hel"}
//!
//! data: {"token":"lo"}
//!
//! data: {"done":true}
//!
//! ```
//!
//! Chunk boundaries carry no meaning: a chunk may end anywhere, including in
//! the middle of a UTF-8 sequence or between the two newlines of a delimiter.
//! Bytes are therefore buffered until a full delimiter is seen, and only
//! complete frames are decoded.

use crate::error::{StreamError, StreamResult};
use crate::events::ProtocolEvent;
use bytes::{Buf, BytesMut};
use serde::Deserialize;
use tracing::{debug, trace, warn};

/// Largest partial frame kept in the buffer.
pub const MAX_BUFFER_SIZE: usize = 10 * 1024 * 1024;

#[derive(Debug, Deserialize)]
struct FramePayload {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    done: Option<bool>,
    #[serde(default)]
    error: Option<String>,
}

/// Incremental decoder from raw body chunks to [`ProtocolEvent`]s.
#[derive(Debug, Default)]
pub struct FrameParser {
    buffer: BytesMut,
    skipped: usize,
}

impl FrameParser {
    /// Create a new parser.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every event completed by it.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::BufferOverflow`] if the unterminated tail grows
    /// past [`MAX_BUFFER_SIZE`]; the buffer is cleared in that case.
    pub fn feed(&mut self, chunk: &[u8]) -> StreamResult<Vec<ProtocolEvent>> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some((pos, delimiter_len)) = find_boundary(&self.buffer) {
            let frame = self.buffer.split_to(pos);
            self.buffer.advance(delimiter_len);
            if let Some(event) = self.decode_frame(&frame) {
                events.push(event);
            }
        }

        if self.buffer.len() > MAX_BUFFER_SIZE {
            self.buffer.clear();
            return Err(StreamError::BufferOverflow(MAX_BUFFER_SIZE));
        }

        Ok(events)
    }

    /// Feed a string chunk.
    pub fn feed_str(&mut self, s: &str) -> StreamResult<Vec<ProtocolEvent>> {
        self.feed(s.as_bytes())
    }

    /// Decode a trailing frame that ended without a delimiter.
    ///
    /// Call once the body is exhausted.
    pub fn finish(&mut self) -> Option<ProtocolEvent> {
        let rest = self.buffer.split();
        if rest.iter().all(u8::is_ascii_whitespace) {
            return None;
        }
        self.decode_frame(&rest)
    }

    /// Number of buffered bytes not yet forming a complete frame.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Number of frames skipped because their payload was malformed.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    fn decode_frame(&mut self, frame: &[u8]) -> Option<ProtocolEvent> {
        let text = match std::str::from_utf8(frame) {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Skipping frame with invalid UTF-8");
                self.skipped += 1;
                return None;
            }
        };

        let mut data_lines = Vec::new();
        for line in text.lines() {
            if line.is_empty() || line.starts_with(':') {
                continue;
            }
            if let Some(value) = line.strip_prefix("data:") {
                data_lines.push(value.strip_prefix(' ').unwrap_or(value));
            } else {
                trace!(line, "Ignoring non-data field");
            }
        }

        if data_lines.is_empty() {
            return None;
        }

        let data = data_lines.join("\n");
        match serde_json::from_str::<FramePayload>(&data) {
            Ok(FramePayload {
                token: Some(token), ..
            }) => Some(ProtocolEvent::Token(token)),
            Ok(FramePayload {
                done: Some(true), ..
            }) => Some(ProtocolEvent::Done),
            Ok(FramePayload {
                error: Some(error), ..
            }) => Some(ProtocolEvent::Error(error)),
            Ok(_) => {
                debug!(payload = %data, "Ignoring frame without token, done, or error");
                None
            }
            Err(e) => {
                warn!(error = %e, payload = %data, "Skipping malformed frame");
                self.skipped += 1;
                None
            }
        }
    }
}

/// Locate the first frame delimiter, returning its offset and length.
fn find_boundary(buffer: &[u8]) -> Option<(usize, usize)> {
    let lf = find(buffer, b"\n\n").map(|pos| (pos, 2));
    let crlf = find(buffer, b"\r\n\r\n").map(|pos| (pos, 4));

    match (lf, crlf) {
        (Some(lf), Some(crlf)) => Some(if crlf.0 < lf.0 { crlf } else { lf }),
        (lf, crlf) => lf.or(crlf),
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    const BODY: &str = concat!(
        "data: {\"token\":\"Hel\"}\n\n",
        "data: {\"token\":\"lo, \"}\n\n",
        ": keep-alive\n\n",
        "data: {\"token\":\"wörld 👋\"}\n\n",
        "data: {\"done\":true}\n\n",
    );

    fn expected() -> Vec<ProtocolEvent> {
        vec![
            ProtocolEvent::Token("Hel".into()),
            ProtocolEvent::Token("lo, ".into()),
            ProtocolEvent::Token("wörld 👋".into()),
            ProtocolEvent::Done,
        ]
    }

    fn parse_chunks<'a>(chunks: impl IntoIterator<Item = &'a [u8]>) -> Vec<ProtocolEvent> {
        let mut parser = FrameParser::new();
        let mut events = Vec::new();
        for chunk in chunks {
            events.extend(parser.feed(chunk).unwrap());
        }
        events.extend(parser.finish());
        events
    }

    #[test]
    fn test_single_chunk() {
        assert_eq!(parse_chunks([BODY.as_bytes()]), expected());
    }

    #[rstest]
    #[case(1)]
    #[case(2)]
    #[case(3)]
    #[case(5)]
    #[case(7)]
    #[case(16)]
    #[case(64)]
    fn test_fixed_size_chunks(#[case] size: usize) {
        assert_eq!(parse_chunks(BODY.as_bytes().chunks(size)), expected());
    }

    #[test]
    fn test_every_two_way_split() {
        let bytes = BODY.as_bytes();
        for i in 0..=bytes.len() {
            let (a, b) = bytes.split_at(i);
            assert_eq!(parse_chunks([a, b]), expected(), "split at byte {}", i);
        }
    }

    #[test]
    fn test_every_three_way_split() {
        let bytes = BODY.as_bytes();
        for i in 0..=bytes.len() {
            for j in i..=bytes.len() {
                let events = parse_chunks([&bytes[..i], &bytes[i..j], &bytes[j..]]);
                assert_eq!(events, expected(), "split at bytes {} and {}", i, j);
            }
        }
    }

    #[test]
    fn test_mid_frame_split() {
        let mut parser = FrameParser::new();
        let mut events = parser.feed_str("data: {\"to").unwrap();
        events.extend(parser.feed_str("ken\":\"Hel").unwrap());
        assert!(events.is_empty());

        events.extend(parser.feed_str("lo\"}\n\ndata: {\"done\":true}\n\n").unwrap());
        assert_eq!(
            events,
            vec![ProtocolEvent::Token("Hello".into()), ProtocolEvent::Done]
        );
        assert_eq!(parser.buffered(), 0);
    }

    #[test]
    fn test_split_inside_delimiter() {
        let mut parser = FrameParser::new();
        assert!(parser.feed_str("data: {\"token\":\"a\"}\n").unwrap().is_empty());
        assert_eq!(
            parser.feed_str("\ndata: {\"do").unwrap(),
            vec![ProtocolEvent::Token("a".into())]
        );
        assert_eq!(parser.feed_str("ne\":true}\n\n").unwrap(), vec![ProtocolEvent::Done]);
    }

    #[test]
    fn test_buffer_holds_no_complete_frame_after_feed() {
        let mut parser = FrameParser::new();
        parser
            .feed_str("data: {\"token\":\"a\"}\n\ndata: {\"token\":\"b\"}\n\ndata: {\"tok")
            .unwrap();
        assert_eq!(parser.buffered(), "data: {\"tok".len());
    }

    #[test]
    fn test_malformed_frame_is_skipped() {
        let events = parse_chunks([concat!(
            "data: {\"token\":\"A\"}\n\n",
            "data: {not json\n\n",
            "data: {\"token\":\"B\"}\n\n",
        )
        .as_bytes()]);
        assert_eq!(
            events,
            vec![ProtocolEvent::Token("A".into()), ProtocolEvent::Token("B".into())]
        );
    }

    #[test]
    fn test_skipped_counter() {
        let mut parser = FrameParser::new();
        parser.feed_str("data: nope\n\ndata: {\"other\":1}\n\n").unwrap();
        // Unknown fields are ignored, not counted as malformed.
        assert_eq!(parser.skipped(), 1);
    }

    #[test]
    fn test_error_frame() {
        let events = parse_chunks([b"data: {\"error\":\"rate limited\"}\n\n".as_slice()]);
        assert_eq!(events, vec![ProtocolEvent::Error("rate limited".into())]);
    }

    #[test]
    fn test_done_false_is_ignored() {
        let events = parse_chunks([b"data: {\"done\":false}\n\n".as_slice()]);
        assert!(events.is_empty());
    }

    #[test]
    fn test_crlf_delimiters() {
        let events = parse_chunks([b"data: {\"token\":\"x\"}\r\n\r\ndata: {\"done\":true}\r\n\r\n".as_slice()]);
        assert_eq!(events, vec![ProtocolEvent::Token("x".into()), ProtocolEvent::Done]);
    }

    #[test]
    fn test_data_without_space_and_multiline() {
        let events = parse_chunks([b"event: message\ndata:{\"token\":\ndata: \"joined\"}\n\n".as_slice()]);
        assert_eq!(events, vec![ProtocolEvent::Token("joined".into())]);
    }

    #[test]
    fn test_finish_flushes_trailing_frame() {
        let mut parser = FrameParser::new();
        assert!(parser.feed_str("data: {\"done\":true}").unwrap().is_empty());
        assert_eq!(parser.finish(), Some(ProtocolEvent::Done));
        assert_eq!(parser.finish(), None);
    }

    #[test]
    fn test_buffer_overflow() {
        let mut parser = FrameParser::new();
        let big = vec![b'x'; MAX_BUFFER_SIZE + 1];
        assert!(matches!(
            parser.feed(&big),
            Err(StreamError::BufferOverflow(_))
        ));
        assert_eq!(parser.buffered(), 0);
    }
}
