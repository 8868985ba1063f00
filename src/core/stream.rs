use memchr::memchr;

use crate::api::StreamFrame;

/// One decoded unit of the live token stream. `Done` is recognized so the
/// frame is not mistaken for garbage, but carries no further effect; the
/// channel ends when the body does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Token(String),
    Done,
}

/// Incremental decoder for the line-oriented token stream.
///
/// Bytes stay buffered until a full line is available, so multi-byte UTF-8
/// sequences split across chunk boundaries are reassembled for free. Lines
/// that fail to parse are dropped; partial and malformed frames are expected
/// on this wire and are not fatal.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk of the live body, returning the events decoded from
    /// every line the chunk completed.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(newline_pos) = memchr(b'\n', &self.buffer) {
            match std::str::from_utf8(&self.buffer[..newline_pos]) {
                Ok(line) => {
                    if let Some(event) = decode_line(line) {
                        events.push(event);
                    }
                }
                Err(err) => {
                    tracing::debug!("dropping non-UTF-8 stream line: {err}");
                }
            }
            self.buffer.drain(..=newline_pos);
        }
        events
    }
}

fn decode_line(line: &str) -> Option<StreamEvent> {
    let mut payload = line.trim();
    if payload.is_empty() {
        return None;
    }
    if let Some(rest) = payload.strip_prefix("data:") {
        payload = rest.trim();
    }
    if payload.is_empty() {
        return None;
    }

    let frame: StreamFrame = serde_json::from_str(payload).ok()?;
    if let Some(token) = frame.token {
        return Some(StreamEvent::Token(token));
    }
    if frame.done == Some(true) {
        return Some(StreamEvent::Done);
    }
    None
}
