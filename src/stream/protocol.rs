//! Cumulative-text payload protocol
//!
//! The runtime reports streaming progress by repeatedly handing over the
//! whole text generated so far. A payload is one of:
//! - `None` or `""`: end of stream
//! - a string starting with [`ERROR_SENTINEL`]: the rest is an error message
//! - anything else: the new cumulative text

/// Control character that never appears in model output
pub const ERROR_SENTINEL: char = '\u{2}';

/// Events delivered to the stream consumer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Newly generated text, never empty
    Delta(String),
    /// Generation finished
    End,
    /// Generation failed
    Error(String),
}

impl StreamEvent {
    /// No events follow a terminal one
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::End | StreamEvent::Error(_))
    }
}

/// A single decoded payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payload<'a> {
    Text(&'a str),
    Error(&'a str),
    End,
}

/// Classify a raw payload
pub fn decode(payload: Option<&str>) -> Payload<'_> {
    match payload {
        None | Some("") => Payload::End,
        Some(text) => match text.strip_prefix(ERROR_SENTINEL) {
            Some(message) => Payload::Error(message),
            None => Payload::Text(text),
        },
    }
}

/// Build an error payload for runtimes that report failures in-band
pub fn encode_error(message: &str) -> String {
    let mut payload = String::with_capacity(message.len() + 1);
    payload.push(ERROR_SENTINEL);
    payload.push_str(message);
    payload
}

/// Turns cumulative payloads into delta events
#[derive(Debug, Default)]
pub struct CumulativeDecoder {
    prev_len: usize,
}

impl CumulativeDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one payload. Returns `None` when the payload adds no new text.
    pub fn feed(&mut self, payload: Option<&str>) -> Option<StreamEvent> {
        match decode(payload) {
            Payload::End => Some(StreamEvent::End),
            Payload::Error(message) => Some(StreamEvent::Error(message.to_string())),
            Payload::Text(cumulative) => {
                let delta = cumulative.get(self.prev_len..).unwrap_or_default();
                let event = (!delta.is_empty()).then(|| StreamEvent::Delta(delta.to_string()));
                self.prev_len = cumulative.len();
                event
            }
        }
    }
}
