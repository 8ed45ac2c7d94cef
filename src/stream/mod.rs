//! Streaming support
//!
//! Decodes the runtime's cumulative-text callbacks and bridges them into a
//! pull-based sequence of deltas.

pub mod bridge;
pub mod protocol;

pub use bridge::{StreamSink, TextStream, channel};
pub use protocol::{CumulativeDecoder, ERROR_SENTINEL, Payload, StreamEvent, decode, encode_error};
