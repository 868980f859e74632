//! Push stream events: wire model, SSE framing, and routing into job patches.

pub mod decode;
pub mod error;
pub mod event;
pub mod sse;

pub use decode::decode_frame;
pub use error::{DecodeError, EventError};
pub use event::{EventKind, StreamEvent, StreamKey};
pub use sse::{SseDecoder, SseFrame};
