//! Server-Sent Events support on top of the stream layer.

mod event;
mod writer;

pub use event::{SseEvent, SseParseError};
pub use writer::{SseStreamWriter, is_sse_request, is_sse_response};
