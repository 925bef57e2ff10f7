//! Chunked SSE response writer.
//!
//! Frames a stream of [`SseEvent`]s over a chunked HTTP response: one event
//! becomes exactly one chunk, so the blank-line delimiter stays re-derivable
//! after chunked reassembly no matter how the transport splits the bytes.

use bytes::Bytes;
use http::{HeaderMap, HeaderValue, Method, StatusCode, header};
use tracing::warn;

use crate::connection::Transport;
use crate::protocol::{MessageHead, StreamError};
use crate::sse::SseEvent;
use crate::stream::StreamWriter;

const EVENT_STREAM: &str = "text/event-stream";

/// Writer for one SSE response stream.
///
/// The response head is sent lazily by the first `write_event`, or eagerly
/// through [`send_header`](Self::send_header); either way exactly once.
/// The stream must be finalized with [`write_done`](Self::write_done);
/// dropping the writer without it is reported as a defect.
#[derive(Debug)]
pub struct SseStreamWriter<T: Transport> {
    writer: StreamWriter<T>,
    header_sent: bool,
}

impl<T: Transport> SseStreamWriter<T> {
    pub fn new(writer: StreamWriter<T>) -> Self {
        Self { writer, header_sent: false }
    }

    /// Sends the SSE response head. A second call is a success no-op.
    pub fn send_header(&mut self) -> Result<(), StreamError> {
        if self.header_sent {
            return Ok(());
        }
        let head = MessageHead::response(StatusCode::OK)
            .field(header::CONTENT_TYPE, EVENT_STREAM)
            .field(header::CACHE_CONTROL, "no-cache")
            .field(header::CONNECTION, "keep-alive")
            .field(header::TRANSFER_ENCODING, "chunked");
        self.writer.write_header(head)?;
        self.header_sent = true;
        Ok(())
    }

    /// Serializes one event and sends it as exactly one chunk, sending the
    /// response head first if it has not gone out yet.
    pub fn write_event(&mut self, event: &SseEvent) -> Result<(), StreamError> {
        self.send_header()?;
        self.writer.write_data(Bytes::from(event.serialize()))
    }

    /// Emits the chunked terminator. A second call is a success no-op.
    pub fn write_done(&mut self) -> Result<(), StreamError> {
        self.send_header()?;
        self.writer.write_done()
    }

    pub fn is_done(&self) -> bool {
        self.writer.is_done()
    }
}

impl<T: Transport> Drop for SseStreamWriter<T> {
    fn drop(&mut self) {
        if self.header_sent && !self.writer.is_done() {
            warn!("sse stream dropped without write_done");
        }
    }
}

/// Advisory check that a request head looks like an SSE subscription:
/// a GET accepting `text/event-stream`. Suspicious traffic is logged,
/// never blocked; callers wanting strict negotiation reject it themselves.
pub fn is_sse_request(method: &Method, fields: &HeaderMap) -> bool {
    let accepts = fields
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|accept| accept.contains(EVENT_STREAM));
    let looks_sse = *method == Method::GET && accepts;
    if !looks_sse {
        warn!(%method, "request does not look like an sse subscription");
    }
    looks_sse
}

/// Advisory check that a response head carries the SSE content type.
pub fn is_sse_response(fields: &HeaderMap) -> bool {
    let content_type = fields.get(header::CONTENT_TYPE).map(HeaderValue::as_bytes);
    let looks_sse = content_type.is_some_and(|value| value.starts_with(EVENT_STREAM.as_bytes()));
    if !looks_sse {
        warn!("response does not look like an sse stream");
    }
    looks_sse
}
