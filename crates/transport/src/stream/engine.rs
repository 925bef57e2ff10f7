//! Per-stream state machine.
//!
//! [`StreamEngine`] tracks the read and write directions of one logical
//! request/response independently, validates every frame transition against
//! the current [`StreamState`], and performs the body-mode bookkeeping:
//! chunk framing and trailer tracking for chunked bodies, exact byte
//! accounting for fixed-length bodies.
//!
//! The engine is purely synchronous. One logical owner drives the read side
//! (the frame pump) and one the write side (the stream writer); all
//! suspension lives above it.

use bytes::{Bytes, BytesMut};
use http::{HeaderMap, HeaderName};
use tokio_util::codec::Encoder;
use tracing::warn;

use crate::codec::body::BodyEncoder;
use crate::codec::head::HeadEncoder;
use crate::ensure;
use crate::protocol::head::{HeaderBlock, declared_trailers};
use crate::protocol::{BodyItem, DataMode, MessageHead, StreamError, body_mode};
use crate::stream::StreamState;

/// State machine for one logical message stream.
///
/// Every operation first surfaces the sticky error if one is set, then
/// validates the state transition. The first failing operation stores its
/// error; every later operation returns that same error, so concurrent
/// racers all observe one consistent failure. Wrong-state usage errors the
/// stream, it never panics.
#[derive(Debug)]
pub struct StreamEngine {
    read_state: StreamState,
    write_state: StreamState,
    read_mode: DataMode,
    write_mode: DataMode,
    /// First error on the stream; all later operations return it
    error: Option<StreamError>,
    head_encoder: HeadEncoder,
    body_encoder: Option<BodyEncoder>,
    /// Trailer names announced by the outbound `Trailer` header
    declared_trailer_names: Vec<HeaderName>,
}

impl StreamEngine {
    pub fn new() -> Self {
        Self {
            read_state: StreamState::Idle,
            write_state: StreamState::Idle,
            read_mode: DataMode::NoData,
            write_mode: DataMode::NoData,
            error: None,
            head_encoder: HeadEncoder,
            body_encoder: None,
            declared_trailer_names: Vec::new(),
        }
    }

    pub fn read_state(&self) -> StreamState {
        self.read_state
    }

    pub fn write_state(&self) -> StreamState {
        self.write_state
    }

    /// The sticky error, if the stream has failed.
    pub fn error(&self) -> Option<&StreamError> {
        self.error.as_ref()
    }

    /// Both directions fully closed with no error.
    pub fn is_terminated(&self) -> bool {
        self.read_state.is_closed() && self.write_state.is_closed() && self.error.is_none()
    }

    /// Marks the stream failed. The first error sticks; later calls are
    /// no-ops so racing failure paths cannot overwrite each other.
    pub fn fail(&mut self, error: StreamError) -> StreamError {
        match &self.error {
            Some(first) => first.clone(),
            None => {
                warn!(%error, "stream failed");
                self.error = Some(error.clone());
                error
            }
        }
    }

    fn checked(&mut self) -> Result<(), StreamError> {
        match &self.error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn read_state_error(&mut self, operation: &'static str) -> StreamError {
        let error = StreamError::state(operation, self.read_state);
        self.fail(error)
    }

    fn write_state_error(&mut self, operation: &'static str) -> StreamError {
        let error = StreamError::state(operation, self.write_state);
        self.fail(error)
    }

    // ---- read side, driven by the frame pump ----

    /// A start line arrived. `Idle -> Init`.
    pub fn handle_start(&mut self) -> Result<(), StreamError> {
        self.checked()?;
        ensure!(self.read_state == StreamState::Idle, self.read_state_error("handle_start"));
        self.read_state = StreamState::Init;
        Ok(())
    }

    /// The header block arrived. `Init -> Open`, or straight to `Closed`
    /// when no body follows.
    pub fn handle_header(&mut self, header: &HeaderBlock) -> Result<(), StreamError> {
        self.checked()?;
        ensure!(self.read_state == StreamState::Init, self.read_state_error("handle_header"));
        self.read_mode = header.mode;
        self.read_state = if header.mode.is_no_data() { StreamState::Closed } else { StreamState::Open };
        Ok(())
    }

    /// A body chunk arrived. Requires `Open`.
    ///
    /// Returns whether the payload should be delivered: data on a `NoData`
    /// stream is discarded with a warning instead of erroring, since the
    /// parser already vouched for the framing.
    pub fn handle_data(&mut self, len: usize) -> Result<bool, StreamError> {
        self.checked()?;
        ensure!(self.read_state == StreamState::Open, self.read_state_error("handle_data"));
        if self.read_mode.is_no_data() {
            warn!(len, "discarding data on a stream with no declared body");
            return Ok(false);
        }
        Ok(true)
    }

    /// The body ended. `Open -> HalfClosed` when a trailer is still due,
    /// else `Open -> Closed`.
    pub fn handle_eof(&mut self, trailer_expected: bool) -> Result<(), StreamError> {
        self.checked()?;
        ensure!(self.read_state == StreamState::Open, self.read_state_error("handle_eof"));
        self.read_state = if self.read_mode.is_chunked() && trailer_expected {
            StreamState::HalfClosed
        } else {
            StreamState::Closed
        };
        Ok(())
    }

    /// The trailer arrived. `HalfClosed -> Closed`.
    pub fn handle_trailer(&mut self) -> Result<(), StreamError> {
        self.checked()?;
        ensure!(self.read_state == StreamState::HalfClosed, self.read_state_error("handle_trailer"));
        self.read_state = StreamState::Closed;
        Ok(())
    }

    // ---- write side, driven by the stream writer ----

    /// Classifies and serializes the outbound head. `Idle -> Open`, or
    /// straight to `Closed` when the head declares no body.
    ///
    /// Classification runs the same rules the wire parser applies to inbound
    /// heads, so the serialized head can never disagree with how the body
    /// will be framed.
    pub fn pre_send_header(&mut self, head: MessageHead) -> Result<Bytes, StreamError> {
        self.checked()?;
        ensure!(self.write_state == StreamState::Idle, self.write_state_error("pre_send_header"));

        let mode = match body_mode(&head.start, &head.fields) {
            Ok(mode) => mode,
            Err(parse_error) => return Err(self.fail(StreamError::from(&parse_error))),
        };
        self.declared_trailer_names = declared_trailers(&head.fields);
        let declared_trailer = mode.is_chunked() && !self.declared_trailer_names.is_empty();

        let mut dst = BytesMut::new();
        if let Err(error) = self.head_encoder.encode((head, mode), &mut dst) {
            return Err(self.fail(error));
        }

        self.write_mode = mode;
        self.body_encoder = Some(BodyEncoder::new(mode, declared_trailer));
        self.write_state = if mode.is_no_data() { StreamState::Closed } else { StreamState::Open };
        Ok(dst.freeze())
    }

    /// Frames one piece of outbound body data. Requires `Open`.
    ///
    /// In fixed-length mode exceeding the declared length fails the stream;
    /// reaching it exactly closes the write side, no explicit eof needed.
    pub fn pre_send_data(&mut self, data: Bytes) -> Result<Bytes, StreamError> {
        self.checked()?;
        ensure!(self.write_state == StreamState::Open, self.write_state_error("pre_send_data"));
        // Rejected without failing the stream: the caller meant write_done
        ensure!(!data.is_empty(), StreamError::EmptyWriteData);

        let mut dst = BytesMut::new();
        let encoder = self.body_encoder_mut("pre_send_data")?;
        if let Err(error) = encoder.encode(BodyItem::Chunk(data), &mut dst) {
            return Err(self.fail(error));
        }

        // Fixed-length bodies auto-close at the exact declared length
        if matches!(self.write_mode, DataMode::ContentLength(_))
            && self.body_encoder.as_ref().is_some_and(BodyEncoder::is_finished)
        {
            self.write_state = StreamState::Closed;
        }
        Ok(dst.freeze())
    }

    /// Terminates the outbound body. Requires `Open`.
    ///
    /// Fixed-length mode verifies the declared byte count was written.
    /// Chunked mode emits the zero chunk and, when trailers were declared,
    /// parks in `HalfClosed` until [`pre_send_trailer`](Self::pre_send_trailer).
    pub fn pre_send_eof(&mut self) -> Result<Bytes, StreamError> {
        self.checked()?;
        ensure!(self.write_state == StreamState::Open, self.write_state_error("pre_send_eof"));

        let mut dst = BytesMut::new();
        let encoder = self.body_encoder_mut("pre_send_eof")?;
        if let Err(error) = encoder.encode(BodyItem::<Bytes>::Eof, &mut dst) {
            return Err(self.fail(error));
        }

        let trailer_pending = self.write_mode.is_chunked() && !self.declared_trailer_names.is_empty();
        self.write_state = if trailer_pending { StreamState::HalfClosed } else { StreamState::Closed };
        Ok(dst.freeze())
    }

    /// Serializes the trailer section. Requires `HalfClosed`.
    ///
    /// The field names must exactly match the set announced by the `Trailer`
    /// header; any surplus or missing name fails the stream.
    pub fn pre_send_trailer(&mut self, fields: HeaderMap) -> Result<Bytes, StreamError> {
        self.checked()?;
        ensure!(self.write_state == StreamState::HalfClosed, self.write_state_error("pre_send_trailer"));

        if let Err(error) = self.validate_trailer_names(&fields) {
            return Err(self.fail(error));
        }

        let mut dst = BytesMut::new();
        let encoder = self.body_encoder_mut("pre_send_trailer")?;
        if let Err(error) = encoder.encode_trailer(&fields, &mut dst) {
            return Err(self.fail(error));
        }

        self.write_state = StreamState::Closed;
        Ok(dst.freeze())
    }

    fn body_encoder_mut(&mut self, operation: &'static str) -> Result<&mut BodyEncoder, StreamError> {
        if self.body_encoder.is_none() {
            let error = self.write_state_error(operation);
            return Err(error);
        }
        self.body_encoder.as_mut().ok_or(StreamError::Closed)
    }

    fn validate_trailer_names(&self, fields: &HeaderMap) -> Result<(), StreamError> {
        for name in fields.keys() {
            ensure!(
                self.declared_trailer_names.contains(name),
                StreamError::trailer_mismatch(format!("undeclared trailer field {name}"))
            );
        }
        for declared in &self.declared_trailer_names {
            ensure!(
                fields.contains_key(declared),
                StreamError::trailer_mismatch(format!("declared trailer field {declared} missing"))
            );
        }
        Ok(())
    }
}

impl Default for StreamEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for StreamEngine {
    fn drop(&mut self) {
        if self.error.is_none() && !(self.read_state.is_closed() && self.write_state.is_closed()) {
            warn!(
                read_state = ?self.read_state,
                write_state = ?self.write_state,
                "stream dropped before both directions closed"
            );
        }
    }
}
