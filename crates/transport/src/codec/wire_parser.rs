//! Incremental frame parser for one HTTP/1.1 connection direction.
//!
//! [`WireParser`] combines the head and body decoders into a single
//! [`Decoder`] producing [`Frame`] values. It never buffers a whole message
//! by necessity: frames are emitted as soon as their bytes are available, so
//! a slow body never delays delivery of the head.
//!
//! When a parse pass finds the entire message already in the buffer, the
//! parser collapses it into one [`Frame::Full`] instead of the usual
//! start/header/data/eof sequence.

use std::collections::VecDeque;
use std::io;

use bytes::{BufMut, BytesMut};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::codec::Role;
use crate::codec::body::BodyDecoder;
use crate::codec::head::HeadDecoder;
use crate::ensure;
use crate::protocol::head::StartLine;
use crate::protocol::{BodyItem, Frame, FullMessage, ParseError};

/// Default upper bound on total message bytes, head plus body
const DEFAULT_MAX_MESSAGE_BYTES: u64 = 8 * 1024 * 1024;

/// Decoder turning a raw byte stream into an ordered [`Frame`] sequence.
///
/// The parser is stateful per message: between the header block and the end
/// of the body it holds the active [`BodyDecoder`], and resets once the
/// message (including any trailer) has been emitted. It is reused across
/// messages on a keep-alive connection.
#[derive(Debug)]
pub struct WireParser {
    head_decoder: HeadDecoder,
    body_decoder: Option<BodyDecoder>,
    /// Frames decoded ahead of the one being returned
    pending: VecDeque<Frame>,
    /// Head and body bytes seen so far for the in-flight message
    message_bytes: u64,
    max_message_bytes: u64,
    /// Whether the in-flight message announced trailers via `Trailer`
    trailer_declared: bool,
}

impl WireParser {
    /// Creates a parser for the server side, decoding request messages.
    pub fn server() -> Self {
        Self::new(Role::Server)
    }

    /// Creates a parser for the client side, decoding response messages.
    pub fn client() -> Self {
        Self::new(Role::Client)
    }

    fn new(role: Role) -> Self {
        Self {
            head_decoder: HeadDecoder::new(role),
            body_decoder: None,
            pending: VecDeque::new(),
            message_bytes: 0,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            trailer_declared: false,
        }
    }

    /// Overrides the per-message total size limit, counting head and body.
    pub fn with_max_message_bytes(mut self, max: u64) -> Self {
        self.max_message_bytes = max;
        self
    }

    /// Whether the parser is between messages, with nothing half decoded.
    ///
    /// Used at connection end to tell a clean close from a truncation.
    pub fn is_idle(&self) -> bool {
        self.body_decoder.is_none() && self.pending.is_empty()
    }

    fn account_message_bytes(&mut self, len: usize) -> Result<(), ParseError> {
        self.message_bytes += len as u64;
        ensure!(
            self.message_bytes <= self.max_message_bytes,
            ParseError::too_large_message(self.message_bytes, self.max_message_bytes)
        );
        Ok(())
    }

    /// Finishes the in-flight body: resets per-message state and queues the
    /// trailer frame when one was captured or declared.
    fn finish_body(&mut self) {
        let mut body_decoder = match self.body_decoder.take() {
            Some(decoder) => decoder,
            None => return,
        };
        self.message_bytes = 0;

        let trailer = body_decoder.take_trailer();
        let declared = self.trailer_declared;
        self.trailer_declared = false;

        match trailer {
            Some(fields) => self.pending.push_back(Frame::Trailer(fields)),
            // Declared but never sent: deliver an empty trailer so the
            // consumer always observes the announced phase
            None if declared => self.pending.push_back(Frame::Trailer(Default::default())),
            None => {}
        }
    }

    /// Attempts to decode the remainder of a message whose head was just
    /// parsed, without yielding to the caller in between.
    ///
    /// Returns the reassembled body and trailer when the buffer held the
    /// complete message, or the partial data decoded so far.
    fn drain_body(
        &mut self,
        body_decoder: &mut BodyDecoder,
        src: &mut BytesMut,
    ) -> Result<DrainOutcome, ParseError> {
        let mut body = BytesMut::new();
        loop {
            match body_decoder.decode(src)? {
                Some(BodyItem::Chunk(data)) => {
                    self.account_message_bytes(data.len())?;
                    body.put(data);
                }
                Some(BodyItem::Eof) => {
                    let trailer = body_decoder.take_trailer();
                    return Ok(DrainOutcome::Complete { body: body.freeze(), trailer });
                }
                None => return Ok(DrainOutcome::Partial { body: body.freeze() }),
            }
        }
    }
}

enum DrainOutcome {
    Complete { body: bytes::Bytes, trailer: Option<http::HeaderMap> },
    Partial { body: bytes::Bytes },
}

impl Decoder for WireParser {
    type Item = Frame;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, ParseError> {
        if let Some(frame) = self.pending.pop_front() {
            return Ok(Some(frame));
        }

        if let Some(mut body_decoder) = self.body_decoder.take() {
            let item = body_decoder.decode(src)?;
            self.body_decoder = Some(body_decoder);
            return match item {
                Some(BodyItem::Chunk(data)) => {
                    self.account_message_bytes(data.len())?;
                    Ok(Some(Frame::Data(data)))
                }
                Some(BodyItem::Eof) => {
                    self.finish_body();
                    Ok(Some(Frame::Eof))
                }
                None => Ok(None),
            };
        }

        let buffered = src.len();
        let (start, header) = match self.head_decoder.decode(src)? {
            Some(head) => head,
            None => return Ok(None),
        };
        // The head decoder consumes nothing until the full head parses, so
        // the difference is exactly the head's byte count
        self.account_message_bytes(buffered - src.len())?;
        self.trailer_declared = header.has_trailer;

        let mut body_decoder = BodyDecoder::from(header.mode);
        match self.drain_body(&mut body_decoder, src)? {
            DrainOutcome::Complete { body, trailer } => {
                trace!(body_size = body.len(), "decoded full message in one pass");
                self.message_bytes = 0;
                let trailer = match trailer {
                    Some(fields) => Some(fields),
                    None if self.trailer_declared => Some(Default::default()),
                    None => None,
                };
                self.trailer_declared = false;
                Ok(Some(Frame::Full(FullMessage { start, header, body, trailer })))
            }
            DrainOutcome::Partial { body } => {
                self.pending.push_back(Frame::Header(header));
                if !body.is_empty() {
                    self.pending.push_back(Frame::Data(body));
                }
                self.body_decoder = Some(body_decoder);
                let frame = match start {
                    StartLine::Request(line) => Frame::RequestLine(line),
                    StartLine::Status(line) => Frame::StatusLine(line),
                };
                Ok(Some(frame))
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, ParseError> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None => {
                ensure!(
                    src.is_empty() && self.is_idle(),
                    ParseError::io(io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed with a message in flight"))
                );
                Ok(None)
            }
        }
    }
}
