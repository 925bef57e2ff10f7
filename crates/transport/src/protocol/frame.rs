use bytes::Bytes;
use http::HeaderMap;

use crate::protocol::head::{HeaderBlock, StartLine};

/// One unit of an HTTP/1.1 message stream as produced by the wire parser and
/// consumed by the stream engine.
///
/// For an ordinary message the parser emits, in order: a start line frame,
/// a [`Frame::Header`], zero or more [`Frame::Data`] frames, [`Frame::Eof`]
/// and, after a chunked body that carried trailers, a [`Frame::Trailer`].
/// When one parse pass finds the whole message already buffered the parser
/// short-circuits into a single [`Frame::Full`] instead, which saves one
/// suspension round per message component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Request line of an inbound request
    RequestLine(crate::protocol::head::RequestLine),
    /// Status line of an inbound response
    StatusLine(crate::protocol::head::StatusLine),
    /// Classified header block
    Header(HeaderBlock),
    /// A piece of body data
    Data(Bytes),
    /// End of the body
    Eof,
    /// Trailer fields following a chunked body
    Trailer(HeaderMap),
    /// A complete message decoded in one pass
    Full(FullMessage),
}

impl Frame {
    /// Returns true if this frame carries body data
    #[inline]
    pub fn is_data(&self) -> bool {
        matches!(self, Frame::Data(_))
    }

    /// Returns true if this frame ends the body
    #[inline]
    pub fn is_eof(&self) -> bool {
        matches!(self, Frame::Eof)
    }
}

/// A complete message: head, reassembled body and optional trailer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FullMessage {
    pub start: StartLine,
    pub header: HeaderBlock,
    pub body: Bytes,
    pub trailer: Option<HeaderMap>,
}

/// An item produced by the body decoders and consumed by the body encoders:
/// a piece of body data or the end of the body. Trailer fields captured by
/// the chunked decoder are retrieved separately once `Eof` has been seen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyItem<Data: bytes::Buf = Bytes> {
    /// A chunk of body data
    Chunk(Data),
    /// Marks the end of the body
    Eof,
}

impl<D: bytes::Buf> BodyItem<D> {
    /// Returns true if this item represents the end of the body
    #[inline]
    pub fn is_eof(&self) -> bool {
        matches!(self, BodyItem::Eof)
    }

    /// Returns true if this item contains chunk data
    #[inline]
    pub fn is_chunk(&self) -> bool {
        matches!(self, BodyItem::Chunk(_))
    }
}

impl BodyItem {
    /// Returns a reference to the contained bytes if this is a chunk
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            BodyItem::Chunk(bytes) => Some(bytes),
            BodyItem::Eof => None,
        }
    }

    /// Consumes the item and returns the contained bytes if this is a chunk
    pub fn into_bytes(self) -> Option<Bytes> {
        match self {
            BodyItem::Chunk(bytes) => Some(bytes),
            BodyItem::Eof => None,
        }
    }
}
