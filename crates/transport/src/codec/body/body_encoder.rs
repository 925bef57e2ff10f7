//! Unified encoder for message bodies.
//!
//! Dispatches to the framing-specific encoder selected by the classified
//! outbound head. `declared_trailer` only matters for chunked bodies, where
//! it keeps the terminator open for the trailer section.

use bytes::{Buf, BytesMut};
use http::HeaderMap;
use tokio_util::codec::Encoder;

use crate::codec::body::chunked_encoder::ChunkedEncoder;
use crate::codec::body::length_encoder::LengthEncoder;
use crate::protocol::{BodyItem, DataMode, StreamError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyEncoder {
    kind: Kind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Kind {
    Length(LengthEncoder),
    Chunked(ChunkedEncoder),
    NoBody,
}

impl BodyEncoder {
    /// Creates an encoder for the given framing mode.
    pub fn new(mode: DataMode, declared_trailer: bool) -> Self {
        let kind = match mode {
            DataMode::NoData => Kind::NoBody,
            DataMode::ContentLength(size) => Kind::Length(LengthEncoder::new(size)),
            DataMode::Chunked => Kind::Chunked(ChunkedEncoder::new(declared_trailer)),
        };
        Self { kind }
    }

    /// Whether the body is complete, including any trailer section.
    pub fn is_finished(&self) -> bool {
        match &self.kind {
            Kind::Length(encoder) => encoder.is_finished(),
            Kind::Chunked(encoder) => encoder.is_finished(),
            Kind::NoBody => true,
        }
    }

    /// Writes the trailer section of a chunked body.
    pub fn encode_trailer(&mut self, fields: &HeaderMap, dst: &mut BytesMut) -> Result<(), StreamError> {
        match &mut self.kind {
            Kind::Chunked(encoder) => encoder.encode_trailer(fields, dst),
            _ => Ok(()),
        }
    }
}

impl<D: Buf> Encoder<BodyItem<D>> for BodyEncoder {
    type Error = StreamError;

    fn encode(&mut self, item: BodyItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match &mut self.kind {
            Kind::Length(encoder) => encoder.encode(item, dst),
            Kind::Chunked(encoder) => encoder.encode(item, dst),
            Kind::NoBody => Ok(()),
        }
    }
}
