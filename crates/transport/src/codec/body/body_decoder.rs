//! Unified decoder for message bodies.
//!
//! Dispatches to the framing-specific decoder selected by the header block:
//! fixed length, chunked, or no body at all.

use bytes::BytesMut;
use http::HeaderMap;
use tokio_util::codec::Decoder;

use crate::codec::body::chunked_decoder::ChunkedDecoder;
use crate::codec::body::length_decoder::LengthDecoder;
use crate::protocol::{BodyItem, DataMode, ParseError};

/// A body decoder configured from a [`DataMode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyDecoder {
    kind: Kind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Kind {
    Length(LengthDecoder),
    Chunked(ChunkedDecoder),
    NoBody,
}

impl BodyDecoder {
    /// Creates a decoder for messages with no body.
    pub fn empty() -> Self {
        Self { kind: Kind::NoBody }
    }

    /// Creates a decoder for chunked transfer encoding.
    pub fn chunked() -> Self {
        Self { kind: Kind::Chunked(ChunkedDecoder::new()) }
    }

    /// Creates a decoder for a fixed-length body.
    pub fn fixed_length(size: u64) -> Self {
        Self { kind: Kind::Length(LengthDecoder::new(size)) }
    }

    /// Returns whether this decoder handles chunked transfer encoding.
    pub fn is_chunked(&self) -> bool {
        matches!(&self.kind, Kind::Chunked(_))
    }

    /// Takes trailer fields captured after a chunked body, if any.
    pub fn take_trailer(&mut self) -> Option<HeaderMap> {
        match &mut self.kind {
            Kind::Chunked(chunked_decoder) => chunked_decoder.take_trailer(),
            _ => None,
        }
    }
}

impl From<DataMode> for BodyDecoder {
    fn from(mode: DataMode) -> Self {
        match mode {
            DataMode::NoData => BodyDecoder::empty(),
            DataMode::ContentLength(size) => BodyDecoder::fixed_length(size),
            DataMode::Chunked => BodyDecoder::chunked(),
        }
    }
}

impl Decoder for BodyDecoder {
    type Item = BodyItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match &mut self.kind {
            Kind::Length(length_decoder) => length_decoder.decode(src),
            Kind::Chunked(chunked_decoder) => chunked_decoder.decode(src),
            Kind::NoBody => Ok(Some(BodyItem::Eof)),
        }
    }
}
