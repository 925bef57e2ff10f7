//! Decoder for bodies framed by a Content-Length header.
//!
//! Cuts exactly `min(remaining, available)` bytes per call and signals end of
//! body once the running counter reaches zero.

use std::cmp;

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use crate::protocol::{BodyItem, ParseError};

/// An incremental decoder for fixed-length bodies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthDecoder {
    /// The number of bytes remaining to be read
    length: u64,
}

impl LengthDecoder {
    /// Creates a decoder expecting `length` body bytes in total.
    pub fn new(length: u64) -> Self {
        Self { length }
    }
}

impl Decoder for LengthDecoder {
    type Item = BodyItem;
    type Error = ParseError;

    /// - `Ok(Some(BodyItem::Eof))` once all declared bytes have been read
    /// - `Ok(Some(BodyItem::Chunk(bytes)))` for each available piece
    /// - `Ok(None)` when more data is needed
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.length == 0 {
            return Ok(Some(BodyItem::Eof));
        }

        if src.is_empty() {
            return Ok(None);
        }

        let len = cmp::min(self.length, src.len() as u64);
        let bytes = src.split_to(len as usize).freeze();

        self.length -= bytes.len() as u64;
        Ok(Some(BodyItem::Chunk(bytes)))
    }
}
