//! Encoder for chunked transfer encoding.
//!
//! Every piece of data is wrapped as one `<hex-size>\r\n<data>\r\n` chunk.
//! The end of the body emits the zero chunk; when trailers were declared the
//! closing CRLF is left to the trailer section so the fields land between the
//! zero chunk and the terminator.

use bytes::{Buf, BufMut, BytesMut};
use http::HeaderMap;
use std::io::{self, Write};

use tokio_util::codec::Encoder;

use crate::protocol::{BodyItem, StreamError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedEncoder {
    eof: bool,
    /// Trailer fields were declared, the zero chunk must stay open for them
    trailer_pending: bool,
}

impl ChunkedEncoder {
    pub fn new(trailer_pending: bool) -> Self {
        Self { eof: false, trailer_pending }
    }

    /// Whether the terminating zero chunk has been written.
    pub fn is_finished(&self) -> bool {
        self.eof && !self.trailer_pending
    }

    /// Writes the trailer section after the zero chunk.
    ///
    /// Must only be called once the zero chunk was emitted with trailers
    /// pending; ordering is enforced by the stream engine.
    pub fn encode_trailer(&mut self, fields: &HeaderMap, dst: &mut BytesMut) -> Result<(), StreamError> {
        for (name, value) in fields.iter() {
            dst.put_slice(name.as_ref());
            dst.put_slice(b": ");
            dst.put_slice(value.as_ref());
            dst.put_slice(b"\r\n");
        }
        dst.put_slice(b"\r\n");
        self.trailer_pending = false;
        Ok(())
    }
}

impl<D: Buf> Encoder<BodyItem<D>> for ChunkedEncoder {
    type Error = StreamError;

    fn encode(&mut self, item: BodyItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if self.eof {
            return Ok(());
        }

        match item {
            BodyItem::Chunk(bytes) => {
                write!(Writer(dst), "{:X}\r\n", bytes.remaining()).map_err(StreamError::from)?;
                dst.reserve(bytes.remaining() + 2);
                dst.put(bytes);
                dst.put_slice(b"\r\n");
                Ok(())
            }
            BodyItem::Eof => {
                self.eof = true;
                if self.trailer_pending {
                    dst.put_slice(b"0\r\n");
                } else {
                    dst.put_slice(b"0\r\n\r\n");
                }
                Ok(())
            }
        }
    }
}

struct Writer<'a>(&'a mut BytesMut);

impl io::Write for Writer<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn frames_each_write_as_one_chunk() {
        let mut encoder = ChunkedEncoder::new(false);
        let mut dst = BytesMut::new();

        encoder.encode(BodyItem::Chunk(Bytes::from_static(b"hello")), &mut dst).unwrap();
        encoder.encode(BodyItem::Chunk(Bytes::from_static(b"world!")), &mut dst).unwrap();
        encoder.encode(BodyItem::<Bytes>::Eof, &mut dst).unwrap();

        assert_eq!(&dst[..], b"5\r\nhello\r\n6\r\nworld!\r\n0\r\n\r\n");
        assert!(encoder.is_finished());
    }

    #[test]
    fn eof_is_emitted_once() {
        let mut encoder = ChunkedEncoder::new(false);
        let mut dst = BytesMut::new();

        encoder.encode(BodyItem::<Bytes>::Eof, &mut dst).unwrap();
        encoder.encode(BodyItem::<Bytes>::Eof, &mut dst).unwrap();
        encoder.encode(BodyItem::Chunk(Bytes::from_static(b"late")), &mut dst).unwrap();

        assert_eq!(&dst[..], b"0\r\n\r\n");
    }

    #[test]
    fn declared_trailer_keeps_terminator_open() {
        let mut encoder = ChunkedEncoder::new(true);
        let mut dst = BytesMut::new();

        encoder.encode(BodyItem::Chunk(Bytes::from_static(b"abc")), &mut dst).unwrap();
        encoder.encode(BodyItem::<Bytes>::Eof, &mut dst).unwrap();
        assert!(!encoder.is_finished());

        let mut fields = HeaderMap::new();
        fields.insert("x-checksum", "abc123".parse().unwrap());
        encoder.encode_trailer(&fields, &mut dst).unwrap();

        assert_eq!(&dst[..], b"3\r\nabc\r\n0\r\nx-checksum: abc123\r\n\r\n");
        assert!(encoder.is_finished());
    }
}
