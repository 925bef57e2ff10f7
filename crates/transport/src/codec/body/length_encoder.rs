//! Encoder for bodies framed by a Content-Length header.
//!
//! Tracks the cumulative written byte count against the declared length:
//! writing past the declaration or finishing short of it is a contract
//! violation, not a retryable condition, because the peer was already told
//! the true length.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::Encoder;

use crate::protocol::{BodyItem, StreamError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthEncoder {
    declared: u64,
    written: u64,
}

impl LengthEncoder {
    pub fn new(declared: u64) -> Self {
        Self { declared, written: 0 }
    }

    /// Whether exactly the declared number of bytes has been written.
    pub fn is_finished(&self) -> bool {
        self.written == self.declared
    }
}

impl<D: Buf> Encoder<BodyItem<D>> for LengthEncoder {
    type Error = StreamError;

    fn encode(&mut self, item: BodyItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            BodyItem::Chunk(bytes) => {
                let len = bytes.remaining() as u64;
                if len == 0 {
                    return Ok(());
                }

                let written = self.written + len;
                if written > self.declared {
                    return Err(StreamError::ContentLengthMismatch { declared: self.declared, written });
                }

                dst.reserve(bytes.remaining());
                dst.put(bytes);
                self.written = written;
                Ok(())
            }
            BodyItem::Eof => {
                if self.written != self.declared {
                    return Err(StreamError::ContentLengthMismatch { declared: self.declared, written: self.written });
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn writes_up_to_the_declared_length() {
        let mut encoder = LengthEncoder::new(10);
        let mut dst = BytesMut::new();

        encoder.encode(BodyItem::Chunk(Bytes::from_static(b"hello")), &mut dst).unwrap();
        assert!(!encoder.is_finished());
        encoder.encode(BodyItem::Chunk(Bytes::from_static(b"world")), &mut dst).unwrap();
        assert!(encoder.is_finished());

        encoder.encode(BodyItem::<Bytes>::Eof, &mut dst).unwrap();
        assert_eq!(&dst[..], b"helloworld");
    }

    #[test]
    fn overflow_is_a_mismatch() {
        let mut encoder = LengthEncoder::new(3);
        let mut dst = BytesMut::new();

        let err = encoder.encode(BodyItem::Chunk(Bytes::from_static(b"toolong")), &mut dst).unwrap_err();
        assert_eq!(err, StreamError::ContentLengthMismatch { declared: 3, written: 7 });
        // nothing was written
        assert!(dst.is_empty());
    }

    #[test]
    fn short_body_fails_on_eof() {
        let mut encoder = LengthEncoder::new(10);
        let mut dst = BytesMut::new();

        encoder.encode(BodyItem::Chunk(Bytes::from_static(b"short")), &mut dst).unwrap();
        let err = encoder.encode(BodyItem::<Bytes>::Eof, &mut dst).unwrap_err();
        assert_eq!(err, StreamError::ContentLengthMismatch { declared: 10, written: 5 });
    }
}
