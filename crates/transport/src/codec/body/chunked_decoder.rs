//! Decoder for chunked transfer encoding (RFC 9112 §7.1).
//!
//! The decoder processes incoming bytes according to the chunked format:
//! each chunk starts with its size in hexadecimal, followed by optional
//! extensions and CRLF, then the chunk data and CRLF. A zero-sized chunk ends
//! the body; it may be followed by trailer fields which this decoder captures
//! and parses instead of discarding.
//!
//! The cursor (state, bytes left in the current chunk, accumulated trailer
//! bytes) is carried across calls, so the input may arrive in arbitrarily
//! small increments, including one byte at a time.

use bytes::{Buf, Bytes, BytesMut};
use http::{HeaderMap, HeaderName, HeaderValue};
use std::task::Poll;
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::protocol::{BodyItem, ParseError};

use ChunkedState::*;

/// Maximum number of trailer fields after the last chunk
const MAX_TRAILER_NUM: usize = 16;

/// An incremental decoder for chunked transfer encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedDecoder {
    state: ChunkedState,
    remaining_size: u64,
    /// Raw trailer lines captured after the zero chunk
    trailer_buf: BytesMut,
    trailer: Option<HeaderMap>,
}

impl ChunkedDecoder {
    /// Creates a decoder positioned at the size line of the first chunk.
    pub fn new() -> Self {
        Self { state: Size, remaining_size: 0, trailer_buf: BytesMut::new(), trailer: None }
    }

    /// Takes the parsed trailer fields, if the body carried any.
    ///
    /// Only meaningful after the decoder has produced [`BodyItem::Eof`].
    pub fn take_trailer(&mut self) -> Option<HeaderMap> {
        self.trailer.take()
    }
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkedState {
    /// Read the chunk size in hex
    Size,
    /// Handle whitespace after size
    SizeLws,
    /// Skip chunk extensions
    Extension,
    /// Read LF after chunk size
    SizeLf,
    /// Read chunk data
    Body,
    /// Read CR after chunk data
    BodyCr,
    /// Read LF after chunk data
    BodyLf,
    /// Read a trailer line
    Trailer,
    /// Read LF after a trailer line
    TrailerLf,
    /// Read final CR
    EndCr,
    /// Read final LF
    EndLf,
    /// Final state after reading last chunk
    End,
}

impl Decoder for ChunkedDecoder {
    type Item = BodyItem;
    type Error = ParseError;

    /// Decodes chunked data from the input buffer.
    ///
    /// - `Ok(Some(BodyItem::Chunk(bytes)))` when a piece of chunk data is ready
    /// - `Ok(Some(BodyItem::Eof))` once the final chunk has been consumed
    /// - `Ok(None)` when more data is needed
    /// - `Err(ParseError)` if the chunked encoding is invalid
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if self.state == End {
                trace!("finished reading chunked data");
                return Ok(Some(BodyItem::Eof));
            }

            if src.is_empty() {
                // need more data
                return Ok(None);
            }

            let mut buf = None;

            self.state = match self.state.step(src, &mut self.remaining_size, &mut self.trailer_buf, &mut buf) {
                Poll::Pending => return Ok(None),
                Poll::Ready(Ok(new_state)) => new_state,
                Poll::Ready(Err(e)) => return Err(e),
            };

            if self.state == End && !self.trailer_buf.is_empty() {
                let raw = self.trailer_buf.split();
                self.trailer = Some(parse_trailer_fields(&raw)?);
            }

            if let Some(bytes) = buf {
                trace!(len = bytes.len(), "read chunked bytes");
                return Ok(Some(BodyItem::Chunk(bytes)));
            }
        }
    }
}

macro_rules! try_next_byte {
    ($src:ident) => {{
        if $src.len() > 0 {
            $src.get_u8()
        } else {
            return Poll::Pending;
        }
    }};
}

impl ChunkedState {
    /// Advances the state machine by one step against the available bytes.
    fn step(
        self,
        src: &mut BytesMut,
        remaining_size: &mut u64,
        trailer_buf: &mut BytesMut,
        buf: &mut Option<Bytes>,
    ) -> Poll<Result<ChunkedState, ParseError>> {
        match self {
            Size => ChunkedState::read_size(src, remaining_size),
            SizeLws => ChunkedState::read_size_lws(src),
            Extension => ChunkedState::read_extension(src),
            SizeLf => ChunkedState::read_size_lf(src, remaining_size),
            Body => ChunkedState::read_body(src, remaining_size, buf),
            BodyCr => ChunkedState::read_body_cr(src),
            BodyLf => ChunkedState::read_body_lf(src),
            Trailer => ChunkedState::read_trailer(src, trailer_buf),
            TrailerLf => ChunkedState::read_trailer_lf(src, trailer_buf),
            EndCr => ChunkedState::read_end_cr(src, trailer_buf),
            EndLf => ChunkedState::read_end_lf(src),
            End => Poll::Ready(Ok(End)),
        }
    }

    /// Reads the chunk size digit by digit. Hex digits accumulate the size;
    /// whitespace, extensions and CR leave the size line.
    fn read_size(src: &mut BytesMut, size_per_chunk: &mut u64) -> Poll<Result<ChunkedState, ParseError>> {
        macro_rules! or_overflow {
            ($e:expr) => {
                match $e {
                    Some(val) => val,
                    None => return Poll::Ready(Err(ParseError::invalid_chunk("overflow chunked length"))),
                }
            };
        }

        let radix = 16;
        match try_next_byte!(src) {
            b @ b'0'..=b'9' => {
                *size_per_chunk = or_overflow!(size_per_chunk.checked_mul(radix));
                *size_per_chunk = or_overflow!(size_per_chunk.checked_add((b - b'0') as u64));
            }

            b @ b'a'..=b'f' => {
                *size_per_chunk = or_overflow!(size_per_chunk.checked_mul(radix));
                *size_per_chunk = or_overflow!(size_per_chunk.checked_add((b + 10 - b'a') as u64));
            }
            b @ b'A'..=b'F' => {
                *size_per_chunk = or_overflow!(size_per_chunk.checked_mul(radix));
                *size_per_chunk = or_overflow!(size_per_chunk.checked_add((b + 10 - b'A') as u64));
            }
            b'\t' | b' ' => return Poll::Ready(Ok(SizeLws)),
            b';' => return Poll::Ready(Ok(Extension)),
            b'\r' => return Poll::Ready(Ok(SizeLf)),

            _ => return Poll::Ready(Err(ParseError::invalid_chunk("invalid chunk size line"))),
        }

        Poll::Ready(Ok(Size))
    }

    /// Linear whitespace after the chunk size. No more digits may follow.
    fn read_size_lws(src: &mut BytesMut) -> Poll<Result<ChunkedState, ParseError>> {
        match try_next_byte!(src) {
            b'\t' | b' ' => Poll::Ready(Ok(SizeLws)),
            b';' => Poll::Ready(Ok(Extension)),
            b'\r' => Poll::Ready(Ok(SizeLf)),
            _ => Poll::Ready(Err(ParseError::invalid_chunk("invalid chunk size linear white space"))),
        }
    }

    /// Chunk extensions are ignored; they end at the next CRLF. A bare LF is
    /// rejected to protect implementations that skip the CR check.
    fn read_extension(src: &mut BytesMut) -> Poll<Result<ChunkedState, ParseError>> {
        match try_next_byte!(src) {
            b'\r' => Poll::Ready(Ok(SizeLf)),
            b'\n' => Poll::Ready(Err(ParseError::invalid_chunk("chunk extension contains newline"))),
            _ => Poll::Ready(Ok(Extension)), // no supported extensions
        }
    }

    /// LF completing the size line. Size zero means the last chunk.
    fn read_size_lf(src: &mut BytesMut, size_per_chunk: &mut u64) -> Poll<Result<ChunkedState, ParseError>> {
        match try_next_byte!(src) {
            b'\n' => {
                if *size_per_chunk == 0 {
                    Poll::Ready(Ok(EndCr))
                } else {
                    Poll::Ready(Ok(Body))
                }
            }

            _ => Poll::Ready(Err(ParseError::invalid_chunk("invalid chunk size LF"))),
        }
    }

    /// Cuts up to the remaining chunk size out of the buffer; partial chunk
    /// data is handed out immediately rather than waiting for the full chunk.
    fn read_body(src: &mut BytesMut, size_per_chunk: &mut u64, buf: &mut Option<Bytes>) -> Poll<Result<ChunkedState, ParseError>> {
        if src.is_empty() {
            return Poll::Ready(Ok(Body));
        }

        if *size_per_chunk == 0 {
            return Poll::Ready(Ok(BodyCr));
        }

        // cap remaining bytes at the max capacity of usize
        let remaining = match *size_per_chunk {
            r if r > usize::MAX as u64 => usize::MAX,
            r => r as usize,
        };

        let read_size = std::cmp::min(remaining, src.len());

        *size_per_chunk -= read_size as u64;
        let bytes = src.split_to(read_size).freeze();
        *buf = Some(bytes);

        if *size_per_chunk > 0 {
            Poll::Ready(Ok(Body))
        } else {
            Poll::Ready(Ok(BodyCr))
        }
    }

    fn read_body_cr(src: &mut BytesMut) -> Poll<Result<ChunkedState, ParseError>> {
        match try_next_byte!(src) {
            b'\r' => Poll::Ready(Ok(BodyLf)),
            _ => Poll::Ready(Err(ParseError::invalid_chunk("invalid chunk body CR"))),
        }
    }

    fn read_body_lf(src: &mut BytesMut) -> Poll<Result<ChunkedState, ParseError>> {
        match try_next_byte!(src) {
            b'\n' => Poll::Ready(Ok(Size)),
            _ => Poll::Ready(Err(ParseError::invalid_chunk("invalid chunk body LF"))),
        }
    }

    /// Accumulates one trailer line up to its CR. The raw bytes are kept so
    /// the whole trailer section can be parsed once the body ends.
    fn read_trailer(src: &mut BytesMut, trailer_buf: &mut BytesMut) -> Poll<Result<ChunkedState, ParseError>> {
        match try_next_byte!(src) {
            b'\r' => {
                trailer_buf.extend_from_slice(b"\r");
                Poll::Ready(Ok(TrailerLf))
            }
            b => {
                trailer_buf.extend_from_slice(&[b]);
                Poll::Ready(Ok(Trailer))
            }
        }
    }

    fn read_trailer_lf(src: &mut BytesMut, trailer_buf: &mut BytesMut) -> Poll<Result<ChunkedState, ParseError>> {
        match try_next_byte!(src) {
            b'\n' => {
                trailer_buf.extend_from_slice(b"\n");
                Poll::Ready(Ok(EndCr))
            }
            _ => Poll::Ready(Err(ParseError::invalid_chunk("invalid trailer end LF"))),
        }
    }

    /// After the zero chunk: a CR ends the message, anything else starts a
    /// trailer line.
    fn read_end_cr(src: &mut BytesMut, trailer_buf: &mut BytesMut) -> Poll<Result<ChunkedState, ParseError>> {
        match try_next_byte!(src) {
            b'\r' => Poll::Ready(Ok(EndLf)),
            b => {
                trailer_buf.extend_from_slice(&[b]);
                Poll::Ready(Ok(Trailer))
            }
        }
    }

    fn read_end_lf(src: &mut BytesMut) -> Poll<Result<ChunkedState, ParseError>> {
        match try_next_byte!(src) {
            b'\n' => Poll::Ready(Ok(End)),
            _ => Poll::Ready(Err(ParseError::invalid_chunk("invalid chunk end LF"))),
        }
    }
}

/// Parses the accumulated trailer lines into a header map.
fn parse_trailer_fields(raw: &[u8]) -> Result<HeaderMap, ParseError> {
    let mut section = Vec::with_capacity(raw.len() + 2);
    section.extend_from_slice(raw);
    section.extend_from_slice(b"\r\n");

    let mut headers = [httparse::EMPTY_HEADER; MAX_TRAILER_NUM];
    match httparse::parse_headers(&section, &mut headers) {
        Ok(httparse::Status::Complete((_, parsed))) => {
            let mut fields = HeaderMap::with_capacity(parsed.len());
            for header in parsed {
                let name =
                    HeaderName::from_bytes(header.name.as_bytes()).map_err(|_| ParseError::invalid_trailer("invalid trailer name"))?;
                let value = HeaderValue::from_bytes(header.value).map_err(|_| ParseError::invalid_trailer("invalid trailer value"))?;
                fields.append(name, value);
            }
            Ok(fields)
        }
        Ok(httparse::Status::Partial) => Err(ParseError::invalid_trailer("truncated trailer section")),
        Err(e) => Err(ParseError::invalid_trailer(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_chunk() {
        let mut buffer: BytesMut = BytesMut::from(&b"10\r\n1234567890abcdef\r\n0\r\n\r\n"[..]);
        let mut decoder = ChunkedDecoder::new();

        let item = decoder.decode(&mut buffer).unwrap().unwrap();
        assert!(item.is_chunk());
        assert_eq!(&item.as_bytes().unwrap()[..], b"1234567890abcdef");

        let item = decoder.decode(&mut buffer).unwrap().unwrap();
        assert!(item.is_eof());
        assert!(decoder.take_trailer().is_none());
    }

    #[test]
    fn multiple_chunks() {
        let mut buffer: BytesMut = BytesMut::from(&b"5\r\nhello\r\n7\r\n, world\r\n0\r\n\r\n"[..]);
        let mut decoder = ChunkedDecoder::new();

        let chunk = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(&chunk.as_bytes().unwrap()[..], b"hello");

        let chunk = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(&chunk.as_bytes().unwrap()[..], b", world");

        let eof = decoder.decode(&mut buffer).unwrap().unwrap();
        assert!(eof.is_eof());
    }

    #[test]
    fn chunk_extensions_are_skipped() {
        let mut buffer: BytesMut = BytesMut::from(&b"5;chunk-ext=value\r\nhello\r\n0\r\n\r\n"[..]);
        let mut decoder = ChunkedDecoder::new();

        let chunk = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(&chunk.as_bytes().unwrap()[..], b"hello");

        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
    }

    #[test]
    fn trailers_are_captured() {
        let mut buffer: BytesMut = BytesMut::from(&b"5\r\nhello\r\n0\r\nX-Checksum: abc123\r\nExpires: never\r\n\r\n"[..]);
        let mut decoder = ChunkedDecoder::new();

        let chunk = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(&chunk.as_bytes().unwrap()[..], b"hello");

        let eof = decoder.decode(&mut buffer).unwrap().unwrap();
        assert!(eof.is_eof());

        let trailer = decoder.take_trailer().unwrap();
        assert_eq!(trailer.len(), 2);
        assert_eq!(trailer.get("x-checksum").unwrap(), "abc123");
        assert_eq!(trailer.get("expires").unwrap(), "never");
    }

    #[test]
    fn byte_at_a_time() {
        let wire = b"5\r\nhello\r\n0\r\nX-Sum: 1\r\n\r\n";
        let mut decoder = ChunkedDecoder::new();
        let mut buffer = BytesMut::new();
        let mut collected = Vec::new();
        let mut eof = false;

        for b in wire {
            buffer.extend_from_slice(&[*b]);
            while let Some(item) = decoder.decode(&mut buffer).unwrap() {
                match item {
                    BodyItem::Chunk(bytes) => collected.extend_from_slice(&bytes),
                    BodyItem::Eof => {
                        eof = true;
                        break;
                    }
                }
            }
            if eof {
                break;
            }
        }

        assert!(eof);
        assert_eq!(collected, b"hello");
        assert_eq!(decoder.take_trailer().unwrap().get("x-sum").unwrap(), "1");
    }

    #[test]
    fn partial_chunk_data_is_handed_out() {
        let mut buffer: BytesMut = BytesMut::from(&b"5\r\nhel"[..]);
        let mut decoder = ChunkedDecoder::new();

        let chunk = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(&chunk.as_bytes().unwrap()[..], b"hel");

        buffer.extend_from_slice(b"lo\r\n0\r\n\r\n");

        let chunk = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(&chunk.as_bytes().unwrap()[..], b"lo");

        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
    }

    #[test]
    fn invalid_chunk_size() {
        let mut buffer: BytesMut = BytesMut::from(&b"xyz\r\n"[..]);
        assert!(ChunkedDecoder::new().decode(&mut buffer).is_err());
    }

    #[test]
    fn missing_crlf_after_data() {
        let mut buffer: BytesMut = BytesMut::from(&b"5\r\nhelloBad"[..]);
        let mut decoder = ChunkedDecoder::new();

        let chunk = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(&chunk.as_bytes().unwrap()[..], b"hello");

        assert!(decoder.decode(&mut buffer).is_err());
    }

    #[test]
    fn zero_size_chunk_only() {
        let mut buffer: BytesMut = BytesMut::from(&b"0\r\n\r\n"[..]);
        let mut decoder = ChunkedDecoder::new();
        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
    }
}
