//! Encoder for outbound HTTP/1.1 message heads.
//!
//! Serializes a [`MessageHead`] plus the framing decision into raw bytes:
//! start line, header fields and the CRLF terminator. The Content-Length or
//! Transfer-Encoding header is forced to agree with the chosen [`DataMode`]
//! so the serialized head can never contradict how the body will be framed.

use bytes::{BufMut, BytesMut};
use http::{HeaderValue, Version, header};
use std::io;
use std::io::{ErrorKind, Write};
use tokio_util::codec::Encoder;
use tracing::error;

use crate::protocol::head::StartLine;
use crate::protocol::{DataMode, MessageHead, StreamError};

/// Initial buffer size reserved for head serialization
const INIT_HEAD_SIZE: usize = 4 * 1024;

/// Encoder for message heads implementing the [`Encoder`] trait.
#[derive(Debug)]
pub struct HeadEncoder;

impl Encoder<(MessageHead, DataMode)> for HeadEncoder {
    type Error = StreamError;

    /// Encodes the head into the destination buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP version is not 1.1 or writing to the
    /// buffer fails.
    fn encode(&mut self, item: (MessageHead, DataMode), dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (head, mode) = item;
        let MessageHead { start, mut fields } = head;

        dst.reserve(INIT_HEAD_SIZE);
        match &start {
            StartLine::Request(line) => {
                if line.version != Version::HTTP_11 {
                    error!(http_version = ?line.version, "unsupported http version");
                    return Err(io::Error::from(ErrorKind::Unsupported).into());
                }
                write!(FastWrite(dst), "{} {} HTTP/1.1\r\n", line.method, line.uri).map_err(StreamError::from)?;
            }
            StartLine::Status(line) => {
                if line.version != Version::HTTP_11 {
                    error!(http_version = ?line.version, "unsupported http version");
                    return Err(io::Error::from(ErrorKind::Unsupported).into());
                }
                let reason = line.reason.as_deref().or_else(|| line.status.canonical_reason()).unwrap_or("");
                write!(FastWrite(dst), "HTTP/1.1 {} {}\r\n", line.status.as_str(), reason).map_err(StreamError::from)?;
            }
        }

        // Force the framing header to agree with the chosen mode
        match mode {
            DataMode::ContentLength(n) => match fields.get_mut(header::CONTENT_LENGTH) {
                Some(value) => *value = n.into(),
                None => {
                    fields.insert(header::CONTENT_LENGTH, n.into());
                }
            },
            DataMode::Chunked => match fields.get_mut(header::TRANSFER_ENCODING) {
                Some(value) => *value = HeaderValue::from_static("chunked"),
                None => {
                    fields.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
                }
            },
            DataMode::NoData => {
                // Responses advertise the empty body explicitly; requests
                // without a body stay bare
                if matches!(start, StartLine::Status(_)) && !fields.contains_key(header::CONTENT_LENGTH) {
                    const ZERO_VALUE: HeaderValue = HeaderValue::from_static("0");
                    fields.insert(header::CONTENT_LENGTH, ZERO_VALUE);
                }
            }
        }

        for (header_name, header_value) in fields.iter() {
            dst.put_slice(header_name.as_ref());
            dst.put_slice(b": ");
            dst.put_slice(header_value.as_ref());
            dst.put_slice(b"\r\n");
        }
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

/// Fast writer into BytesMut, skipping the bounds checks a generic io writer
/// would repeat after the reserve above.
struct FastWrite<'a>(&'a mut BytesMut);

impl Write for FastWrite<'_> {
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
    use http::{Method, StatusCode, Uri};

    #[test]
    fn response_head_with_length() {
        let head = MessageHead::response(StatusCode::OK).field(header::CONTENT_TYPE, "text/plain");
        let mut dst = BytesMut::new();
        HeadEncoder.encode((head, DataMode::ContentLength(5)), &mut dst).unwrap();

        let text = std::str::from_utf8(&dst).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("content-type: text/plain\r\n"));
        assert!(text.contains("content-length: 5\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn chunked_head_forces_transfer_encoding() {
        let head = MessageHead::response(StatusCode::OK);
        let mut dst = BytesMut::new();
        HeadEncoder.encode((head, DataMode::Chunked), &mut dst).unwrap();

        let text = std::str::from_utf8(&dst).unwrap();
        assert!(text.contains("transfer-encoding: chunked\r\n"));
        assert!(!text.contains("content-length"));
    }

    #[test]
    fn empty_response_advertises_zero_length() {
        let head = MessageHead::response(StatusCode::NO_CONTENT);
        let mut dst = BytesMut::new();
        HeadEncoder.encode((head, DataMode::NoData), &mut dst).unwrap();

        assert!(std::str::from_utf8(&dst).unwrap().contains("content-length: 0\r\n"));
    }

    #[test]
    fn request_head_writes_request_line() {
        let head = MessageHead::request(Method::POST, Uri::from_static("/upload")).field(header::HOST, "example.test");
        let mut dst = BytesMut::new();
        HeadEncoder.encode((head, DataMode::ContentLength(3)), &mut dst).unwrap();

        let text = std::str::from_utf8(&dst).unwrap();
        assert!(text.starts_with("POST /upload HTTP/1.1\r\n"));
        assert!(text.contains("host: example.test\r\n"));
    }
}
