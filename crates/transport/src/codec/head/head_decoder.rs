//! Incremental decoder for HTTP/1.1 message heads.
//!
//! Parses the start line and header fields of a request or response from raw
//! bytes into a [`StartLine`] and a classified [`HeaderBlock`]. The decoder is
//! driven repeatedly as bytes arrive and returns `Ok(None)` until the header
//! terminator has been observed; already consumed bytes are never re-parsed.
//!
//! # Implementation
//!
//! 1. Parse raw bytes with `httparse`
//! 2. Record header name/value byte ranges
//! 3. Split the head off the buffer and build the typed header map zero-copy
//! 4. Classify body framing from the start line and fields
//!
//! # Limits
//!
//! - Maximum number of headers: 64
//! - Maximum header size: 8KB

use std::mem::MaybeUninit;

use bytes::BytesMut;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri, Version, header};
use httparse::{Error, Status};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::ensure;

use crate::codec::Role;
use crate::protocol::head::{HeaderBlock, RequestLine, StartLine, StatusLine};
use crate::protocol::{ParseError, body_mode};

/// Maximum number of headers allowed in a message head
pub(crate) const MAX_HEADER_NUM: usize = 64;

/// Maximum size in bytes allowed for the entire header section
pub(crate) const MAX_HEADER_BYTES: usize = 8 * 1024;

/// Decoder for message heads implementing the [`Decoder`] trait.
///
/// The role decides the start line grammar: a server parses request lines,
/// a client parses status lines. Everything after the start line is shared.
#[derive(Debug)]
pub struct HeadDecoder {
    role: Role,
}

impl HeadDecoder {
    pub fn new(role: Role) -> Self {
        Self { role }
    }
}

impl Decoder for HeadDecoder {
    type Item = (StartLine, HeaderBlock);
    type Error = ParseError;

    /// Attempts to decode a message head from the provided bytes buffer.
    ///
    /// - `Ok(Some((start, header)))` if a complete head was parsed
    /// - `Ok(None)` if more data is needed
    /// - `Err(ParseError)` if the head is malformed or exceeds the limits
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // Fast path: the shortest legal head is longer than this
        if src.len() < 14 {
            return Ok(None);
        }

        match self.role {
            Role::Server => decode_request_head(src),
            Role::Client => decode_response_head(src),
        }
    }
}

fn decode_request_head(src: &mut BytesMut) -> Result<Option<(StartLine, HeaderBlock)>, ParseError> {
    let mut req = httparse::Request::new(&mut []);
    let mut headers: [MaybeUninit<httparse::Header>; MAX_HEADER_NUM] = [const { MaybeUninit::uninit() }; MAX_HEADER_NUM];

    let parsed_result = req.parse_with_uninit_headers(src, &mut headers).map_err(|e| match e {
        Error::TooManyHeaders => ParseError::too_many_headers(MAX_HEADER_NUM),
        e => ParseError::invalid_header(e.to_string()),
    });

    match parsed_result? {
        Status::Complete(body_offset) => {
            trace!(head_size = body_offset, "parsed request head");
            ensure!(body_offset <= MAX_HEADER_BYTES, ParseError::too_large_header(body_offset, MAX_HEADER_BYTES));

            let header_count = req.headers.len();
            ensure!(header_count <= MAX_HEADER_NUM, ParseError::too_many_headers(header_count));

            let mut header_index: [HeaderIndex; MAX_HEADER_NUM] = EMPTY_HEADER_INDEX_ARRAY;
            HeaderIndex::record(src, req.headers, &mut header_index);

            let version = parse_version(req.version)?;
            let method = req.method.ok_or(ParseError::InvalidMethod)?.parse::<Method>().map_err(|_| ParseError::InvalidMethod)?;
            let uri = req.path.ok_or(ParseError::InvalidUri)?.parse::<Uri>().map_err(|_| ParseError::InvalidUri)?;

            let header_bytes = src.split_to(body_offset).freeze();
            let fields = build_fields(&header_bytes, &header_index[..header_count])?;

            let start = StartLine::Request(RequestLine { method, uri, version });
            let header = classify(start, fields)?;
            Ok(Some(header))
        }
        Status::Partial => {
            ensure!(src.len() <= MAX_HEADER_BYTES, ParseError::too_large_header(src.len(), MAX_HEADER_BYTES));
            Ok(None)
        }
    }
}

fn decode_response_head(src: &mut BytesMut) -> Result<Option<(StartLine, HeaderBlock)>, ParseError> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADER_NUM];
    let mut resp = httparse::Response::new(&mut headers);

    let parsed_result = resp.parse(src).map_err(|e| match e {
        Error::TooManyHeaders => ParseError::too_many_headers(MAX_HEADER_NUM),
        e => ParseError::invalid_header(e.to_string()),
    });

    match parsed_result? {
        Status::Complete(body_offset) => {
            trace!(head_size = body_offset, "parsed response head");
            ensure!(body_offset <= MAX_HEADER_BYTES, ParseError::too_large_header(body_offset, MAX_HEADER_BYTES));

            let header_count = resp.headers.len();
            ensure!(header_count <= MAX_HEADER_NUM, ParseError::too_many_headers(header_count));

            let mut header_index: [HeaderIndex; MAX_HEADER_NUM] = EMPTY_HEADER_INDEX_ARRAY;
            HeaderIndex::record(src, resp.headers, &mut header_index);

            let version = parse_version(resp.version)?;
            let status = StatusCode::from_u16(resp.code.ok_or(ParseError::InvalidStatus)?).map_err(|_| ParseError::InvalidStatus)?;
            let reason = resp.reason.filter(|r| !r.is_empty()).map(str::to_owned);

            let header_bytes = src.split_to(body_offset).freeze();
            let fields = build_fields(&header_bytes, &header_index[..header_count])?;

            let start = StartLine::Status(StatusLine { status, reason, version });
            let header = classify(start, fields)?;
            Ok(Some(header))
        }
        Status::Partial => {
            ensure!(src.len() <= MAX_HEADER_BYTES, ParseError::too_large_header(src.len(), MAX_HEADER_BYTES));
            Ok(None)
        }
    }
}

fn parse_version(version: Option<u8>) -> Result<Version, ParseError> {
    match version {
        Some(0) => Ok(Version::HTTP_10),
        Some(1) => Ok(Version::HTTP_11),
        // HTTP/2 and HTTP/3 heads never reach this decoder
        v => Err(ParseError::InvalidVersion(v)),
    }
}

/// Builds the typed header map from recorded byte ranges without copying the
/// header bytes.
fn build_fields(header_bytes: &bytes::Bytes, indices: &[HeaderIndex]) -> Result<HeaderMap, ParseError> {
    let mut fields = HeaderMap::with_capacity(indices.len());
    for index in indices {
        let name = HeaderName::from_bytes(&header_bytes[index.name.0..index.name.1])
            .map_err(|_| ParseError::invalid_header("invalid header name"))?;

        // SAFETY: httparse verified the header value contains only visible
        // ASCII chars, which is a subset of what HeaderValue accepts
        let value = unsafe { HeaderValue::from_maybe_shared_unchecked(header_bytes.slice(index.value.0..index.value.1)) };

        fields.append(name, value);
    }
    Ok(fields)
}

/// Derives the framing mode and trailer expectation from the parsed head.
fn classify(start: StartLine, fields: HeaderMap) -> Result<(StartLine, HeaderBlock), ParseError> {
    let mode = body_mode(&start, &fields)?;
    let has_trailer = mode.is_chunked() && fields.contains_key(header::TRAILER);
    Ok((start, HeaderBlock { fields, mode, has_trailer }))
}

/// Stores the byte range positions of a header's name and value within the
/// original buffer, so the typed header map can be built zero-copy.
#[derive(Clone, Copy)]
struct HeaderIndex {
    name: (usize, usize),
    value: (usize, usize),
}

const EMPTY_HEADER_INDEX: HeaderIndex = HeaderIndex { name: (0, 0), value: (0, 0) };

const EMPTY_HEADER_INDEX_ARRAY: [HeaderIndex; MAX_HEADER_NUM] = [EMPTY_HEADER_INDEX; MAX_HEADER_NUM];

impl HeaderIndex {
    /// Records the byte positions of header names and values from the parsed
    /// headers.
    fn record(bytes: &[u8], headers: &[httparse::Header<'_>], indices: &mut [HeaderIndex]) {
        let bytes_ptr = bytes.as_ptr() as usize;
        for (header, indices) in headers.iter().zip(indices.iter_mut()) {
            let name_start = header.name.as_ptr() as usize - bytes_ptr;
            let name_end = name_start + header.name.len();
            indices.name = (name_start, name_end);
            let value_start = header.value.as_ptr() as usize - bytes_ptr;
            let value_end = value_start + header.value.len();
            indices.value = (value_start, value_end);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::DataMode;
    use indoc::indoc;

    #[test]
    fn request_head_consumes_exactly_the_head() {
        let str = indoc! {"
            GET /index.html HTTP/1.1\r
            Host: 127.0.0.1:8080\r
            User-Agent: curl/7.79.1\r
            Accept: */*\r
            \r
            123"};

        let mut bytes = BytesMut::from(str);
        let mut decoder = HeadDecoder::new(Role::Server);

        let (start, header) = decoder.decode(&mut bytes).unwrap().unwrap();

        assert_eq!(&bytes[..], &b"123"[..]);
        assert_eq!(header.mode, DataMode::NoData);
        assert!(!header.has_trailer);
        assert_eq!(header.fields.len(), 3);
        assert_eq!(header.fields.get(header::HOST), Some(&HeaderValue::from_static("127.0.0.1:8080")));

        match start {
            StartLine::Request(line) => {
                assert_eq!(line.method, Method::GET);
                assert_eq!(line.uri.path(), "/index.html");
                assert_eq!(line.version, Version::HTTP_11);
            }
            StartLine::Status(_) => panic!("expected request line"),
        }
    }

    #[test]
    fn request_head_needs_terminator() {
        let mut bytes = BytesMut::from("POST /upload HTTP/1.1\r\nContent-Length: 5\r\n");
        let mut decoder = HeadDecoder::new(Role::Server);

        assert!(decoder.decode(&mut bytes).unwrap().is_none());

        bytes.extend_from_slice(b"\r\nhello");
        let (_, header) = decoder.decode(&mut bytes).unwrap().unwrap();
        assert_eq!(header.mode, DataMode::ContentLength(5));
        assert_eq!(&bytes[..], b"hello");
    }

    #[test]
    fn response_head_parses_status_line() {
        let mut bytes = BytesMut::from("HTTP/1.1 404 Not Found\r\nContent-Length: 9\r\n\r\nnot found");
        let mut decoder = HeadDecoder::new(Role::Client);

        let (start, header) = decoder.decode(&mut bytes).unwrap().unwrap();
        match start {
            StartLine::Status(line) => {
                assert_eq!(line.status, StatusCode::NOT_FOUND);
                assert_eq!(line.reason.as_deref(), Some("Not Found"));
            }
            StartLine::Request(_) => panic!("expected status line"),
        }
        assert_eq!(header.mode, DataMode::ContentLength(9));
        assert_eq!(&bytes[..], b"not found");
    }

    #[test]
    fn chunked_response_with_declared_trailer() {
        let str = indoc! {"
            HTTP/1.1 200 OK\r
            Transfer-Encoding: chunked\r
            Trailer: X-Checksum\r
            \r
            "};

        let mut bytes = BytesMut::from(str);
        let (_, header) = HeadDecoder::new(Role::Client).decode(&mut bytes).unwrap().unwrap();
        assert_eq!(header.mode, DataMode::Chunked);
        assert!(header.has_trailer);
    }

    #[test]
    fn oversized_partial_head_is_rejected() {
        let mut bytes = BytesMut::from(&b"GET / HTTP/1.1\r\n"[..]);
        bytes.extend_from_slice("X-Filler: ".as_bytes());
        bytes.extend_from_slice(&vec![b'a'; MAX_HEADER_BYTES]);

        let result = HeadDecoder::new(Role::Server).decode(&mut bytes);
        assert!(matches!(result, Err(ParseError::TooLargeHeader { .. })));
    }

    #[test]
    fn malformed_start_line_is_rejected() {
        let mut bytes = BytesMut::from("NOT A VALID START LINE AT ALL\r\n\r\n");
        let result = HeadDecoder::new(Role::Server).decode(&mut bytes);
        assert!(result.is_err());
    }
}
