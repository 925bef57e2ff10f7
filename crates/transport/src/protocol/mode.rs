use http::{HeaderMap, HeaderValue, Method, StatusCode, header};

use crate::protocol::ParseError;
use crate::protocol::head::StartLine;

/// Describes how a message body is framed on the wire.
///
/// The mode is decided once per message from the header block and then drives
/// both the body decoder selection on the read side and the body encoder
/// selection on the write side:
/// - `NoData`: no body follows the header terminator
/// - `ContentLength(n)`: exactly `n` raw bytes follow
/// - `Chunked`: the body uses chunked transfer encoding and may be followed
///   by trailer fields
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DataMode {
    /// No body is expected
    NoData,
    /// Body with a known length in bytes
    ContentLength(u64),
    /// Body using chunked transfer encoding
    Chunked,
}

impl DataMode {
    /// Returns true if the body uses chunked transfer encoding
    #[inline]
    pub fn is_chunked(&self) -> bool {
        matches!(self, DataMode::Chunked)
    }

    /// Returns true if no body is expected
    #[inline]
    pub fn is_no_data(&self) -> bool {
        matches!(self, DataMode::NoData)
    }

    /// Returns the declared length for content-length framed bodies
    pub fn content_length(&self) -> Option<u64> {
        match self {
            DataMode::ContentLength(n) => Some(*n),
            _ => None,
        }
    }
}

/// Classifies the body framing of a message from its start line and header
/// fields.
///
/// This single function is used for both directions: the wire parser applies
/// it to inbound heads and the stream engine applies it to outbound heads, so
/// the two sides can never disagree on framing.
///
/// Classification follows RFC 9112 §6:
/// - `Transfer-Encoding: chunked` (chunked must be the final coding) wins
/// - otherwise a valid `Content-Length` gives a fixed-length body
/// - any `Transfer-Encoding` alongside `Content-Length` is rejected as an
///   ambiguous length declaration, a known request-smuggling vector. This is
///   stricter than the RFC's precedence rule, which the RFC itself allows:
///   a message carrying both "ought to be handled as an error"
/// - bodyless request methods and `1xx`/`204`/`304` responses are forced to
///   `NoData` regardless of header declaration
pub fn body_mode(start: &StartLine, fields: &HeaderMap) -> Result<DataMode, ParseError> {
    if !may_carry_body(start) {
        return Ok(DataMode::NoData);
    }

    let te_header = fields.get(header::TRANSFER_ENCODING);
    let cl_header = fields.get(header::CONTENT_LENGTH);

    match (te_header, cl_header) {
        (None, None) => Ok(DataMode::NoData),

        (te_value @ Some(_), None) => {
            if is_chunked(te_value) {
                Ok(DataMode::Chunked)
            } else {
                Ok(DataMode::NoData)
            }
        }

        (None, Some(cl_value)) => {
            let cl_str = cl_value.to_str().map_err(|_| ParseError::invalid_content_length("value can't to_str"))?;

            let length =
                cl_str.trim().parse::<u64>().map_err(|_| ParseError::invalid_content_length(format!("value {cl_str} is not u64")))?;

            if length == 0 { Ok(DataMode::NoData) } else { Ok(DataMode::ContentLength(length)) }
        }

        (Some(_), Some(_)) => Err(ParseError::AmbiguousBodyLength),
    }
}

/// Whether a message of this kind may carry a body at all.
///
/// Requests with bodyless methods and informational / no-content / not-modified
/// responses never have one, whatever the headers claim.
fn may_carry_body(start: &StartLine) -> bool {
    match start {
        StartLine::Request(line) => !matches!(
            line.method,
            Method::GET | Method::HEAD | Method::DELETE | Method::OPTIONS | Method::CONNECT | Method::TRACE
        ),
        StartLine::Status(line) => {
            !(line.status.is_informational() || line.status == StatusCode::NO_CONTENT || line.status == StatusCode::NOT_MODIFIED)
        }
    }
}

/// Checks if the Transfer-Encoding header value indicates chunked encoding.
///
/// According to RFC 9112, chunked must be the last encoding if present.
fn is_chunked(header_value: Option<&HeaderValue>) -> bool {
    const CHUNKED: &[u8] = b"chunked";
    if let Some(value) = header_value {
        if let Some(bytes) = value.as_bytes().rsplit(|b| *b == b',').next() {
            return bytes.trim_ascii().eq_ignore_ascii_case(CHUNKED);
        }
    }
    false
}
