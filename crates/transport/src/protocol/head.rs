//! Message head types shared by the wire parser and the stream engine.
//!
//! A head is the start line plus the header fields of one HTTP/1.1 message.
//! Requests and responses are represented by one closed enum instead of
//! runtime type casts, so downstream code resolves the message kind by
//! pattern match.

use http::{HeaderMap, HeaderName, Method, StatusCode, Uri, Version, header};

use crate::protocol::DataMode;

/// The request line of an inbound or outbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    pub method: Method,
    pub uri: Uri,
    pub version: Version,
}

/// The status line of an inbound or outbound response.
///
/// `reason` keeps the reason phrase as observed on the wire. Encoding always
/// emits the canonical reason for the status code, so `None` is the common
/// case for locally built responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub status: StatusCode,
    pub reason: Option<String>,
    pub version: Version,
}

/// Start line of a message: request line or status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartLine {
    Request(RequestLine),
    Status(StatusLine),
}

impl StartLine {
    /// Returns true if this is a request line
    #[inline]
    pub fn is_request(&self) -> bool {
        matches!(self, StartLine::Request(_))
    }
}

/// A fully classified header block: the parsed fields plus the body framing
/// decision derived from them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderBlock {
    /// The header fields as they appeared on the wire
    pub fields: HeaderMap,
    /// Body framing derived from the fields and the start line
    pub mode: DataMode,
    /// Whether a `Trailer` header declared trailer fields after a chunked body
    pub has_trailer: bool,
}

impl HeaderBlock {
    /// The trailer field names declared by the `Trailer` header, if any.
    ///
    /// Invalid names in the declaration are skipped rather than failing the
    /// message, mirroring how unknown chunk extensions are ignored.
    pub fn declared_trailers(&self) -> Vec<HeaderName> {
        declared_trailers(&self.fields)
    }
}

/// Parses the comma separated `Trailer` header into header names.
pub(crate) fn declared_trailers(fields: &HeaderMap) -> Vec<HeaderName> {
    let Some(value) = fields.get(header::TRAILER) else {
        return Vec::new();
    };

    let Ok(list) = value.to_str() else {
        return Vec::new();
    };

    list.split(',').filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok()).collect()
}

/// An outbound message head handed to the write side.
///
/// Unlike [`HeaderBlock`] the framing mode is not stored here: the stream
/// engine classifies the head itself when the header is sent, exactly the way
/// the wire parser classifies inbound heads.
#[derive(Debug, Clone)]
pub struct MessageHead {
    pub start: StartLine,
    pub fields: HeaderMap,
}

impl MessageHead {
    /// Creates a response head with the given status and no fields.
    pub fn response(status: StatusCode) -> Self {
        Self {
            start: StartLine::Status(StatusLine { status, reason: None, version: Version::HTTP_11 }),
            fields: HeaderMap::new(),
        }
    }

    /// Creates a request head with the given method and uri and no fields.
    pub fn request(method: Method, uri: Uri) -> Self {
        Self { start: StartLine::Request(RequestLine { method, uri, version: Version::HTTP_11 }), fields: HeaderMap::new() }
    }

    /// Inserts a header field, replacing any previous value.
    pub fn field<V>(mut self, name: HeaderName, value: V) -> Self
    where
        V: TryInto<http::HeaderValue>,
    {
        if let Ok(value) = value.try_into() {
            self.fields.insert(name, value);
        }
        self
    }
}
