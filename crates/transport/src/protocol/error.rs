use std::io;

use http::StatusCode;
use thiserror::Error;

use crate::stream::StreamState;

/// Top level error type for one connection.
///
/// Wire level failures and stream level failures are kept apart because they
/// propagate differently: a parse error is local to the current message and
/// surfaces as a decode result, while a stream error is made sticky on the
/// stream and broadcast to every pending operation.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("parse error: {source}")]
    Parse {
        #[from]
        source: ParseError,
    },

    #[error("stream error: {source}")]
    Stream {
        #[from]
        source: StreamError,
    },
}

impl HttpError {
    /// The HTTP status a server should answer with when this error occurs
    /// before a response head was written: 400 for malformed input, 408 for
    /// read deadlines, 500 for everything else.
    pub fn status_hint(&self) -> StatusCode {
        match self {
            HttpError::Parse { .. } => StatusCode::BAD_REQUEST,
            HttpError::Stream { source: StreamError::Timeout } => StatusCode::REQUEST_TIMEOUT,
            HttpError::Stream { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the connection must be torn down because the wire state is
    /// ambiguous after this error. Timeouts and clean end-of-body signals
    /// keep the connection usable.
    pub fn must_close_connection(&self) -> bool {
        !matches!(
            self,
            HttpError::Stream { source: StreamError::Timeout } | HttpError::Stream { source: StreamError::ReadEof }
        )
    }
}

/// Errors produced while decoding raw bytes into frames.
///
/// All variants are fatal for the current message; needing more input is not
/// an error and is reported as `Ok(None)` from the decoder instead.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("header size too large, current: {current_size} exceed the limit {max_size}")]
    TooLargeHeader { current_size: usize, max_size: usize },

    #[error("message size too large, current: {current_size} exceed the limit {max_size}")]
    TooLargeMessage { current_size: u64, max_size: u64 },

    #[error("header number exceed the limit {max_num}")]
    TooManyHeaders { max_num: usize },

    #[error("invalid header: {reason}")]
    InvalidHeader { reason: String },

    #[error("invalid http version: {0:?}")]
    InvalidVersion(Option<u8>),

    #[error("invalid http method")]
    InvalidMethod,

    #[error("invalid http uri")]
    InvalidUri,

    #[error("invalid http status code")]
    InvalidStatus,

    #[error("invalid content-length header: {reason}")]
    InvalidContentLength { reason: String },

    #[error("transfer-encoding and content-length both present in headers")]
    AmbiguousBodyLength,

    #[error("invalid chunk framing: {reason}")]
    InvalidChunk { reason: String },

    #[error("invalid trailer section: {reason}")]
    InvalidTrailer { reason: String },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ParseError {
    pub fn too_large_header(current_size: usize, max_size: usize) -> Self {
        Self::TooLargeHeader { current_size, max_size }
    }

    pub fn too_large_message(current_size: u64, max_size: u64) -> Self {
        Self::TooLargeMessage { current_size, max_size }
    }

    pub fn too_many_headers(max_num: usize) -> Self {
        Self::TooManyHeaders { max_num }
    }

    pub fn invalid_header<S: ToString>(str: S) -> Self {
        Self::InvalidHeader { reason: str.to_string() }
    }

    pub fn invalid_content_length<S: ToString>(str: S) -> Self {
        Self::InvalidContentLength { reason: str.to_string() }
    }

    pub fn invalid_chunk<S: ToString>(str: S) -> Self {
        Self::InvalidChunk { reason: str.to_string() }
    }

    pub fn invalid_trailer<S: ToString>(str: S) -> Self {
        Self::InvalidTrailer { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}

/// Errors surfaced through the stream reader and writer.
///
/// The type is `Clone` because the first error on a stream is stored and
/// returned to every operation issued afterwards.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// An operation was attempted in the wrong stream state. Indicates caller
    /// misuse; the stream is errored, never panicked.
    #[error("operation {operation} not allowed in state {state:?}")]
    State { operation: &'static str, state: StreamState },

    /// Declared and actual byte counts diverged on the write side. Fatal for
    /// the connection: the peer can no longer be told the true length.
    #[error("content-length mismatch: declared {declared}, written {written}")]
    ContentLengthMismatch { declared: u64, written: u64 },

    /// The trailer fields sent do not match the declared `Trailer` header.
    #[error("trailer mismatch: {reason}")]
    TrailerMismatch { reason: String },

    /// A read or write deadline expired. The stream stays usable and the
    /// operation may be retried.
    #[error("operation deadline exceeded")]
    Timeout,

    /// The underlying connection closed or broke. Fatal for the stream and
    /// delivered to every pending operation.
    #[error("connection error: {reason}")]
    Network { reason: String },

    /// End of body was already delivered on a previous read. Informational,
    /// distinguishes a repeated read from a transport failure.
    #[error("end of body already reached")]
    ReadEof,

    /// The stream was shut down while the operation was pending.
    #[error("stream closed")]
    Closed,

    /// `write_data` was called with an empty payload. An empty write must be
    /// expressed through `write_done`: in chunked mode an empty chunk means
    /// end of body.
    #[error("empty write_data payload, use write_done to finish the body")]
    EmptyWriteData,

    /// An inbound parse failure broadcast to readers of the stream.
    #[error("protocol parse failure: {reason}")]
    Parse { reason: String },
}

impl StreamError {
    pub fn state(operation: &'static str, state: StreamState) -> Self {
        Self::State { operation, state }
    }

    pub fn network<S: ToString>(reason: S) -> Self {
        Self::Network { reason: reason.to_string() }
    }

    pub fn trailer_mismatch<S: ToString>(reason: S) -> Self {
        Self::TrailerMismatch { reason: reason.to_string() }
    }
}

impl From<io::Error> for StreamError {
    fn from(e: io::Error) -> Self {
        StreamError::Network { reason: e.to_string() }
    }
}

impl From<&ParseError> for StreamError {
    fn from(e: &ParseError) -> Self {
        StreamError::Parse { reason: e.to_string() }
    }
}
