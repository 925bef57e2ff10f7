//! HTTP/1.1 wire codec built on [`tokio_util::codec`].
//!
//! The codec is split into three layers:
//!
//! - [`head`]: start line + header block decoding/encoding via `httparse`
//! - [`body`]: chunked and fixed-length body framing
//! - [`WireParser`]: the combined [`Decoder`](tokio_util::codec::Decoder)
//!   that turns a byte stream into a [`Frame`](crate::protocol::Frame)
//!   sequence, with a short-circuit for messages that arrive whole

pub mod body;
pub mod head;
mod wire_parser;

pub use wire_parser::WireParser;

/// Which side of the connection a parser serves.
///
/// A server parses request heads and encodes status lines; a client does
/// the reverse. The body layer is identical for both.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Role {
    Server,
    Client,
}
