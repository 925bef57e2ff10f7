//! Body encoding and decoding for both framing modes.
//!
//! - [`BodyDecoder`]: dispatches to chunked / fixed-length / no-body decoding
//! - [`BodyEncoder`]: dispatches to chunked / fixed-length / no-body encoding
//!
//! The chunked side captures and emits trailer fields; the fixed-length side
//! enforces the declared byte count in both directions.

mod body_decoder;
mod body_encoder;
mod chunked_decoder;
mod chunked_encoder;
mod length_decoder;
mod length_encoder;

pub use body_decoder::BodyDecoder;
pub use body_encoder::BodyEncoder;
