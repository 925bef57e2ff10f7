//! Message head encoding and decoding.
//!
//! - [`HeadDecoder`]: incremental start-line + header parsing for requests
//!   and responses, with size limit enforcement
//! - [`HeadEncoder`]: start-line + header serialization that keeps the
//!   framing headers consistent with the chosen body mode

mod head_decoder;
mod head_encoder;

pub use head_decoder::HeadDecoder;
pub use head_encoder::HeadEncoder;
