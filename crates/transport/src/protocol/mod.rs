//! Core protocol types shared across the transport engine.
//!
//! This module defines the data model the other layers communicate with:
//!
//! - **Frame model** ([`frame`]): the closed set of stream frames exchanged
//!   between the wire parser and the stream engine
//!   - [`Frame`]: start line, header, data, eof, trailer or full message
//!   - [`BodyItem`]: body decoder output, a chunk or end-of-body
//! - **Message heads** ([`head`]): request/status lines and header blocks
//!   - [`StartLine`], [`RequestLine`], [`StatusLine`]
//!   - [`HeaderBlock`]: fields plus the framing decision derived from them
//!   - [`MessageHead`]: an outbound head before classification
//! - **Body framing** ([`mode`]): [`DataMode`] and the shared [`body_mode`]
//!   classification both directions use
//! - **Errors** ([`error`]): [`HttpError`], [`ParseError`], [`StreamError`]
//!
//! Message kinds are a closed enum resolved by pattern match; there is no
//! runtime downcasting anywhere in the engine.

mod frame;
pub use frame::BodyItem;
pub use frame::Frame;
pub use frame::FullMessage;

pub mod head;
pub use head::HeaderBlock;
pub use head::MessageHead;
pub use head::RequestLine;
pub use head::StartLine;
pub use head::StatusLine;

mod mode;
pub use mode::DataMode;
pub use mode::body_mode;

mod error;
pub use error::HttpError;
pub use error::ParseError;
pub use error::StreamError;
