//! Per-stream state machine and the suspension-based reader/writer on top.
//!
//! A stream is one logical request/response. The [`StreamEngine`] validates
//! every frame transition; the [`InboundQueue`] buffers decoded inbound
//! frames with bounded backpressure; [`StreamReader`] and [`StreamWriter`]
//! are the application-facing halves.

mod engine;
mod inbound;
mod reader;
mod state;
mod writer;

pub use engine::StreamEngine;
pub use inbound::{DEFAULT_INBOUND_CAPACITY, InboundHead, InboundQueue};
pub use reader::StreamReader;
pub use state::StreamState;
pub use writer::StreamWriter;
