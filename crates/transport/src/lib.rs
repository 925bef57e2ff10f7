//! HTTP/1.1 streaming transport engine
//!
//! This crate turns a raw, possibly fragmented byte stream into a sequence
//! of well-formed HTTP/1.1 messages and exposes a suspension-based
//! reader/writer API for streaming request and response bodies, including
//! Server-Sent Events, without blocking the I/O task.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::{Arc, Mutex};
//! use std::time::Duration;
//!
//! use h1_stream::codec::WireParser;
//! use h1_stream::connection::{ChannelTransport, FramePump};
//! use h1_stream::stream::{InboundQueue, StreamEngine, StreamReader, StreamWriter};
//! use tokio::net::TcpStream;
//! use tracing::info;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     tracing_subscriber::fmt().init();
//!
//!     let tcp_stream = TcpStream::connect("127.0.0.1:8080").await?;
//!     let (read_half, write_half) = tcp_stream.into_split();
//!
//!     let engine = Arc::new(Mutex::new(StreamEngine::new()));
//!     let queue = Arc::new(InboundQueue::default());
//!     let (transport, _write_task) = ChannelTransport::spawn(write_half);
//!
//!     let mut writer = StreamWriter::new(Arc::clone(&engine), transport);
//!     let head = h1_stream::protocol::MessageHead::request(
//!         http::Method::GET,
//!         "/events".parse()?,
//!     );
//!     writer.write_header(head)?;
//!
//!     let mut pump = FramePump::new(read_half, WireParser::client());
//!     let pump_engine = Arc::clone(&engine);
//!     let pump_queue = Arc::clone(&queue);
//!     tokio::spawn(async move {
//!         let _ = pump.pump_message(&pump_engine, &pump_queue).await;
//!     });
//!
//!     let mut reader = StreamReader::new(queue);
//!     let head = reader.read_header(Duration::from_secs(5)).await?;
//!     info!(mode = ?head.header.mode, "response head received");
//!     while let Some(chunk) = reader.read_chunk(Duration::from_secs(5)).await? {
//!         info!(len = chunk.len(), "body chunk");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - [`codec`]: wire parsing and encoding ([`codec::WireParser`] and the
//!   head/body codecs under it)
//! - [`protocol`]: the frame model, message head types, body framing mode
//!   and error taxonomy
//! - [`stream`]: the per-stream state machine and the suspension-based
//!   reader/writer on top of it
//! - [`sse`]: Server-Sent Events model, parser, serializer and writer
//! - [`connection`]: transport abstraction and the frame pump gluing a
//!   connection's read half to a stream
//!
//! # Limitations
//!
//! - HTTP/1.1 only
//! - Maximum header size: 8KB, maximum number of headers: 64
//! - Default maximum message size: 8MB (configurable per parser)
//!
//! # Safety
//!
//! Unsafe code is confined to header-value construction in the head decoder,
//! where httparse has already validated the bytes.

pub mod codec;
pub mod connection;
pub mod protocol;
pub mod sse;
pub mod stream;

mod utils;
pub(crate) use utils::ensure;
