//! Write side of one stream.
//!
//! [`StreamWriter`] serializes outbound frames through the shared
//! [`StreamEngine`] and hands the bytes to the connection's [`Transport`].
//! `write_header` and `write_done` are idempotent: repeating them on an
//! already finalized stream succeeds without further I/O.

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use http::HeaderMap;

use crate::connection::Transport;
use crate::protocol::{MessageHead, StreamError};
use crate::stream::StreamEngine;
use crate::utils::lock_unpoisoned;

#[derive(Debug)]
pub struct StreamWriter<T: Transport> {
    /// Shared with the frame pump, which drives the read side
    engine: Arc<Mutex<StreamEngine>>,
    transport: T,
    header_sent: bool,
    done: bool,
}

impl<T: Transport> StreamWriter<T> {
    pub fn new(engine: Arc<Mutex<StreamEngine>>, transport: T) -> Self {
        Self { engine, transport, header_sent: false, done: false }
    }

    /// Sends the message head. A second call is a success no-op.
    pub fn write_header(&mut self, head: MessageHead) -> Result<(), StreamError> {
        if self.header_sent {
            return Ok(());
        }
        let bytes = lock_unpoisoned(&self.engine).pre_send_header(head)?;
        self.send(bytes)?;
        self.header_sent = true;
        Ok(())
    }

    /// Sends one piece of body data.
    ///
    /// Empty payloads are rejected: in chunked mode an empty chunk means
    /// end of body, which must go through [`write_done`](Self::write_done).
    pub fn write_data(&mut self, data: Bytes) -> Result<(), StreamError> {
        let bytes = lock_unpoisoned(&self.engine).pre_send_data(data)?;
        self.send(bytes)
    }

    /// Terminates the body. A second call, or a call after a fixed-length
    /// body closed itself at the declared length, is a success no-op.
    pub fn write_done(&mut self) -> Result<(), StreamError> {
        if self.done {
            return Ok(());
        }

        let mut engine = lock_unpoisoned(&self.engine);
        if engine.write_state().is_closed() && engine.error().is_none() {
            self.done = true;
            return Ok(());
        }
        let bytes = engine.pre_send_eof()?;
        let closed = engine.write_state().is_closed();
        drop(engine);

        self.send(bytes)?;
        // A declared trailer keeps the stream half closed until write_trailer
        self.done = closed;
        Ok(())
    }

    /// Sends the trailer section of a chunked body and finalizes the stream.
    pub fn write_trailer(&mut self, fields: HeaderMap) -> Result<(), StreamError> {
        let bytes = lock_unpoisoned(&self.engine).pre_send_trailer(fields)?;
        self.send(bytes)?;
        self.done = true;
        Ok(())
    }

    /// Whether the write side has been finalized.
    pub fn is_done(&self) -> bool {
        self.done
    }

    fn send(&mut self, bytes: Bytes) -> Result<(), StreamError> {
        if self.transport.is_closed() {
            let error = StreamError::network("transport closed");
            return Err(lock_unpoisoned(&self.engine).fail(error));
        }
        if let Err(io_error) = self.transport.send(bytes) {
            let error = StreamError::from(io_error);
            return Err(lock_unpoisoned(&self.engine).fail(error));
        }
        Ok(())
    }
}
