//! Outbound byte transport abstraction.
//!
//! The stream writer does not talk to a socket directly: it hands serialized
//! bytes to a [`Transport`], which is whatever the surrounding runtime wires
//! in. [`ChannelTransport`] is the production shape, a handle to a
//! supervised write task; [`BufferTransport`] collects bytes in memory for
//! tests.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::utils::lock_unpoisoned;

/// Sink for serialized outbound bytes.
///
/// `send` is synchronous: implementations queue or buffer, they never block
/// the caller on network progress. `is_closed` is best effort and used to
/// refuse writes early with a network error instead of a silent drop.
pub trait Transport {
    fn send(&self, data: Bytes) -> io::Result<()>;
    fn is_closed(&self) -> bool;
}

/// Transport backed by a channel into a supervised write task.
///
/// The task owns the [`AsyncWrite`] half of the connection and drains the
/// channel until every sender is dropped or the sink fails. It is a normal
/// runtime task, so it is cancelled with the runtime rather than leaking
/// past its connection.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    sender: mpsc::UnboundedSender<Bytes>,
    closed: Arc<AtomicBool>,
}

impl ChannelTransport {
    /// Spawns the write task over `sink` and returns the transport handle
    /// plus the task handle for supervision.
    pub fn spawn<W>(mut sink: W) -> (Self, JoinHandle<()>)
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Bytes>();
        let closed = Arc::new(AtomicBool::new(false));

        let task_closed = Arc::clone(&closed);
        let handle = tokio::spawn(async move {
            while let Some(data) = receiver.recv().await {
                if let Err(error) = sink.write_all(&data).await {
                    warn!(%error, "connection write failed");
                    break;
                }
            }
            task_closed.store(true, Ordering::Release);
            if let Err(error) = sink.shutdown().await {
                debug!(%error, "connection shutdown failed");
            }
        });

        (Self { sender, closed }, handle)
    }
}

impl Transport for ChannelTransport {
    fn send(&self, data: Bytes) -> io::Result<()> {
        if self.is_closed() {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "write task stopped"));
        }
        self.sender.send(data).map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "write task stopped"))
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.sender.is_closed()
    }
}

/// In-memory transport for tests and local assembly.
#[derive(Debug, Clone, Default)]
pub struct BufferTransport {
    buffer: Arc<Mutex<BytesMut>>,
    closed: Arc<AtomicBool>,
}

impl BufferTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything sent so far.
    pub fn written(&self) -> Bytes {
        lock_unpoisoned(&self.buffer).clone().freeze()
    }

    /// Makes further sends fail with a broken pipe error.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

impl Transport for BufferTransport {
    fn send(&self, data: Bytes) -> io::Result<()> {
        if self.is_closed() {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "transport closed"));
        }
        lock_unpoisoned(&self.buffer).extend_from_slice(&data);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
