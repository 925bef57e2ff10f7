//! Bounded inbound buffer between the frame pump and the stream reader.
//!
//! One queue belongs to exactly one stream. The pump offers decoded frames
//! into it; the reader takes them out. Capacity is counted in body bytes and
//! produces backpressure: an offer that would overflow suspends until the
//! reader frees space. `stop` and `fail` wake every waiter on both sides so
//! nothing can hang past stream teardown.
//!
//! The timeout-vs-data race is safe by construction: a reader that gives up
//! drops its `Notified` future and the data stays queued for the next take,
//! so no pending operation can ever resolve twice.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use bytes::Bytes;
use http::HeaderMap;
use tokio::sync::Notify;

use crate::protocol::StreamError;
use crate::protocol::head::{HeaderBlock, StartLine};

/// Default capacity of buffered body bytes per stream
pub const DEFAULT_INBOUND_CAPACITY: usize = 64 * 1024;

/// The decoded head of an inbound message, delivered as one unit.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundHead {
    pub start: StartLine,
    pub header: HeaderBlock,
}

/// Single-owner bounded queue of decoded inbound frames.
#[derive(Debug)]
pub struct InboundQueue {
    inner: Mutex<Inner>,
    /// Signalled when something becomes available to take
    readable: Notify,
    /// Signalled when buffered bytes drop below capacity
    writable: Notify,
    capacity: usize,
}

#[derive(Debug)]
struct Inner {
    head: Option<InboundHead>,
    chunks: VecDeque<Bytes>,
    buffered_bytes: usize,
    eof: bool,
    trailer: Option<HeaderMap>,
    /// Whether a trailer section is still due after eof
    trailer_expected: bool,
    error: Option<StreamError>,
    stopped: bool,
}

impl InboundQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                head: None,
                chunks: VecDeque::new(),
                buffered_bytes: 0,
                eof: false,
                trailer: None,
                trailer_expected: false,
                error: None,
                stopped: false,
            }),
            readable: Notify::new(),
            writable: Notify::new(),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        crate::utils::lock_unpoisoned(&self.inner)
    }

    // ---- producer side (frame pump) ----

    /// Delivers the message head and wakes the reader.
    pub fn offer_head(&self, head: InboundHead) -> Result<(), StreamError> {
        let mut inner = self.lock();
        inner.refuse_when_down()?;
        inner.trailer_expected = head.header.has_trailer;
        inner.head = Some(head);
        drop(inner);
        self.readable.notify_waiters();
        Ok(())
    }

    /// Queues one body chunk, suspending while the buffer is at capacity.
    pub async fn offer_data(&self, data: Bytes) -> Result<(), StreamError> {
        loop {
            let notified = self.writable.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut inner = self.lock();
                inner.refuse_when_down()?;
                if inner.buffered_bytes < self.capacity {
                    inner.buffered_bytes += data.len();
                    inner.chunks.push_back(data);
                    drop(inner);
                    self.readable.notify_waiters();
                    return Ok(());
                }
            }
            notified.await;
        }
    }

    /// Marks the end of the body and wakes the reader.
    pub fn offer_eof(&self) -> Result<(), StreamError> {
        let mut inner = self.lock();
        inner.refuse_when_down()?;
        inner.eof = true;
        drop(inner);
        self.readable.notify_waiters();
        Ok(())
    }

    /// Delivers the trailer section and wakes the reader.
    pub fn offer_trailer(&self, fields: HeaderMap) -> Result<(), StreamError> {
        let mut inner = self.lock();
        inner.refuse_when_down()?;
        inner.trailer = Some(fields);
        inner.trailer_expected = false;
        drop(inner);
        self.readable.notify_waiters();
        Ok(())
    }

    // ---- teardown, either side ----

    /// Fails the queue; every pending and future operation observes the
    /// first error. Wakes all waiters on both sides.
    pub fn fail(&self, error: StreamError) {
        let mut inner = self.lock();
        if inner.error.is_none() {
            inner.error = Some(error);
        }
        drop(inner);
        self.readable.notify_waiters();
        self.writable.notify_waiters();
    }

    /// Shuts the queue down without an error. Wakes all waiters; already
    /// queued data stays readable, new offers are refused.
    pub fn stop(&self) {
        let mut inner = self.lock();
        inner.stopped = true;
        drop(inner);
        self.readable.notify_waiters();
        self.writable.notify_waiters();
    }

    // ---- consumer side (stream reader) ----

    /// Waits for and takes the message head.
    pub async fn take_head(&self) -> Result<InboundHead, StreamError> {
        loop {
            let notified = self.readable.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut inner = self.lock();
                if let Some(head) = inner.head.take() {
                    return Ok(head);
                }
                inner.check_down()?;
            }
            notified.await;
        }
    }

    /// Waits for and takes the next body chunk; `None` means end of body.
    ///
    /// Buffered chunks drain before eof or failure is reported, and a clean
    /// eof is reported before any connection error, so a connection closing
    /// right after a complete body never turns into a spurious failure.
    pub async fn take_chunk(&self) -> Result<Option<Bytes>, StreamError> {
        loop {
            let notified = self.readable.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut inner = self.lock();
                if let Some(chunk) = inner.chunks.pop_front() {
                    inner.buffered_bytes -= chunk.len();
                    drop(inner);
                    self.writable.notify_waiters();
                    return Ok(Some(chunk));
                }
                if inner.eof {
                    return Ok(None);
                }
                inner.check_down()?;
            }
            notified.await;
        }
    }

    /// Waits for the trailer section after eof; `None` when the message
    /// declared no trailer.
    pub async fn take_trailer(&self) -> Result<Option<HeaderMap>, StreamError> {
        loop {
            let notified = self.readable.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut inner = self.lock();
                if let Some(fields) = inner.trailer.take() {
                    return Ok(Some(fields));
                }
                if inner.eof && !inner.trailer_expected {
                    return Ok(None);
                }
                inner.check_down()?;
            }
            notified.await;
        }
    }
}

impl Default for InboundQueue {
    fn default() -> Self {
        Self::new(DEFAULT_INBOUND_CAPACITY)
    }
}

impl Inner {
    /// Producer-side guard: a downed queue accepts nothing further.
    fn refuse_when_down(&self) -> Result<(), StreamError> {
        match &self.error {
            Some(error) => Err(error.clone()),
            None if self.stopped => Err(StreamError::Closed),
            None => Ok(()),
        }
    }

    /// Consumer-side guard, checked only once nothing is left to drain.
    fn check_down(&self) -> Result<(), StreamError> {
        self.refuse_when_down()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn chunks_flow_in_order() {
        let queue = InboundQueue::default();
        queue.offer_data(Bytes::from_static(b"one")).await.unwrap();
        queue.offer_data(Bytes::from_static(b"two")).await.unwrap();
        queue.offer_eof().unwrap();

        assert_eq!(queue.take_chunk().await.unwrap(), Some(Bytes::from_static(b"one")));
        assert_eq!(queue.take_chunk().await.unwrap(), Some(Bytes::from_static(b"two")));
        assert_eq!(queue.take_chunk().await.unwrap(), None);
    }

    #[tokio::test]
    async fn take_suspends_until_data_arrives() {
        let queue = Arc::new(InboundQueue::default());

        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.take_chunk().await })
        };
        tokio::task::yield_now().await;

        queue.offer_data(Bytes::from_static(b"late")).await.unwrap();
        assert_eq!(consumer.await.unwrap().unwrap(), Some(Bytes::from_static(b"late")));
    }

    #[tokio::test]
    async fn full_buffer_backpressures_the_producer() {
        let queue = Arc::new(InboundQueue::new(4));
        queue.offer_data(Bytes::from_static(b"fill")).await.unwrap();

        let producer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.offer_data(Bytes::from_static(b"more")).await })
        };
        tokio::task::yield_now().await;
        assert!(!producer.is_finished());

        // Draining a chunk frees capacity and wakes the producer
        queue.take_chunk().await.unwrap();
        producer.await.unwrap().unwrap();
        assert_eq!(queue.take_chunk().await.unwrap(), Some(Bytes::from_static(b"more")));
    }

    #[tokio::test]
    async fn stop_wakes_all_waiters() {
        let queue = Arc::new(InboundQueue::new(4));
        queue.offer_data(Bytes::from_static(b"full")).await.unwrap();

        let producer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.offer_data(Bytes::from_static(b"blocked")).await })
        };
        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.take_head().await })
        };
        tokio::task::yield_now().await;

        queue.stop();
        assert_eq!(producer.await.unwrap(), Err(StreamError::Closed));
        assert_eq!(consumer.await.unwrap(), Err(StreamError::Closed));
    }

    #[tokio::test]
    async fn queued_data_survives_stop() {
        let queue = InboundQueue::default();
        queue.offer_data(Bytes::from_static(b"kept")).await.unwrap();
        queue.offer_eof().unwrap();
        queue.stop();

        assert_eq!(queue.take_chunk().await.unwrap(), Some(Bytes::from_static(b"kept")));
        assert_eq!(queue.take_chunk().await.unwrap(), None);
    }

    #[tokio::test]
    async fn clean_eof_beats_a_late_failure() {
        let queue = InboundQueue::default();
        queue.offer_eof().unwrap();
        queue.fail(StreamError::network("connection reset"));

        // Body ended cleanly before the failure, so the reader sees eof
        assert_eq!(queue.take_chunk().await.unwrap(), None);
    }

    #[tokio::test]
    async fn failure_reaches_a_pending_reader() {
        let queue = Arc::new(InboundQueue::default());
        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.take_chunk().await })
        };
        tokio::task::yield_now().await;

        queue.fail(StreamError::network("broken pipe"));
        assert_eq!(consumer.await.unwrap(), Err(StreamError::network("broken pipe")));
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_take_leaves_data_for_the_next() {
        let queue = Arc::new(InboundQueue::default());

        // A read that times out before data arrives has no lasting effect
        let timed_out = tokio::time::timeout(Duration::from_millis(1), queue.take_chunk()).await;
        assert!(timed_out.is_err());

        queue.offer_data(Bytes::from_static(b"intact")).await.unwrap();
        assert_eq!(queue.take_chunk().await.unwrap(), Some(Bytes::from_static(b"intact")));
    }

    #[tokio::test]
    async fn trailer_is_delivered_after_eof() {
        let queue = InboundQueue::default();
        queue.offer_head(InboundHead {
            start: StartLine::Status(crate::protocol::head::StatusLine {
                status: http::StatusCode::OK,
                reason: None,
                version: http::Version::HTTP_11,
            }),
            header: HeaderBlock { fields: HeaderMap::new(), mode: crate::protocol::DataMode::Chunked, has_trailer: true },
        })
        .unwrap();
        queue.offer_eof().unwrap();

        let mut fields = HeaderMap::new();
        fields.insert("x-checksum", http::HeaderValue::from_static("abc"));
        queue.offer_trailer(fields.clone()).unwrap();

        queue.take_head().await.unwrap();
        assert_eq!(queue.take_chunk().await.unwrap(), None);
        assert_eq!(queue.take_trailer().await.unwrap(), Some(fields));
    }
}
