//! Suspension-based read side of one stream.
//!
//! [`StreamReader`] is the application-facing consumer of an
//! [`InboundQueue`]: every operation suspends until the frame pump has
//! delivered enough data or the deadline expires. Taking `&mut self`
//! makes the single-outstanding-read discipline structural.
//!
//! A deadline expiry has no side effect on the stream: the read future is
//! dropped, already buffered bytes stay in place and the next read picks
//! them up.

use std::sync::Arc;
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use http::HeaderMap;
use tokio::time::timeout;

use crate::ensure;
use crate::protocol::StreamError;
use crate::stream::inbound::{InboundHead, InboundQueue};

#[derive(Debug)]
pub struct StreamReader {
    queue: Arc<InboundQueue>,
    /// Bytes taken from the queue but not yet returned to the caller
    pending: BytesMut,
    /// Set once end of body has been reported to the caller
    eof_seen: bool,
}

impl StreamReader {
    pub fn new(queue: Arc<InboundQueue>) -> Self {
        Self { queue, pending: BytesMut::new(), eof_seen: false }
    }

    /// Waits for the message head.
    pub async fn read_header(&mut self, deadline: Duration) -> Result<InboundHead, StreamError> {
        timeout(deadline, self.queue.take_head()).await.map_err(|_| StreamError::Timeout)?
    }

    /// Waits for the next piece of body data as the pump delivered it.
    ///
    /// `None` signals the end of the body exactly once; reading again after
    /// that fails with [`StreamError::ReadEof`].
    pub async fn read_chunk(&mut self, deadline: Duration) -> Result<Option<Bytes>, StreamError> {
        ensure!(!self.eof_seen, StreamError::ReadEof);
        if !self.pending.is_empty() {
            return Ok(Some(self.pending.split().freeze()));
        }

        let chunk = timeout(deadline, self.queue.take_chunk()).await.map_err(|_| StreamError::Timeout)??;
        if chunk.is_none() {
            self.eof_seen = true;
        }
        Ok(chunk)
    }

    /// Reads up to `n` bytes, suspending until they are available or the
    /// body ends.
    ///
    /// The first read that comes back shorter than `n` is the end-of-body
    /// signal; any read after it fails with [`StreamError::ReadEof`].
    pub async fn read_at_most(&mut self, n: usize, deadline: Duration) -> Result<Bytes, StreamError> {
        self.fill(n, deadline).await
    }

    /// Reads exactly `n` bytes, suspending until they are available.
    ///
    /// When the body ends first the remaining bytes are returned short once;
    /// after that every read fails with [`StreamError::ReadEof`].
    pub async fn read_exactly(&mut self, n: usize, deadline: Duration) -> Result<Bytes, StreamError> {
        self.fill(n, deadline).await
    }

    /// Waits for the trailer section; `None` when the message declared none.
    pub async fn read_trailer(&mut self, deadline: Duration) -> Result<Option<HeaderMap>, StreamError> {
        timeout(deadline, self.queue.take_trailer()).await.map_err(|_| StreamError::Timeout)?
    }

    /// Whether end of body has already been reported.
    pub fn is_eof(&self) -> bool {
        self.eof_seen
    }

    async fn fill(&mut self, n: usize, deadline: Duration) -> Result<Bytes, StreamError> {
        ensure!(!self.eof_seen, StreamError::ReadEof);
        let result = timeout(deadline, self.fill_pending(n)).await;
        match result {
            Ok(Ok(eof)) => {
                let take = self.pending.len().min(n);
                let bytes = self.pending.split_to(take).freeze();
                if eof && bytes.len() < n {
                    self.eof_seen = true;
                }
                Ok(bytes)
            }
            Ok(Err(error)) => Err(error),
            // Partially collected bytes stay pending for the next read
            Err(_) => Err(StreamError::Timeout),
        }
    }

    /// Accumulates queue chunks into `pending` until `n` bytes are buffered
    /// or the body ends. Returns whether eof was reached.
    async fn fill_pending(&mut self, n: usize) -> Result<bool, StreamError> {
        while self.pending.len() < n {
            match self.queue.take_chunk().await? {
                Some(chunk) => self.pending.put(chunk),
                None => return Ok(true),
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::DataMode;
    use crate::protocol::head::{HeaderBlock, StartLine, StatusLine};
    use http::{StatusCode, Version};

    const NO_WAIT: Duration = Duration::from_secs(5);

    async fn queue_with_body(parts: &[&'static [u8]]) -> Arc<InboundQueue> {
        let queue = Arc::new(InboundQueue::default());
        for part in parts {
            queue.offer_data(Bytes::from_static(part)).await.unwrap();
        }
        queue
    }

    #[tokio::test]
    async fn read_exactly_reassembles_across_chunks() {
        let queue = queue_with_body(&[b"hel", b"lo", b"world"]).await;
        let mut reader = StreamReader::new(Arc::clone(&queue));

        let bytes = reader.read_exactly(10, NO_WAIT).await.unwrap();
        assert_eq!(&bytes[..], b"helloworld");
        assert!(!reader.is_eof());
    }

    #[tokio::test]
    async fn read_exactly_leaves_surplus_for_the_next_read() {
        let queue = queue_with_body(&[b"helloworld"]).await;
        let mut reader = StreamReader::new(Arc::clone(&queue));

        assert_eq!(&reader.read_exactly(5, NO_WAIT).await.unwrap()[..], b"hello");
        assert_eq!(&reader.read_exactly(5, NO_WAIT).await.unwrap()[..], b"world");
    }

    #[tokio::test]
    async fn first_short_read_signals_eof_then_read_eof() {
        let queue = Arc::new(InboundQueue::default());
        queue.offer_data(Bytes::from_static(b"hi")).await.unwrap();
        queue.offer_eof().unwrap();
        let mut reader = StreamReader::new(Arc::clone(&queue));

        let bytes = reader.read_exactly(10, NO_WAIT).await.unwrap();
        assert_eq!(&bytes[..], b"hi");
        assert!(reader.is_eof());

        assert_eq!(reader.read_exactly(10, NO_WAIT).await, Err(StreamError::ReadEof));
        assert_eq!(reader.read_at_most(1, NO_WAIT).await, Err(StreamError::ReadEof));
    }

    #[tokio::test]
    async fn full_read_at_eof_defers_the_signal() {
        let queue = Arc::new(InboundQueue::default());
        queue.offer_data(Bytes::from_static(b"exact")).await.unwrap();
        queue.offer_eof().unwrap();
        let mut reader = StreamReader::new(Arc::clone(&queue));

        // The full-length read succeeds without consuming the eof signal
        assert_eq!(&reader.read_exactly(5, NO_WAIT).await.unwrap()[..], b"exact");
        assert!(!reader.is_eof());

        // The next read is the first short one
        assert_eq!(&reader.read_exactly(5, NO_WAIT).await.unwrap()[..], b"");
        assert!(reader.is_eof());
        assert_eq!(reader.read_exactly(5, NO_WAIT).await, Err(StreamError::ReadEof));
    }

    #[tokio::test]
    async fn read_header_delivers_the_head() {
        let queue = Arc::new(InboundQueue::default());
        queue
            .offer_head(InboundHead {
                start: StartLine::Status(StatusLine { status: StatusCode::OK, reason: None, version: Version::HTTP_11 }),
                header: HeaderBlock { fields: Default::default(), mode: DataMode::ContentLength(5), has_trailer: false },
            })
            .unwrap();

        let mut reader = StreamReader::new(queue);
        let head = reader.read_header(NO_WAIT).await.unwrap();
        assert_eq!(head.header.mode, DataMode::ContentLength(5));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_expiry_resolves_with_timeout() {
        let queue = Arc::new(InboundQueue::default());
        let mut reader = StreamReader::new(Arc::clone(&queue));

        let result = reader.read_chunk(Duration::from_millis(1)).await;
        assert_eq!(result, Err(StreamError::Timeout));

        // The stream stays usable after a timeout
        queue.offer_data(Bytes::from_static(b"late")).await.unwrap();
        assert_eq!(reader.read_chunk(NO_WAIT).await.unwrap(), Some(Bytes::from_static(b"late")));
    }

    /// Data arriving after the deadline resolves the read with `Timeout`;
    /// data arriving before it resolves with the data. Never both.
    #[tokio::test(start_paused = true)]
    async fn timeout_vs_data_race_resolves_once() {
        let queue = Arc::new(InboundQueue::default());
        let mut reader = StreamReader::new(Arc::clone(&queue));

        // Data at 2ms loses against a 1ms deadline
        {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(2)).await;
                let _ = queue.offer_data(Bytes::from_static(b"slow")).await;
            });
        }
        assert_eq!(reader.read_chunk(Duration::from_millis(1)).await, Err(StreamError::Timeout));

        // The late data was not lost: it is the next read's result
        assert_eq!(reader.read_chunk(NO_WAIT).await.unwrap(), Some(Bytes::from_static(b"slow")));

        // Data at 1ms wins against a 5ms deadline. The instants are kept a
        // full timer tick apart so the paused clock cannot merge them.
        {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(1)).await;
                let _ = queue.offer_data(Bytes::from_static(b"fast")).await;
            });
        }
        assert_eq!(reader.read_chunk(Duration::from_millis(5)).await.unwrap(), Some(Bytes::from_static(b"fast")));
    }

    #[tokio::test]
    async fn network_failure_reaches_a_waiting_reader() {
        let queue = Arc::new(InboundQueue::default());
        let mut reader = StreamReader::new(Arc::clone(&queue));

        let waiting = tokio::spawn(async move { reader.read_exactly(4, NO_WAIT).await });
        tokio::task::yield_now().await;

        queue.fail(StreamError::network("connection lost"));
        assert_eq!(waiting.await.unwrap(), Err(StreamError::network("connection lost")));
    }
}
