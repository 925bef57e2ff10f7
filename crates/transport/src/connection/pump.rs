//! Frame pump: drives decoded frames from the wire into one stream.
//!
//! The pump owns the read half of a connection wrapped in
//! `FramedRead<_, WireParser>` and lives for the whole connection. For each
//! message it validates every frame through that stream's [`StreamEngine`]
//! and offers the payload into its [`InboundQueue`], suspending on the
//! queue's backpressure. A parse or validation failure fails both the engine
//! and the queue, so every pending read observes the same first error.

use std::sync::Mutex;

use futures::StreamExt;
use tokio::io::AsyncRead;
use tokio_util::codec::FramedRead;
use tracing::{debug, warn};

use crate::codec::WireParser;
use crate::protocol::head::StartLine;
use crate::protocol::{Frame, FullMessage, StreamError};
use crate::stream::{InboundHead, InboundQueue, StreamEngine, StreamState};
use crate::utils::lock_unpoisoned;

#[derive(Debug)]
pub struct FramePump<R> {
    framed: FramedRead<R, WireParser>,
}

impl<R: AsyncRead + Unpin> FramePump<R> {
    pub fn new(read_half: R, parser: WireParser) -> Self {
        Self { framed: FramedRead::new(read_half, parser) }
    }

    /// Pumps one complete message into `queue`, validating through `engine`.
    ///
    /// Returns `Ok(true)` once the message has been fully delivered,
    /// `Ok(false)` when the connection ended cleanly before a new message
    /// started. Connection loss mid-message fails the stream and is
    /// returned as the stream's first error.
    pub async fn pump_message(
        &mut self,
        engine: &Mutex<StreamEngine>,
        queue: &InboundQueue,
    ) -> Result<bool, StreamError> {
        // The start line frame is held back until its header block arrives,
        // so the queue always receives the head as one unit
        let mut pending_start: Option<StartLine> = None;
        let mut trailer_expected = false;

        loop {
            let frame = match self.framed.next().await {
                Some(Ok(frame)) => frame,
                Some(Err(parse_error)) => {
                    let error = StreamError::from(&parse_error);
                    lock_unpoisoned(engine).fail(error.clone());
                    queue.fail(error.clone());
                    return Err(error);
                }
                None => {
                    if lock_unpoisoned(engine).read_state() == StreamState::Idle {
                        debug!("connection ended between messages");
                        queue.stop();
                        return Ok(false);
                    }
                    let error = StreamError::network("connection closed mid-message");
                    lock_unpoisoned(engine).fail(error.clone());
                    queue.fail(error.clone());
                    return Err(error);
                }
            };

            let result = match frame {
                Frame::RequestLine(line) => {
                    pending_start = Some(StartLine::Request(line));
                    lock_unpoisoned(engine).handle_start()
                }
                Frame::StatusLine(line) => {
                    pending_start = Some(StartLine::Status(line));
                    lock_unpoisoned(engine).handle_start()
                }
                Frame::Header(header) => {
                    trailer_expected = header.has_trailer;
                    let validated = lock_unpoisoned(engine).handle_header(&header);
                    match (validated, pending_start.take()) {
                        (Ok(()), Some(start)) => {
                            let offered = queue.offer_head(InboundHead { start, header });
                            // No body declared: the reader still needs the
                            // end-of-body marker
                            if offered.is_ok() && lock_unpoisoned(engine).read_state().is_closed() {
                                queue.offer_eof()
                            } else {
                                offered
                            }
                        }
                        (Ok(()), None) => Err(StreamError::state("offer_head", StreamState::Idle)),
                        (Err(error), _) => Err(error),
                    }
                }
                Frame::Data(data) => {
                    // The guard must not live across the offer: binding the
                    // result first releases the engine before suspending
                    let accepted = lock_unpoisoned(engine).handle_data(data.len());
                    match accepted {
                        Ok(true) => queue.offer_data(data).await,
                        Ok(false) => Ok(()),
                        Err(error) => Err(error),
                    }
                }
                Frame::Eof => {
                    let validated = lock_unpoisoned(engine).handle_eof(trailer_expected);
                    validated.and_then(|()| queue.offer_eof())
                }
                Frame::Trailer(fields) => {
                    if lock_unpoisoned(engine).read_state() != StreamState::HalfClosed {
                        // The peer sent a trailer it never declared
                        warn!("dropping undeclared trailer section");
                        Ok(())
                    } else {
                        let validated = lock_unpoisoned(engine).handle_trailer();
                        validated.and_then(|()| queue.offer_trailer(fields))
                    }
                }
                Frame::Full(message) => self.deliver_full(engine, queue, message).await,
            };

            if let Err(error) = result {
                let error = lock_unpoisoned(engine).fail(error);
                queue.fail(error.clone());
                return Err(error);
            }
            if lock_unpoisoned(engine).read_state().is_closed() {
                return Ok(true);
            }
        }
    }

    /// Expands a short-circuited full message through the same transitions
    /// the frame-by-frame path takes.
    async fn deliver_full(
        &mut self,
        engine: &Mutex<StreamEngine>,
        queue: &InboundQueue,
        message: FullMessage,
    ) -> Result<(), StreamError> {
        let FullMessage { start, header, body, trailer } = message;
        let has_body = !body.is_empty();
        let trailer_expected = trailer.is_some();

        {
            let mut engine = lock_unpoisoned(engine);
            engine.handle_start()?;
            engine.handle_header(&header)?;
        }
        queue.offer_head(InboundHead { start, header })?;

        if lock_unpoisoned(engine).read_state().is_closed() {
            // No body declared: the reader still needs the end-of-body marker
            return queue.offer_eof();
        }

        if has_body {
            if lock_unpoisoned(engine).handle_data(body.len())? {
                queue.offer_data(body).await?;
            }
        }

        lock_unpoisoned(engine).handle_eof(trailer_expected)?;
        queue.offer_eof()?;
        if let Some(fields) = trailer {
            lock_unpoisoned(engine).handle_trailer()?;
            queue.offer_trailer(fields)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::DataMode;
    use crate::stream::StreamReader;
    use bytes::Bytes;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;

    const WAIT: Duration = Duration::from_secs(5);

    fn stream_parts() -> (Arc<Mutex<StreamEngine>>, Arc<InboundQueue>) {
        (Arc::new(Mutex::new(StreamEngine::new())), Arc::new(InboundQueue::default()))
    }

    #[tokio::test]
    async fn pumps_a_buffered_response_as_one_message() {
        let (engine, queue) = stream_parts();
        let wire: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Length:5\r\n\r\nhello";
        let mut pump = FramePump::new(wire, WireParser::client());

        assert!(pump.pump_message(&engine, &queue).await.unwrap());

        let mut reader = StreamReader::new(Arc::clone(&queue));
        let head = reader.read_header(WAIT).await.unwrap();
        assert_eq!(head.header.mode, DataMode::ContentLength(5));
        assert_eq!(reader.read_chunk(WAIT).await.unwrap(), Some(Bytes::from_static(b"hello")));
        assert_eq!(reader.read_chunk(WAIT).await.unwrap(), None);
    }

    #[tokio::test]
    async fn pumps_a_split_chunked_response_with_trailer() {
        let (engine, queue) = stream_parts();
        let (mut writer, read_half) = tokio::io::duplex(4096);
        let mut pump = FramePump::new(read_half, WireParser::client());

        let engine_for_pump = Arc::clone(&engine);
        let queue_for_pump = Arc::clone(&queue);
        let pumping = tokio::spawn(async move { pump.pump_message(&engine_for_pump, &queue_for_pump).await });

        writer.write_all(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\nTrailer: X-Checksum\r\n\r\n").await.unwrap();
        writer.write_all(b"5\r\nhello\r\n").await.unwrap();
        writer.write_all(b"0\r\nX-Checksum: abc\r\n\r\n").await.unwrap();

        let mut reader = StreamReader::new(Arc::clone(&queue));
        reader.read_header(WAIT).await.unwrap();
        assert_eq!(reader.read_chunk(WAIT).await.unwrap(), Some(Bytes::from_static(b"hello")));
        assert_eq!(reader.read_chunk(WAIT).await.unwrap(), None);
        let trailer = reader.read_trailer(WAIT).await.unwrap().unwrap();
        assert_eq!(trailer.get("x-checksum").map(|v| v.as_bytes()), Some(&b"abc"[..]));

        assert!(pumping.await.unwrap().unwrap());
        assert!(lock_unpoisoned(&engine).read_state().is_closed());
    }

    /// A pump suspended on queue backpressure must not be holding the engine
    /// lock, or every write on the shared engine would block with it.
    #[tokio::test]
    async fn backpressured_pump_releases_the_engine_lock() {
        let engine = Arc::new(Mutex::new(StreamEngine::new()));
        let queue = Arc::new(InboundQueue::new(4));
        let (mut writer, read_half) = tokio::io::duplex(4096);
        let mut pump = FramePump::new(read_half, WireParser::client());

        let engine_for_pump = Arc::clone(&engine);
        let queue_for_pump = Arc::clone(&queue);
        let pumping = tokio::spawn(async move { pump.pump_message(&engine_for_pump, &queue_for_pump).await });

        writer.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 8\r\n\r\n").await.unwrap();
        writer.write_all(b"full").await.unwrap();
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
        writer.write_all(b"more").await.unwrap();
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }

        // The queue is at capacity and the pump is parked on the offer;
        // the engine must still be lockable from here
        assert!(!pumping.is_finished());
        assert_eq!(lock_unpoisoned(&engine).read_state(), StreamState::Open);

        let mut reader = StreamReader::new(Arc::clone(&queue));
        let body = reader.read_exactly(8, WAIT).await.unwrap();
        assert_eq!(&body[..], b"fullmore");
        assert!(pumping.await.unwrap().unwrap());
    }

    #[tokio::test]
    async fn connection_loss_mid_message_fails_the_stream() {
        let (engine, queue) = stream_parts();
        // Declared 10 bytes, connection ends after 5
        let wire: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Length:10\r\n\r\nhello";
        let mut pump = FramePump::new(wire, WireParser::client());

        let result = pump.pump_message(&engine, &queue).await;
        assert!(matches!(result, Err(StreamError::Parse { .. }) | Err(StreamError::Network { .. })));

        // Delivered data drains, then the failure surfaces
        let mut reader = StreamReader::new(Arc::clone(&queue));
        assert_eq!(reader.read_chunk(WAIT).await.unwrap(), Some(Bytes::from_static(b"hello")));
        assert!(reader.read_chunk(WAIT).await.is_err());
    }

    #[tokio::test]
    async fn clean_connection_end_stops_the_queue() {
        let (engine, queue) = stream_parts();
        let wire: &[u8] = b"";
        let mut pump = FramePump::new(wire, WireParser::client());

        assert!(!pump.pump_message(&engine, &queue).await.unwrap());

        let mut reader = StreamReader::new(queue);
        assert_eq!(reader.read_chunk(WAIT).await, Err(StreamError::Closed));
    }

    /// Serializing a chunked response with the write side and feeding the
    /// bytes back through the pump reproduces the original body and trailer.
    #[tokio::test]
    async fn writer_output_round_trips_through_the_pump() {
        use crate::connection::BufferTransport;
        use crate::protocol::MessageHead;
        use crate::stream::StreamWriter;
        use http::{HeaderMap, StatusCode, header};

        let transport = BufferTransport::new();
        let write_engine = Arc::new(Mutex::new(StreamEngine::new()));
        let mut writer = StreamWriter::new(Arc::clone(&write_engine), transport.clone());

        let head = MessageHead::response(StatusCode::OK)
            .field(header::TRANSFER_ENCODING, "chunked")
            .field(header::TRAILER, "X-Checksum");
        writer.write_header(head).unwrap();
        writer.write_data(Bytes::from_static(b"hello ")).unwrap();
        writer.write_data(Bytes::from_static(b"world")).unwrap();
        writer.write_done().unwrap();
        let mut trailer = HeaderMap::new();
        trailer.insert("x-checksum", "abc123".parse().unwrap());
        writer.write_trailer(trailer).unwrap();

        let wire = transport.written();
        let (engine, queue) = stream_parts();
        let mut pump = FramePump::new(&wire[..], WireParser::client());
        assert!(pump.pump_message(&engine, &queue).await.unwrap());

        let mut reader = StreamReader::new(Arc::clone(&queue));
        let head = reader.read_header(WAIT).await.unwrap();
        assert!(head.header.mode.is_chunked());

        let body = reader.read_exactly(11, WAIT).await.unwrap();
        assert_eq!(&body[..], b"hello world");
        assert_eq!(reader.read_chunk(WAIT).await.unwrap(), None);

        let trailer = reader.read_trailer(WAIT).await.unwrap().unwrap();
        assert_eq!(trailer.get("x-checksum").map(|v| v.as_bytes()), Some(&b"abc123"[..]));
    }

    #[tokio::test]
    async fn malformed_head_fails_engine_and_queue() {
        let (engine, queue) = stream_parts();
        let wire: &[u8] = b"TOTALLY NOT HTTP AT ALL\r\n\r\n";
        let mut pump = FramePump::new(wire, WireParser::server());

        assert!(pump.pump_message(&engine, &queue).await.is_err());
        assert!(lock_unpoisoned(&engine).error().is_some());

        let mut reader = StreamReader::new(queue);
        assert!(matches!(reader.read_header(WAIT).await, Err(StreamError::Parse { .. })));
    }
}
