//! Frame-oriented wrappers around the two halves of a byte stream.
//!
//! [`FrameReader`] and [`FrameWriter`] speak [`crate::frame::Frame`] instead
//! of raw bytes.  All protocol logic lives elsewhere; this module owns only
//! byte I/O and the decode buffer.
//!
//! The stream carries no frame boundaries, so the reader holds the trailing
//! frame back until a following marker arrives or the stream has been quiet
//! for the fragment-grace interval.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{timeout_at, Instant};

use crate::connection::ConnError;
use crate::frame::{Frame, FrameBuffer, Peer};

/// Bytes requested from the stream per read.
const READ_CHUNK: usize = 4096;

// ---------------------------------------------------------------------------
// FrameReader
// ---------------------------------------------------------------------------

/// Read half of a connection, decoding frames for one [`Peer`].
#[derive(Debug)]
pub struct FrameReader<R> {
    inner: R,
    buffer: FrameBuffer,
    /// Frames produced by a flush that have not been handed out yet.
    ready: VecDeque<Frame>,
    grace: Duration,
    last_read: Instant,
    eof: bool,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R, peer: Peer, grace: Duration) -> Self {
        Self {
            inner,
            buffer: FrameBuffer::new(peer),
            ready: VecDeque::new(),
            grace,
            last_read: Instant::now(),
            eof: false,
        }
    }

    /// Receive the next frame, waiting at most `wait`.
    ///
    /// Returns `Ok(None)` when the wait expires without a complete frame;
    /// that is not an error.  Returns [`ConnError::Closed`] once the peer
    /// has closed the stream and every buffered frame has been handed out.
    pub async fn next_frame(&mut self, wait: Duration) -> Result<Option<Frame>, ConnError> {
        let deadline = Instant::now() + wait;
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            if let Some(frame) = self.ready.pop_front() {
                return Ok(Some(frame));
            }
            if let Some(frame) = self.buffer.next_frame() {
                return Ok(Some(frame));
            }
            if self.eof {
                return Err(ConnError::Closed);
            }

            let now = Instant::now();
            let mut limit = deadline;
            if self.buffer.has_pending() {
                let settle = self.last_read + self.grace;
                if now >= settle {
                    self.ready.extend(self.buffer.flush());
                    continue;
                }
                limit = limit.min(settle);
            }
            if now >= deadline {
                return Ok(None);
            }

            match timeout_at(limit, self.inner.read(&mut chunk)).await {
                Ok(Ok(0)) => {
                    self.eof = true;
                    self.ready.extend(self.buffer.flush());
                }
                Ok(Ok(n)) => {
                    self.buffer.extend(&chunk[..n]);
                    self.last_read = Instant::now();
                }
                Ok(Err(e)) => return Err(e.into()),
                // Re-evaluate the grace period and the caller's deadline.
                Err(_elapsed) => {}
            }
        }
    }

    /// Change which markers the decoder recognises from now on.
    pub fn set_peer(&mut self, peer: Peer) {
        self.buffer.set_peer(peer);
    }

    /// Throw away everything decoded or buffered but not yet handed out.
    ///
    /// Returns the number of frames and bytes discarded.
    pub fn discard_buffered(&mut self) -> usize {
        let frames = self.ready.len();
        self.ready.clear();
        frames + self.buffer.clear()
    }
}

// ---------------------------------------------------------------------------
// FrameWriter
// ---------------------------------------------------------------------------

/// Write half of a connection.  Each frame goes out in one `write_all`.
#[derive(Debug)]
pub struct FrameWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Encode `frame` and write it to the stream.
    pub async fn send(&mut self, frame: &Frame) -> Result<(), ConnError> {
        self.inner.write_all(&frame.encode()).await?;
        self.inner.flush().await?;
        Ok(())
    }

    /// Close the write direction of the stream.
    pub async fn shutdown(&mut self) -> Result<(), ConnError> {
        self.inner.shutdown().await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const GRACE: Duration = Duration::from_millis(20);
    const WAIT: Duration = Duration::from_millis(500);

    #[tokio::test]
    async fn trailing_frame_released_after_grace() {
        let (mut near, far) = tokio::io::duplex(1024);
        let mut reader = FrameReader::new(far, Peer::Sender, GRACE);

        near.write_all(b"ACK:0ACK:1").await.unwrap();

        let first = reader.next_frame(WAIT).await.unwrap();
        assert_eq!(
            first,
            Some(Frame::CumulativeAck {
                ack: 0,
                max_segment_size: None
            })
        );
        // No following marker ever arrives; the grace period completes it.
        let second = reader.next_frame(WAIT).await.unwrap();
        assert_eq!(
            second,
            Some(Frame::CumulativeAck {
                ack: 1,
                max_segment_size: None
            })
        );
    }

    #[tokio::test]
    async fn bounded_wait_expires_quietly() {
        let (_near, far) = tokio::io::duplex(1024);
        let mut reader = FrameReader::new(far, Peer::Receiver, GRACE);
        let got = reader.next_frame(Duration::from_millis(30)).await.unwrap();
        assert_eq!(got, None);
    }

    #[tokio::test]
    async fn eof_flushes_then_reports_closed() {
        let (mut near, far) = tokio::io::duplex(1024);
        let mut reader = FrameReader::new(far, Peer::Receiver, GRACE);

        near.write_all(b"MSG:0|last").await.unwrap();
        drop(near);

        let frame = reader.next_frame(WAIT).await.unwrap();
        assert_eq!(
            frame,
            Some(Frame::Data {
                seq: 0,
                payload: b"last".to_vec()
            })
        );
        assert!(matches!(
            reader.next_frame(WAIT).await,
            Err(ConnError::Closed)
        ));
    }

    #[tokio::test]
    async fn writer_emits_encoded_frames() {
        let (near, mut far) = tokio::io::duplex(1024);
        let mut writer = FrameWriter::new(near);
        writer.send(&Frame::Syn).await.unwrap();
        writer
            .send(&Frame::Data {
                seq: 3,
                payload: b"xyz".to_vec(),
            })
            .await
            .unwrap();
        writer.shutdown().await.unwrap();

        let mut wire = Vec::new();
        far.read_to_end(&mut wire).await.unwrap();
        assert_eq!(wire, b"SYNMSG:3|xyz");
    }

    #[tokio::test]
    async fn discard_drops_stale_bytes() {
        let (mut near, far) = tokio::io::duplex(1024);
        let mut reader = FrameReader::new(far, Peer::Sender, Duration::from_secs(5));
        near.write_all(b"ACK:4").await.unwrap();

        // Long grace keeps "ACK:4" pending; a short wait returns nothing.
        assert_eq!(
            reader.next_frame(Duration::from_millis(30)).await.unwrap(),
            None
        );
        assert_eq!(reader.discard_buffered(), 5);
    }
}
