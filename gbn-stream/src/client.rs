//! Sending end of a connection.
//!
//! # Architecture
//!
//! ```text
//!  Client::send(data)
//!      │
//!      ├── spawn ─▶ ack listener task ──owns──▶ FrameReader (read half)
//!      │                 │
//!      │                 │ on_ack / size update
//!      │                 ▼
//!      │         Arc<Mutex<SendWindow>>
//!      │                 ▲
//!      │                 │ admit / retransmit
//!      └── sending loop ─┴──────────────────▶ FrameWriter (write half)
//! ```
//!
//! One unit at a time: `send` slices the payload, drives the window until
//! every segment is acknowledged, sends `FIN`, stops the listener and joins
//! it before returning.  Sequence numbers restart at 0 for every unit.
//!
//! ```ignore
//! let mut client = Client::connect("127.0.0.1:5555", SenderConfig::default()).await?;
//! client.send(b"first unit").await?;
//! client.send(b"second unit").await?;
//! client.close().await?;
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::ack_listener;
use crate::config::SenderConfig;
use crate::connection::{ConnError, Session};
use crate::frame::{Frame, Peer};
use crate::gbn_sender::SendWindow;
use crate::handshake;
use crate::socket::{FrameReader, FrameWriter};

/// Counters for one transferred unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferStats {
    /// Distinct segments sliced from the payload.
    pub segments: usize,
    /// Timeouts that resent the window.
    pub retransmit_rounds: usize,
    /// Segments sent again across all rounds.
    pub retransmitted_segments: usize,
    /// Segment size in force when the unit finished.
    pub max_segment_size: usize,
}

/// An established sending connection.
pub struct Client<S> {
    /// `None` only while a listener task owns it.
    reader: Option<FrameReader<ReadHalf<S>>>,
    writer: FrameWriter<WriteHalf<S>>,
    session: Session,
    config: SenderConfig,
}

impl Client<TcpStream> {
    /// Connect to `addr` and run the handshake.
    pub async fn connect(addr: impl ToSocketAddrs, config: SenderConfig) -> Result<Self, ConnError> {
        config.validate()?;
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        log::info!("[client] connected to {}", stream.peer_addr()?);
        Self::handshake(stream, config).await
    }
}

impl<S> Client<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    /// Run the handshake over an already-open stream.
    pub async fn handshake(stream: S, config: SenderConfig) -> Result<Self, ConnError> {
        config.validate()?;
        let (read_half, write_half) = tokio::io::split(stream);
        let mut reader = FrameReader::new(read_half, Peer::Sender, config.fragment_grace);
        let mut writer = FrameWriter::new(write_half);

        let reply = handshake::connect(&mut reader, &mut writer, config.handshake_timeout).await?;
        let session = Session::new(
            reply.max_segment_size,
            reply.dynamic,
            Some(config.window_size),
        );

        Ok(Self {
            reader: Some(reader),
            writer,
            session,
            config,
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Deliver `data` as one unit.
    ///
    /// Returns once every segment has been acknowledged and `FIN` is sent.
    pub async fn send(&mut self, data: &[u8]) -> Result<TransferStats, ConnError> {
        let mut reader = self.reader.take().ok_or(ConnError::Closed)?;
        let stale = reader.discard_buffered();
        if stale > 0 {
            log::debug!("[client] discarded {stale} stale buffered item(s)");
        }

        let window = Arc::new(Mutex::new(SendWindow::new(
            self.config.window_size,
            self.session.max_segment_size,
        )));
        let running = Arc::new(AtomicBool::new(true));
        let listener = tokio::spawn(ack_listener::listen(
            reader,
            Arc::clone(&window),
            Arc::clone(&running),
            self.config.ack_poll,
        ));

        let outcome = self.drive_window(data, &window, &running).await;
        running.store(false, Ordering::Release);
        let joined = listener.await;

        // Write back any size the receiver piggybacked during the unit.
        let size = window.lock().await.max_segment_size();
        if size != self.session.max_segment_size {
            log::info!(
                "[client] max segment size {} → {size}",
                self.session.max_segment_size
            );
            self.session.max_segment_size = size;
        }

        match joined {
            Err(join) => Err(join.into()),
            Ok(Err(listener_err)) => Err(listener_err),
            Ok(Ok(reader)) => {
                self.reader = Some(reader);
                outcome
            }
        }
    }

    /// Sending loop: fill the window, retransmit on timeout, finish with
    /// `FIN`.
    async fn drive_window(
        &mut self,
        data: &[u8],
        window: &Mutex<SendWindow>,
        running: &AtomicBool,
    ) -> Result<TransferStats, ConnError> {
        let mut stats = TransferStats::default();
        let mut offset = 0usize;
        let mut stalled_rounds = 0u32;
        let mut last_base = 0u32;

        loop {
            if !running.load(Ordering::Acquire) {
                // The listener died; its error is reported by the caller.
                return Err(ConnError::Closed);
            }

            {
                let mut w = window.lock().await;
                let now = Instant::now();

                while offset < data.len() && w.can_admit() {
                    let end = (offset + w.max_segment_size()).min(data.len());
                    let payload = data[offset..end].to_vec();
                    let seq = w.admit(payload.clone(), now);
                    log::debug!("[client] → MSG:{seq} ({} bytes)", payload.len());
                    self.writer.send(&Frame::Data { seq, payload }).await?;
                    stats.segments += 1;
                    offset = end;
                }

                if offset >= data.len() && w.is_drained() {
                    stats.max_segment_size = w.max_segment_size();
                    break;
                }

                if w.base != last_base {
                    last_base = w.base;
                    stalled_rounds = 0;
                }

                if w.retransmit_due(now, self.config.timeout) {
                    stalled_rounds += 1;
                    if let Some(limit) = self.config.max_retransmits {
                        if stalled_rounds > limit {
                            log::warn!("[client] giving up at base={} after {limit} rounds", w.base);
                            return Err(ConnError::MaxRetriesExceeded(limit));
                        }
                    }

                    let resend: Vec<Frame> = w
                        .unacked()
                        .map(|(seq, payload)| Frame::Data {
                            seq,
                            payload: payload.to_vec(),
                        })
                        .collect();
                    log::warn!(
                        "[client] timeout; resending {} segment(s) from base={}",
                        resend.len(),
                        w.base
                    );
                    for frame in &resend {
                        self.writer.send(frame).await?;
                    }
                    stats.retransmit_rounds += 1;
                    stats.retransmitted_segments += resend.len();
                    w.restart_timer(Instant::now());
                }
            }

            tokio::time::sleep(self.config.poll_interval).await;
        }

        self.writer.send(&Frame::Fin).await?;
        log::info!(
            "[client] unit delivered: {} bytes in {} segment(s), {} retransmission round(s)",
            data.len(),
            stats.segments,
            stats.retransmit_rounds
        );
        Ok(stats)
    }

    /// Send `CLOSE_CONN` and shut the write half down.
    pub async fn close(mut self) -> Result<Session, ConnError> {
        self.writer.send(&Frame::CloseConn).await?;
        self.writer.shutdown().await?;
        log::info!("[client] connection closed");
        Ok(self.session)
    }
}
