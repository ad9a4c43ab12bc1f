//! Receiving end of a connection.
//!
//! One connection is served at a time.  After the handshake, [`Server::run`]
//! processes frames strictly in decode order:
//!
//! - `MSG:` is stored in the [`ReceiveBuffer`] and answered with one
//!   cumulative `ACK:`, carrying `MAX_SIZE:` when dynamic resizing is on.
//! - `FIN` reconstructs the unit, hands it to the output channel and resets
//!   the buffer.
//! - `CLOSE_CONN` ends the session.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use crate::config::ReceiverConfig;
use crate::connection::{ConnError, Session};
use crate::frame::{Frame, Peer, SizeReply};
use crate::gbn_receiver::ReceiveBuffer;
use crate::handshake;
use crate::socket::{FrameReader, FrameWriter};

pub struct Server<S> {
    reader: FrameReader<ReadHalf<S>>,
    writer: FrameWriter<WriteHalf<S>>,
    session: Session,
    idle_poll: Duration,
}

impl Server<TcpStream> {
    /// Accept one client from `listener` and run the handshake.
    pub async fn accept(listener: &TcpListener, config: ReceiverConfig) -> Result<Self, ConnError> {
        config.validate()?;
        let (stream, peer) = listener.accept().await?;
        stream.set_nodelay(true)?;
        log::info!("[server] connection from {peer}");
        Self::handshake(stream, config).await
    }
}

impl<S> Server<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Run the handshake over an already-open stream.
    pub async fn handshake(stream: S, config: ReceiverConfig) -> Result<Self, ConnError> {
        config.validate()?;
        let (read_half, write_half) = tokio::io::split(stream);
        let mut reader = FrameReader::new(read_half, Peer::Receiver, config.fragment_grace);
        let mut writer = FrameWriter::new(write_half);

        let offer = SizeReply {
            max_segment_size: config.max_segment_size,
            dynamic: config.dynamic,
        };
        handshake::accept(&mut reader, &mut writer, offer, config.idle_poll).await?;

        Ok(Self {
            reader,
            writer,
            session: Session::new(config.max_segment_size, config.dynamic, None),
            idle_poll: config.idle_poll,
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Serve the connection until `CLOSE_CONN`.
    ///
    /// Every reconstructed unit is sent on `output`.  Returns the final
    /// session; ends with [`ConnError::Closed`] if the peer disappears
    /// without closing.
    pub async fn run(mut self, output: mpsc::Sender<Vec<u8>>) -> Result<Session, ConnError> {
        let mut unit = ReceiveBuffer::new();

        loop {
            let frame = match self.reader.next_frame(self.idle_poll).await {
                Ok(Some(frame)) => frame,
                Ok(None) => continue,
                Err(ConnError::Closed) => {
                    log::warn!(
                        "[server] peer closed without CLOSE_CONN ({} segment(s) pending)",
                        unit.buffered()
                    );
                    return Err(ConnError::Closed);
                }
                Err(e) => return Err(e),
            };

            match frame {
                Frame::Data { seq, payload } => {
                    let len = payload.len();
                    let ack = unit.on_segment(seq, payload);
                    let max_segment_size = self.session.piggyback_for(ack);
                    self.writer
                        .send(&Frame::CumulativeAck {
                            ack,
                            max_segment_size,
                        })
                        .await?;
                    log::debug!("[server] ← MSG:{seq} ({len} bytes); → ACK:{ack}");
                }
                Frame::Fin => {
                    let message = unit.take_message();
                    log::info!("[server] unit complete: {} bytes", message.len());
                    if output.send(message).await.is_err() {
                        log::warn!("[server] output receiver dropped; discarding unit");
                    }
                }
                Frame::CloseConn => {
                    log::info!("[server] CLOSE_CONN received; session ends");
                    return Ok(self.session);
                }
                other => log::debug!("[server] ignoring {other:?}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn config(dynamic: bool) -> ReceiverConfig {
        ReceiverConfig {
            max_segment_size: 100,
            dynamic,
            idle_poll: Duration::from_millis(20),
            fragment_grace: Duration::from_millis(5),
        }
    }

    async fn open(peer: &mut tokio::io::DuplexStream) {
        peer.write_all(b"SYN").await.unwrap();
        let mut buf = [0u8; 64];
        let n = peer.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"SYN/ACK");
        peer.write_all(b"ACKREQ_MAX_SIZE").await.unwrap();
    }

    #[tokio::test]
    async fn out_of_order_unit_is_reassembled() {
        let (mut near, far) = tokio::io::duplex(4096);
        let server = tokio::spawn(async move {
            let server = Server::handshake(far, config(false)).await?;
            let (tx, mut rx) = mpsc::channel(4);
            let session = server.run(tx).await?;
            Ok::<_, ConnError>((session, rx.recv().await))
        });

        open(&mut near).await;
        near.write_all(b"MSG:1|worldMSG:0|hello FINCLOSE_CONN")
            .await
            .unwrap();

        let (session, message) = server.await.unwrap().unwrap();
        assert_eq!(message.as_deref(), Some(&b"hello world"[..]));
        assert_eq!(session.max_segment_size, 100);

        let mut wire = Vec::new();
        near.read_to_end(&mut wire).await.unwrap();
        assert_eq!(wire, b"100ACK:-1ACK:1");
    }

    #[tokio::test]
    async fn dynamic_session_piggybacks_and_shrinks() {
        let (mut near, far) = tokio::io::duplex(4096);
        let server = tokio::spawn(async move {
            let server = Server::handshake(far, config(true)).await?;
            let (tx, _rx) = mpsc::channel(4);
            server.run(tx).await
        });

        open(&mut near).await;
        for seq in 0..7 {
            near.write_all(format!("MSG:{seq}|x").as_bytes()).await.unwrap();
        }
        near.write_all(b"CLOSE_CONN").await.unwrap();

        let session = server.await.unwrap().unwrap();
        assert!(session.is_shrunk());
        assert_eq!(session.max_segment_size, 25);

        let mut wire = Vec::new();
        near.read_to_end(&mut wire).await.unwrap();
        let text = String::from_utf8(wire).unwrap();
        assert!(text.starts_with("100|DYN=True"));
        assert!(text.contains("ACK:4|MAX_SIZE:100"));
        assert!(text.ends_with("ACK:5|MAX_SIZE:25ACK:6|MAX_SIZE:25"));
    }

    #[tokio::test]
    async fn eof_without_close_is_an_error() {
        let (mut near, far) = tokio::io::duplex(4096);
        let server = tokio::spawn(async move {
            let server = Server::handshake(far, config(false)).await?;
            let (tx, _rx) = mpsc::channel(4);
            server.run(tx).await
        });

        open(&mut near).await;
        let mut reply = [0u8; 8];
        let n = near.read(&mut reply).await.unwrap();
        assert_eq!(&reply[..n], b"100");
        drop(near);

        assert!(matches!(server.await.unwrap(), Err(ConnError::Closed)));
    }
}
