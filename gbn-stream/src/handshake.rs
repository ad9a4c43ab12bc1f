//! Drives the handshake state machines over a stream.
//!
//! The sending end opens with `SYN`, acknowledges `SYN/ACK`, and asks for the
//! receiver's maximum segment size.  The receiving end answers with
//! `<size>[|DYN=True]` once it has seen both `ACK` and `REQ_MAX_SIZE`.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::Instant;

use crate::connection::ConnError;
use crate::frame::{Peer, SizeReply};
use crate::socket::{FrameReader, FrameWriter};
use crate::state::{ReceiverState, SenderState};

/// Active open.  Fails with [`ConnError::HandshakeFailed`] when no size
/// reply arrives within `limit`.
pub async fn connect<R, W>(
    reader: &mut FrameReader<R>,
    writer: &mut FrameWriter<W>,
    limit: Duration,
) -> Result<SizeReply, ConnError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let deadline = Instant::now() + limit;
    let mut state = SenderState::default();

    loop {
        while let Some(frame) = state.advance() {
            writer.send(&frame).await?;
            log::debug!("[client] → {frame:?} ({state})");
        }
        if let SenderState::Negotiated(reply) = state {
            log::info!(
                "[client] handshake complete: max segment size {}{}",
                reply.max_segment_size,
                if reply.dynamic { " (dynamic)" } else { "" }
            );
            return Ok(reply);
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(ConnError::HandshakeFailed(format!(
                "no answer within {limit:?} (stuck in {state})"
            )));
        }
        match reader.next_frame(remaining).await {
            Ok(Some(frame)) => {
                log::debug!("[client] ← {frame:?}");
                if let Some(reply) = state.on_frame(frame) {
                    writer.send(&reply).await?;
                    log::debug!("[client] → {reply:?} ({state})");
                }
            }
            Ok(None) => {}
            Err(ConnError::Closed) => {
                return Err(ConnError::HandshakeFailed(format!(
                    "peer closed the stream in {state}"
                )))
            }
            Err(e) => return Err(e),
        }
    }
}

/// Passive open.  Waits for the peer indefinitely, polling every
/// `idle_poll`, and answers the size request with `offer`.
pub async fn accept<R, W>(
    reader: &mut FrameReader<R>,
    writer: &mut FrameWriter<W>,
    offer: SizeReply,
    idle_poll: Duration,
) -> Result<(), ConnError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut state = ReceiverState::default();

    while state != ReceiverState::Negotiated {
        let frame = match reader.next_frame(idle_poll).await {
            Ok(Some(frame)) => frame,
            Ok(None) => continue,
            Err(ConnError::Closed) => {
                return Err(ConnError::HandshakeFailed(format!(
                    "peer closed the stream in {state}"
                )))
            }
            Err(e) => return Err(e),
        };
        log::debug!("[server] ← {frame:?}");
        if let Some(reply) = state.on_frame(&frame, offer) {
            writer.send(&reply).await?;
            log::debug!("[server] → {reply:?} ({state})");
        }
        state.advance();
    }

    // Payloads may now contain handshake words.
    reader.set_peer(Peer::ReceiverData);
    log::info!("[server] handshake complete: offered {offer}");
    Ok(())
}
