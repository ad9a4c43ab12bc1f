//! Acknowledgment listener for one transferred unit.
//!
//! Runs as its own task beside the sending loop.  Both share the
//! [`SendWindow`] behind one mutex; every acknowledgment is applied under
//! that lock, so admission, retransmission and window advancement never
//! interleave.
//!
//! The task owns the read half while it runs and hands it back through its
//! `JoinHandle`, so the next unit cannot start reading until this listener
//! has been joined.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncRead;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::connection::ConnError;
use crate::frame::Frame;
use crate::gbn_sender::SendWindow;
use crate::socket::FrameReader;

/// Consume acknowledgments until `running` is cleared or the stream fails.
///
/// Each bounded wait of `poll` re-checks `running`.  On any exit the flag
/// is cleared so the sending loop notices a dead listener.
pub async fn listen<R>(
    mut reader: FrameReader<R>,
    window: Arc<Mutex<SendWindow>>,
    running: Arc<AtomicBool>,
    poll: Duration,
) -> Result<FrameReader<R>, ConnError>
where
    R: AsyncRead + Unpin,
{
    let outcome = consume(&mut reader, &window, &running, poll).await;
    running.store(false, Ordering::Release);
    outcome.map(|()| reader)
}

async fn consume<R>(
    reader: &mut FrameReader<R>,
    window: &Mutex<SendWindow>,
    running: &AtomicBool,
    poll: Duration,
) -> Result<(), ConnError>
where
    R: AsyncRead + Unpin,
{
    while running.load(Ordering::Acquire) {
        let frame = match reader.next_frame(poll).await {
            Ok(Some(frame)) => frame,
            Ok(None) => continue,
            Err(e) => {
                log::warn!("[acks] receive failed: {e}");
                return Err(e);
            }
        };

        let (ack, max_segment_size) = match frame {
            Frame::CumulativeAck {
                ack,
                max_segment_size,
            } => (ack, max_segment_size),
            other => {
                log::debug!("[acks] ignoring {other:?}");
                continue;
            }
        };

        let mut w = window.lock().await;
        if let Some(size) = max_segment_size {
            if w.set_max_segment_size(size) {
                log::info!("[acks] receiver set max segment size to {size}");
            }
        }
        let slid = w.on_ack(ack, Instant::now());
        if slid > 0 {
            log::debug!(
                "[acks] ← ACK:{ack} slid {slid}; base={} next_seq={}",
                w.base,
                w.next_seq
            );
        } else {
            log::debug!("[acks] ← ACK:{ack} (no progress, base={})", w.base);
        }
    }
    Ok(())
}
