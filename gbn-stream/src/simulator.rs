//! Fault-injecting relay for deterministic testing.
//!
//! The underlying stream never loses or reorders bytes, so the protocol's
//! recovery paths only run when something in between misbehaves.  A
//! [`Simulator`] sits between the two ends, decodes each direction with the
//! frame codec, and re-encodes what it forwards:
//!
//! ```text
//!  Client ──▶ [upstream: hold / duplicate MSG] ──▶ Server
//!  Client ◀── [downstream: drop ACK]           ◀── Server
//! ```
//!
//! | Fault            | Description                                          |
//! |------------------|------------------------------------------------------|
//! | Ack drop         | Drop the first `ACK:<n>` for each listed `n`.        |
//! | Random ack loss  | Drop any `ACK:` with probability `ack_loss_rate`.    |
//! | Reordering       | Deliver the first copy of a listed `MSG:` after the  |
//! |                  | frame that follows it.                               |
//! | Duplication      | Deliver the first copy of a listed `MSG:` twice.     |
//!
//! Random loss draws from a `StdRng` seeded with `seed`, so a failing run
//! replays exactly.  Listed sequence and ack numbers apply once per
//! connection, not once per unit.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::connection::ConnError;
use crate::frame::{Frame, Peer};
use crate::socket::{FrameReader, FrameWriter};

const RELAY_POLL: Duration = Duration::from_millis(50);
const RELAY_GRACE: Duration = Duration::from_millis(2);

/// Faults to inject.  The default is a transparent pass-through.
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    pub drop_acks: Vec<i64>,
    pub hold_segments: Vec<u32>,
    pub duplicate_segments: Vec<u32>,
    /// Probability in `[0.0, 1.0]` of dropping any acknowledgment.
    pub ack_loss_rate: f64,
    pub seed: u64,
}

/// One observation made by the relay, in forwarding order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    /// A data segment was forwarded to the receiving end.
    Data { seq: u32, len: usize },
    /// An acknowledgment was forwarded to the sending end.
    Ack {
        ack: i64,
        max_segment_size: Option<usize>,
    },
    /// An acknowledgment was swallowed.
    DroppedAck { ack: i64 },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Trace {
    pub events: Vec<TraceEvent>,
}

impl Trace {
    /// `(seq, len)` of every forwarded data segment, retransmissions included.
    pub fn data(&self) -> Vec<(u32, usize)> {
        self.events
            .iter()
            .filter_map(|e| match *e {
                TraceEvent::Data { seq, len } => Some((seq, len)),
                _ => None,
            })
            .collect()
    }

    /// Forwarded acknowledgment numbers.
    pub fn acks(&self) -> Vec<i64> {
        self.events
            .iter()
            .filter_map(|e| match *e {
                TraceEvent::Ack { ack, .. } => Some(ack),
                _ => None,
            })
            .collect()
    }

    pub fn dropped_acks(&self) -> Vec<i64> {
        self.events
            .iter()
            .filter_map(|e| match *e {
                TraceEvent::DroppedAck { ack } => Some(ack),
                _ => None,
            })
            .collect()
    }

    /// How many times segment `seq` was forwarded.
    pub fn copies_of(&self, seq: u32) -> usize {
        self.data().iter().filter(|&&(s, _)| s == seq).count()
    }
}

/// A running relay.  Dropping it leaves the relay tasks running until both
/// ends close; [`Simulator::shutdown`] stops them at once.
pub struct Simulator {
    trace: Arc<Mutex<Trace>>,
    upstream: JoinHandle<()>,
    downstream: JoinHandle<()>,
}

impl Simulator {
    /// Relay between `client_side` (the sending end's peer stream) and
    /// `server_side` (the receiving end's peer stream).
    pub fn spawn<A, B>(client_side: A, server_side: B, plan: FaultPlan) -> Self
    where
        A: AsyncRead + AsyncWrite + Send + Unpin + 'static,
        B: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (client_read, client_write) = tokio::io::split(client_side);
        let (server_read, server_write) = tokio::io::split(server_side);
        let trace = Arc::new(Mutex::new(Trace::default()));

        let upstream = tokio::spawn(relay_segments(
            FrameReader::new(client_read, Peer::Receiver, RELAY_GRACE),
            FrameWriter::new(server_write),
            plan.clone(),
            Arc::clone(&trace),
        ));
        let downstream = tokio::spawn(relay_acks(
            FrameReader::new(server_read, Peer::Sender, RELAY_GRACE),
            FrameWriter::new(client_write),
            plan,
            Arc::clone(&trace),
        ));

        Self {
            trace,
            upstream,
            downstream,
        }
    }

    /// Snapshot of everything observed so far.
    pub async fn trace(&self) -> Trace {
        self.trace.lock().await.clone()
    }

    /// Stop both relay directions and return the final trace.
    pub async fn shutdown(self) -> Trace {
        self.upstream.abort();
        self.downstream.abort();
        let _ = self.upstream.await;
        let _ = self.downstream.await;
        let trace = self.trace.lock().await;
        trace.clone()
    }
}

/// Client → server: data segments and control tokens.
async fn relay_segments<R, W>(
    mut reader: FrameReader<R>,
    mut writer: FrameWriter<W>,
    plan: FaultPlan,
    trace: Arc<Mutex<Trace>>,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut hold: HashSet<u32> = plan.hold_segments.into_iter().collect();
    let mut duplicate: HashSet<u32> = plan.duplicate_segments.into_iter().collect();
    let mut held: Option<Frame> = None;

    loop {
        let frame = match reader.next_frame(RELAY_POLL).await {
            Ok(Some(frame)) => frame,
            Ok(None) => continue,
            Err(e) => {
                log::debug!("[sim] upstream ends: {e}");
                break;
            }
        };

        if frame == Frame::ReqMaxSize {
            reader.set_peer(Peer::ReceiverData);
        }
        let seq = match &frame {
            Frame::Data { seq, .. } => Some(*seq),
            _ => None,
        };
        if let Some(seq) = seq {
            if hold.remove(&seq) {
                log::debug!("[sim] holding MSG:{seq}");
                held = Some(frame);
                continue;
            }
        }

        let mut copies = 1;
        if let Some(seq) = seq.filter(|s| duplicate.remove(s)) {
            log::debug!("[sim] duplicating MSG:{seq}");
            copies = 2;
        }
        for _ in 0..copies {
            if forward_segment(&mut writer, &frame, &trace).await.is_err() {
                return;
            }
        }
        if let Some(late) = held.take() {
            if forward_segment(&mut writer, &late, &trace).await.is_err() {
                return;
            }
        }
    }
    let _ = writer.shutdown().await;
}

async fn forward_segment<W>(
    writer: &mut FrameWriter<W>,
    frame: &Frame,
    trace: &Mutex<Trace>,
) -> Result<(), ConnError>
where
    W: AsyncWrite + Unpin,
{
    writer.send(frame).await?;
    if let Frame::Data { seq, payload } = frame {
        trace.lock().await.events.push(TraceEvent::Data {
            seq: *seq,
            len: payload.len(),
        });
    }
    Ok(())
}

/// Server → client: handshake replies and acknowledgments.
async fn relay_acks<R, W>(
    mut reader: FrameReader<R>,
    mut writer: FrameWriter<W>,
    plan: FaultPlan,
    trace: Arc<Mutex<Trace>>,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut drop_once: HashSet<i64> = plan.drop_acks.into_iter().collect();
    let mut rng = StdRng::seed_from_u64(plan.seed);

    loop {
        let frame = match reader.next_frame(RELAY_POLL).await {
            Ok(Some(frame)) => frame,
            Ok(None) => continue,
            Err(e) => {
                log::debug!("[sim] downstream ends: {e}");
                break;
            }
        };

        if let Frame::CumulativeAck {
            ack,
            max_segment_size,
        } = frame
        {
            let lost = plan.ack_loss_rate > 0.0 && rng.random::<f64>() < plan.ack_loss_rate;
            if drop_once.remove(&ack) || lost {
                log::debug!("[sim] dropping ACK:{ack}");
                trace.lock().await.events.push(TraceEvent::DroppedAck { ack });
                continue;
            }
            trace.lock().await.events.push(TraceEvent::Ack {
                ack,
                max_segment_size,
            });
        }

        if writer.send(&frame).await.is_err() {
            return;
        }
    }
    let _ = writer.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn pass_through_by_default() {
        let (mut client, relay_client) = tokio::io::duplex(1024);
        let (relay_server, mut server) = tokio::io::duplex(1024);
        let sim = Simulator::spawn(relay_client, relay_server, FaultPlan::default());

        client.write_all(b"MSG:0|hi").await.unwrap();
        let mut buf = [0u8; 64];
        let n = server.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"MSG:0|hi");

        server.write_all(b"ACK:0").await.unwrap();
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"ACK:0");

        let trace = sim.shutdown().await;
        assert_eq!(trace.data(), vec![(0, 2)]);
        assert_eq!(trace.acks(), vec![0]);
    }

    #[tokio::test]
    async fn listed_ack_dropped_once() {
        let (mut client, relay_client) = tokio::io::duplex(1024);
        let (relay_server, mut server) = tokio::io::duplex(1024);
        let plan = FaultPlan {
            drop_acks: vec![1],
            ..FaultPlan::default()
        };
        let sim = Simulator::spawn(relay_client, relay_server, plan);

        server.write_all(b"ACK:1").await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        server.write_all(b"ACK:1").await.unwrap();

        let mut buf = [0u8; 64];
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"ACK:1");

        let trace = sim.shutdown().await;
        assert_eq!(trace.dropped_acks(), vec![1]);
        assert_eq!(trace.acks(), vec![1]);
    }

    #[tokio::test]
    async fn held_segment_follows_next_frame() {
        let (mut client, relay_client) = tokio::io::duplex(1024);
        let (relay_server, mut server) = tokio::io::duplex(1024);
        let plan = FaultPlan {
            hold_segments: vec![0],
            duplicate_segments: vec![1],
            ..FaultPlan::default()
        };
        let sim = Simulator::spawn(relay_client, relay_server, plan);

        client.write_all(b"MSG:0|aMSG:1|bFIN").await.unwrap();
        drop(client);

        let mut wire = Vec::new();
        server.read_to_end(&mut wire).await.unwrap();
        assert_eq!(wire, b"MSG:1|bMSG:1|bMSG:0|aFIN");

        let trace = sim.shutdown().await;
        assert_eq!(trace.copies_of(1), 2);
        assert_eq!(trace.data().last(), Some(&(0, 1)));
    }

    #[tokio::test]
    async fn payload_words_pass_after_size_request() {
        let (mut client, relay_client) = tokio::io::duplex(1024);
        let (relay_server, mut server) = tokio::io::duplex(1024);
        let sim = Simulator::spawn(relay_client, relay_server, FaultPlan::default());

        client
            .write_all(b"SYNACKREQ_MAX_SIZEMSG:0|SYN ACK STACKFIN")
            .await
            .unwrap();
        drop(client);

        let mut wire = Vec::new();
        server.read_to_end(&mut wire).await.unwrap();
        assert_eq!(wire, b"SYNACKREQ_MAX_SIZEMSG:0|SYN ACK STACKFIN");

        let trace = sim.shutdown().await;
        assert_eq!(trace.data(), vec![(0, 13)]);
    }

    #[test]
    fn seeded_loss_is_reproducible() {
        let draw = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            (0..16).map(|_| rng.random::<f64>() < 0.3).collect::<Vec<_>>()
        };
        assert_eq!(draw(7), draw(7));
    }
}
