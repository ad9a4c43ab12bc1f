//! Wire-format definitions for protocol frames.
//!
//! Every token exchanged between peers is a [`Frame`].  This module is
//! responsible for:
//! - Defining the textual markers that identify each frame kind.
//! - Serialising a [`Frame`] into the bytes written to the stream.
//! - Recovering frames from a growing byte buffer ([`FrameBuffer`]) when the
//!   stream delivers them coalesced, split across reads, or interleaved.
//!
//! No I/O happens here; this is pure data transformation.
//!
//! # Wire format
//!
//! Frames are ASCII markers with no length prefix and no delimiter:
//!
//! ```text
//!  sender → receiver                 receiver → sender
//!  ─────────────────                 ─────────────────
//!  SYN                               SYN/ACK
//!  ACK                               <maxSize>[|DYN=True]
//!  REQ_MAX_SIZE                      ACK:<num>[|MAX_SIZE:<n>]
//!  MSG:<seq>|<payload>
//!  FIN
//!  CLOSE_CONN
//! ```
//!
//! Because nothing marks where a frame ends, a frame with a body (`MSG:`,
//! `ACK:`) runs until the next recognised marker.  Each direction decodes
//! only the markers its peer can send (see [`Peer`]), which keeps the
//! `ACK` / `ACK:` and `SYN` / `SYN/ACK` pairs from shadowing each other.
//! Once the handshake is over the receiving end switches to
//! [`Peer::ReceiverData`], where only `MSG:`, `FIN` and `CLOSE_CONN` are
//! markers.  Payload bytes must not contain those three.

use std::fmt;

/// Maximum segment size assumed when the size reply cannot be parsed.
pub const DEFAULT_MAX_SEGMENT_SIZE: usize = 100;

/// Literal marker tokens as they appear on the wire.
pub mod markers {
    pub const SYN: &[u8] = b"SYN";
    pub const SYN_ACK: &[u8] = b"SYN/ACK";
    pub const ACK: &[u8] = b"ACK";
    pub const REQ_MAX_SIZE: &[u8] = b"REQ_MAX_SIZE";
    pub const DATA: &[u8] = b"MSG:";
    pub const CUMULATIVE_ACK: &[u8] = b"ACK:";
    pub const FIN: &[u8] = b"FIN";
    pub const CLOSE_CONN: &[u8] = b"CLOSE_CONN";
    /// Piggyback field inside a cumulative acknowledgment.
    pub const MAX_SIZE: &str = "MAX_SIZE:";
    /// Dynamic-resize flag inside a size reply.
    pub const DYNAMIC: &str = "DYN=True";
}

// ---------------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------------

/// One logical protocol token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Connection open (sender → receiver).
    Syn,
    /// Handshake acknowledgment (receiver → sender).
    SynAck,
    /// Final handshake acknowledgment (sender → receiver).
    Ack,
    /// Request for the receiver's maximum segment size.
    ReqMaxSize,
    /// The receiver's answer to [`Frame::ReqMaxSize`].
    SizeReply(SizeReply),
    /// One payload segment.
    Data { seq: u32, payload: Vec<u8> },
    /// Cumulative acknowledgment.
    ///
    /// `ack` is `-1` while segment 0 has not arrived yet.
    CumulativeAck {
        ack: i64,
        max_segment_size: Option<usize>,
    },
    /// End of one transferred unit.
    Fin,
    /// End of the connection.
    CloseConn,
}

impl Frame {
    /// Serialise this frame into a newly allocated byte vector.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Frame::Syn => markers::SYN.to_vec(),
            Frame::SynAck => markers::SYN_ACK.to_vec(),
            Frame::Ack => markers::ACK.to_vec(),
            Frame::ReqMaxSize => markers::REQ_MAX_SIZE.to_vec(),
            Frame::SizeReply(reply) => reply.to_string().into_bytes(),
            Frame::Data { seq, payload } => {
                let mut buf = format!("MSG:{seq}|").into_bytes();
                buf.extend_from_slice(payload);
                buf
            }
            Frame::CumulativeAck {
                ack,
                max_segment_size: Some(size),
            } => format!("ACK:{ack}|{}{size}", markers::MAX_SIZE).into_bytes(),
            Frame::CumulativeAck {
                ack,
                max_segment_size: None,
            } => format!("ACK:{ack}").into_bytes(),
            Frame::Fin => markers::FIN.to_vec(),
            Frame::CloseConn => markers::CLOSE_CONN.to_vec(),
        }
    }
}

// ---------------------------------------------------------------------------
// SizeReply
// ---------------------------------------------------------------------------

/// Negotiated segment-size parameters carried by the size reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeReply {
    pub max_segment_size: usize,
    pub dynamic: bool,
}

impl SizeReply {
    /// Parse `<maxSize>` or `<maxSize>|DYN=True`.
    ///
    /// Only the numeric prefix matters; anything unparsable (or zero) falls
    /// back to [`DEFAULT_MAX_SEGMENT_SIZE`].
    pub fn parse(raw: &[u8]) -> Self {
        let text = String::from_utf8_lossy(raw);
        let mut fields = text.split('|');
        let max_segment_size = fields
            .next()
            .and_then(|n| n.trim().parse::<usize>().ok())
            .filter(|&n| n > 0)
            .unwrap_or(DEFAULT_MAX_SEGMENT_SIZE);
        let dynamic = fields.any(|f| f.trim() == markers::DYNAMIC);
        Self {
            max_segment_size,
            dynamic,
        }
    }
}

impl fmt::Display for SizeReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.max_segment_size)?;
        if self.dynamic {
            write!(f, "|{}", markers::DYNAMIC)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Markers per direction
// ---------------------------------------------------------------------------

/// Which end of the connection a [`FrameBuffer`] decodes for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Peer {
    /// The transmitting end: sees `SYN/ACK`, the size reply and `ACK:` frames.
    Sender,
    /// The receiving end during the handshake: sees handshake tokens,
    /// `MSG:`, `FIN` and `CLOSE_CONN`.
    Receiver,
    /// The receiving end after the handshake: only `MSG:`, `FIN` and
    /// `CLOSE_CONN`, so payloads may carry `SYN`, `ACK` and friends.
    ReceiverData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Marker {
    Syn,
    SynAck,
    Ack,
    ReqMaxSize,
    Data,
    CumulativeAck,
    Fin,
    CloseConn,
}

impl Marker {
    fn token(self) -> &'static [u8] {
        match self {
            Marker::Syn => markers::SYN,
            Marker::SynAck => markers::SYN_ACK,
            Marker::Ack => markers::ACK,
            Marker::ReqMaxSize => markers::REQ_MAX_SIZE,
            Marker::Data => markers::DATA,
            Marker::CumulativeAck => markers::CUMULATIVE_ACK,
            Marker::Fin => markers::FIN,
            Marker::CloseConn => markers::CLOSE_CONN,
        }
    }

    /// `true` for markers followed by a body that runs to the next marker.
    fn has_body(self) -> bool {
        matches!(self, Marker::Data | Marker::CumulativeAck)
    }

    /// Build the frame for this marker from its body bytes.
    ///
    /// Returns `None` for a malformed body.
    fn frame(self, body: &[u8]) -> Option<Frame> {
        match self {
            Marker::Syn => Some(Frame::Syn),
            Marker::SynAck => Some(Frame::SynAck),
            Marker::Ack => Some(Frame::Ack),
            Marker::ReqMaxSize => Some(Frame::ReqMaxSize),
            Marker::Fin => Some(Frame::Fin),
            Marker::CloseConn => Some(Frame::CloseConn),
            Marker::Data => parse_data(body),
            Marker::CumulativeAck => parse_ack(body),
        }
    }
}

impl Peer {
    /// Markers this end can receive, longest first so a tie at the same
    /// offset resolves to the longer token.
    fn markers(self) -> &'static [Marker] {
        match self {
            Peer::Sender => &[Marker::SynAck, Marker::CumulativeAck],
            Peer::Receiver => &[
                Marker::ReqMaxSize,
                Marker::CloseConn,
                Marker::Data,
                Marker::Syn,
                Marker::Ack,
                Marker::Fin,
            ],
            Peer::ReceiverData => &[Marker::CloseConn, Marker::Data, Marker::Fin],
        }
    }

    fn longest_marker(self) -> usize {
        self.markers()
            .iter()
            .map(|m| m.token().len())
            .max()
            .unwrap_or(0)
    }
}

/// `<seq>|<payload>`
fn parse_data(body: &[u8]) -> Option<Frame> {
    let sep = body.iter().position(|&b| b == b'|')?;
    let seq = std::str::from_utf8(&body[..sep])
        .ok()?
        .trim()
        .parse::<u32>()
        .ok()?;
    Some(Frame::Data {
        seq,
        payload: body[sep + 1..].to_vec(),
    })
}

/// `<num>` or `<num>|MAX_SIZE:<n>`
fn parse_ack(body: &[u8]) -> Option<Frame> {
    let text = std::str::from_utf8(body).ok()?;
    let (num, extra) = match text.split_once('|') {
        Some((num, extra)) => (num, Some(extra)),
        None => (text, None),
    };
    let ack = num.trim().parse::<i64>().ok()?;
    // A garbled size field does not invalidate the acknowledgment itself.
    let max_segment_size = extra
        .and_then(|e| e.trim().strip_prefix(markers::MAX_SIZE))
        .and_then(|n| n.trim().parse::<usize>().ok())
        .filter(|&n| n > 0);
    Some(Frame::CumulativeAck {
        ack,
        max_segment_size,
    })
}

// ---------------------------------------------------------------------------
// FrameBuffer
// ---------------------------------------------------------------------------

/// Accumulates stream reads and extracts complete frames.
///
/// A frame is complete once the next marker has been seen after it.  The
/// trailing frame stays buffered until more bytes arrive or the caller
/// declares the stream idle with [`FrameBuffer::flush`].  Malformed
/// fragments are dropped without aborting the decode.
#[derive(Debug)]
pub struct FrameBuffer {
    peer: Peer,
    buffer: Vec<u8>,
    /// Offset from which the search for the end of a pending body resumes.
    /// Everything before it has already been scanned without a match.
    resume: usize,
}

impl FrameBuffer {
    pub fn new(peer: Peer) -> Self {
        Self {
            peer,
            buffer: Vec::with_capacity(4096),
            resume: 0,
        }
    }

    pub fn peer(&self) -> Peer {
        self.peer
    }

    /// Switch the marker table.  Bytes already buffered are decoded with the
    /// new table.
    pub fn set_peer(&mut self, peer: Peer) {
        self.peer = peer;
        self.resume = 0;
    }

    /// Append raw bytes from a stream read.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Append `data` and extract every frame that is now complete.
    pub fn push(&mut self, data: &[u8]) -> Vec<Frame> {
        self.extend(data);
        std::iter::from_fn(|| self.next_frame()).collect()
    }

    /// Extract one complete frame, if the buffer holds one.
    pub fn next_frame(&mut self) -> Option<Frame> {
        self.extract(false)
    }

    /// Treat everything still buffered as complete and decode it.
    pub fn flush(&mut self) -> Vec<Frame> {
        let frames = std::iter::from_fn(|| self.extract(true)).collect();
        self.buffer.clear();
        self.resume = 0;
        frames
    }

    /// `true` while bytes are waiting for a following marker.
    pub fn has_pending(&self) -> bool {
        !self.buffer.is_empty()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Drop all buffered bytes.  Returns how many were discarded.
    pub fn clear(&mut self) -> usize {
        let n = self.buffer.len();
        self.buffer.clear();
        self.resume = 0;
        n
    }

    fn extract(&mut self, at_end: bool) -> Option<Frame> {
        loop {
            if self.buffer.is_empty() {
                return None;
            }

            let Some((start, marker)) = self.find_marker(0) else {
                if !at_end {
                    return None;
                }
                let loose = std::mem::take(&mut self.buffer);
                self.resume = 0;
                match self.loose_fragment(&loose) {
                    Some(frame) => return Some(frame),
                    None => continue,
                }
            };

            // Bytes ahead of the first marker form a fragment of their own.
            if start > 0 {
                let loose: Vec<u8> = self.buffer.drain(..start).collect();
                self.resume = 0;
                match self.loose_fragment(&loose) {
                    Some(frame) => return Some(frame),
                    None => continue,
                }
            }

            let token_len = marker.token().len();
            let end = if marker.has_body() {
                match self.find_marker(token_len.max(self.resume)) {
                    Some((next, _)) => next,
                    None if at_end => self.buffer.len(),
                    None => {
                        // A marker may still be completed by the next read.
                        let overlap = self.peer.longest_marker().saturating_sub(1);
                        self.resume = self.buffer.len().saturating_sub(overlap);
                        return None;
                    }
                }
            } else {
                token_len
            };

            let segment: Vec<u8> = self.buffer.drain(..end).collect();
            self.resume = 0;
            match marker.frame(&segment[token_len..]) {
                Some(frame) => return Some(frame),
                None => log::debug!(
                    "[codec] dropping malformed fragment {:?}",
                    String::from_utf8_lossy(&segment)
                ),
            }
        }
    }

    /// Leftmost marker at or after `from`.
    fn find_marker(&self, from: usize) -> Option<(usize, Marker)> {
        let markers = self.peer.markers();
        (from..self.buffer.len()).find_map(|i| {
            let rest = &self.buffer[i..];
            markers
                .iter()
                .find(|m| rest.starts_with(m.token()))
                .map(|&m| (i, m))
        })
    }

    /// Interpret bytes that precede any marker.
    ///
    /// The only unmarked frame is the size reply, which only the sender sees.
    fn loose_fragment(&self, raw: &[u8]) -> Option<Frame> {
        let trimmed = raw.trim_ascii();
        if trimmed.is_empty() {
            return None;
        }
        match self.peer {
            Peer::Sender => Some(Frame::SizeReply(SizeReply::parse(trimmed))),
            Peer::Receiver | Peer::ReceiverData => {
                log::debug!(
                    "[codec] dropping unmarked fragment {:?}",
                    String::from_utf8_lossy(trimmed)
                );
                None
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
