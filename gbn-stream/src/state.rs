//! Handshake finite-state machines.
//!
//! Both ends negotiate the maximum segment size before any data moves:
//!
//! ```text
//!  sender:   IDLE ──SYN──▶ SYN_SENT ──SYN/ACK──▶ ACK_SENT ──REQ_MAX_SIZE──▶
//!            SIZE_REQUESTED ──size reply──▶ NEGOTIATED
//!
//!  receiver: LISTENING ──SYN──▶ SYNACK_SENT ──ACK + REQ_MAX_SIZE──▶
//!            SIZE_SENT ──▶ NEGOTIATED
//! ```
//!
//! The machines are pure: they consume frames and name the frame to send
//! next.  [`crate::handshake`] drives them over a stream.  Frames that do
//! not fit the current state are ignored.

use std::fmt;

use crate::frame::{Frame, SizeReply};

// ---------------------------------------------------------------------------
// Sender side
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SenderState {
    /// Nothing sent yet.
    #[default]
    Idle,
    /// `SYN` sent; waiting for `SYN/ACK`.
    SynSent,
    /// `ACK` sent; the size request goes out next.
    AckSent,
    /// `REQ_MAX_SIZE` sent; waiting for the size reply.
    SizeRequested,
    /// Handshake complete.
    Negotiated(SizeReply),
}

impl SenderState {
    /// Step through states that advance without input.
    ///
    /// Returns the frame to transmit on entering the next state.
    pub fn advance(&mut self) -> Option<Frame> {
        match *self {
            SenderState::Idle => {
                *self = SenderState::SynSent;
                Some(Frame::Syn)
            }
            SenderState::AckSent => {
                *self = SenderState::SizeRequested;
                Some(Frame::ReqMaxSize)
            }
            _ => None,
        }
    }

    /// Feed one received frame.  Returns the frame to transmit in response.
    pub fn on_frame(&mut self, frame: Frame) -> Option<Frame> {
        match (*self, frame) {
            (SenderState::SynSent, Frame::SynAck) => {
                *self = SenderState::AckSent;
                Some(Frame::Ack)
            }
            (SenderState::SizeRequested, Frame::SizeReply(reply)) => {
                *self = SenderState::Negotiated(reply);
                None
            }
            _ => None,
        }
    }
}

impl fmt::Display for SenderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SenderState::Idle => write!(f, "IDLE"),
            SenderState::SynSent => write!(f, "SYN_SENT"),
            SenderState::AckSent => write!(f, "ACK_SENT"),
            SenderState::SizeRequested => write!(f, "SIZE_REQUESTED"),
            SenderState::Negotiated(_) => write!(f, "NEGOTIATED"),
        }
    }
}

// ---------------------------------------------------------------------------
// Receiver side
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReceiverState {
    /// Waiting for `SYN`.
    #[default]
    Listening,
    /// `SYN/ACK` sent; collecting `ACK` and `REQ_MAX_SIZE` in either order.
    SynAckSent { ack: bool, size_request: bool },
    /// Size reply sent.
    SizeSent,
    /// Handshake complete.
    Negotiated,
}

impl ReceiverState {
    /// Step through states that advance without input.
    pub fn advance(&mut self) {
        if *self == ReceiverState::SizeSent {
            *self = ReceiverState::Negotiated;
        }
    }

    /// Feed one received frame.  `offer` is the size reply this end sends
    /// once both `ACK` and `REQ_MAX_SIZE` have been seen.
    pub fn on_frame(&mut self, frame: &Frame, offer: SizeReply) -> Option<Frame> {
        match (*self, frame) {
            (ReceiverState::Listening, Frame::Syn) => {
                *self = ReceiverState::SynAckSent {
                    ack: false,
                    size_request: false,
                };
                Some(Frame::SynAck)
            }
            (ReceiverState::SynAckSent { size_request, .. }, Frame::Ack) => {
                self.collect(true, size_request, offer)
            }
            (ReceiverState::SynAckSent { ack, .. }, Frame::ReqMaxSize) => {
                self.collect(ack, true, offer)
            }
            _ => None,
        }
    }

    fn collect(&mut self, ack: bool, size_request: bool, offer: SizeReply) -> Option<Frame> {
        if ack && size_request {
            *self = ReceiverState::SizeSent;
            Some(Frame::SizeReply(offer))
        } else {
            *self = ReceiverState::SynAckSent { ack, size_request };
            None
        }
    }
}

impl fmt::Display for ReceiverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReceiverState::Listening => write!(f, "LISTENING"),
            ReceiverState::SynAckSent { .. } => write!(f, "SYNACK_SENT"),
            ReceiverState::SizeSent => write!(f, "SIZE_SENT"),
            ReceiverState::Negotiated => write!(f, "NEGOTIATED"),
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const OFFER: SizeReply = SizeReply {
        max_segment_size: 64,
        dynamic: true,
    };

    #[test]
    fn sender_walks_every_state() {
        let mut s = SenderState::default();
        assert_eq!(s.advance(), Some(Frame::Syn));
        assert_eq!(s, SenderState::SynSent);
        assert_eq!(s.advance(), None);

        assert_eq!(s.on_frame(Frame::SynAck), Some(Frame::Ack));
        assert_eq!(s, SenderState::AckSent);
        assert_eq!(s.advance(), Some(Frame::ReqMaxSize));
        assert_eq!(s, SenderState::SizeRequested);

        assert_eq!(s.on_frame(Frame::SizeReply(OFFER)), None);
        assert_eq!(s, SenderState::Negotiated(OFFER));
        assert_eq!(s.to_string(), "NEGOTIATED");
    }

    #[test]
    fn sender_ignores_out_of_place_frames() {
        let mut s = SenderState::SynSent;
        assert_eq!(s.on_frame(Frame::SizeReply(OFFER)), None);
        assert_eq!(s, SenderState::SynSent);

        let mut s = SenderState::SizeRequested;
        assert_eq!(s.on_frame(Frame::SynAck), None);
        assert_eq!(s, SenderState::SizeRequested);
    }

    #[test]
    fn receiver_replies_after_ack_then_request() {
        let mut r = ReceiverState::default();
        assert_eq!(r.on_frame(&Frame::Syn, OFFER), Some(Frame::SynAck));
        assert_eq!(r.on_frame(&Frame::Ack, OFFER), None);
        assert_eq!(r.to_string(), "SYNACK_SENT");
        assert_eq!(
            r.on_frame(&Frame::ReqMaxSize, OFFER),
            Some(Frame::SizeReply(OFFER))
        );
        assert_eq!(r, ReceiverState::SizeSent);
        r.advance();
        assert_eq!(r, ReceiverState::Negotiated);
    }

    #[test]
    fn receiver_accepts_request_before_ack() {
        let mut r = ReceiverState::default();
        r.on_frame(&Frame::Syn, OFFER);
        assert_eq!(r.on_frame(&Frame::ReqMaxSize, OFFER), None);
        assert_eq!(r.on_frame(&Frame::Ack, OFFER), Some(Frame::SizeReply(OFFER)));
    }

    #[test]
    fn receiver_ignores_tokens_before_syn() {
        let mut r = ReceiverState::default();
        assert_eq!(r.on_frame(&Frame::Ack, OFFER), None);
        assert_eq!(r.on_frame(&Frame::ReqMaxSize, OFFER), None);
        assert_eq!(r, ReceiverState::Listening);
    }

    #[test]
    fn receiver_ignores_repeated_syn() {
        let mut r = ReceiverState::default();
        r.on_frame(&Frame::Syn, OFFER);
        assert_eq!(r.on_frame(&Frame::Syn, OFFER), None);
    }
}
