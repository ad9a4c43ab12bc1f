//! Per-connection session parameters and the error type shared by every
//! layer.
//!
//! A [`Session`] is created when the handshake completes and lives until
//! `CLOSE_CONN` or a transport error.  Window and receive-buffer state reset
//! with every transferred unit; the session does not.

use thiserror::Error;

/// The receiver shrinks the segment size once it emits an ack at or above
/// this sequence number (dynamic resizing only).
pub const SHRINK_AFTER_ACK: i64 = 5;

/// Segment size the receiver shrinks to.
pub const SHRUNK_SEGMENT_SIZE: usize = 25;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Connection-level failures.
///
/// Malformed frames never show up here: the codec drops them.  A missing
/// acknowledgment is not an error either; it triggers retransmission.
#[derive(Debug, Error)]
pub enum ConnError {
    /// Underlying I/O error from the stream.
    #[error("socket I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed the stream.
    #[error("connection closed by peer")]
    Closed,

    /// The connection could not be established.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// Rejected configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The configured retransmission ceiling was reached without progress.
    #[error("no acknowledgment after {0} retransmission rounds")]
    MaxRetriesExceeded(u32),

    /// The acknowledgment listener task panicked or was cancelled.
    #[error("ack listener failed: {0}")]
    Listener(#[from] tokio::task::JoinError),
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Parameters agreed for one established connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Largest payload carried by one segment.
    pub max_segment_size: usize,
    /// Whether the receiver may shrink `max_segment_size` mid-connection.
    pub dynamic: bool,
    /// Segments in flight at once; only the sending end knows it.
    pub window_size: Option<usize>,
    shrunk: bool,
}

impl Session {
    pub fn new(max_segment_size: usize, dynamic: bool, window_size: Option<usize>) -> Self {
        Self {
            max_segment_size,
            dynamic,
            window_size,
            shrunk: false,
        }
    }

    /// `true` once the one-way shrink has happened.
    pub fn is_shrunk(&self) -> bool {
        self.shrunk
    }

    /// Apply the receiver's resize policy to an outgoing acknowledgment.
    ///
    /// Returns the size to piggyback on the ack, or `None` when dynamic
    /// resizing is off.  The shrink happens at most once and never reverts.
    pub fn piggyback_for(&mut self, ack: i64) -> Option<usize> {
        if !self.dynamic {
            return None;
        }
        if !self.shrunk && ack >= SHRINK_AFTER_ACK {
            self.max_segment_size = self.max_segment_size.min(SHRUNK_SEGMENT_SIZE);
            self.shrunk = true;
            log::info!(
                "[server] ack {ack} reached shrink threshold; max segment size now {}",
                self.max_segment_size
            );
        }
        Some(self.max_segment_size)
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_session_never_piggybacks() {
        let mut s = Session::new(100, false, None);
        for ack in -1..20 {
            assert_eq!(s.piggyback_for(ack), None);
        }
        assert_eq!(s.max_segment_size, 100);
        assert!(!s.is_shrunk());
    }

    #[test]
    fn dynamic_session_shrinks_at_threshold() {
        let mut s = Session::new(100, true, None);
        for ack in 0..SHRINK_AFTER_ACK {
            assert_eq!(s.piggyback_for(ack), Some(100));
        }
        assert_eq!(s.piggyback_for(SHRINK_AFTER_ACK), Some(SHRUNK_SEGMENT_SIZE));
        assert!(s.is_shrunk());
    }

    #[test]
    fn shrink_never_reverts() {
        let mut s = Session::new(100, true, None);
        s.piggyback_for(7);
        // A later, lower cumulative ack (new unit) keeps the small size.
        assert_eq!(s.piggyback_for(0), Some(SHRUNK_SEGMENT_SIZE));
        assert_eq!(s.piggyback_for(-1), Some(SHRUNK_SEGMENT_SIZE));
    }

    #[test]
    fn shrink_does_not_grow_small_sizes() {
        let mut s = Session::new(10, true, None);
        assert_eq!(s.piggyback_for(9), Some(10));
        assert!(s.is_shrunk());
    }
}
