//! Go-Back-N receive-side reassembly.
//!
//! [`ReceiveBuffer`] keeps every segment of the current unit keyed by
//! sequence number, so duplicates and out-of-order arrivals are harmless:
//!
//! - A segment is stored once; a second copy of the same `seq` is ignored.
//! - `expected_seq` advances over every contiguous sequence number present.
//! - After every segment (new, duplicate or early) the caller sends a
//!   **cumulative ACK** of [`ReceiveBuffer::ack_number`] = `expected_seq - 1`.
//! - On `FIN` the caller takes the reconstructed message, which also resets
//!   the buffer for the next unit.
//!
//! This module only manages state; all socket I/O is the caller's
//! responsibility.

use std::collections::BTreeMap;

/// Receive-side state for one transferred unit.
#[derive(Debug, Default)]
pub struct ReceiveBuffer {
    segments: BTreeMap<u32, Vec<u8>>,
    /// Next sequence number needed for contiguous delivery.
    expected_seq: u32,
}

impl ReceiveBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store one segment and return the cumulative ack to send for it.
    pub fn on_segment(&mut self, seq: u32, payload: Vec<u8>) -> i64 {
        self.segments.entry(seq).or_insert(payload);
        while self.segments.contains_key(&self.expected_seq) {
            self.expected_seq += 1;
        }
        self.ack_number()
    }

    /// `expected_seq - 1`; `-1` until segment 0 has arrived.
    pub fn ack_number(&self) -> i64 {
        i64::from(self.expected_seq) - 1
    }

    pub fn expected_seq(&self) -> u32 {
        self.expected_seq
    }

    /// Number of distinct segments held.
    pub fn buffered(&self) -> usize {
        self.segments.len()
    }

    /// Concatenate every buffered payload in ascending sequence order and
    /// reset for the next unit.
    pub fn take_message(&mut self) -> Vec<u8> {
        let segments = std::mem::take(&mut self.segments);
        self.expected_seq = 0;
        segments.into_values().flatten().collect()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state() {
        let r = ReceiveBuffer::new();
        assert_eq!(r.expected_seq(), 0);
        assert_eq!(r.ack_number(), -1);
        assert_eq!(r.buffered(), 0);
    }

    #[test]
    fn in_order_segments_advance_cursor() {
        let mut r = ReceiveBuffer::new();
        assert_eq!(r.on_segment(0, b"abc".to_vec()), 0);
        assert_eq!(r.on_segment(1, b"de".to_vec()), 1);
        assert_eq!(r.on_segment(2, b"f".to_vec()), 2);
        assert_eq!(r.expected_seq(), 3);
        assert_eq!(r.take_message(), b"abcdef");
    }

    #[test]
    fn out_of_order_segment_is_buffered_and_acked_cumulatively() {
        let mut r = ReceiveBuffer::new();
        // Gap at 0: the ack still names the last contiguous segment.
        assert_eq!(r.on_segment(1, b"world".to_vec()), -1);
        assert_eq!(r.on_segment(2, b"!".to_vec()), -1);
        assert_eq!(r.buffered(), 2);
        // Filling the gap releases everything behind it.
        assert_eq!(r.on_segment(0, b"hello ".to_vec()), 2);
        assert_eq!(r.take_message(), b"hello world!");
    }

    #[test]
    fn duplicate_segment_keeps_first_copy() {
        let mut r = ReceiveBuffer::new();
        r.on_segment(0, b"one".to_vec());
        assert_eq!(r.on_segment(0, b"ONE".to_vec()), 0);
        assert_eq!(r.buffered(), 1);
        assert_eq!(r.take_message(), b"one");
    }

    #[test]
    fn expected_seq_is_non_decreasing() {
        let mut r = ReceiveBuffer::new();
        let mut last = r.expected_seq();
        for seq in [3u32, 0, 0, 2, 1, 5, 4, 1] {
            r.on_segment(seq, vec![seq as u8]);
            assert!(r.expected_seq() >= last);
            assert_eq!(r.ack_number(), i64::from(r.expected_seq()) - 1);
            last = r.expected_seq();
        }
        assert_eq!(r.expected_seq(), 6);
    }

    #[test]
    fn take_message_resets_for_next_unit() {
        let mut r = ReceiveBuffer::new();
        r.on_segment(0, b"first".to_vec());
        assert_eq!(r.take_message(), b"first");
        assert_eq!(r.expected_seq(), 0);
        assert_eq!(r.ack_number(), -1);

        assert_eq!(r.on_segment(0, b"second".to_vec()), 0);
        assert_eq!(r.take_message(), b"second");
    }

    #[test]
    fn empty_unit_yields_empty_message() {
        let mut r = ReceiveBuffer::new();
        assert!(r.take_message().is_empty());
    }
}
