//! Go-Back-N send-side window state.
//!
//! [`SendWindow`] maintains a sliding window of up to `N` in-flight segments
//! for one transferred unit.  Sequence numbers count segments (not bytes)
//! and restart at 0 with every unit.
//!
//! # Protocol contract
//!
//! - At most `window_size` segments are in flight: `next_seq - base ≤ N`.
//! - ACKs are **cumulative**: `ack = K` means segments `0..=K` arrived in
//!   order, so `base` moves to `K + 1`.
//! - On timeout, the caller retransmits **all** segments in
//!   `[base, next_seq)` (go back to N) and restarts the timer.
//! - One timer covers the oldest unacked segment.  It is armed only while
//!   `base < next_seq`.
//!
//! This module only manages state; socket I/O and locking are the caller's
//! responsibility.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

use crate::timer::RetransmitTimer;

// ---------------------------------------------------------------------------
// SendWindow
// ---------------------------------------------------------------------------

/// Go-Back-N send-side state for one transferred unit.
///
/// # Sequence-number layout
///
/// ```text
///  base               next_seq          base + N
///    │                   │                 │
///  ──┼───────────────────┼─────────────────┼──▶ seq space
///    │ <── in flight ──▶ │ <── sendable ──▶│
/// ```
#[derive(Debug)]
pub struct SendWindow {
    /// Oldest unacknowledged sequence number (left window edge).
    pub base: u32,

    /// Sequence number for the next new segment.
    pub next_seq: u32,

    /// Maximum number of segments in flight (N).
    window_size: usize,

    /// Payloads of segments `base..next_seq`, front = `base`.
    in_flight: VecDeque<Vec<u8>>,

    timer: RetransmitTimer,

    /// Current slicing size; the receiver may lower it mid-unit.
    max_segment_size: usize,
}

impl SendWindow {
    /// Create an empty window: `base = next_seq = 0`, timer disarmed.
    ///
    /// # Panics
    ///
    /// Panics if `window_size` or `max_segment_size` is zero.
    pub fn new(window_size: usize, max_segment_size: usize) -> Self {
        assert!(window_size >= 1, "window_size must be at least 1");
        assert!(max_segment_size >= 1, "max_segment_size must be at least 1");
        Self {
            base: 0,
            next_seq: 0,
            window_size,
            in_flight: VecDeque::with_capacity(window_size),
            timer: RetransmitTimer::new(),
            max_segment_size,
        }
    }

    /// `true` when there is room for one more segment.
    pub fn can_admit(&self) -> bool {
        self.in_flight.len() < self.window_size
    }

    /// Number of segments awaiting acknowledgment.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// `true` while at least one segment awaits acknowledgment.
    pub fn has_unacked(&self) -> bool {
        self.base < self.next_seq
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn max_segment_size(&self) -> usize {
        self.max_segment_size
    }

    /// Apply a size update piggybacked on an acknowledgment.
    ///
    /// Only segments sliced after this call are affected.  Returns `true`
    /// if the size changed; zero is ignored.
    pub fn set_max_segment_size(&mut self, size: usize) -> bool {
        if size == 0 || size == self.max_segment_size {
            return false;
        }
        self.max_segment_size = size;
        true
    }

    pub fn timer(&self) -> &RetransmitTimer {
        &self.timer
    }

    /// Buffer a newly sliced segment and assign it the next sequence number.
    ///
    /// Arms the timer when this is the only unacknowledged segment.  The
    /// caller transmits the returned sequence number's frame.
    ///
    /// # Panics
    ///
    /// Panics in debug mode if the window is full.  Check [`can_admit`]
    /// first.
    ///
    /// [`can_admit`]: SendWindow::can_admit
    pub fn admit(&mut self, payload: Vec<u8>, now: Instant) -> u32 {
        debug_assert!(
            self.can_admit(),
            "admit called on a full window ({} / {})",
            self.in_flight.len(),
            self.window_size
        );
        let seq = self.next_seq;
        if self.base == self.next_seq {
            self.timer.arm(now);
        }
        self.in_flight.push_back(payload);
        self.next_seq += 1;
        self.debug_check();
        seq
    }

    /// Process a cumulative acknowledgment.
    ///
    /// Accepts `base ≤ ack < next_seq`: slides `base` to `ack + 1`, then
    /// re-arms the timer if segments remain or disarms it otherwise.
    /// Returns the number of newly acknowledged segments; `0` for a
    /// duplicate, stale, or out-of-range ack.
    pub fn on_ack(&mut self, ack: i64, now: Instant) -> u32 {
        if ack < i64::from(self.base) || ack >= i64::from(self.next_seq) {
            return 0;
        }
        let new_base = (ack + 1) as u32;
        let acked = new_base - self.base;
        for _ in 0..acked {
            self.in_flight.pop_front();
        }
        self.base = new_base;

        if self.has_unacked() {
            self.timer.arm(now);
        } else {
            self.timer.disarm();
        }
        self.debug_check();
        acked
    }

    /// `true` when the timer is armed, segments are outstanding and more
    /// than `timeout` has elapsed.
    pub fn retransmit_due(&self, now: Instant, timeout: Duration) -> bool {
        self.has_unacked() && self.timer.expired(now, timeout)
    }

    /// Every unacknowledged segment, oldest first, with its sequence number.
    ///
    /// This is exactly `[base, next_seq)`, the set a timeout retransmits.
    pub fn unacked(&self) -> impl Iterator<Item = (u32, &[u8])> {
        (self.base..).zip(self.in_flight.iter().map(Vec::as_slice))
    }

    /// Restart the timer after a full-window retransmission.
    pub fn restart_timer(&mut self, now: Instant) {
        self.timer.arm(now);
    }

    /// `true` once every admitted segment has been acknowledged.
    pub fn is_drained(&self) -> bool {
        self.base == self.next_seq
    }

    fn debug_check(&self) {
        debug_assert!(self.base <= self.next_seq);
        debug_assert!((self.next_seq - self.base) as usize <= self.window_size);
        debug_assert_eq!(
            (self.next_seq - self.base) as usize,
            self.in_flight.len()
        );
        debug_assert_eq!(self.timer.is_armed(), self.has_unacked());
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
