//! Retransmission timer.
//!
//! Go-Back-N keeps a single timer for the oldest unacknowledged segment.
//! The interval is fixed: there is no RTT estimation and no back-off, so a
//! silent peer causes retransmission every `timeout` until a ceiling (if
//! configured) is reached.

use std::time::Duration;

use tokio::time::Instant;

/// Start time of the oldest unacknowledged segment's wait, if armed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetransmitTimer {
    started: Option<Instant>,
}

impl RetransmitTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm (or re-arm) the timer at `now`.
    pub fn arm(&mut self, now: Instant) {
        self.started = Some(now);
    }

    pub fn disarm(&mut self) {
        self.started = None;
    }

    pub fn is_armed(&self) -> bool {
        self.started.is_some()
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.started
    }

    /// `true` when armed and strictly more than `timeout` has passed.
    pub fn expired(&self, now: Instant, timeout: Duration) -> bool {
        matches!(self.started, Some(start) if now.saturating_duration_since(start) > timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_millis(300);

    #[test]
    fn disarmed_timer_never_expires() {
        let t = RetransmitTimer::new();
        assert!(!t.is_armed());
        assert!(!t.expired(Instant::now() + Duration::from_secs(3600), TIMEOUT));
    }

    #[test]
    fn expires_strictly_after_timeout() {
        let start = Instant::now();
        let mut t = RetransmitTimer::new();
        t.arm(start);
        assert!(!t.expired(start + TIMEOUT, TIMEOUT));
        assert!(t.expired(start + TIMEOUT + Duration::from_millis(1), TIMEOUT));
    }

    #[test]
    fn rearm_restarts_the_wait() {
        let start = Instant::now();
        let mut t = RetransmitTimer::new();
        t.arm(start);
        t.arm(start + Duration::from_millis(250));
        assert!(!t.expired(start + Duration::from_millis(400), TIMEOUT));
        assert_eq!(t.started_at(), Some(start + Duration::from_millis(250)));
    }

    #[test]
    fn disarm_clears_deadline() {
        let start = Instant::now();
        let mut t = RetransmitTimer::new();
        t.arm(start);
        t.disarm();
        assert!(!t.expired(start + Duration::from_secs(10), TIMEOUT));
    }
}
