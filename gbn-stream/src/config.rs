//! Tunables for both ends of a connection.

use std::time::Duration;

use crate::connection::ConnError;
use crate::frame::DEFAULT_MAX_SEGMENT_SIZE;

/// Address the binary binds or connects to when none is given.
pub const DEFAULT_ADDR: &str = "127.0.0.1:5555";

/// Sending end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderConfig {
    /// Segments in flight at once (N).
    pub window_size: usize,
    /// Retransmission timeout for the oldest unacknowledged segment.
    pub timeout: Duration,
    /// Cadence of the sending loop while the window is full.
    pub poll_interval: Duration,
    /// Bounded wait of one ack-listener receive.
    pub ack_poll: Duration,
    /// Idle time after which a trailing frame is considered complete.
    pub fragment_grace: Duration,
    /// Upper bound on the whole handshake.
    pub handshake_timeout: Duration,
    /// Consecutive retransmission rounds without progress before giving up.
    /// `None` retries forever.
    pub max_retransmits: Option<u32>,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            window_size: 5,
            timeout: Duration::from_secs(3),
            poll_interval: Duration::from_millis(100),
            ack_poll: Duration::from_millis(500),
            fragment_grace: Duration::from_millis(20),
            handshake_timeout: Duration::from_secs(10),
            max_retransmits: None,
        }
    }
}

impl SenderConfig {
    pub fn validate(&self) -> Result<(), ConnError> {
        if self.window_size == 0 {
            return Err(ConnError::Config("window size must be at least 1".into()));
        }
        non_zero("timeout", self.timeout)?;
        non_zero("poll interval", self.poll_interval)?;
        non_zero("ack poll", self.ack_poll)?;
        non_zero("fragment grace", self.fragment_grace)?;
        non_zero("handshake timeout", self.handshake_timeout)?;
        if self.max_retransmits == Some(0) {
            return Err(ConnError::Config(
                "retransmission ceiling must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Receiving end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiverConfig {
    /// Size offered in the handshake.
    pub max_segment_size: usize,
    /// Whether the size may shrink mid-connection.
    pub dynamic: bool,
    /// Bounded wait of one receive while idle.
    pub idle_poll: Duration,
    pub fragment_grace: Duration,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            max_segment_size: DEFAULT_MAX_SEGMENT_SIZE,
            dynamic: false,
            idle_poll: Duration::from_millis(500),
            fragment_grace: Duration::from_millis(20),
        }
    }
}

impl ReceiverConfig {
    pub fn validate(&self) -> Result<(), ConnError> {
        if self.max_segment_size == 0 {
            return Err(ConnError::Config(
                "max segment size must be at least 1".into(),
            ));
        }
        non_zero("idle poll", self.idle_poll)?;
        non_zero("fragment grace", self.fragment_grace)
    }
}

fn non_zero(name: &str, value: Duration) -> Result<(), ConnError> {
    if value.is_zero() {
        Err(ConnError::Config(format!("{name} must be non-zero")))
    } else {
        Ok(())
    }
}
