//! `gbn-stream`: Go-Back-N sliding-window delivery with segment-size
//! renegotiation, carried over an ordered byte stream.
//!
//! # Architecture
//!
//! ```text
//!  ┌──────────┐   MSG:<seq>|…  FIN   ┌──────────┐
//!  │  Client  │─────────────────────▶│  Server  │
//!  └────┬─────┘                      └─────┬────┘
//!       │      ACK:<n>[|MAX_SIZE:<m>]      │
//!       │◀─────────────────────────────────┘
//!       │
//!  ┌────▼──────────────────────────────┐
//!  │  SendWindow ◀── ack listener task │  (one mutex per unit)
//!  └────┬──────────────────────────────┘
//!       │ frames
//!  ┌────▼──────────────┐
//!  │ FrameReader/Writer│  (marker codec over tokio AsyncRead/AsyncWrite)
//!  └───────────────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`frame`]: wire format and marker-scanning decoder
//! - [`socket`]: frame-oriented stream halves with bounded waits
//! - [`state`]: handshake finite-state machines
//! - [`handshake`]: drives the state machines over a stream
//! - [`connection`]: session parameters, resize policy, error type
//! - [`config`]: tunables and defaults
//! - [`gbn_sender`]: send window state
//! - [`ack_listener`]: concurrent acknowledgment consumer
//! - [`gbn_receiver`]: receive-side reassembly
//! - [`timer`]: retransmission timer
//! - [`client`]: sending end
//! - [`server`]: receiving end
//! - [`simulator`]: fault-injecting relay for tests

pub mod ack_listener;
pub mod client;
pub mod config;
pub mod connection;
pub mod frame;
pub mod gbn_receiver;
pub mod gbn_sender;
pub mod handshake;
pub mod server;
pub mod simulator;
pub mod socket;
pub mod state;
pub mod timer;

pub use client::{Client, TransferStats};
pub use config::{ReceiverConfig, SenderConfig};
pub use connection::{ConnError, Session};
pub use server::Server;
