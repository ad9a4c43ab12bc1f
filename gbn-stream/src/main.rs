//! Entry point for `gbn-stream`.
//!
//! Parses CLI arguments and dispatches into either **server** or **client** mode.
//! All protocol work is delegated to library modules; `main.rs` owns only
//! process setup (logging, argument parsing, file reading, printing).

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use gbn_stream::config::DEFAULT_ADDR;
use gbn_stream::{Client, ReceiverConfig, SenderConfig, Server};

/// Go-Back-N delivery over TCP.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Accept one connection and print every delivered unit.
    Server {
        /// Local address to bind.
        #[arg(short, long, default_value = DEFAULT_ADDR)]
        bind: String,
        /// Maximum segment size offered in the handshake.
        #[arg(short, long, default_value_t = 100)]
        max_size: usize,
        /// Shrink the segment size once acknowledgments reach 5.
        #[arg(short, long)]
        dynamic: bool,
    },
    /// Connect and send each file as one unit.
    Client {
        /// Server address.
        #[arg(short, long, default_value = DEFAULT_ADDR)]
        server: String,
        /// Segments in flight at once.
        #[arg(short, long, default_value_t = 5)]
        window: usize,
        /// Retransmission timeout in seconds.
        #[arg(short, long, default_value_t = 3.0)]
        timeout: f64,
        /// Files to transfer, in order.
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();

    match cli.mode {
        Mode::Server {
            bind,
            max_size,
            dynamic,
        } => {
            let config = ReceiverConfig {
                max_segment_size: max_size,
                dynamic,
                ..ReceiverConfig::default()
            };
            config.validate()?;

            let listener = TcpListener::bind(&bind)
                .await
                .with_context(|| format!("cannot bind {bind}"))?;
            log::info!("Listening on {bind}");
            let server = Server::accept(&listener, config).await?;

            let (tx, mut rx) = mpsc::channel::<Vec<u8>>(16);
            let printer = tokio::spawn(async move {
                while let Some(message) = rx.recv().await {
                    println!("{}", String::from_utf8_lossy(&message));
                }
            });
            let session = server.run(tx).await?;
            printer.await?;
            log::info!("Session ended at max segment size {}", session.max_segment_size);
        }
        Mode::Client {
            server,
            window,
            timeout,
            files,
        } => {
            let timeout = Duration::try_from_secs_f64(timeout)
                .context("timeout must be a non-negative number of seconds")?;
            let config = SenderConfig {
                window_size: window,
                timeout,
                ..SenderConfig::default()
            };

            let mut client = Client::connect(&server, config)
                .await
                .with_context(|| format!("cannot connect to {server}"))?;
            for path in &files {
                let data = tokio::fs::read(path)
                    .await
                    .with_context(|| format!("cannot read {}", path.display()))?;
                let stats = client.send(&data).await?;
                log::info!(
                    "Sent {}: {} segment(s), {} retransmitted",
                    path.display(),
                    stats.segments,
                    stats.retransmitted_segments
                );
            }
            client.close().await?;
        }
    }
    Ok(())
}
