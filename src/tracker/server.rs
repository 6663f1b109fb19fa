use anyhow::{Context, Result};
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tracing::{Instrument, debug, error, info, warn};

use super::framer::{DEFAULT_MAX_BUFFER_BYTES, FrameScanner};
use super::session::{PacketObserver, SessionHandler, StreamAckWriter};

/// Per-connection limits
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    /// Cap on bytes held for an unterminated frame
    pub max_buffer_bytes: usize,
    /// Size of each socket read
    pub read_buffer_bytes: usize,
    /// Chunks queued between the socket reader and the session loop
    pub chunk_queue_capacity: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_buffer_bytes: DEFAULT_MAX_BUFFER_BYTES,
            read_buffer_bytes: 2048,
            chunk_queue_capacity: 64,
        }
    }
}

/// TCP listener accepting tracker device connections.
///
/// Each connection gets a reader task that forwards raw chunks over a channel
/// to a single session loop. The session loop is the only consumer, so frames
/// from one device are always processed in order.
pub struct GatewayServer<O> {
    listener: TcpListener,
    settings: SessionSettings,
    observer: Arc<O>,
}

impl<O: PacketObserver> GatewayServer<O> {
    pub async fn bind(addr: &str, settings: SessionSettings, observer: Arc<O>) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind tracker listener on {}", addr))?;
        Ok(Self {
            listener,
            settings,
            observer,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("Failed to read tracker listener address")
    }

    /// Accept connections until the task is dropped
    pub async fn run(self) -> Result<()> {
        info!("Tracker gateway listening on {}", self.local_addr()?);

        loop {
            let (stream, peer_addr) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("Failed to accept tracker connection: {}", e);
                    metrics::counter!("tracker.connection.accept_error_total").increment(1);
                    continue;
                }
            };

            metrics::counter!("tracker.connection.accepted_total").increment(1);
            let settings = self.settings;
            let observer = self.observer.clone();
            tokio::spawn(
                handle_connection(stream, peer_addr, settings, observer)
                    .instrument(tracing::info_span!("device", peer = %peer_addr)),
            );
        }
    }
}

async fn handle_connection<O: PacketObserver>(
    stream: TcpStream,
    peer_addr: SocketAddr,
    settings: SessionSettings,
    observer: Arc<O>,
) {
    info!("Device connected from {}", peer_addr);
    metrics::gauge!("tracker.connection.active").increment(1.0);
    let connection_start = std::time::Instant::now();

    let (read_half, write_half) = stream.into_split();
    let (chunk_tx, chunk_rx) = flume::bounded::<Bytes>(settings.chunk_queue_capacity);
    let reader = tokio::spawn(
        read_loop(read_half, chunk_tx, settings.read_buffer_bytes).in_current_span(),
    );

    let mut session = SessionHandler::new(
        peer_addr.to_string(),
        FrameScanner::new(settings.max_buffer_bytes),
        StreamAckWriter::new(write_half),
        observer,
    );

    while let Ok(chunk) = chunk_rx.recv_async().await {
        if let Err(e) = session.handle_bytes(&chunk).await {
            error!("Failed to write acknowledgment to {}: {}", peer_addr, e);
            break;
        }
    }

    // Stops the reader if the session ended on a write failure
    reader.abort();

    let stats = session.stats();
    info!(
        "Device {} disconnected after {:.1}s: {} frames, {} packets ({} bad checksum), {} rejected, {} acks",
        peer_addr,
        connection_start.elapsed().as_secs_f64(),
        stats.frames,
        stats.packets,
        stats.invalid_checksums,
        stats.rejected,
        stats.acks_sent
    );
    if session.buffered_len() > 0 {
        debug!(
            "Dropping {} buffered bytes of an incomplete frame",
            session.buffered_len()
        );
    }
    metrics::counter!("tracker.connection.closed_total").increment(1);
    metrics::gauge!("tracker.connection.active").decrement(1.0);
}

/// Forward socket reads to the session loop until EOF, a read error, or the
/// session loop going away
async fn read_loop(mut read_half: OwnedReadHalf, chunk_tx: flume::Sender<Bytes>, buffer_size: usize) {
    let mut buffer = vec![0u8; buffer_size.max(1)];

    loop {
        match read_half.read(&mut buffer).await {
            Ok(0) => {
                debug!("Connection closed by device");
                break;
            }
            Ok(n) => {
                if chunk_tx
                    .send_async(Bytes::copy_from_slice(&buffer[..n]))
                    .await
                    .is_err()
                {
                    break;
                }
            }
            Err(e) => {
                warn!("Read error from device: {}", e);
                metrics::counter!("tracker.connection.read_error_total").increment(1);
                break;
            }
        }
    }
}
