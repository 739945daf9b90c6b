//! Connection Handler Module
//!
//! This module handles individual client connections. Each client gets its
//! own task that reads request lines and writes responses in arrival order.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Client connects (TCP handshake)
//!        │
//!        ▼
//! 2. Socket options set (TCP_NODELAY, keep-alive), handler spawned
//!        │
//!        ▼
//! 3. ┌──────────────────────────────────────────┐
//!    │      Main Loop                           │
//!    │                                          │
//!    │  ┌─────────────────────────────────────┐ │
//!    │  │ Execute every complete buffered line│ │
//!    │  │ and queue the responses             │ │
//!    │  └──────────────────┬──────────────────┘ │
//!    │                     ▼                    │
//!    │  ┌─────────────────────────────────────┐ │
//!    │  │ Flush                               │ │
//!    │  └──────────────────┬──────────────────┘ │
//!    │                     ▼                    │
//!    │  ┌─────────────────────────────────────┐ │
//!    │  │ Wait for: shutdown | heartbeat |    │ │
//!    │  │           more bytes                │ │
//!    │  └──────────────────┬──────────────────┘ │
//!    │                     ▼                    │
//!    │                [Loop back]               │
//!    └──────────────────────────────────────────┘
//!        │
//!        ▼
//! 4. Client disconnects / I/O error / TERM sent
//!        │
//!        ▼
//! 5. Handler task ends
//! ```
//!
//! ## Buffer Management
//!
//! Incoming bytes accumulate in a `BytesMut` buffer. TCP is a stream, so a
//! read may deliver half a line or several pipelined lines at once; lines
//! are cut out of the buffer only once their `\n` has arrived.
//!
//! ## Ordering
//!
//! One task owns the whole socket, so responses are written strictly in
//! request order. Heartbeats and the shutdown notice are written by the same
//! task between requests, never in the middle of a response.

use crate::commands::CommandHandler;
use crate::connection::heartbeat::{Heartbeat, DEFAULT_HEARTBEAT_INTERVAL};
use crate::protocol::{CommandError, Response, LINE_END};
use bytes::BytesMut;
use socket2::{SockRef, TcpKeepalive};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

/// Longest request line accepted before the connection is dropped (64 KB)
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Default idle time before TCP keep-alive probes start
pub const DEFAULT_KEEPALIVE_TIME: Duration = Duration::from_secs(60);

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total commands processed
    pub commands_processed: AtomicU64,
    /// Total heartbeats sent
    pub heartbeats_sent: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn command_processed(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn heartbeat_sent(&self) {
        self.heartbeats_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written
            .fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Per-connection settings.
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    /// Interval between unsolicited `UPONG` lines
    pub heartbeat_interval: Duration,
    /// Idle time before TCP keep-alive probes start
    pub keepalive_time: Duration,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            keepalive_time: DEFAULT_KEEPALIVE_TIME,
        }
    }
}

/// Enables `TCP_NODELAY` and TCP keep-alive on an accepted socket.
pub fn configure_socket(stream: &TcpStream, keepalive_time: Duration) -> std::io::Result<()> {
    stream.set_nodelay(true)?;
    let keepalive = TcpKeepalive::new().with_time(keepalive_time);
    SockRef::from(stream).set_tcp_keepalive(&keepalive)?;
    Ok(())
}

/// What woke the main loop up.
enum Event {
    Shutdown,
    Heartbeat,
    Read(std::io::Result<usize>),
}

/// Handles a single client connection.
///
/// This struct owns the socket, the read buffer and the heartbeat schedule
/// for one connected client.
pub struct ConnectionHandler {
    /// The TCP stream for this connection
    stream: BufWriter<TcpStream>,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// Buffer for incoming data
    buffer: BytesMut,

    /// The command handler (shared across connections)
    command_handler: CommandHandler,

    /// Heartbeat schedule
    heartbeat: Heartbeat,

    /// Server shutdown notification
    shutdown: broadcast::Receiver<()>,

    /// Connection statistics (shared)
    stats: Arc<ConnectionStats>,
}

impl ConnectionHandler {
    /// Creates a new connection handler.
    ///
    /// # Arguments
    ///
    /// * `stream` - The TCP stream for this connection
    /// * `addr` - The client's socket address
    /// * `command_handler` - The command handler for executing commands
    /// * `shutdown` - Receives the server-wide shutdown broadcast
    /// * `options` - Heartbeat interval and socket settings
    /// * `stats` - Shared connection statistics
    pub fn new(
        stream: TcpStream,
        addr: SocketAddr,
        command_handler: CommandHandler,
        shutdown: broadcast::Receiver<()>,
        options: &ConnectionOptions,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        stats.connection_opened();

        Self {
            stream: BufWriter::new(stream),
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            command_handler,
            heartbeat: Heartbeat::new(options.heartbeat_interval),
            shutdown,
            stats,
        }
    }

    /// Runs the main connection loop.
    ///
    /// Reads commands from the client, executes them, and sends back
    /// responses until the client disconnects, an I/O error occurs, or the
    /// server shuts down.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.addr, "Client connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => info!(client = %self.addr, "Client disconnected gracefully"),
            Err(e) => match e {
                ConnectionError::ClientDisconnected => {
                    info!(client = %self.addr, "Client disconnected")
                }
                ConnectionError::Shutdown => {
                    info!(client = %self.addr, "Connection closed for shutdown")
                }
                ConnectionError::IoError(io_err)
                    if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
                {
                    debug!(client = %self.addr, "Connection reset by client")
                }
                _ => warn!(client = %self.addr, error = %e, "Connection error"),
            },
        }

        self.stats.connection_closed();
        result
    }

    /// The main read-execute-respond loop.
    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            self.process_buffered_lines().await?;

            // Ensure we have some capacity
            if self.buffer.capacity() - self.buffer.len() < 1024 {
                self.buffer.reserve(INITIAL_BUFFER_SIZE);
            }

            let event = tokio::select! {
                biased;
                _ = self.shutdown.recv() => Event::Shutdown,
                _ = self.heartbeat.tick() => Event::Heartbeat,
                result = self.stream.get_mut().read_buf(&mut self.buffer) => Event::Read(result),
            };

            match event {
                Event::Shutdown => {
                    // Best effort: the socket is closed right after either way
                    self.send(&Response::Terminate).await?;
                    self.stream.flush().await?;
                    return Err(ConnectionError::Shutdown);
                }
                Event::Heartbeat => {
                    self.send(&Response::Heartbeat).await?;
                    self.stream.flush().await?;
                    self.stats.heartbeat_sent();
                    trace!(client = %self.addr, "Sent heartbeat");
                }
                Event::Read(result) => {
                    let n = result?;
                    if n == 0 {
                        return self.finish_at_eof().await;
                    }
                    self.stats.bytes_read(n);
                    trace!(client = %self.addr, bytes = n, "Read data");
                }
            }
        }
    }

    /// Executes every complete line in the buffer, then flushes once.
    async fn process_buffered_lines(&mut self) -> Result<(), ConnectionError> {
        let mut pending = false;

        while let Some(line) = self.next_line()? {
            pending |= self.execute(&line).await?;
        }

        if pending {
            self.stream.flush().await?;
        }
        Ok(())
    }

    /// Cuts the next complete line out of the buffer, terminator dropped.
    fn next_line(&mut self) -> Result<Option<BytesMut>, ConnectionError> {
        match self.buffer.iter().position(|&b| b == LINE_END as u8) {
            Some(pos) => {
                let mut line = self.buffer.split_to(pos + 1);
                line.truncate(pos);
                trace!(
                    client = %self.addr,
                    remaining = self.buffer.len(),
                    "Parsed line"
                );
                Ok(Some(line))
            }
            None if self.buffer.len() > MAX_LINE_LEN => {
                warn!(
                    client = %self.addr,
                    size = self.buffer.len(),
                    "Request line too long"
                );
                Err(ConnectionError::LineTooLong)
            }
            None => Ok(None),
        }
    }

    /// Executes one request line and queues its response. Blank lines get
    /// no response; a line that is not UTF-8 gets an error without being
    /// parsed. Returns whether anything was written.
    async fn execute(&mut self, raw: &[u8]) -> Result<bool, ConnectionError> {
        let response = match std::str::from_utf8(raw) {
            Ok(line) if line.trim().is_empty() => return Ok(false),
            Ok(line) => self.command_handler.execute_line(line),
            Err(_) => {
                debug!(client = %self.addr, bytes = raw.len(), "Request line is not UTF-8");
                Response::error(CommandError::InvalidEncoding)
            }
        };
        self.stats.command_processed();
        self.send(&response).await?;
        Ok(true)
    }

    /// The client closed its write side. A final line without a terminator
    /// still gets its response.
    async fn finish_at_eof(&mut self) -> Result<(), ConnectionError> {
        if !self.buffer.is_empty() {
            let rest = self.buffer.split();
            if self.execute(&rest).await? {
                self.stream.flush().await?;
            }
        }
        Err(ConnectionError::ClientDisconnected)
    }

    /// Writes a response into the send buffer.
    async fn send(&mut self, response: &Response) -> Result<(), ConnectionError> {
        let bytes = response.serialize();
        if bytes.is_empty() {
            return Ok(());
        }
        self.stream.write_all(bytes.as_bytes()).await?;
        self.stats.bytes_written(bytes.len());
        trace!(
            client = %self.addr,
            bytes = bytes.len(),
            "Queued response"
        );
        Ok(())
    }
}

/// Errors that end a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Client disconnected normally
    #[error("Client disconnected")]
    ClientDisconnected,

    /// A request line exceeded [`MAX_LINE_LEN`]
    #[error("Request line too long")]
    LineTooLong,

    /// The server is shutting down
    #[error("Server shutting down")]
    Shutdown,
}

/// Handles a client connection.
///
/// This is a convenience function that configures the socket, creates a
/// ConnectionHandler and runs it to completion.
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    command_handler: CommandHandler,
    shutdown: broadcast::Receiver<()>,
    options: ConnectionOptions,
    stats: Arc<ConnectionStats>,
) {
    if let Err(e) = configure_socket(&stream, options.keepalive_time) {
        warn!(client = %addr, error = %e, "Failed to set socket options");
    }

    let handler = ConnectionHandler::new(stream, addr, command_handler, shutdown, &options, stats);
    if let Err(e) = handler.run().await {
        match e {
            ConnectionError::ClientDisconnected | ConnectionError::Shutdown => {}
            ConnectionError::IoError(ref io_err)
                if io_err.kind() == std::io::ErrorKind::ConnectionReset => {}
            _ => {
                debug!(client = %addr, error = %e, "Connection ended with error");
            }
        }
    }
}
