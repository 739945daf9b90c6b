//! TCP listener and server lifecycle.
//!
//! The listener accepts connections until the shutdown future resolves, then
//! broadcasts the shutdown to every open connection. Each one writes `TERM`
//! and closes its socket; the listener waits for them (bounded by
//! [`SHUTDOWN_GRACE`]) and closes the listening socket.
//!
//! ```text
//!   ctrl-c ──> Server::run ──broadcast──> handler 1 ── TERM, close
//!                  │                 ├──> handler 2 ── TERM, close
//!                  │                 └──> handler N ── TERM, close
//!                  ▼
//!          wait for handlers, drop listener
//! ```

use crate::commands::CommandHandler;
use crate::config::ServerConfig;
use crate::connection::{handle_connection, ConnectionOptions, ConnectionStats};
use crate::storage::{ExpirySweeper, StorageEngine};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Upper bound on how long shutdown waits for connections to send `TERM`.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Pause after a failed `accept` so a persistent error doesn't spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// A bound listener plus everything its connections share.
#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    storage: Arc<StorageEngine>,
    options: ConnectionOptions,
    stats: Arc<ConnectionStats>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Server {
    /// Binds the listening socket.
    pub async fn bind(
        addr: SocketAddr,
        storage: Arc<StorageEngine>,
        options: ConnectionOptions,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            listener,
            storage,
            options,
            stats: Arc::new(ConnectionStats::new()),
            shutdown_tx,
        })
    }

    /// The address actually bound (useful with port 0).
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Shared connection statistics.
    pub fn stats(&self) -> Arc<ConnectionStats> {
        Arc::clone(&self.stats)
    }

    /// Accepts connections until `shutdown` resolves, then closes every
    /// connection with a `TERM` line.
    pub async fn run(self, shutdown: impl Future<Output = ()>) {
        let Server {
            listener,
            storage,
            options,
            stats,
            shutdown_tx,
        } = self;

        let mut connections = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        let handler = CommandHandler::new(Arc::clone(&storage));
                        connections.spawn(handle_connection(
                            stream,
                            addr,
                            handler,
                            shutdown_tx.subscribe(),
                            options.clone(),
                            Arc::clone(&stats),
                        ));
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to accept connection");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = joined {
                        warn!(error = %e, "Connection task failed");
                    }
                }
            }
        }

        let open = stats.active_connections.load(Ordering::Relaxed);
        info!(connections = open, "Shutdown signal received, notifying clients");
        // Fails only when no connection is listening
        let _ = shutdown_tx.send(());
        drop(listener);

        let drain = async {
            while let Some(joined) = connections.join_next().await {
                if let Err(e) = joined {
                    debug!(error = %e, "Connection task failed during shutdown");
                }
            }
        };
        if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
            warn!(
                remaining = connections.len(),
                "Connections did not close in time, aborting"
            );
            connections.shutdown().await;
        }

        info!("Server shutdown complete");
    }
}

/// Runs a complete server: store, reaper and listener.
///
/// Returns once `shutdown` has resolved and every connection has been closed.
pub async fn serve(config: &ServerConfig, shutdown: impl Future<Output = ()>) -> std::io::Result<()> {
    let storage = Arc::new(StorageEngine::new());
    let _reaper = ExpirySweeper::start(Arc::clone(&storage), config.expiry_config());

    let server = Server::bind(config.bind_address(), storage, config.connection_options()).await?;
    info!(
        address = %server.local_addr()?,
        version = crate::VERSION,
        "shrmpl-kv listening"
    );

    server.run(shutdown).await;
    Ok(())
}
