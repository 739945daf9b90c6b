//! # shrmpl-kv - A Small In-Memory Key-Value Server
//!
//! shrmpl-kv keeps integer and short text values in memory and serves them
//! over a pipelined, newline-delimited TCP protocol. It is built for a
//! handful of long-lived client connections issuing thousands of commands
//! each without reconnecting.
//!
//! ## Features
//!
//! - **Line Protocol**: One ASCII command per line, one response per line
//! - **Pipelining**: Responses always come back in request order
//! - **TTL Support**: Keys can expire after seconds, minutes or hours
//! - **Heartbeats**: Unsolicited `UPONG` lines keep idle connections open
//! - **Graceful Shutdown**: Every client gets `TERM` before the socket closes
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                             shrmpl-kv                                   │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ TCP Server  │───>│ Connection  │───>│  Command    │                  │
//! │  │ (Listener)  │    │  Handler    │    │  Handler    │                  │
//! │  └─────────────┘    └──────┬──────┘    └──────┬──────┘                  │
//! │         │                  │                  │                         │
//! │    TERM broadcast     UPONG heartbeat         ▼                         │
//! │                                   ┌──────────────────────────────┐      │
//! │  ┌─────────────┐                  │        StorageEngine         │      │
//! │  │    Line     │                  │ RwLock<HashMap<key, Entry>>  │      │
//! │  │   Parser    │                  └──────────────────────────────┘      │
//! │  └─────────────┘                                  ▲                     │
//! │                                                   │                     │
//! │                     ┌─────────────────────────────┴───────────────────┐ │
//! │                     │           Expiration Reaper                     │ │
//! │                     │      (Background Tokio Task)                    │ │
//! │                     └─────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use shrmpl_kv::config::ServerConfig;
//! use shrmpl_kv::server::serve;
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let config = ServerConfig::default();
//!     serve(&config, async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await
//! }
//! ```
//!
//! ## Supported Commands
//!
//! - `PING`
//! - `GET key`
//! - `SET key value [ttl]`
//! - `INCR key [ttl]`
//! - `DEL key`
//! - `LIST`
//! - `BATCH cmd1;cmd2;cmd3`
//!
//! A `ttl` is a whole number followed by `s`, `min` or `h`.
//!
//! ## Module Overview
//!
//! - [`protocol`]: Request parsing and response rendering
//! - [`storage`]: Thread-safe store with TTL support and the reaper
//! - [`commands`]: Command dispatcher
//! - [`connection`]: Per-client connection handling and heartbeats
//! - [`server`]: Listener and shutdown broadcast
//! - [`config`]: Server configuration
//! - [`client`]: Async client
//!
//! ## Expiry
//!
//! Expired entries are never returned: every read compares the expiry with
//! the clock. Removing them from memory is left to the reaper, so reads
//! never need the write lock.

pub mod client;
pub mod commands;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod server;
pub mod storage;

// Re-export commonly used types for convenience
pub use client::{ClientError, KvClient};
pub use commands::CommandHandler;
pub use config::ServerConfig;
pub use connection::{handle_connection, ConnectionStats};
pub use protocol::{Command, CommandError, Response, MAX_BATCH_COMMANDS};
pub use server::{serve, Server};
pub use storage::{
    start_expiry_sweeper, ExpiryConfig, ExpirySweeper, StorageEngine, MAX_TOKEN_LEN,
};

/// The default port shrmpl-kv listens on
pub const DEFAULT_PORT: u16 = 7171;

/// The default host shrmpl-kv binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of shrmpl-kv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
