//! Connection Handler Module
//!
//! This module manages individual client connections. Each client
//! connection is handled by its own async task on the shared Tokio runtime.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     TCP Listener                            │
//! │                    (server.rs)                              │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │
//!                        │ accept()
//!                        ▼
//!           ┌────────────────────────┐
//!           │   For each client...   │
//!           └────────────┬───────────┘
//!                        │
//!                        │ spawn task
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 ConnectionHandler                           │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐      │
//! │  │ Read bytes  │───>│ Split lines │───>│ Execute cmd │      │
//! │  └─────────────┘    └─────────────┘    └─────────────┘      │
//! │                                               │             │
//! │  ┌─────────────┐                              ▼             │
//! │  │  Heartbeat  │─── UPONG ──────────> ┌─────────────┐       │
//! │  └─────────────┘                      │ Send resp   │       │
//! │  ┌─────────────┐                      └─────────────┘       │
//! │  │  Shutdown   │─── TERM ───────────────────^               │
//! │  └─────────────┘                                            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Async I/O**: Uses Tokio for non-blocking network operations
//! - **Pipelining**: Any number of lines per TCP packet, answered in order
//! - **Heartbeat**: Unsolicited `UPONG` keeps idle connections alive
//! - **Shutdown**: `TERM` is sent before the socket is closed
//! - **Statistics**: Tracks connection and command metrics

pub mod handler;
pub mod heartbeat;

// Re-export commonly used types
pub use handler::{
    configure_socket, handle_connection, ConnectionError, ConnectionHandler, ConnectionOptions,
    ConnectionStats, DEFAULT_KEEPALIVE_TIME, MAX_LINE_LEN,
};
pub use heartbeat::{Heartbeat, DEFAULT_HEARTBEAT_INTERVAL};
