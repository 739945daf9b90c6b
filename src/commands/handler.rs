//! Command Handler Module
//!
//! Executes parsed requests against the storage engine. Every request line
//! yields exactly one [`Response`], malformed lines included, which is what
//! keeps pipelined clients in step with the server.
//!
//! ## Supported Commands
//!
//! - `PING` - Test connection
//! - `GET key` - Get a key's value
//! - `SET key value [ttl]` - Set a key, optionally expiring
//! - `INCR key [ttl]` - Increment an integer, starting from 0
//! - `DEL key` - Delete a key
//! - `LIST` - Enumerate all live keys
//! - `BATCH c1;c2;c3` - Run up to three commands in one line
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     CommandHandler                          │
//! │                                                             │
//! │  ┌──────────────┐    ┌─────────────┐    ┌─────────────┐     │
//! │  │ parse_line() │───>│  execute()  │───>│  dispatch() │     │
//! │  └──────────────┘    └─────────────┘    └─────────────┘     │
//! │                                               │             │
//! │                                               ▼             │
//! │                                      StorageEngine          │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use crate::protocol::{parse_line, Command, CommandError, Response};
use crate::storage::StorageEngine;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// Executes commands against the shared storage engine.
///
/// Cloning is cheap; each connection gets its own clone.
#[derive(Clone)]
pub struct CommandHandler {
    /// The storage engine
    storage: Arc<StorageEngine>,
}

impl CommandHandler {
    /// Creates a new command handler with the given storage engine.
    pub fn new(storage: Arc<StorageEngine>) -> Self {
        Self { storage }
    }

    /// Returns the underlying storage engine.
    pub fn storage(&self) -> &Arc<StorageEngine> {
        &self.storage
    }

    /// Parses and executes one request line.
    pub fn execute_line(&self, line: &str) -> Response {
        let response = match parse_line(line) {
            Ok(command) => self.execute(command),
            Err(err) => Response::Error(err),
        };

        debug!(command = %line.trim(), response = %response, "Processed command");
        response
    }

    /// Executes a parsed command.
    ///
    /// `BATCH` sub-commands run in order, each against the live store. A
    /// failing sub-command does not stop the ones after it.
    pub fn execute(&self, command: Command) -> Response {
        match command {
            Command::Batch(commands) => Response::Batch(
                commands
                    .into_iter()
                    .map(|parsed| match parsed {
                        Ok(command) => self.dispatch(command),
                        Err(err) => Response::Error(err),
                    })
                    .collect(),
            ),
            command => self.dispatch(command),
        }
    }

    /// Dispatches a single, non-batch command to its handler.
    fn dispatch(&self, command: Command) -> Response {
        trace!(command = command.name(), "Dispatching");

        match command {
            Command::Ping => Response::Pong,
            Command::Get { key } => self.cmd_get(&key),
            Command::Set { key, value, ttl } => self.cmd_set(&key, &value, ttl),
            Command::Incr { key, ttl } => self.cmd_incr(&key, ttl),
            Command::Del { key } => self.cmd_del(&key),
            Command::List => Response::Entries(self.storage.list()),
            // The parser never nests batches
            Command::Batch(_) => Response::Error(CommandError::UnknownCommand),
        }
    }

    /// GET key
    fn cmd_get(&self, key: &str) -> Response {
        match self.storage.get(key) {
            Some(value) => Response::Value(value),
            None => Response::Error(CommandError::KeyNotFound),
        }
    }

    /// SET key value [ttl]
    fn cmd_set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Response {
        match self.storage.set(key, value, ttl) {
            Ok(()) => Response::Ok,
            Err(err) => Response::error(err),
        }
    }

    /// INCR key [ttl]
    fn cmd_incr(&self, key: &str, ttl: Option<Duration>) -> Response {
        match self.storage.incr(key, ttl) {
            Ok(n) => Response::Integer(n),
            Err(err) => Response::error(err),
        }
    }

    /// DEL key
    fn cmd_del(&self, key: &str) -> Response {
        match self.storage.del(key) {
            Ok(()) => Response::Ok,
            Err(err) => Response::error(err),
        }
    }
}
