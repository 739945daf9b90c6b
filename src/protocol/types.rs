//! Line Protocol Types
//!
//! Requests and responses are single ASCII lines terminated by `\n`.
//!
//! ## Examples
//!
//! ```text
//! > SET foo 42 10min        < OK
//! > GET foo                 < 42
//! > INCR hits               < 1
//! > DEL missing             < ERROR key not found
//! > BATCH GET foo;INCR hits < 42;2
//! ```
//!
//! `LIST` is the one reply that is not exactly one line: it produces one
//! `key=value,expiration` line per live key, and nothing at all for an empty
//! store.
//!
//! The server may also send two unsolicited lines at any time: `UPONG`
//! (heartbeat, to be ignored) and `TERM` (the server is shutting down).

use crate::protocol::parser::MAX_BATCH_COMMANDS;
use crate::storage::{ListedEntry, StoreError};
use std::fmt::{self, Write as _};
use std::time::Duration;
use thiserror::Error;

/// Line terminator for every request and response.
pub const LINE_END: char = '\n';

/// Separator between `BATCH` sub-commands and sub-results.
pub const BATCH_SEPARATOR: char = ';';

/// Heartbeat line sent unprompted by the server.
pub const HEARTBEAT: &str = "UPONG";

/// Shutdown notice sent to every connection before the server exits.
pub const TERMINATE: &str = "TERM";

/// Rendered in place of an expiry for entries that never expire.
pub const NO_EXPIRATION: &str = "no-expiration";

/// A per-request failure. Rendered as `ERROR <message>`; the connection
/// stays open.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    #[error("invalid length")]
    InvalidLength,

    #[error("invalid expiration")]
    InvalidExpiration,

    #[error("unknown command")]
    UnknownCommand,

    #[error("key not found")]
    KeyNotFound,

    #[error("batch cannot exceed {} commands", MAX_BATCH_COMMANDS)]
    BatchLimitExceeded,

    /// Wrong number of arguments for a known command
    #[error("invalid arguments")]
    InvalidArguments,

    #[error("increment would overflow")]
    Overflow,

    /// The request line is not valid UTF-8
    #[error("invalid encoding")]
    InvalidEncoding,
}

impl From<StoreError> for CommandError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidLength => CommandError::InvalidLength,
            StoreError::KeyNotFound => CommandError::KeyNotFound,
            StoreError::Overflow => CommandError::Overflow,
            StoreError::InvalidExpiration => CommandError::InvalidExpiration,
        }
    }
}

/// A parsed request line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Ping,
    Get {
        key: String,
    },
    Set {
        key: String,
        value: String,
        ttl: Option<Duration>,
    },
    Incr {
        key: String,
        ttl: Option<Duration>,
    },
    Del {
        key: String,
    },
    List,
    /// Sub-commands in order. A sub-command that failed to parse keeps its
    /// slot so it still yields one `ERROR` sub-result.
    Batch(Vec<Result<Command, CommandError>>),
}

impl Command {
    /// The command keyword, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Ping => "PING",
            Command::Get { .. } => "GET",
            Command::Set { .. } => "SET",
            Command::Incr { .. } => "INCR",
            Command::Del { .. } => "DEL",
            Command::List => "LIST",
            Command::Batch(_) => "BATCH",
        }
    }
}

/// A reply to one request line, or an unsolicited server line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Ok,
    Pong,
    /// Textual value returned by `GET`
    Value(String),
    /// Result of `INCR`
    Integer(i64),
    /// `LIST` snapshot
    Entries(Vec<ListedEntry>),
    /// One result per `BATCH` sub-command
    Batch(Vec<Response>),
    Error(CommandError),
    /// Unsolicited `UPONG`
    Heartbeat,
    /// Unsolicited `TERM`
    Terminate,
}

impl Response {
    /// Creates an error response.
    pub fn error(err: impl Into<CommandError>) -> Self {
        Response::Error(err.into())
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error(_))
    }

    /// Renders the response as it goes on the wire, line terminators included.
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        self.write_to(&mut out);
        out
    }

    /// Appends the wire form of this response to `out`.
    pub fn write_to(&self, out: &mut String) {
        match self {
            Response::Entries(entries) => {
                for entry in entries {
                    write_entry(out, entry);
                    out.push(LINE_END);
                }
            }
            _ => {
                self.write_inline(out);
                out.push(LINE_END);
            }
        }
    }

    /// Writes the response without any line terminator. `LIST` entries are
    /// separated by spaces here so a `BATCH` reply stays on one line.
    fn write_inline(&self, out: &mut String) {
        match self {
            Response::Ok => out.push_str("OK"),
            Response::Pong => out.push_str("PONG"),
            Response::Value(value) => out.push_str(value),
            Response::Integer(n) => {
                let _ = write!(out, "{}", n);
            }
            Response::Entries(entries) => {
                for (i, entry) in entries.iter().enumerate() {
                    if i > 0 {
                        out.push(' ');
                    }
                    write_entry(out, entry);
                }
            }
            Response::Batch(results) => {
                for (i, result) in results.iter().enumerate() {
                    if i > 0 {
                        out.push(BATCH_SEPARATOR);
                    }
                    result.write_inline(out);
                }
            }
            Response::Error(err) => {
                let _ = write!(out, "ERROR {}", err);
            }
            Response::Heartbeat => out.push_str(HEARTBEAT),
            Response::Terminate => out.push_str(TERMINATE),
        }
    }
}

fn write_entry(out: &mut String, entry: &ListedEntry) {
    let _ = write!(out, "{}={},", entry.key, entry.value);
    match entry.expires_at_unix() {
        Some(secs) => {
            let _ = write!(out, "{}", secs);
        }
        None => out.push_str(NO_EXPIRATION),
    }
}

impl From<CommandError> for Response {
    fn from(err: CommandError) -> Self {
        Response::Error(err)
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        self.write_inline(&mut out);
        f.write_str(&out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn entry(key: &str, value: &str, expires: Option<u64>) -> ListedEntry {
        ListedEntry {
            key: key.to_string(),
            value: value.to_string(),
            expires_at: expires.map(|secs| UNIX_EPOCH + Duration::from_secs(secs)),
        }
    }

    #[test]
    fn test_serialize_simple() {
        assert_eq!(Response::Ok.serialize(), "OK\n");
        assert_eq!(Response::Pong.serialize(), "PONG\n");
        assert_eq!(Response::Value("42".into()).serialize(), "42\n");
        assert_eq!(Response::Integer(-3).serialize(), "-3\n");
        assert_eq!(Response::Heartbeat.serialize(), "UPONG\n");
        assert_eq!(Response::Terminate.serialize(), "TERM\n");
    }

    #[test]
    fn test_serialize_errors() {
        assert_eq!(
            Response::error(CommandError::KeyNotFound).serialize(),
            "ERROR key not found\n"
        );
        assert_eq!(
            Response::error(CommandError::BatchLimitExceeded).serialize(),
            "ERROR batch cannot exceed 3 commands\n"
        );
        assert_eq!(
            Response::error(StoreError::InvalidLength).serialize(),
            "ERROR invalid length\n"
        );
        assert_eq!(
            Response::error(CommandError::UnknownCommand).serialize(),
            "ERROR unknown command\n"
        );
    }

    #[test]
    fn test_serialize_entries() {
        let response = Response::Entries(vec![
            entry("a", "1", None),
            entry("b", "hello", Some(1_700_000_000)),
        ]);
        assert_eq!(
            response.serialize(),
            "a=1,no-expiration\nb=hello,1700000000\n"
        );

        // Empty store yields no lines at all
        assert_eq!(Response::Entries(vec![]).serialize(), "");
    }

    #[test]
    fn test_serialize_batch() {
        let response = Response::Batch(vec![
            Response::Ok,
            Response::Value("v".into()),
            Response::error(CommandError::KeyNotFound),
        ]);
        assert_eq!(response.serialize(), "OK;v;ERROR key not found\n");

        let response = Response::Batch(vec![Response::Entries(vec![
            entry("a", "1", None),
            entry("b", "2", None),
        ])]);
        assert_eq!(response.serialize(), "a=1,no-expiration b=2,no-expiration\n");
    }

    #[test]
    fn test_display_is_single_line() {
        let now = SystemTime::now();
        let response = Response::Entries(vec![ListedEntry {
            key: "k".into(),
            value: "v".into(),
            expires_at: Some(now),
        }]);
        assert!(!response.to_string().contains('\n'));
    }
}
