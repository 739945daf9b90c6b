//! Async client for a shrmpl-kv server.
//!
//! [`KvClient`] holds one connection and issues one request at a time.
//! Unsolicited `UPONG` heartbeats are skipped while waiting for a reply, and
//! a `TERM` line surfaces as [`ClientError::ServerShutdown`].
//!
//! ```ignore
//! let mut client = KvClient::connect("127.0.0.1:7171").await?;
//! client.set_with_ttl("session", "abc", "10min").await?;
//! assert_eq!(client.get("session").await?, Some("abc".to_string()));
//! ```

use crate::protocol::{BATCH_SEPARATOR, HEARTBEAT, MAX_BATCH_COMMANDS, NO_EXPIRATION, TERMINATE};
use crate::storage::MAX_TOKEN_LEN;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::trace;

/// How long [`KvClient::connect`] waits for the TCP handshake.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

const ERROR_PREFIX: &str = "ERROR ";

/// Errors returned by [`KvClient`].
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not connect within {} seconds", CONNECT_TIMEOUT.as_secs())]
    ConnectTimeout,

    #[error("server shutting down")]
    ServerShutdown,

    #[error("connection closed by server")]
    ConnectionClosed,

    #[error("key or value length exceeds {} characters", MAX_TOKEN_LEN)]
    InvalidLength,

    /// Empty, or contains whitespace or `;`, which would split the request
    #[error("key, value or ttl must be a single token without ';'")]
    InvalidToken,

    #[error("batch cannot exceed {} commands", MAX_BATCH_COMMANDS)]
    BatchTooLarge,

    /// The server answered with `ERROR <message>`
    #[error("server error: {0}")]
    Server(String),

    #[error("unexpected response: {0:?}")]
    InvalidResponse(String),
}

/// One row of a `LIST` reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    pub key: String,
    pub value: String,
    /// Absolute expiry in Unix seconds
    pub expires_at: Option<u64>,
}

/// A connection to a shrmpl-kv server.
#[derive(Debug)]
pub struct KvClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    line: String,
}

impl KvClient {
    /// Connects to `addr` with a [`CONNECT_TIMEOUT`] and `TCP_NODELAY` set.
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, ClientError> {
        let stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr))
            .await
            .map_err(|_| ClientError::ConnectTimeout)??;
        stream.set_nodelay(true)?;

        let (reader, writer) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(reader),
            writer,
            line: String::new(),
        })
    }

    /// Sends one raw request line and returns the first reply line that is
    /// not a heartbeat, without its line terminator.
    ///
    /// A bare `LIST` is sent as `BATCH LIST`: its plain reply has one line
    /// per entry and none at all for an empty store, so it could not be read
    /// back as a single reply. The result is the space-separated form.
    pub async fn send_command(&mut self, command: &str) -> Result<String, ClientError> {
        let command = match command.trim() {
            "LIST" => "BATCH LIST",
            _ => command,
        };
        let mut request = String::with_capacity(command.len() + 1);
        request.push_str(command);
        request.push('\n');
        self.writer.write_all(request.as_bytes()).await?;

        loop {
            self.line.clear();
            if self.reader.read_line(&mut self.line).await? == 0 {
                return Err(ClientError::ConnectionClosed);
            }

            let reply = self.line.trim_end_matches(['\r', '\n']);
            match reply {
                HEARTBEAT => trace!("heartbeat received"),
                TERMINATE => return Err(ClientError::ServerShutdown),
                _ => return Ok(reply.to_string()),
            }
        }
    }

    pub async fn ping(&mut self) -> Result<(), ClientError> {
        let reply = self.request("PING").await?;
        expect_exact(reply, "PONG")
    }

    /// Returns `None` when the key is absent or expired.
    pub async fn get(&mut self, key: &str) -> Result<Option<String>, ClientError> {
        check_token(key)?;
        match self.request(&format!("GET {}", key)).await {
            Ok(value) => Ok(Some(value)),
            Err(ClientError::Server(msg)) if msg == "key not found" => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn set(&mut self, key: &str, value: &str) -> Result<(), ClientError> {
        check_token(key)?;
        check_token(value)?;
        let reply = self.request(&format!("SET {} {}", key, value)).await?;
        expect_exact(reply, "OK")
    }

    /// Sets a value that expires after `ttl` (`30s`, `10min`, `2h`).
    pub async fn set_with_ttl(&mut self, key: &str, value: &str, ttl: &str) -> Result<(), ClientError> {
        check_token(key)?;
        check_token(value)?;
        check_token(ttl)?;
        let reply = self.request(&format!("SET {} {} {}", key, value, ttl)).await?;
        expect_exact(reply, "OK")
    }

    pub async fn incr(&mut self, key: &str) -> Result<i64, ClientError> {
        check_token(key)?;
        let reply = self.request(&format!("INCR {}", key)).await?;
        parse_integer(reply)
    }

    pub async fn incr_with_ttl(&mut self, key: &str, ttl: &str) -> Result<i64, ClientError> {
        check_token(key)?;
        check_token(ttl)?;
        let reply = self.request(&format!("INCR {} {}", key, ttl)).await?;
        parse_integer(reply)
    }

    /// Returns `false` when there was nothing to delete.
    pub async fn delete(&mut self, key: &str) -> Result<bool, ClientError> {
        check_token(key)?;
        match self.request(&format!("DEL {}", key)).await {
            Ok(reply) => expect_exact(reply, "OK").map(|_| true),
            Err(ClientError::Server(msg)) if msg == "key not found" => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Lists every live entry.
    ///
    /// Sent as `BATCH LIST` so the reply is a single line however many
    /// entries the store holds.
    pub async fn list(&mut self) -> Result<Vec<ListEntry>, ClientError> {
        let reply = self.request("BATCH LIST").await?;
        parse_entries(&reply)
    }

    /// Runs up to three commands in one round trip and returns one reply
    /// per command. Failed sub-commands come back as `ERROR ...` strings.
    pub async fn batch(&mut self, commands: &[&str]) -> Result<Vec<String>, ClientError> {
        if commands.is_empty() || commands.len() > MAX_BATCH_COMMANDS {
            return Err(ClientError::BatchTooLarge);
        }

        let mut request = String::from("BATCH ");
        for (i, command) in commands.iter().enumerate() {
            if i > 0 {
                request.push(BATCH_SEPARATOR);
            }
            request.push_str(command);
        }

        let reply = self.send_command(&request).await?;
        Ok(reply.split(BATCH_SEPARATOR).map(str::to_string).collect())
    }

    /// Like [`send_command`](Self::send_command), but turns `ERROR` replies
    /// into [`ClientError::Server`].
    async fn request(&mut self, command: &str) -> Result<String, ClientError> {
        let reply = self.send_command(command).await?;
        match reply.strip_prefix(ERROR_PREFIX) {
            Some(msg) => Err(ClientError::Server(msg.to_string())),
            None => Ok(reply),
        }
    }
}

/// Checks that `token` goes on the wire as exactly one argument.
fn check_token(token: &str) -> Result<(), ClientError> {
    if token.len() > MAX_TOKEN_LEN {
        return Err(ClientError::InvalidLength);
    }
    if token.is_empty()
        || token
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || c == BATCH_SEPARATOR)
    {
        return Err(ClientError::InvalidToken);
    }
    Ok(())
}

fn expect_exact(reply: String, expected: &str) -> Result<(), ClientError> {
    if reply == expected {
        Ok(())
    } else {
        Err(ClientError::InvalidResponse(reply))
    }
}

fn parse_integer(reply: String) -> Result<i64, ClientError> {
    reply
        .parse()
        .map_err(|_| ClientError::InvalidResponse(reply))
}

/// Parses space-separated `key=value,expiry` entries.
fn parse_entries(reply: &str) -> Result<Vec<ListEntry>, ClientError> {
    reply
        .split_ascii_whitespace()
        .map(|raw| -> Result<ListEntry, ClientError> {
            let invalid = || ClientError::InvalidResponse(raw.to_string());
            let (pair, expiry) = raw.rsplit_once(',').ok_or_else(invalid)?;
            let (key, value) = pair.split_once('=').ok_or_else(invalid)?;
            let expires_at = match expiry {
                NO_EXPIRATION => None,
                secs => Some(secs.parse().map_err(|_| invalid())?),
            };

            Ok(ListEntry {
                key: key.to_string(),
                value: value.to_string(),
                expires_at,
            })
        })
        .collect()
}
