//! Request Line Parser
//!
//! Turns one request line into a [`Command`]. Parsing never touches the
//! store, so a malformed line (bad arity, oversized token, bad TTL) is
//! rejected before anything is mutated.
//!
//! ## Grammar
//!
//! ```text
//! line     = command | "BATCH" SP command *( ";" command )
//! command  = "PING" | "GET" SP key | "SET" SP key SP value [SP ttl]
//!          | "INCR" SP key [SP ttl] | "DEL" SP key | "LIST"
//! ttl      = 1*DIGIT ( "s" | "min" | "h" )
//! ```
//!
//! Keywords are case-sensitive. Tokens are separated by ASCII whitespace.

use crate::protocol::types::{Command, CommandError, BATCH_SEPARATOR};
use crate::storage::MAX_TOKEN_LEN;
use std::time::Duration;

/// Maximum number of sub-commands in one `BATCH`.
pub const MAX_BATCH_COMMANDS: usize = 3;

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, CommandError>;

/// Parses one request line (without its terminator).
///
/// # Example
///
/// ```
/// use shrmpl_kv::protocol::{parse_line, Command};
///
/// assert_eq!(parse_line("PING"), Ok(Command::Ping));
/// assert!(parse_line("FLY away").is_err());
/// ```
pub fn parse_line(line: &str) -> ParseResult<Command> {
    let line = line.trim();

    let (keyword, rest) = match line.split_once(|c: char| c.is_ascii_whitespace()) {
        Some((keyword, rest)) => (keyword, rest.trim()),
        None => (line, ""),
    };

    if keyword == "BATCH" {
        return parse_batch(rest);
    }

    parse_command(line)
}

/// Parses the body of a `BATCH` line.
///
/// Empty pieces (a trailing `;`, say) are skipped and do not count toward
/// the limit. Over the limit, nothing in the batch runs.
fn parse_batch(body: &str) -> ParseResult<Command> {
    let pieces: Vec<&str> = body
        .split(BATCH_SEPARATOR)
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
        .collect();

    if pieces.is_empty() {
        return Err(CommandError::InvalidArguments);
    }
    if pieces.len() > MAX_BATCH_COMMANDS {
        return Err(CommandError::BatchLimitExceeded);
    }

    Ok(Command::Batch(pieces.into_iter().map(parse_command).collect()))
}

/// Parses a single command. `BATCH` is not recognized here, so a nested
/// batch comes back as an unknown command.
pub fn parse_command(text: &str) -> ParseResult<Command> {
    let parts: Vec<&str> = text.split_ascii_whitespace().collect();

    match parts.as_slice() {
        ["PING"] => Ok(Command::Ping),
        ["GET", key] => Ok(Command::Get {
            key: token(key)?,
        }),
        ["SET", key, value] => Ok(Command::Set {
            key: token(key)?,
            value: token(value)?,
            ttl: None,
        }),
        ["SET", key, value, ttl] => {
            let key = token(key)?;
            let value = token(value)?;
            Ok(Command::Set {
                key,
                value,
                ttl: Some(parse_ttl(ttl)?),
            })
        }
        ["INCR", key] => Ok(Command::Incr {
            key: token(key)?,
            ttl: None,
        }),
        ["INCR", key, ttl] => {
            let key = token(key)?;
            Ok(Command::Incr {
                key,
                ttl: Some(parse_ttl(ttl)?),
            })
        }
        ["DEL", key] => Ok(Command::Del {
            key: token(key)?,
        }),
        ["LIST"] => Ok(Command::List),
        [keyword, ..] if is_known(keyword) => Err(CommandError::InvalidArguments),
        _ => Err(CommandError::UnknownCommand),
    }
}

fn is_known(keyword: &str) -> bool {
    matches!(keyword, "PING" | "GET" | "SET" | "INCR" | "DEL" | "LIST")
}

fn token(raw: &str) -> ParseResult<String> {
    if raw.len() > MAX_TOKEN_LEN {
        return Err(CommandError::InvalidLength);
    }
    Ok(raw.to_string())
}

/// Parses a TTL token such as `30s`, `15min` or `2h`.
///
/// # Example
///
/// ```
/// use shrmpl_kv::protocol::parse_ttl;
/// use std::time::Duration;
///
/// assert_eq!(parse_ttl("15min"), Ok(Duration::from_secs(900)));
/// assert!(parse_ttl("15m").is_err());
/// ```
pub fn parse_ttl(raw: &str) -> ParseResult<Duration> {
    if raw.len() > MAX_TOKEN_LEN {
        return Err(CommandError::InvalidLength);
    }

    let (digits, unit_secs) = if let Some(digits) = raw.strip_suffix("min") {
        (digits, 60)
    } else if let Some(digits) = raw.strip_suffix('s') {
        (digits, 1)
    } else if let Some(digits) = raw.strip_suffix('h') {
        (digits, 3600)
    } else {
        return Err(CommandError::InvalidExpiration);
    };

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CommandError::InvalidExpiration);
    }

    digits
        .parse::<u64>()
        .ok()
        .and_then(|n| n.checked_mul(unit_secs))
        .map(Duration::from_secs)
        .ok_or(CommandError::InvalidExpiration)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(parse_line("PING"), Ok(Command::Ping));
        assert_eq!(parse_line("LIST"), Ok(Command::List));
        assert_eq!(
            parse_line("GET foo"),
            Ok(Command::Get { key: "foo".into() })
        );
        assert_eq!(
            parse_line("DEL foo"),
            Ok(Command::Del { key: "foo".into() })
        );
        assert_eq!(
            parse_line("SET foo 42"),
            Ok(Command::Set {
                key: "foo".into(),
                value: "42".into(),
                ttl: None
            })
        );
        assert_eq!(
            parse_line("INCR hits 1h"),
            Ok(Command::Incr {
                key: "hits".into(),
                ttl: Some(Duration::from_secs(3600))
            })
        );
    }

    #[test]
    fn test_parse_tolerates_whitespace() {
        assert_eq!(parse_line("  PING \r"), Ok(Command::Ping));
        assert_eq!(
            parse_line("SET   a\tb"),
            Ok(Command::Set {
                key: "a".into(),
                value: "b".into(),
                ttl: None
            })
        );
    }

    #[test]
    fn test_keywords_are_case_sensitive() {
        assert_eq!(parse_line("ping"), Err(CommandError::UnknownCommand));
        assert_eq!(parse_line("Get foo"), Err(CommandError::UnknownCommand));
    }

    #[test]
    fn test_wrong_arity() {
        assert_eq!(parse_line("GET"), Err(CommandError::InvalidArguments));
        assert_eq!(parse_line("GET a b"), Err(CommandError::InvalidArguments));
        assert_eq!(parse_line("SET a"), Err(CommandError::InvalidArguments));
        assert_eq!(parse_line("SET a b 1s x"), Err(CommandError::InvalidArguments));
        assert_eq!(parse_line("PING hello"), Err(CommandError::InvalidArguments));
        assert_eq!(parse_line("LIST all"), Err(CommandError::InvalidArguments));
    }

    #[test]
    fn test_length_checked_before_ttl() {
        let long = "x".repeat(MAX_TOKEN_LEN + 1);
        assert_eq!(
            parse_line(&format!("SET {} v bogus", long)),
            Err(CommandError::InvalidLength)
        );
        assert_eq!(
            parse_line(&format!("GET {}", long)),
            Err(CommandError::InvalidLength)
        );
        assert_eq!(
            parse_line(&format!("SET k {}", long)),
            Err(CommandError::InvalidLength)
        );
        assert!(parse_line(&format!("SET k {}", "x".repeat(MAX_TOKEN_LEN))).is_ok());
    }

    #[test]
    fn test_parse_ttl() {
        assert_eq!(parse_ttl("1s"), Ok(Duration::from_secs(1)));
        assert_eq!(parse_ttl("0s"), Ok(Duration::ZERO));
        assert_eq!(parse_ttl("5min"), Ok(Duration::from_secs(300)));
        assert_eq!(parse_ttl("2h"), Ok(Duration::from_secs(7200)));

        for bad in ["", "s", "10", "10m", "-5s", "+5s", "1.5h", "10 s", "abc", "10sec"] {
            assert_eq!(parse_ttl(bad), Err(CommandError::InvalidExpiration), "{bad}");
        }

        let huge = format!("{}h", u64::MAX);
        assert_eq!(parse_ttl(&huge), Err(CommandError::InvalidExpiration));
    }

    #[test]
    fn test_invalid_ttl_rejects_command() {
        assert_eq!(
            parse_line("SET k v 10x"),
            Err(CommandError::InvalidExpiration)
        );
        assert_eq!(parse_line("INCR k soon"), Err(CommandError::InvalidExpiration));
    }

    #[test]
    fn test_parse_batch() {
        let parsed = parse_line("BATCH SET a 1;GET a; INCR b").unwrap();
        assert_eq!(
            parsed,
            Command::Batch(vec![
                Ok(Command::Set {
                    key: "a".into(),
                    value: "1".into(),
                    ttl: None
                }),
                Ok(Command::Get { key: "a".into() }),
                Ok(Command::Incr {
                    key: "b".into(),
                    ttl: None
                }),
            ])
        );
    }

    #[test]
    fn test_batch_keeps_failed_slots() {
        let parsed = parse_line("BATCH GET a;NOPE;SET b").unwrap();
        assert_eq!(
            parsed,
            Command::Batch(vec![
                Ok(Command::Get { key: "a".into() }),
                Err(CommandError::UnknownCommand),
                Err(CommandError::InvalidArguments),
            ])
        );
    }

    #[test]
    fn test_batch_limit() {
        assert_eq!(
            parse_line("BATCH GET a;GET b;GET c;GET d"),
            Err(CommandError::BatchLimitExceeded)
        );
        // Trailing separators don't count
        assert!(parse_line("BATCH GET a;GET b;GET c;").is_ok());
    }

    #[test]
    fn test_batch_edge_cases() {
        assert_eq!(parse_line("BATCH"), Err(CommandError::InvalidArguments));
        assert_eq!(parse_line("BATCH ;;"), Err(CommandError::InvalidArguments));
        assert_eq!(
            parse_line("BATCH BATCH PING"),
            Ok(Command::Batch(vec![Err(CommandError::UnknownCommand)]))
        );
    }

    #[test]
    fn test_unknown_command() {
        assert_eq!(parse_line("FLUSHALL"), Err(CommandError::UnknownCommand));
        assert_eq!(parse_line(""), Err(CommandError::UnknownCommand));
    }
}
