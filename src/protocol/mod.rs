//! Line Protocol Implementation
//!
//! ASCII, newline-terminated, one command or response per line.
//!
//! ## Modules
//!
//! - `types`: `Command`, `Response`, `CommandError` and response rendering
//! - `parser`: request line parser and TTL grammar
//!
//! ## Example
//!
//! ```
//! use shrmpl_kv::protocol::{parse_line, Command, Response};
//!
//! let command = parse_line("GET name").unwrap();
//! assert_eq!(command, Command::Get { key: "name".to_string() });
//!
//! let response = Response::Value("shrimp".to_string());
//! assert_eq!(response.serialize(), "shrimp\n");
//! ```

pub mod parser;
pub mod types;

// Re-export commonly used types for convenience
pub use parser::{parse_command, parse_line, parse_ttl, ParseResult, MAX_BATCH_COMMANDS};
pub use types::{
    Command, CommandError, Response, BATCH_SEPARATOR, HEARTBEAT, LINE_END, NO_EXPIRATION,
    TERMINATE,
};
