//! Server configuration.
//!
//! Settings come from, in increasing priority:
//!
//! 1. Built-in defaults
//! 2. An optional `KEY=VALUE` file given with `--config <file>`
//! 3. Positional `<bind-ip> <port>` arguments
//!
//! ```text
//! # shrmpl-kv.conf
//! BIND_ADDR=0.0.0.0:7171
//! LOG_LEVEL=debug
//! REAPER_INTERVAL_SECS=60
//! HEARTBEAT_INTERVAL_SECS=120
//! KEEPALIVE_SECS=60
//! ```

use crate::connection::{ConnectionOptions, DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_KEEPALIVE_TIME};
use crate::storage::{ExpiryConfig, DEFAULT_REAPER_INTERVAL};
use crate::{DEFAULT_HOST, DEFAULT_PORT};
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Longest interval accepted for any `*_SECS` setting (one year).
pub const MAX_INTERVAL_SECS: u64 = 365 * 24 * 60 * 60;

/// Errors raised while building a [`ServerConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },

    #[error("invalid bind address: {0:?}")]
    InvalidAddress(String),

    #[error("invalid port: {0:?}")]
    InvalidPort(String),

    #[error("{0} requires a value")]
    MissingValue(String),

    #[error("unexpected argument: {0:?}")]
    UnexpectedArgument(String),
}

/// What the command line asked for.
#[derive(Debug, Clone, PartialEq)]
pub enum CliAction {
    Run(ServerConfig),
    Help,
    Version,
}

/// Server configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// IP address to bind to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Interval between expiration reaper sweeps
    pub reaper_interval: Duration,
    /// Interval between `UPONG` heartbeats on each connection
    pub heartbeat_interval: Duration,
    /// Idle time before TCP keep-alive probes start
    pub keepalive_time: Duration,
    /// Default log filter, overridden by `RUST_LOG`
    pub log_level: String,
    /// Keys found in the config file that mean nothing to the server
    pub unknown_keys: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST
                .parse()
                .unwrap_or(IpAddr::from([127, 0, 0, 1])),
            port: DEFAULT_PORT,
            reaper_interval: DEFAULT_REAPER_INTERVAL,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            keepalive_time: DEFAULT_KEEPALIVE_TIME,
            log_level: "info".to_string(),
            unknown_keys: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Parses command-line arguments (without the program name).
    pub fn from_args<I>(args: I) -> Result<CliAction, ConfigError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut config_path: Option<PathBuf> = None;
        let mut positional = Vec::new();

        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--help" | "-h" => return Ok(CliAction::Help),
                "--version" | "-v" => return Ok(CliAction::Version),
                "--config" | "-c" => match args.next() {
                    Some(path) => config_path = Some(PathBuf::from(path)),
                    None => return Err(ConfigError::MissingValue(arg.clone())),
                },
                flag if flag.starts_with('-') => {
                    return Err(ConfigError::UnexpectedArgument(arg.clone()));
                }
                _ => positional.push(arg.clone()),
            }
        }

        let mut config = match config_path {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };

        match positional.as_slice() {
            [] => {}
            [host, port] => {
                config.host = parse_host(host)?;
                config.port = parse_port(port)?;
            }
            [_] => return Err(ConfigError::MissingValue("<bind-ip>".to_string())),
            [_, _, extra, ..] => return Err(ConfigError::UnexpectedArgument(extra.clone())),
        }

        Ok(CliAction::Run(config))
    }

    /// Loads a `KEY=VALUE` config file on top of the defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let mut config = Self::default();
        config.apply(&contents)?;
        Ok(config)
    }

    /// Applies `KEY=VALUE` lines. Blank lines and `#` comments are skipped.
    pub fn apply(&mut self, contents: &str) -> Result<(), ConfigError> {
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(ConfigError::InvalidValue {
                    key: line.to_string(),
                    value: String::new(),
                });
            };
            let (key, value) = (key.trim(), value.trim());

            match key {
                "BIND_ADDR" => {
                    let addr: SocketAddr = value
                        .parse()
                        .map_err(|_| ConfigError::InvalidAddress(value.to_string()))?;
                    self.host = addr.ip();
                    self.port = addr.port();
                }
                "LOG_LEVEL" => self.log_level = value.to_ascii_lowercase(),
                "REAPER_INTERVAL_SECS" => self.reaper_interval = parse_secs(key, value)?,
                "HEARTBEAT_INTERVAL_SECS" => self.heartbeat_interval = parse_secs(key, value)?,
                "KEEPALIVE_SECS" => self.keepalive_time = parse_secs(key, value)?,
                _ => self.unknown_keys.push(key.to_string()),
            }
        }
        Ok(())
    }

    /// Returns the bind address
    pub fn bind_address(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Per-connection settings derived from this config.
    pub fn connection_options(&self) -> ConnectionOptions {
        ConnectionOptions {
            heartbeat_interval: self.heartbeat_interval,
            keepalive_time: self.keepalive_time,
        }
    }

    /// Reaper settings derived from this config.
    pub fn expiry_config(&self) -> ExpiryConfig {
        ExpiryConfig {
            interval: self.reaper_interval,
        }
    }
}

fn parse_host(raw: &str) -> Result<IpAddr, ConfigError> {
    raw.parse()
        .map_err(|_| ConfigError::InvalidAddress(raw.to_string()))
}

fn parse_port(raw: &str) -> Result<u16, ConfigError> {
    raw.parse()
        .map_err(|_| ConfigError::InvalidPort(raw.to_string()))
}

fn parse_secs(key: &str, value: &str) -> Result<Duration, ConfigError> {
    match value.parse::<u64>() {
        Ok(secs) if (1..=MAX_INTERVAL_SECS).contains(&secs) => Ok(Duration::from_secs(secs)),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn run_config(list: &[&str]) -> ServerConfig {
        match ServerConfig::from_args(args(list)).unwrap() {
            CliAction::Run(config) => config,
            other => panic!("expected a run config, got {:?}", other),
        }
    }

    #[test]
    fn test_defaults() {
        let config = run_config(&[]);
        assert_eq!(config.bind_address().to_string(), "127.0.0.1:7171");
        assert_eq!(config.reaper_interval, Duration::from_secs(60));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(120));
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_positional_address() {
        let config = run_config(&["0.0.0.0", "9000"]);
        assert_eq!(config.bind_address().to_string(), "0.0.0.0:9000");
    }

    #[test]
    fn test_bad_arguments() {
        assert!(matches!(
            ServerConfig::from_args(args(&["localhost", "9000"])),
            Err(ConfigError::InvalidAddress(_))
        ));
        assert!(matches!(
            ServerConfig::from_args(args(&["127.0.0.1", "99999"])),
            Err(ConfigError::InvalidPort(_))
        ));
        assert!(matches!(
            ServerConfig::from_args(args(&["127.0.0.1"])),
            Err(ConfigError::MissingValue(_))
        ));
        assert!(matches!(
            ServerConfig::from_args(args(&["--config"])),
            Err(ConfigError::MissingValue(_))
        ));
        assert!(matches!(
            ServerConfig::from_args(args(&["--verbose"])),
            Err(ConfigError::UnexpectedArgument(_))
        ));
    }

    #[test]
    fn test_help_and_version() {
        assert_eq!(
            ServerConfig::from_args(args(&["--help"])).unwrap(),
            CliAction::Help
        );
        assert_eq!(
            ServerConfig::from_args(args(&["1.2.3.4", "1", "-v"])).unwrap(),
            CliAction::Version
        );
    }

    #[test]
    fn test_apply_file_contents() {
        let mut config = ServerConfig::default();
        config
            .apply(
                "# server\n\
                 BIND_ADDR = 10.0.0.5:7000\n\
                 \n\
                 LOG_LEVEL=DEBUG\n\
                 REAPER_INTERVAL_SECS=5\n\
                 HEARTBEAT_INTERVAL_SECS=30\n\
                 KEEPALIVE_SECS=15\n\
                 SEND_LOG=true\n",
            )
            .unwrap();

        assert_eq!(config.bind_address().to_string(), "10.0.0.5:7000");
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.reaper_interval, Duration::from_secs(5));
        assert_eq!(config.connection_options().heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.connection_options().keepalive_time, Duration::from_secs(15));
        assert_eq!(config.expiry_config().interval, Duration::from_secs(5));
        assert_eq!(config.unknown_keys, vec!["SEND_LOG".to_string()]);
    }

    #[test]
    fn test_apply_rejects_bad_values() {
        let mut config = ServerConfig::default();
        assert!(matches!(
            config.apply("REAPER_INTERVAL_SECS=0"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            config.apply("BIND_ADDR=nowhere"),
            Err(ConfigError::InvalidAddress(_))
        ));
        assert!(matches!(
            config.apply("just some words"),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_interval_bounds() {
        let mut config = ServerConfig::default();
        config
            .apply(&format!("HEARTBEAT_INTERVAL_SECS={}", MAX_INTERVAL_SECS))
            .unwrap();
        assert_eq!(config.heartbeat_interval, Duration::from_secs(MAX_INTERVAL_SECS));

        for key in ["HEARTBEAT_INTERVAL_SECS", "REAPER_INTERVAL_SECS", "KEEPALIVE_SECS"] {
            assert!(matches!(
                config.apply(&format!("{}=18446744073709551615", key)),
                Err(ConfigError::InvalidValue { .. })
            ));
            assert!(matches!(
                config.apply(&format!("{}={}", key, MAX_INTERVAL_SECS + 1)),
                Err(ConfigError::InvalidValue { .. })
            ));
        }
        assert_eq!(config.heartbeat_interval, Duration::from_secs(MAX_INTERVAL_SECS));
    }

    #[test]
    fn test_positional_overrides_file() {
        let path = std::env::temp_dir().join(format!("shrmpl-kv-{}.conf", std::process::id()));
        std::fs::write(&path, "BIND_ADDR=10.0.0.5:7000\nHEARTBEAT_INTERVAL_SECS=9\n").unwrap();

        let config = run_config(&["--config", path.to_str().unwrap(), "127.0.0.1", "8000"]);
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.bind_address().to_string(), "127.0.0.1:8000");
        assert_eq!(config.heartbeat_interval, Duration::from_secs(9));
    }

    #[test]
    fn test_missing_file() {
        let result = ServerConfig::from_args(args(&["--config", "/definitely/not/here.conf"]));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }
}
