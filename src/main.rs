//! shrmpl-kv server
//!
//! This is the main entry point for the shrmpl-kv server.
//! It reads the configuration, sets up logging and runs the listener until
//! Ctrl+C.

use anyhow::Context;
use shrmpl_kv::config::{CliAction, ServerConfig};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

fn print_help() {
    println!(
        r#"
shrmpl-kv - A Small In-Memory Key-Value Server

USAGE:
    shrmpl-kv-srv [OPTIONS] [<BIND-IP> <PORT>]

ARGS:
    <BIND-IP>                IP address to bind to (default: {host})
    <PORT>                   Port to listen on (default: {port})

OPTIONS:
    -c, --config <FILE>      Read KEY=VALUE settings from FILE
    -v, --version            Print version information
    -h, --help               Print this help message

CONFIG KEYS:
    BIND_ADDR                  Address and port, e.g. 0.0.0.0:7171
    LOG_LEVEL                  Log filter (overridden by RUST_LOG)
    REAPER_INTERVAL_SECS       Seconds between expired-key sweeps
    HEARTBEAT_INTERVAL_SECS    Seconds between UPONG heartbeats
    KEEPALIVE_SECS             TCP keep-alive idle time

CONNECTING:
    $ shrmpl-kv-cli {host} {port}
    ?> SET visits 1 10min
    RECVD: OK
    ?> INCR visits
    RECVD: 2
"#,
        host = shrmpl_kv::DEFAULT_HOST,
        port = shrmpl_kv::DEFAULT_PORT,
    );
}

fn print_banner(config: &ServerConfig) {
    println!(
        r#"
shrmpl-kv v{}
──────────────────────────────────────────────
Server started on {}
Reaper every {}s, heartbeat every {}s
Ready to accept connections.

Use Ctrl+C to shutdown gracefully.
"#,
        shrmpl_kv::VERSION,
        config.bind_address(),
        config.reaper_interval.as_secs(),
        config.heartbeat_interval.as_secs(),
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let config = match ServerConfig::from_args(std::env::args().skip(1)) {
        Ok(CliAction::Run(config)) => config,
        Ok(CliAction::Help) => {
            print_help();
            return Ok(());
        }
        Ok(CliAction::Version) => {
            println!("shrmpl-kv version {}", shrmpl_kv::VERSION);
            return Ok(());
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            print_help();
            std::process::exit(2);
        }
    };

    // Set up logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .with_context(|| format!("invalid log level {:?}", config.log_level))?;
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    for key in &config.unknown_keys {
        warn!(key = %key, "Ignoring unknown config key");
    }

    print_banner(&config);

    // Set up graceful shutdown
    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            // Without a signal handler the server runs until killed
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received, stopping server...");
    };

    shrmpl_kv::server::serve(&config, shutdown)
        .await
        .with_context(|| format!("failed to serve on {}", config.bind_address()))?;

    Ok(())
}
