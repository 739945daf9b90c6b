//! Interactive shrmpl-kv client.
//!
//! Reads one command per line from stdin, sends it unchanged and prints every
//! reply as `RECVD: <line>`. Heartbeats are hidden; `TERM` ends the session.

use anyhow::{bail, Context};
use shrmpl_kv::client::CONNECT_TIMEOUT;
use shrmpl_kv::protocol::{HEARTBEAT, TERMINATE};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

fn prompt() -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    write!(stdout, "?> ")?;
    stdout.flush()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() != 3 {
        eprintln!("Usage: {} <ip> <port>", args[0]);
        eprintln!(
            "Example: {} {} {}",
            args[0],
            shrmpl_kv::DEFAULT_HOST,
            shrmpl_kv::DEFAULT_PORT
        );
        std::process::exit(2);
    }
    let addr = format!("{}:{}", args[1], args[2]);

    let stream = match tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(&addr)).await {
        Ok(result) => result.with_context(|| format!("failed to connect to {}", addr))?,
        Err(_) => bail!(
            "could not connect to {} within {} seconds",
            addr,
            CONNECT_TIMEOUT.as_secs()
        ),
    };
    stream.set_nodelay(true)?;

    let (reader, mut writer) = stream.into_split();
    let mut server = BufReader::new(reader).lines();
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    println!("Successfully connected to {}", addr);
    prompt()?;

    loop {
        tokio::select! {
            line = stdin.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    break;
                };
                let command = line.trim();
                if command.is_empty() {
                    prompt()?;
                    continue;
                }
                writer
                    .write_all(format!("{}\n", command).as_bytes())
                    .await
                    .context("failed to send command")?;
            }
            line = server.next_line() => {
                let Some(line) = line.context("failed to read from server")? else {
                    println!("Connection closed by server");
                    break;
                };
                match line.trim_end() {
                    HEARTBEAT => {}
                    TERMINATE => {
                        println!("Server shutting down. Disconnecting.");
                        break;
                    }
                    reply => {
                        println!("RECVD: {}", reply);
                        prompt()?;
                    }
                }
            }
        }
    }

    Ok(())
}
