//! `LanChat` CLI
//!
//! Logs in to a relay and offers a line-oriented chat prompt.

use std::io::{self, Write};
use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use zeroize::Zeroizing;

use lanchat_cli::{ClientSession, repl};
use lanchat_core::config::load_config;
use lanchat_core::tracing_init::{directives, init_tracing};

#[derive(Parser, Debug)]
#[command(name = "lanchat")]
#[command(version, about = "LanChat terminal client", long_about = None)]
struct Cli {
    /// Account to log in as.
    #[arg(short, long)]
    user: String,

    /// Password; prompted on stdin when omitted.
    #[arg(long, env = "LANCHAT_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Relay address.
    #[arg(long)]
    addr: Option<SocketAddr>,

    /// Path to a JSON settings file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output logs as JSON.
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(addr) = cli.addr {
        config.client.addr = addr;
    }

    config.validate()?;
    init_tracing(
        &directives(&["lanchat", "lanchat_cli"], &config.client.log_level),
        cli.log_json,
    )?;
    info!(version = env!("CARGO_PKG_VERSION"), "Starting lanchat");

    let mut stdin = BufReader::new(tokio::io::stdin());
    let password = match cli.password {
        Some(p) => Zeroizing::new(p),
        None => {
            let mut err = io::stderr();
            write!(err, "password for {}: ", cli.user)?;
            err.flush()?;
            let mut line = Zeroizing::new(String::new());
            stdin.read_line(&mut line).await?;
            Zeroizing::new(line.trim_end_matches(['\r', '\n']).to_string())
        }
    };

    let session = ClientSession::authenticate(&config.client, &cli.user, &password).await?;
    drop(password);

    let mut out = io::stdout();
    repl::run(session, stdin, &mut out).await
}
