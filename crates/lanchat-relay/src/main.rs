//! `LanChat` Relay Server
//!
//! Line-framed TCP relay that authenticates clients, stores their messages
//! and pushes refresh notices to connected sessions.

use std::io::Write;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tokio::io::BufReader;
use tracing::{info, warn};

use lanchat_core::config::{Config, load_config};
use lanchat_core::tracing_init::{directives, init_tracing};
use lanchat_relay::server::console::Console;
use lanchat_relay::server::{RelayServer, admin};
use lanchat_relay::storage::{PersistenceGateway, RelayDatabase};

#[derive(Parser, Debug)]
#[command(name = "lanchat-relay")]
#[command(version, about = "LanChat relay server - authenticates and relays LAN chat")]
struct Args {
    /// Path to a JSON settings file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Address to listen on.
    #[arg(long, global = true)]
    addr: Option<SocketAddr>,

    /// Path to `SQLite` database file.
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the relay (default).
    Serve {
        /// Do not read operator commands from stdin.
        #[arg(long)]
        no_console: bool,
    },
    /// Create an account without starting the relay.
    AddUser {
        username: String,
        /// Password; read from LANCHAT_PASSWORD when omitted.
        #[arg(long, env = "LANCHAT_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Delete an account and its messages without starting the relay.
    DelUser { username: String },
    /// List stored accounts.
    ListUsers,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = load_config(args.config.as_deref())?;
    if let Some(addr) = args.addr {
        config.relay.addr = addr;
    }
    if let Some(path) = &args.db_path {
        config.relay.database_path = Some(path.clone());
    }

    config.validate()?;
    init_tracing(
        &directives(&["lanchat_relay"], &config.relay.log_level),
        args.log_json,
    )?;

    let db_path = match &config.relay.database_path {
        Some(path) => path.clone(),
        None => default_db_path()?,
    };
    let gateway = open_gateway(&db_path).await?;

    match args.command.unwrap_or(Command::Serve { no_console: false }) {
        Command::Serve { no_console } => serve(&config, gateway, !no_console).await?,
        Command::AddUser { username, password } => {
            let client = admin::create_account(&gateway, &username, &password).await?;
            info!(username = %client.username, id = %client.id, "Account created");
            gateway.close().await;
        }
        Command::DelUser { username } => {
            admin::delete_account(&gateway, &username).await?;
            info!(username = %username, "Account deleted");
            gateway.close().await;
        }
        Command::ListUsers => {
            let names = gateway.poll_usernames().await?;
            gateway.close().await;
            let mut out = std::io::stdout().lock();
            for name in names {
                writeln!(out, "{name}")?;
            }
        }
    }
    Ok(())
}

async fn serve(config: &Config, gateway: PersistenceGateway, console: bool) -> anyhow::Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %config.relay.addr,
        "Starting lanchat-relay"
    );

    let server = RelayServer::bind(config.relay.addr, gateway.clone())
        .await?
        .with_max_frame_bytes(config.relay.max_frame_bytes);
    let shutdown = server.shutdown_token();

    if console {
        let console = Console {
            admin: server.admin(),
            registry: server.registry(),
            gateway,
            shutdown: shutdown.clone(),
        };
        tokio::spawn(async move {
            let stdin = BufReader::new(tokio::io::stdin());
            if let Err(e) = console.run(stdin, tokio::io::stdout()).await {
                warn!(error = %e, "Console stopped");
            }
        });
    }

    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received shutdown signal");
                signal.cancel();
            }
            Err(e) => warn!(error = %e, "Cannot listen for Ctrl-C"),
        }
    });

    server.run().await;
    Ok(())
}

async fn open_gateway(path: &Path) -> anyhow::Result<PersistenceGateway> {
    info!(path = %path.display(), "Opening relay database");
    let db = RelayDatabase::open(path).await?;
    Ok(PersistenceGateway::new(db))
}

fn default_db_path() -> anyhow::Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(home.join(".lanchat").join("relay.db"))
}
