//! Operator console read from stdin while the relay is serving.

use std::str::FromStr;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use super::admin::{AdminService, join};
use crate::registry::ConnectionRegistry;
use crate::storage::PersistenceGateway;

const HELP: &str = "commands: add <user> <password> | del <user> | purge <user> | who | users | quit";

#[derive(Debug, PartialEq, Eq)]
pub enum ConsoleCommand {
    Add {
        username: String,
        password: Zeroizing<String>,
    },
    Delete(String),
    Purge(String),
    Who,
    Users,
    Help,
    Quit,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("unknown command: {0}")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
}

impl FromStr for ConsoleCommand {
    type Err = ParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Ok(Self::Help);
        };
        let args: Vec<&str> = words.collect();
        match (verb, args.as_slice()) {
            ("add", [username, password]) => Ok(Self::Add {
                username: (*username).to_string(),
                password: Zeroizing::new((*password).to_string()),
            }),
            ("add", _) => Err(ParseError::Usage("add <user> <password>")),
            ("del", [username]) => Ok(Self::Delete((*username).to_string())),
            ("del", _) => Err(ParseError::Usage("del <user>")),
            ("purge", [username]) => Ok(Self::Purge((*username).to_string())),
            ("purge", _) => Err(ParseError::Usage("purge <user>")),
            ("who", []) => Ok(Self::Who),
            ("users", []) => Ok(Self::Users),
            ("help", _) => Ok(Self::Help),
            ("quit" | "exit", []) => Ok(Self::Quit),
            (other, _) => Err(ParseError::Unknown(other.to_string())),
        }
    }
}

/// Everything the console acts on.
pub struct Console {
    pub admin: AdminService,
    pub registry: ConnectionRegistry,
    pub gateway: PersistenceGateway,
    pub shutdown: CancellationToken,
}

impl Console {
    /// Read commands line by line until `quit`, end of input, or shutdown.
    pub async fn run<R, W>(&self, input: R, mut output: W) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = input.lines();
        loop {
            let line = tokio::select! {
                () = self.shutdown.cancelled() => break,
                line = lines.next_line() => line?,
            };
            let Some(line) = line else {
                debug!("Console input closed");
                break;
            };
            let reply = match line.parse::<ConsoleCommand>() {
                Ok(ConsoleCommand::Quit) => {
                    self.shutdown.cancel();
                    break;
                }
                Ok(cmd) => self.execute(cmd).await,
                Err(e) => e.to_string(),
            };
            output.write_all(reply.as_bytes()).await?;
            output.write_all(b"\n").await?;
            output.flush().await?;
        }
        Ok(())
    }

    async fn execute(&self, cmd: ConsoleCommand) -> String {
        match cmd {
            ConsoleCommand::Add { username, password } => {
                let handle = self
                    .admin
                    .create_account(username.clone(), password.as_str().to_owned());
                match join(handle).await {
                    Ok(summary) => format!("created {} ({})", summary.username, summary.id),
                    Err(e) => {
                        warn!(username = %username, error = %e, "Account creation failed");
                        format!("error: {e}")
                    }
                }
            }
            ConsoleCommand::Delete(username) => {
                match join(self.admin.delete_account(username.clone())).await {
                    Ok(()) => format!("deleted {username}"),
                    Err(e) => format!("error: {e}"),
                }
            }
            ConsoleCommand::Purge(username) => {
                match join(self.admin.delete_messages(username.clone())).await {
                    Ok(removed) => format!("removed {removed} messages of {username}"),
                    Err(e) => format!("error: {e}"),
                }
            }
            ConsoleCommand::Who => {
                let online = self.registry.connected_usernames().await;
                if online.is_empty() {
                    "nobody connected".to_string()
                } else {
                    online.join(" ")
                }
            }
            ConsoleCommand::Users => match self.gateway.poll_usernames().await {
                Ok(names) if names.is_empty() => "no accounts".to_string(),
                Ok(names) => names.join(" "),
                Err(e) => format!("error: {e}"),
            },
            ConsoleCommand::Help => HELP.to_string(),
            ConsoleCommand::Quit => String::new(),
        }
    }
}
