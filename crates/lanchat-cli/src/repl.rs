//! Interactive front end over a [`ClientSession`].
//!
//! User-facing output uses writeln! to stdout (this is a CLI binary, not debug output).

use std::io::Write;
use std::str::FromStr;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::debug;

use lanchat_proto::{ClientSummary, Message};

use crate::error::SessionError;
use crate::session::ClientSession;

pub const HELP: &str = "\
/list                 show accounts and who is online
/msgs                 show your sent and received messages
/with <user>          show your conversation with <user>
/send <user> <text>   send a message (also: @user text)
/quit                 disconnect and exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    List,
    Messages,
    With(String),
    Send { to: String, text: String },
    Help,
    Quit,
}

impl FromStr for ReplCommand {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix('@') {
            return parse_send(rest);
        }
        let (verb, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();
        match verb {
            "/list" => Ok(Self::List),
            "/msgs" => Ok(Self::Messages),
            "/with" if !rest.is_empty() => Ok(Self::With(rest.to_string())),
            "/with" => Err("usage: /with <user>".to_string()),
            "/send" => parse_send(rest),
            "/quit" | "/exit" => Ok(Self::Quit),
            "" | "/help" => Ok(Self::Help),
            other => Err(format!("unknown command {other}, try /help")),
        }
    }
}

fn parse_send(rest: &str) -> Result<ReplCommand, String> {
    match rest.split_once(char::is_whitespace) {
        Some((to, text)) if !text.trim().is_empty() => Ok(ReplCommand::Send {
            to: to.to_string(),
            text: text.trim().to_string(),
        }),
        _ => Err("usage: /send <user> <text>".to_string()),
    }
}

fn username_of(clients: &[ClientSummary], id: &str) -> String {
    clients
        .iter()
        .find(|c| c.id == id)
        .map_or_else(|| id.to_string(), |c| c.username.clone())
}

fn id_of(clients: &[ClientSummary], username: &str) -> Option<String> {
    clients
        .iter()
        .find(|c| c.username == username)
        .map(|c| c.id.clone())
}

fn render(out: &mut impl Write, clients: &[ClientSummary], m: &Message) -> std::io::Result<()> {
    let ack = if m.receiver_acknowledged { "" } else { " (offline)" };
    writeln!(
        out,
        "  [{}] {} -> {}: {}{}",
        m.timestamp,
        username_of(clients, &m.sender_id),
        username_of(clients, &m.receiver_id),
        m.content,
        ack
    )
}

/// Resolve a username, refreshing the list once if it is not known yet.
async fn resolve(session: &ClientSession, username: &str) -> Result<Option<String>, SessionError> {
    if let Some(id) = id_of(&session.clients().snapshot(), username) {
        return Ok(Some(id));
    }
    session.refresh_client_list().await?;
    Ok(id_of(&session.clients().snapshot(), username))
}

/// Run one command. Returns `false` when the user asked to leave.
pub async fn execute<W: Write>(
    session: &ClientSession,
    cmd: ReplCommand,
    out: &mut W,
) -> anyhow::Result<bool> {
    match cmd {
        ReplCommand::List => {
            session.refresh_client_list().await?;
            for c in session.clients().snapshot() {
                let state = if c.online { "online" } else { "offline" };
                writeln!(out, "  {:<30} {state}", c.username)?;
            }
        }
        ReplCommand::Messages => {
            session.refresh_message_lists().await?;
            let clients = session.clients().snapshot();
            let lists = session.messages().snapshot();
            writeln!(out, "sent:")?;
            for m in &lists.sent {
                render(out, &clients, m)?;
            }
            writeln!(out, "received:")?;
            for m in &lists.received {
                render(out, &clients, m)?;
            }
        }
        ReplCommand::With(user) => {
            let Some(peer) = resolve(session, &user).await? else {
                writeln!(out, "no such user: {user}")?;
                return Ok(true);
            };
            let groups = session.filter_by_role(&peer).await?;
            let clients = session.clients().snapshot();
            writeln!(out, "you -> {user}:")?;
            for m in &groups.as_sender {
                render(out, &clients, m)?;
            }
            writeln!(out, "{user} -> you:")?;
            for m in &groups.as_receiver {
                render(out, &clients, m)?;
            }
        }
        ReplCommand::Send { to, text } => {
            let Some(peer) = resolve(session, &to).await? else {
                writeln!(out, "no such user: {to}")?;
                return Ok(true);
            };
            match session.send_message(&peer, &text).await {
                Ok(true) => writeln!(out, "sent")?,
                Ok(false) => writeln!(out, "message could not be delivered")?,
                Err(e @ SessionError::InvalidInput(_)) => writeln!(out, "{e}")?,
                Err(e) => return Err(e.into()),
            }
        }
        ReplCommand::Help => writeln!(out, "{HELP}")?,
        ReplCommand::Quit => return Ok(false),
    }
    Ok(true)
}

/// Read commands until `/quit`, end of input, or the session closes.
pub async fn run<R, W>(session: Arc<ClientSession>, input: R, out: &mut W) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut lines = input.lines();
    writeln!(out, "logged in as {}. /help for commands", session.username())?;
    loop {
        let line = tokio::select! {
            () = session.closed() => {
                writeln!(out, "connection closed by relay")?;
                return Ok(());
            }
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            debug!("Input closed");
            break;
        };
        let keep_going = match line.parse::<ReplCommand>() {
            Ok(cmd) => match execute(&session, cmd, out).await {
                Ok(keep_going) => keep_going,
                Err(e) => {
                    writeln!(out, "error: {e}")?;
                    !session.is_closed()
                }
            },
            Err(msg) => {
                writeln!(out, "{msg}")?;
                true
            }
        };
        out.flush()?;
        if !keep_going {
            break;
        }
    }
    session.disconnect().await;
    Ok(())
}
