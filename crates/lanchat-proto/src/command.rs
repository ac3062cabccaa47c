//! The closed catalog of command tags exchanged on a connection.
//!
//! Every frame on the wire starts with one of these tags. Requests flow
//! client to server and are answered by their acknowledge tag; mandates are
//! pushed by the relay without a pending request.

use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Wire strings
// ---------------------------------------------------------------------------

pub const TAG_AUTH_REQUEST: &str = "AUTH_REQUEST";
pub const TAG_AUTH_REQUEST_ACK: &str = "AUTH_REQUEST_ACK";
pub const TAG_MESSAGE_BROADCAST_REQUEST: &str = "MESSAGE_BROADCAST_REQUEST";
pub const TAG_MESSAGE_BROADCAST_ACK: &str = "MESSAGE_BROADCAST_ACK";
pub const TAG_CLIENT_LIST_UPDATE_REQUEST: &str = "CLIENT_LIST_UPDATE_REQUEST";
pub const TAG_CLIENT_LIST_UPDATE_ACK: &str = "CLIENT_LIST_UPDATE_ACK";
pub const TAG_MESSAGE_LIST_UPDATE_REQUEST: &str = "MESSAGE_LIST_UPDATE_REQUEST";
pub const TAG_MESSAGE_LIST_UPDATE_ACK: &str = "MESSAGE_LIST_UPDATE_ACK";
pub const TAG_DISCONNECTION_REQUEST: &str = "DISCONNECTION_REQUEST";
pub const TAG_DISCONNECTION_ACK: &str = "DISCONNECTION_ACK";
pub const TAG_CLIENT_LIST_UPDATE_MANDATE: &str = "CLIENT_LIST_UPDATE_MANDATE";
pub const TAG_MESSAGE_LIST_UPDATE_MANDATE: &str = "MESSAGE_LIST_UPDATE_MANDATE";
pub const TAG_SHUTDOWN_MANDATE: &str = "SHUTDOWN_MANDATE";

/// Direction and purpose of a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandRole {
    /// Client to server, expects an acknowledge tag.
    Request,
    /// Server to client, answers a request.
    Acknowledge,
    /// Server to client, unsolicited.
    Mandate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    AuthRequest,
    AuthRequestAck,
    MessageBroadcastRequest,
    MessageBroadcastAck,
    ClientListUpdateRequest,
    ClientListUpdateAck,
    MessageListUpdateRequest,
    MessageListUpdateAck,
    DisconnectionRequest,
    DisconnectionAck,
    ClientListUpdateMandate,
    MessageListUpdateMandate,
    ShutdownMandate,
}

impl Command {
    pub const ALL: [Self; 13] = [
        Self::AuthRequest,
        Self::AuthRequestAck,
        Self::MessageBroadcastRequest,
        Self::MessageBroadcastAck,
        Self::ClientListUpdateRequest,
        Self::ClientListUpdateAck,
        Self::MessageListUpdateRequest,
        Self::MessageListUpdateAck,
        Self::DisconnectionRequest,
        Self::DisconnectionAck,
        Self::ClientListUpdateMandate,
        Self::MessageListUpdateMandate,
        Self::ShutdownMandate,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AuthRequest => TAG_AUTH_REQUEST,
            Self::AuthRequestAck => TAG_AUTH_REQUEST_ACK,
            Self::MessageBroadcastRequest => TAG_MESSAGE_BROADCAST_REQUEST,
            Self::MessageBroadcastAck => TAG_MESSAGE_BROADCAST_ACK,
            Self::ClientListUpdateRequest => TAG_CLIENT_LIST_UPDATE_REQUEST,
            Self::ClientListUpdateAck => TAG_CLIENT_LIST_UPDATE_ACK,
            Self::MessageListUpdateRequest => TAG_MESSAGE_LIST_UPDATE_REQUEST,
            Self::MessageListUpdateAck => TAG_MESSAGE_LIST_UPDATE_ACK,
            Self::DisconnectionRequest => TAG_DISCONNECTION_REQUEST,
            Self::DisconnectionAck => TAG_DISCONNECTION_ACK,
            Self::ClientListUpdateMandate => TAG_CLIENT_LIST_UPDATE_MANDATE,
            Self::MessageListUpdateMandate => TAG_MESSAGE_LIST_UPDATE_MANDATE,
            Self::ShutdownMandate => TAG_SHUTDOWN_MANDATE,
        }
    }

    pub const fn role(self) -> CommandRole {
        match self {
            Self::AuthRequest
            | Self::MessageBroadcastRequest
            | Self::ClientListUpdateRequest
            | Self::MessageListUpdateRequest
            | Self::DisconnectionRequest => CommandRole::Request,
            Self::AuthRequestAck
            | Self::MessageBroadcastAck
            | Self::ClientListUpdateAck
            | Self::MessageListUpdateAck
            | Self::DisconnectionAck => CommandRole::Acknowledge,
            Self::ClientListUpdateMandate
            | Self::MessageListUpdateMandate
            | Self::ShutdownMandate => CommandRole::Mandate,
        }
    }

    /// The acknowledge tag paired with a request, if any.
    pub const fn ack(self) -> Option<Self> {
        match self {
            Self::AuthRequest => Some(Self::AuthRequestAck),
            Self::MessageBroadcastRequest => Some(Self::MessageBroadcastAck),
            Self::ClientListUpdateRequest => Some(Self::ClientListUpdateAck),
            Self::MessageListUpdateRequest => Some(Self::MessageListUpdateAck),
            Self::DisconnectionRequest => Some(Self::DisconnectionAck),
            _ => None,
        }
    }

    /// Tags a client may legitimately put on the wire.
    ///
    /// `DISCONNECTION_ACK` is included: a client answers the relay's
    /// shutdown-time `DISCONNECTION_REQUEST` with it.
    pub const fn sent_by_client(self) -> bool {
        matches!(self.role(), CommandRole::Request) || matches!(self, Self::DisconnectionAck)
    }

    /// Tags a relay pushes without a pending client request.
    ///
    /// A relay-initiated `DISCONNECTION_REQUEST` belongs here too, but that
    /// depends on context, so the reader decides for that tag.
    pub const fn is_mandate(self) -> bool {
        matches!(self.role(), CommandRole::Mandate)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a line is not a catalog tag.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown command tag: {0}")]
pub struct UnknownCommand(pub String);

impl FromStr for Command {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownCommand(s.to_string()))
    }
}
