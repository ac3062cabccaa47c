//! Errors surfaced by the client session engine.

use std::net::SocketAddr;

use lanchat_proto::{ProtocolError, ValidationError};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Login rejected: {0}")]
    Rejected(String),

    #[error("Cannot reach relay at {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("Timed out waiting for the relay")]
    Timeout,

    #[error("Relay closed the connection")]
    Disconnected,

    #[error("Session is closed")]
    Closed,
}

impl From<ValidationError> for SessionError {
    fn from(e: ValidationError) -> Self {
        Self::InvalidInput(e.to_string())
    }
}

impl SessionError {
    /// Whether another attempt on the same connection may succeed.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Protocol(_) | Self::Timeout)
    }
}
