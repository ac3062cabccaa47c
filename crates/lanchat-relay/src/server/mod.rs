//! Relay-side connection handling and administration.

pub mod admin;
pub mod console;
mod handler;
mod handshake;
mod listener;

#[cfg(test)]
mod handler_tests;

pub use admin::{AdminError, AdminService};
pub use handler::{ConnectionHandler, handle_connection};
pub use listener::RelayServer;

use lanchat_proto::ProtocolError;

use crate::registry::ConnectionRegistry;
use crate::storage::{DatabaseError, PersistenceGateway};

/// Shared state handed to every connection task.
#[derive(Clone)]
pub struct RelayState {
    pub gateway: PersistenceGateway,
    pub registry: ConnectionRegistry,
}

impl RelayState {
    pub fn new(gateway: PersistenceGateway) -> Self {
        Self {
            gateway,
            registry: ConnectionRegistry::new(),
        }
    }
}

/// Why a connection task stopped serving or skipped a request.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("Handshake rejected: {0}")]
    Rejected(String),

    #[error("Storage error: {0}")]
    Storage(#[from] DatabaseError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl HandlerError {
    /// Whether the connection must be torn down.
    pub const fn is_fatal(&self) -> bool {
        match self {
            Self::Protocol(e) => e.is_fatal(),
            Self::Rejected(_) | Self::Internal(_) => true,
            Self::Storage(_) => false,
        }
    }
}
