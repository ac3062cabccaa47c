//! In-memory registry of authenticated connections.

mod connection;

pub use connection::{ClientConnection, ConnectionRegistry, RegistryError};
