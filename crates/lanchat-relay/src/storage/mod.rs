//! `SQLite` storage for the `LanChat` relay.
//!
//! [`RelayDatabase`] holds the raw queries; [`PersistenceGateway`] is what
//! the rest of the relay talks to. It adds readers/writer exclusion on top.

mod db;
mod gateway;
mod models;
mod queries;

#[cfg(test)]
mod tests;

pub use db::RelayDatabase;
pub use gateway::PersistenceGateway;
pub use lanchat_core::db::DatabaseError;
pub use models::{Client, MessageRow};
