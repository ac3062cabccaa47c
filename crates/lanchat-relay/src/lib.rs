//! `LanChat` Relay Library
//!
//! Core functionality for the `LanChat` relay:
//! - `SQLite` storage behind a readers/writer persistence gateway
//! - Connection registry keyed by identifier and username
//! - Handshake, per-connection dispatch and relay pushes
//! - Account administration and the operator console

pub mod registry;
pub mod server;
pub mod storage;
