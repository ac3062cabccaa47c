//! `SQLite` database for the `LanChat` relay.

lanchat_core::define_database!(RelayDatabase, "Relay database migrations complete");
