//! Readers/writer gate in front of the relay database.
//!
//! Any number of polls run concurrently. An insert or delete takes the gate
//! exclusively, so it waits for in-flight polls and holds off new polls and
//! writes until its transaction commits or rolls back.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};

use lanchat_core::db::DatabaseError;
use lanchat_crypto::PasswordDigest;
use lanchat_proto::{Message, MessageLists};

use super::db::RelayDatabase;
use super::models::Client;

#[derive(Clone)]
pub struct PersistenceGateway {
    db: RelayDatabase,
    gate: Arc<RwLock<()>>,
}

impl PersistenceGateway {
    pub fn new(db: RelayDatabase) -> Self {
        Self {
            db,
            gate: Arc::new(RwLock::new(())),
        }
    }

    /// Gateway over a fresh in-memory database (for testing).
    pub async fn in_memory() -> Result<Self, DatabaseError> {
        Ok(Self::new(RelayDatabase::open_in_memory().await?))
    }

    // -------------------------------------------------------------------------
    // Polls
    // -------------------------------------------------------------------------

    pub async fn poll_usernames(&self) -> Result<Vec<String>, DatabaseError> {
        let _read = self.gate.read().await;
        self.db.list_usernames().await
    }

    pub async fn poll_clients(&self) -> Result<Vec<Client>, DatabaseError> {
        let _read = self.gate.read().await;
        self.db.list_clients().await
    }

    pub async fn poll_client_by_username(
        &self,
        username: &str,
    ) -> Result<Option<Client>, DatabaseError> {
        let _read = self.gate.read().await;
        self.db.find_client_by_username(username).await
    }

    pub async fn poll_client_by_id(&self, id: &str) -> Result<Option<Client>, DatabaseError> {
        let _read = self.gate.read().await;
        self.db.find_client_by_id(id).await
    }

    pub async fn poll_messages(&self) -> Result<Vec<Message>, DatabaseError> {
        let _read = self.gate.read().await;
        self.db.list_messages().await
    }

    /// Both halves come from one read section, so no write lands between them.
    pub async fn poll_sent_and_received(
        &self,
        username: &str,
    ) -> Result<MessageLists, DatabaseError> {
        let _read = self.gate.read().await;
        self.db.messages_for_username(username).await
    }

    // -------------------------------------------------------------------------
    // Writes
    // -------------------------------------------------------------------------

    pub async fn insert_client(
        &self,
        id: &str,
        username: &str,
        digest: &PasswordDigest,
    ) -> Result<Client, DatabaseError> {
        let _write = self.gate.write().await;
        let client = self.db.insert_client(id, username, digest).await?;
        info!(username = %username, "Client inserted");
        Ok(client)
    }

    pub async fn insert_message(&self, message: &Message) -> Result<Message, DatabaseError> {
        let _write = self.gate.write().await;
        let stored = self.db.insert_message(message).await?;
        debug!(
            sender_id = %stored.sender_id,
            receiver_id = %stored.receiver_id,
            receiver_acknowledged = stored.receiver_acknowledged,
            "Message inserted"
        );
        Ok(stored)
    }

    pub async fn delete_client_by_username(&self, username: &str) -> Result<bool, DatabaseError> {
        let _write = self.gate.write().await;
        let deleted = self.db.delete_client_by_username(username).await?;
        if deleted {
            info!(username = %username, "Client deleted");
        }
        Ok(deleted)
    }

    pub async fn delete_messages_by_username(&self, username: &str) -> Result<u64, DatabaseError> {
        let _write = self.gate.write().await;
        let removed = self.db.delete_messages_by_username(username).await?;
        info!(username = %username, removed, "Messages deleted");
        Ok(removed)
    }

    #[cfg(test)]
    pub(crate) fn gate(&self) -> Arc<RwLock<()>> {
        Arc::clone(&self.gate)
    }

    /// Wait for in-flight operations, then close the storage handle.
    pub async fn close(&self) {
        let _write = self.gate.write().await;
        self.db.close().await;
        info!("Relay database closed");
    }
}
