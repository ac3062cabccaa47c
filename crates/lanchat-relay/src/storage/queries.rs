//! Database queries for the `LanChat` relay.
//!
//! Every write runs in its own transaction; dropping the transaction on an
//! early `?` return rolls it back.

use lanchat_core::db::{DatabaseError, unix_timestamp};
use lanchat_crypto::PasswordDigest;
use lanchat_proto::{Message, MessageLists};

use super::db::RelayDatabase;
use super::models::{Client, MessageRow};

impl RelayDatabase {
    // =========================================================================
    // Client queries
    // =========================================================================

    /// Insert a new identity. `id` must already be derived.
    pub async fn insert_client(
        &self,
        id: &str,
        username: &str,
        digest: &PasswordDigest,
    ) -> Result<Client, DatabaseError> {
        let now = unix_timestamp();

        let mut tx = self.pool().begin().await?;
        sqlx::query(
            "INSERT INTO clients (id, username, password_hash, password_salt, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(username)
        .bind(&digest.hash)
        .bind(&digest.salt)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(Client {
            id: id.to_string(),
            username: username.to_string(),
            password_hash: digest.hash.clone(),
            password_salt: digest.salt.clone(),
            created_at: now,
        })
    }

    pub async fn list_usernames(&self) -> Result<Vec<String>, DatabaseError> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT username FROM clients ORDER BY username")
            .fetch_all(self.pool())
            .await?;
        Ok(rows.into_iter().map(|(u,)| u).collect())
    }

    pub async fn list_clients(&self) -> Result<Vec<Client>, DatabaseError> {
        let clients = sqlx::query_as::<_, Client>("SELECT * FROM clients ORDER BY username")
            .fetch_all(self.pool())
            .await?;
        Ok(clients)
    }

    pub async fn find_client_by_username(
        &self,
        username: &str,
    ) -> Result<Option<Client>, DatabaseError> {
        let client = sqlx::query_as::<_, Client>("SELECT * FROM clients WHERE username = ?")
            .bind(username)
            .fetch_optional(self.pool())
            .await?;
        Ok(client)
    }

    pub async fn find_client_by_id(&self, id: &str) -> Result<Option<Client>, DatabaseError> {
        let client = sqlx::query_as::<_, Client>("SELECT * FROM clients WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(client)
    }

    /// Delete an identity together with every message it sent or received.
    ///
    /// Returns `false` when no such username exists.
    pub async fn delete_client_by_username(&self, username: &str) -> Result<bool, DatabaseError> {
        let mut tx = self.pool().begin().await?;

        let id: Option<(String,)> = sqlx::query_as("SELECT id FROM clients WHERE username = ?")
            .bind(username)
            .fetch_optional(&mut *tx)
            .await?;
        let Some((id,)) = id else {
            return Ok(false);
        };

        sqlx::query("DELETE FROM messages WHERE sender_id = ? OR receiver_id = ?")
            .bind(&id)
            .bind(&id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM clients WHERE id = ?")
            .bind(&id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(true)
    }

    // =========================================================================
    // Message queries
    // =========================================================================

    /// Persist a message. Timestamp and acknowledgement flags are taken as
    /// given; callers stamp them.
    pub async fn insert_message(&self, message: &Message) -> Result<Message, DatabaseError> {
        let mut tx = self.pool().begin().await?;
        sqlx::query(
            "INSERT INTO messages (sender_id, receiver_id, content, timestamp, sender_acknowledged, receiver_acknowledged) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&message.sender_id)
        .bind(&message.receiver_id)
        .bind(&message.content)
        .bind(message.timestamp)
        .bind(message.sender_acknowledged)
        .bind(message.receiver_acknowledged)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(message.clone())
    }

    pub async fn list_messages(&self) -> Result<Vec<Message>, DatabaseError> {
        let rows = sqlx::query_as::<_, MessageRow>("SELECT * FROM messages ORDER BY timestamp, id")
            .fetch_all(self.pool())
            .await?;
        Ok(rows.into_iter().map(Message::from).collect())
    }

    /// Messages sent and received by `username`, oldest first.
    pub async fn messages_for_username(
        &self,
        username: &str,
    ) -> Result<MessageLists, DatabaseError> {
        let sent = sqlx::query_as::<_, MessageRow>(
            "SELECT m.* FROM messages m JOIN clients c ON c.id = m.sender_id WHERE c.username = ? ORDER BY m.timestamp, m.id",
        )
        .bind(username)
        .fetch_all(self.pool())
        .await?;

        let received = sqlx::query_as::<_, MessageRow>(
            "SELECT m.* FROM messages m JOIN clients c ON c.id = m.receiver_id WHERE c.username = ? ORDER BY m.timestamp, m.id",
        )
        .bind(username)
        .fetch_all(self.pool())
        .await?;

        Ok(MessageLists {
            sent: sent.into_iter().map(Message::from).collect(),
            received: received.into_iter().map(Message::from).collect(),
        })
    }

    /// Delete every message `username` sent or received.
    pub async fn delete_messages_by_username(&self, username: &str) -> Result<u64, DatabaseError> {
        let mut tx = self.pool().begin().await?;
        let result = sqlx::query(
            "DELETE FROM messages WHERE sender_id IN (SELECT id FROM clients WHERE username = ?1) OR receiver_id IN (SELECT id FROM clients WHERE username = ?1)",
        )
        .bind(username)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(result.rows_affected())
    }
}
