//! Data models for relay storage.

use serde::{Deserialize, Serialize};

use lanchat_crypto::PasswordDigest;
use lanchat_proto::{ClientSummary, Message};

/// A stored identity.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Client {
    pub id: String,
    pub username: String,
    pub password_hash: String,
    pub password_salt: String,
    pub created_at: i64,
}

impl Client {
    pub fn digest(&self) -> PasswordDigest {
        PasswordDigest {
            hash: self.password_hash.clone(),
            salt: self.password_salt.clone(),
        }
    }

    pub fn summary(&self, online: bool) -> ClientSummary {
        ClientSummary {
            id: self.id.clone(),
            username: self.username.clone(),
            online,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MessageRow {
    pub id: i64,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    pub timestamp: i64,
    pub sender_acknowledged: bool,
    pub receiver_acknowledged: bool,
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        Self {
            sender_id: row.sender_id,
            receiver_id: row.receiver_id,
            content: row.content,
            timestamp: row.timestamp,
            sender_acknowledged: row.sender_acknowledged,
            receiver_acknowledged: row.receiver_acknowledged,
        }
    }
}
