//! Structured records that follow a tag on the wire.

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Handshake credentials. The password is wiped when the value drops.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Outcome of a handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl AuthResponse {
    pub const fn accepted() -> Self {
        Self {
            success: true,
            reason: None,
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            reason: Some(reason.into()),
        }
    }
}

/// Public view of an identity. Never carries credential material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSummary {
    pub id: String,
    pub username: String,
    /// Whether the identity had a registered connection when the list was built.
    #[serde(default)]
    pub online: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    /// Unix seconds, stamped by the relay on insert.
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub sender_acknowledged: bool,
    #[serde(default)]
    pub receiver_acknowledged: bool,
}

impl Message {
    /// A message as a client submits it; the relay fills in the rest.
    pub fn outgoing(
        sender_id: impl Into<String>,
        receiver_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            sender_id: sender_id.into(),
            receiver_id: receiver_id.into(),
            content: content.into(),
            timestamp: 0,
            sender_acknowledged: false,
            receiver_acknowledged: false,
        }
    }
}

/// A user's history split by role, serialized as `{"sent": [...], "received": [...]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageLists {
    pub sent: Vec<Message>,
    pub received: Vec<Message>,
}

/// Relay's answer to a submitted message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastReceipt {
    pub stored: bool,
    pub receiver_acknowledged: bool,
}

impl BroadcastReceipt {
    pub const fn rejected() -> Self {
        Self {
            stored: false,
            receiver_acknowledged: false,
        }
    }
}
