//! Grouping of a conversation by the local user's role.

use serde::{Deserialize, Serialize};

use lanchat_proto::{Message, MessageLists};

/// Messages exchanged with one peer, split by who sent them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleGroups {
    /// Sent by the local user to the peer.
    pub as_sender: Vec<Message>,
    /// Received by the local user from the peer.
    pub as_receiver: Vec<Message>,
}

pub fn group_by_role(lists: &MessageLists, peer_id: &str) -> RoleGroups {
    RoleGroups {
        as_sender: lists
            .sent
            .iter()
            .filter(|m| m.receiver_id == peer_id)
            .cloned()
            .collect(),
        as_receiver: lists
            .received
            .iter()
            .filter(|m| m.sender_id == peer_id)
            .cloned()
            .collect(),
    }
}
