//! Storage layer tests for the `LanChat` relay.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use lanchat_core::db::unix_timestamp;
use lanchat_crypto::PasswordDigest;
use lanchat_proto::Message;

use super::db::RelayDatabase;
use super::gateway::PersistenceGateway;
use lanchat_core::db::DatabaseError;

fn digest() -> PasswordDigest {
    PasswordDigest {
        hash: "aGFzaA==".into(),
        salt: "c2FsdA==".into(),
    }
}

async fn test_gateway() -> PersistenceGateway {
    PersistenceGateway::in_memory().await.unwrap()
}

fn stamped(sender: &str, receiver: &str, content: &str, receiver_ack: bool) -> Message {
    Message {
        timestamp: unix_timestamp(),
        sender_acknowledged: true,
        receiver_acknowledged: receiver_ack,
        ..Message::outgoing(sender, receiver, content)
    }
}

// === Client tests ===

#[tokio::test]
async fn insert_and_poll_client() {
    let gw = test_gateway().await;
    let client = gw.insert_client("id-a", "alice", &digest()).await.unwrap();
    assert_eq!(client.id, "id-a");
    assert_eq!(client.digest(), digest());

    let found = gw.poll_client_by_username("alice").await.unwrap().unwrap();
    assert_eq!(found.id, "id-a");
    assert_eq!(found.password_salt, "c2FsdA==");

    assert!(gw.poll_client_by_username("bob").await.unwrap().is_none());
    assert!(gw.poll_client_by_id("id-a").await.unwrap().is_some());
}

#[tokio::test]
async fn duplicate_username_is_a_constraint_error() {
    let gw = test_gateway().await;
    gw.insert_client("id-a", "alice", &digest()).await.unwrap();

    let err = gw.insert_client("id-b", "alice", &digest()).await.unwrap_err();
    assert!(matches!(err, DatabaseError::Constraint(_)));
    assert_eq!(gw.poll_usernames().await.unwrap(), vec!["alice"]);
}

#[tokio::test]
async fn overlong_username_rejected_by_schema() {
    let gw = test_gateway().await;
    let err = gw
        .insert_client("id-x", &"x".repeat(31), &digest())
        .await
        .unwrap_err();
    assert!(matches!(err, DatabaseError::Constraint(_)));
}

#[tokio::test]
async fn usernames_sorted() {
    let gw = test_gateway().await;
    gw.insert_client("id-c", "carol", &digest()).await.unwrap();
    gw.insert_client("id-a", "alice", &digest()).await.unwrap();
    gw.insert_client("id-b", "bob", &digest()).await.unwrap();

    assert_eq!(
        gw.poll_usernames().await.unwrap(),
        vec!["alice", "bob", "carol"]
    );
    assert_eq!(gw.poll_clients().await.unwrap().len(), 3);
}

// === Message tests ===

#[tokio::test]
async fn sent_and_received_split_by_role() {
    let gw = test_gateway().await;
    gw.insert_client("id-a", "alice", &digest()).await.unwrap();
    gw.insert_client("id-b", "bob", &digest()).await.unwrap();

    gw.insert_message(&stamped("id-a", "id-b", "hi", true))
        .await
        .unwrap();
    gw.insert_message(&stamped("id-b", "id-a", "hey", false))
        .await
        .unwrap();
    gw.insert_message(&stamped("id-a", "id-b", "again", false))
        .await
        .unwrap();

    let alice = gw.poll_sent_and_received("alice").await.unwrap();
    assert_eq!(alice.sent.len(), 2);
    assert_eq!(alice.received.len(), 1);
    assert_eq!(alice.sent[0].content, "hi");
    assert!(alice.sent[0].receiver_acknowledged);
    assert_eq!(alice.sent[1].content, "again");
    assert!(!alice.received[0].receiver_acknowledged);

    let bob = gw.poll_sent_and_received("bob").await.unwrap();
    assert_eq!(bob.sent.len(), 1);
    assert_eq!(bob.received.len(), 2);

    assert_eq!(gw.poll_messages().await.unwrap().len(), 3);
}

#[tokio::test]
async fn message_to_unknown_receiver_is_rejected() {
    let gw = test_gateway().await;
    gw.insert_client("id-a", "alice", &digest()).await.unwrap();

    let err = gw
        .insert_message(&stamped("id-a", "ghost", "hi", false))
        .await
        .unwrap_err();
    assert!(matches!(err, DatabaseError::Constraint(_)));
    assert!(gw.poll_messages().await.unwrap().is_empty());
}

#[tokio::test]
async fn empty_content_rejected_by_schema() {
    let gw = test_gateway().await;
    gw.insert_client("id-a", "alice", &digest()).await.unwrap();
    gw.insert_client("id-b", "bob", &digest()).await.unwrap();

    let err = gw
        .insert_message(&stamped("id-a", "id-b", "", false))
        .await
        .unwrap_err();
    assert!(matches!(err, DatabaseError::Constraint(_)));
}

#[tokio::test]
async fn unknown_user_has_empty_history() {
    let gw = test_gateway().await;
    let lists = gw.poll_sent_and_received("nobody").await.unwrap();
    assert!(lists.sent.is_empty());
    assert!(lists.received.is_empty());
}

// === Delete tests ===

#[tokio::test]
async fn delete_client_removes_its_messages() {
    let gw = test_gateway().await;
    gw.insert_client("id-a", "alice", &digest()).await.unwrap();
    gw.insert_client("id-b", "bob", &digest()).await.unwrap();
    gw.insert_client("id-c", "carol", &digest()).await.unwrap();
    gw.insert_message(&stamped("id-a", "id-b", "1", true))
        .await
        .unwrap();
    gw.insert_message(&stamped("id-b", "id-a", "2", true))
        .await
        .unwrap();
    gw.insert_message(&stamped("id-b", "id-c", "3", true))
        .await
        .unwrap();

    assert!(gw.delete_client_by_username("alice").await.unwrap());
    assert!(!gw.delete_client_by_username("alice").await.unwrap());

    assert!(gw.poll_client_by_username("alice").await.unwrap().is_none());
    let remaining = gw.poll_messages().await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].content, "3");
}

#[tokio::test]
async fn delete_messages_keeps_identity() {
    let gw = test_gateway().await;
    gw.insert_client("id-a", "alice", &digest()).await.unwrap();
    gw.insert_client("id-b", "bob", &digest()).await.unwrap();
    gw.insert_message(&stamped("id-a", "id-b", "1", true))
        .await
        .unwrap();
    gw.insert_message(&stamped("id-b", "id-a", "2", true))
        .await
        .unwrap();

    assert_eq!(gw.delete_messages_by_username("alice").await.unwrap(), 2);
    assert!(gw.poll_messages().await.unwrap().is_empty());
    assert!(gw.poll_client_by_username("alice").await.unwrap().is_some());
    assert_eq!(gw.delete_messages_by_username("alice").await.unwrap(), 0);
}

// === Exclusion tests ===

#[tokio::test]
async fn writer_waits_for_readers_but_readers_share() {
    let gw = test_gateway().await;
    let gate = gw.gate();
    let held = gate.read().await;

    // A second reader is not blocked by the first.
    let polled = tokio::time::timeout(Duration::from_secs(1), gw.poll_usernames()).await;
    assert!(polled.is_ok());

    let writer = {
        let gw = gw.clone();
        tokio::spawn(async move { gw.insert_client("id-a", "alice", &digest()).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!writer.is_finished());

    drop(held);
    writer.await.unwrap().unwrap();
    assert_eq!(gw.poll_usernames().await.unwrap(), vec!["alice"]);
}

#[tokio::test]
async fn readers_wait_for_writer() {
    let gw = test_gateway().await;
    let gate = gw.gate();
    let held = gate.write().await;

    let reader = {
        let gw = gw.clone();
        tokio::spawn(async move { gw.poll_usernames().await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!reader.is_finished());

    drop(held);
    assert!(reader.await.unwrap().unwrap().is_empty());
}

// === File-backed database ===

#[tokio::test]
async fn data_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("relay.db");

    let db = RelayDatabase::open(&path).await.unwrap();
    PersistenceGateway::new(db.clone())
        .insert_client("id-a", "alice", &digest())
        .await
        .unwrap();
    db.close().await;

    let gw = PersistenceGateway::new(RelayDatabase::open(&path).await.unwrap());
    assert_eq!(gw.poll_usernames().await.unwrap(), vec!["alice"]);
    gw.close().await;
}
