//! Connection handler tests over in-memory duplex streams.

#![allow(clippy::unwrap_used)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use lanchat_proto::{
    AuthResponse, BroadcastReceipt, ClientSummary, Command, Credentials, Frame, FrameReader,
    FrameWriter, MAX_FRAME_BYTES, Message, MessageLists,
};

use super::admin::{self, AdminService, join};
use super::handler::{ConnectionHandler, Flow, handle_connection};
use super::RelayState;
use crate::registry::ClientConnection;
use crate::storage::PersistenceGateway;

fn peer() -> SocketAddr {
    "127.0.0.1:40000".parse().unwrap()
}

async fn relay_with(users: &[(&str, &str)]) -> RelayState {
    let state = RelayState::new(PersistenceGateway::in_memory().await.unwrap());
    for (username, password) in users {
        admin::create_account(&state.gateway, username, password)
            .await
            .unwrap();
    }
    state
}

struct TestClient {
    reader: FrameReader,
    writer: FrameWriter,
    identifier: String,
}

impl TestClient {
    fn connect(state: &RelayState) -> Self {
        Self::connect_with_limit(state, MAX_FRAME_BYTES)
    }

    fn connect_with_limit(state: &RelayState, max_frame_bytes: usize) -> Self {
        let (client, server) = tokio::io::duplex(64 * 1024);
        tokio::spawn(handle_connection(
            state.clone(),
            server,
            peer(),
            max_frame_bytes,
            CancellationToken::new(),
        ));
        let (rd, wr) = tokio::io::split(client);
        Self {
            reader: FrameReader::new(rd),
            writer: FrameWriter::new(wr),
            identifier: String::new(),
        }
    }

    async fn handshake(&mut self, username: &str, password: &str) -> AuthResponse {
        self.writer.send_command(Command::AuthRequest).await.unwrap();
        self.reader
            .expect_command(Command::AuthRequestAck)
            .await
            .unwrap();
        self.writer
            .send_payload(&Credentials::new(username, password))
            .await
            .unwrap();
        self.reader.read_payload().await.unwrap()
    }

    async fn login(state: &RelayState, username: &str, password: &str) -> Self {
        let mut client = Self::connect(state);
        let response = client.handshake(username, password).await;
        assert!(response.success, "{username} rejected: {response:?}");
        client.identifier = client.reader.read_payload().await.unwrap();
        client
    }

    /// Next frame that is not a relay push.
    async fn reply(&mut self) -> Frame {
        loop {
            match self.reader.read_frame().await.unwrap() {
                Frame::Command(cmd) if cmd.is_mandate() => {}
                frame => return frame,
            }
        }
    }

    async fn expect_reply(&mut self, cmd: Command) {
        assert_eq!(self.reply().await, Frame::Command(cmd));
    }

    async fn wait_for_mandate(&mut self, wanted: Command) {
        let wait = async {
            loop {
                if let Frame::Command(cmd) = self.reader.read_frame().await.unwrap() {
                    if cmd == wanted {
                        return;
                    }
                }
            }
        };
        tokio::time::timeout(Duration::from_secs(5), wait)
            .await
            .unwrap();
    }

    async fn send(&mut self, message: &Message) -> BroadcastReceipt {
        self.writer
            .send_command(Command::MessageBroadcastRequest)
            .await
            .unwrap();
        self.expect_reply(Command::MessageBroadcastAck).await;
        self.writer.send_payload(message).await.unwrap();
        self.reply().await.decode().unwrap()
    }

    /// Read until the relay closes the stream.
    async fn expect_closed(&mut self) {
        let drain = async {
            while self.reader.next_frame().await.unwrap_or(None).is_some() {}
        };
        tokio::time::timeout(Duration::from_secs(5), drain)
            .await
            .unwrap();
    }
}

async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

fn assert_send<T: Send>(_: &T) {}

// === Handshake ===

#[tokio::test]
async fn connection_future_can_be_spawned() {
    let state = relay_with(&[]).await;
    let (_client, server) = tokio::io::duplex(1024);
    let task = handle_connection(
        state,
        server,
        peer(),
        MAX_FRAME_BYTES,
        CancellationToken::new(),
    );
    assert_send(&task);
}

#[tokio::test]
async fn handshake_registers_stored_identifier() {
    let state = relay_with(&[("alice", "pw1")]).await;
    let alice = TestClient::login(&state, "alice", "pw1").await;

    let stored = state
        .gateway
        .poll_client_by_username("alice")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(alice.identifier, stored.id);
    assert!(state.registry.is_connected(&stored.id).await);
    assert_eq!(
        state.registry.get_by_username("alice").await.unwrap().identifier,
        stored.id
    );
}

#[tokio::test]
async fn wrong_password_is_rejected_and_not_registered() {
    let state = relay_with(&[("alice", "pw1")]).await;
    let mut client = TestClient::connect(&state);

    let response = client.handshake("alice", "nope").await;
    assert_eq!(response, AuthResponse::rejected("invalid credentials"));
    client.expect_closed().await;

    assert_eq!(state.registry.connection_count().await, 0);
    assert_eq!(state.registry.broadcast(Command::ShutdownMandate).await, 0);
}

#[tokio::test]
async fn unknown_user_gets_same_rejection() {
    let state = relay_with(&[("alice", "pw1")]).await;
    let mut client = TestClient::connect(&state);

    let response = client.handshake("mallory", "pw1").await;
    assert_eq!(response.reason.as_deref(), Some("invalid credentials"));
    client.expect_closed().await;
}

#[tokio::test]
async fn malformed_credentials_are_rejected() {
    let state = relay_with(&[("alice", "pw1")]).await;
    let mut client = TestClient::connect(&state);

    client.writer.send_command(Command::AuthRequest).await.unwrap();
    client
        .reader
        .expect_command(Command::AuthRequestAck)
        .await
        .unwrap();
    client
        .writer
        .send_payload(&serde_json::json!({"user": "alice"}))
        .await
        .unwrap();

    let response: AuthResponse = client.reader.read_payload().await.unwrap();
    assert_eq!(response.reason.as_deref(), Some("malformed credentials"));
    client.expect_closed().await;
}

#[tokio::test]
async fn first_frame_must_be_auth_request() {
    let state = relay_with(&[("alice", "pw1")]).await;
    let mut client = TestClient::connect(&state);

    client
        .writer
        .send_command(Command::ClientListUpdateRequest)
        .await
        .unwrap();
    client.expect_closed().await;
    assert_eq!(state.registry.connection_count().await, 0);
}

#[tokio::test]
async fn oversized_frame_drops_connection() {
    let state = relay_with(&[("alice", "pw1")]).await;
    let mut client = TestClient::connect_with_limit(&state, 64);

    client.writer.send_command(Command::AuthRequest).await.unwrap();
    client
        .reader
        .expect_command(Command::AuthRequestAck)
        .await
        .unwrap();
    client
        .writer
        .send_payload(&Credentials::new("alice", "p".repeat(200)))
        .await
        .unwrap();
    client.expect_closed().await;
    assert_eq!(state.registry.connection_count().await, 0);
}

#[tokio::test]
async fn second_login_for_connected_user_is_refused() {
    let state = relay_with(&[("alice", "pw1")]).await;
    let _first = TestClient::login(&state, "alice", "pw1").await;

    let mut second = TestClient::connect(&state);
    let response = second.handshake("alice", "pw1").await;
    assert_eq!(response.reason.as_deref(), Some("already connected"));
    second.expect_closed().await;
    assert_eq!(state.registry.connection_count().await, 1);
}

#[tokio::test]
async fn login_pushes_client_list_mandate_to_others() {
    let state = relay_with(&[("alice", "pw1"), ("bob", "pw2")]).await;
    let mut alice = TestClient::login(&state, "alice", "pw1").await;
    alice.wait_for_mandate(Command::ClientListUpdateMandate).await;

    let _bob = TestClient::login(&state, "bob", "pw2").await;
    alice.wait_for_mandate(Command::ClientListUpdateMandate).await;
}

// === Message relay ===

#[tokio::test]
async fn message_to_connected_receiver_is_acknowledged() {
    let state = relay_with(&[("alice", "pw1"), ("bob", "pw2")]).await;
    let mut alice = TestClient::login(&state, "alice", "pw1").await;
    let mut bob = TestClient::login(&state, "bob", "pw2").await;

    let receipt = alice
        .send(&Message::outgoing(&alice.identifier, &bob.identifier, "hi"))
        .await;
    assert_eq!(
        receipt,
        BroadcastReceipt {
            stored: true,
            receiver_acknowledged: true
        }
    );
    bob.wait_for_mandate(Command::MessageListUpdateMandate).await;
    alice.wait_for_mandate(Command::MessageListUpdateMandate).await;

    let stored = state.gateway.poll_messages().await.unwrap();
    assert_eq!(stored.len(), 1);
    assert!(stored[0].sender_acknowledged);
    assert!(stored[0].receiver_acknowledged);
    assert!(stored[0].timestamp > 0);
}

#[tokio::test]
async fn message_to_offline_receiver_is_stored_unacknowledged() {
    let state = relay_with(&[("alice", "pw1"), ("bob", "pw2")]).await;
    let bob_id = state
        .gateway
        .poll_client_by_username("bob")
        .await
        .unwrap()
        .unwrap()
        .id;
    let mut alice = TestClient::login(&state, "alice", "pw1").await;

    let receipt = alice
        .send(&Message::outgoing(&alice.identifier, &bob_id, "hi2"))
        .await;
    assert!(receipt.stored);
    assert!(!receipt.receiver_acknowledged);

    let stored = state.gateway.poll_messages().await.unwrap();
    assert_eq!(stored.len(), 1);
    assert!(!stored[0].receiver_acknowledged);
}

#[tokio::test]
async fn invalid_messages_are_refused_without_dropping_connection() {
    let state = relay_with(&[("alice", "pw1"), ("bob", "pw2")]).await;
    let mut alice = TestClient::login(&state, "alice", "pw1").await;
    let bob = TestClient::login(&state, "bob", "pw2").await;
    let me = alice.identifier.clone();

    let refused = [
        Message::outgoing(&bob.identifier, &me, "spoofed sender"),
        Message::outgoing(&me, &me, "to myself"),
        Message::outgoing(&me, "no-such-id", "unknown receiver"),
        Message::outgoing(&me, &bob.identifier, ""),
        Message::outgoing(&me, &bob.identifier, "x".repeat(1025)),
    ];
    for message in &refused {
        assert_eq!(alice.send(message).await, BroadcastReceipt::rejected());
    }
    assert!(state.gateway.poll_messages().await.unwrap().is_empty());

    let ok = alice
        .send(&Message::outgoing(&me, &bob.identifier, "x".repeat(1024)))
        .await;
    assert!(ok.stored);
}

#[tokio::test]
async fn unreadable_message_payload_gets_rejected_receipt() {
    let state = relay_with(&[("alice", "pw1")]).await;
    let mut alice = TestClient::login(&state, "alice", "pw1").await;

    alice
        .writer
        .send_command(Command::MessageBroadcastRequest)
        .await
        .unwrap();
    alice.expect_reply(Command::MessageBroadcastAck).await;
    alice.writer.send_payload(&[1, 2, 3]).await.unwrap();
    let receipt: BroadcastReceipt = alice.reply().await.decode().unwrap();
    assert!(!receipt.stored);
}

// === Lists ===

#[tokio::test]
async fn client_list_marks_online_identities() {
    let state = relay_with(&[("alice", "pw1"), ("bob", "pw2"), ("carol", "pw3")]).await;
    let mut alice = TestClient::login(&state, "alice", "pw1").await;
    let _bob = TestClient::login(&state, "bob", "pw2").await;

    alice
        .writer
        .send_command(Command::ClientListUpdateRequest)
        .await
        .unwrap();
    alice.expect_reply(Command::ClientListUpdateAck).await;
    let list: Vec<ClientSummary> = alice.reply().await.decode().unwrap();

    let online: Vec<(&str, bool)> = list
        .iter()
        .map(|c| (c.username.as_str(), c.online))
        .collect();
    assert_eq!(
        online,
        vec![("alice", true), ("bob", true), ("carol", false)]
    );
}

#[tokio::test]
async fn message_lists_split_by_role() {
    let state = relay_with(&[("alice", "pw1"), ("bob", "pw2")]).await;
    let mut alice = TestClient::login(&state, "alice", "pw1").await;
    let mut bob = TestClient::login(&state, "bob", "pw2").await;

    alice
        .send(&Message::outgoing(&alice.identifier, &bob.identifier, "a->b"))
        .await;
    bob.send(&Message::outgoing(&bob.identifier, &alice.identifier, "b->a"))
        .await;

    alice
        .writer
        .send_command(Command::MessageListUpdateRequest)
        .await
        .unwrap();
    alice.expect_reply(Command::MessageListUpdateAck).await;
    let lists: MessageLists = alice.reply().await.decode().unwrap();

    assert_eq!(lists.sent.len(), 1);
    assert_eq!(lists.sent[0].content, "a->b");
    assert_eq!(lists.received.len(), 1);
    assert_eq!(lists.received[0].content, "b->a");
}

#[tokio::test]
async fn list_storage_failure_sends_null_body() {
    let state = relay_with(&[("alice", "pw1")]).await;
    let mut alice = TestClient::login(&state, "alice", "pw1").await;
    state.gateway.close().await;

    alice
        .writer
        .send_command(Command::ClientListUpdateRequest)
        .await
        .unwrap();
    alice.expect_reply(Command::ClientListUpdateAck).await;
    let body = alice.reply().await;
    assert_eq!(body, Frame::Payload("null".into()));
    assert!(body.decode::<Vec<ClientSummary>>().is_err());
}

// === Stray frames ===

#[tokio::test]
async fn stray_frames_are_ignored() {
    let state = relay_with(&[("alice", "pw1")]).await;
    let mut alice = TestClient::login(&state, "alice", "pw1").await;

    alice.writer.send_payload(&"stray").await.unwrap();
    alice
        .writer
        .send_command(Command::ClientListUpdateAck)
        .await
        .unwrap();
    alice
        .writer
        .send_command(Command::MessageListUpdateRequest)
        .await
        .unwrap();
    alice.expect_reply(Command::MessageListUpdateAck).await;
    let lists: MessageLists = alice.reply().await.decode().unwrap();
    assert_eq!(lists, MessageLists::default());
}

#[tokio::test]
async fn unknown_line_keeps_handler_running() {
    let state = relay_with(&[]).await;
    let (a, _b) = tokio::io::duplex(1024);
    let (_c, d) = tokio::io::duplex(1024);
    let conn = Arc::new(ClientConnection::new(
        "id".into(),
        "alice".into(),
        FrameWriter::new(a),
    ));
    let mut handler = ConnectionHandler::new(state, conn, FrameReader::new(d));

    let flow = handler
        .handle_incoming(Frame::parse("HELLO_RELAY"))
        .await
        .unwrap();
    assert_eq!(flow, Flow::Continue);
    let flow = handler
        .handle_incoming(Frame::Command(Command::ShutdownMandate))
        .await
        .unwrap();
    assert_eq!(flow, Flow::Continue);
    let flow = handler
        .handle_incoming(Frame::Command(Command::DisconnectionAck))
        .await
        .unwrap();
    assert_eq!(flow, Flow::Disconnect);
}

// === Disconnect and deletion ===

#[tokio::test]
async fn disconnect_acks_and_deregisters() {
    let state = relay_with(&[("alice", "pw1")]).await;
    let mut alice = TestClient::login(&state, "alice", "pw1").await;

    alice
        .writer
        .send_command(Command::DisconnectionRequest)
        .await
        .unwrap();
    alice.expect_reply(Command::DisconnectionAck).await;
    alice.expect_closed().await;

    let registry = state.registry.clone();
    eventually(|| {
        let registry = registry.clone();
        async move { registry.connection_count().await == 0 }
    })
    .await;
    assert!(state.registry.get_by_username("alice").await.is_none());
}

#[tokio::test]
async fn dropped_stream_deregisters() {
    let state = relay_with(&[("alice", "pw1")]).await;
    let alice = TestClient::login(&state, "alice", "pw1").await;
    drop(alice);

    let registry = state.registry.clone();
    eventually(|| {
        let registry = registry.clone();
        async move { registry.connection_count().await == 0 }
    })
    .await;
}

#[tokio::test]
async fn deleting_connected_user_closes_connection_first() {
    let state = relay_with(&[("alice", "pw1"), ("bob", "pw2")]).await;
    let admin = AdminService::new(state.clone());
    let mut alice = TestClient::login(&state, "alice", "pw1").await;
    let mut bob = TestClient::login(&state, "bob", "pw2").await;

    join(admin.delete_account("alice".into())).await.unwrap();

    assert!(state.registry.get_by_username("alice").await.is_none());
    assert!(!state.registry.is_connected(&alice.identifier).await);
    assert!(
        state
            .gateway
            .poll_client_by_username("alice")
            .await
            .unwrap()
            .is_none()
    );
    alice.expect_closed().await;
    bob.wait_for_mandate(Command::ClientListUpdateMandate).await;
}

#[tokio::test]
async fn account_deleted_during_login_is_not_registered() {
    let state = relay_with(&[("alice", "pw1")]).await;
    let admin = AdminService::new(state.clone());
    let mut alice = TestClient::connect(&state);

    alice.writer.send_command(Command::AuthRequest).await.unwrap();
    alice
        .reader
        .expect_command(Command::AuthRequestAck)
        .await
        .unwrap();
    alice
        .writer
        .send_payload(&Credentials::new("alice", "pw1"))
        .await
        .unwrap();
    // Land the deletion while the password is being verified.
    tokio::time::sleep(Duration::from_millis(5)).await;
    join(admin.delete_account("alice".into())).await.unwrap();

    let _response: AuthResponse = alice.reader.read_payload().await.unwrap();
    alice.expect_closed().await;

    let registry = state.registry.clone();
    eventually(|| {
        let registry = registry.clone();
        async move { registry.connection_count().await == 0 }
    })
    .await;
    assert!(state.registry.get_by_username("alice").await.is_none());
    assert!(
        state
            .gateway
            .poll_client_by_username("alice")
            .await
            .unwrap()
            .is_none()
    );
}
