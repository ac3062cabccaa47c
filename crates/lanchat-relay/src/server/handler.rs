//! Per-connection read loop and request dispatch.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use lanchat_core::db::unix_timestamp;
use lanchat_proto::{
    BroadcastReceipt, ClientSummary, Command, Frame, FrameReader, FrameWriter, Message,
    ProtocolError, validate_content,
};

use super::{HandlerError, RelayState, handshake};
use crate::registry::ClientConnection;

/// What the read loop does after a frame has been handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Disconnect,
}

/// Serve one accepted stream from handshake to close.
///
/// `shutdown` only interrupts the handshake; an authenticated connection is
/// stopped by closing it through the registry.
#[instrument(skip(state, stream, shutdown), fields(peer = %peer))]
pub async fn handle_connection<S>(
    state: RelayState,
    stream: S,
    peer: SocketAddr,
    max_frame_bytes: usize,
    shutdown: CancellationToken,
) where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let (rd, wr) = tokio::io::split(stream);
    let mut reader = FrameReader::with_max_length(rd, max_frame_bytes);
    let writer = FrameWriter::new(wr);

    let conn = tokio::select! {
        () = shutdown.cancelled() => {
            debug!("Shutdown during handshake");
            return;
        }
        result = handshake::authenticate(&state, &mut reader, writer) => match result {
            Ok(conn) => conn,
            Err(e) => {
                info!(error = %e, "Handshake failed");
                return;
            }
        },
    };

    state.registry.broadcast(Command::ClientListUpdateMandate).await;
    ConnectionHandler::new(state, conn, reader).run().await;
}

/// The `ACTIVE` phase of an authenticated connection.
pub struct ConnectionHandler {
    state: RelayState,
    conn: Arc<ClientConnection>,
    reader: FrameReader,
}

impl ConnectionHandler {
    pub fn new(state: RelayState, conn: Arc<ClientConnection>, reader: FrameReader) -> Self {
        Self {
            state,
            conn,
            reader,
        }
    }

    /// Read and dispatch frames until the client disconnects, the stream
    /// fails, or the connection is closed from elsewhere.
    pub async fn run(mut self) {
        loop {
            let next = tokio::select! {
                () = self.conn.closed() => break,
                next = self.reader.next_frame() => next,
            };
            let frame = match next {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    debug!(username = %self.conn.username, "Peer closed the stream");
                    break;
                }
                Err(e) => {
                    warn!(username = %self.conn.username, error = %e, "Read failed");
                    break;
                }
            };
            match self.handle_incoming(frame).await {
                Ok(Flow::Continue) => {}
                Ok(Flow::Disconnect) => break,
                Err(e) if e.is_fatal() => {
                    warn!(username = %self.conn.username, error = %e, "Dropping connection");
                    break;
                }
                Err(e) => {
                    warn!(username = %self.conn.username, error = %e, "Request failed");
                }
            }
        }
        self.finish().await;
    }

    /// Dispatch one frame read off the wire. Never used for relay pushes;
    /// those go through [`ClientConnection::push_to_client`].
    pub(crate) async fn handle_incoming(&mut self, frame: Frame) -> Result<Flow, HandlerError> {
        let cmd = match frame {
            Frame::Command(cmd) => cmd,
            other => {
                warn!(
                    username = %self.conn.username,
                    frame = %other.describe(),
                    "Ignoring frame outside a request"
                );
                return Ok(Flow::Continue);
            }
        };
        if !cmd.sent_by_client() {
            warn!(username = %self.conn.username, command = %cmd, "Ignoring relay-only command");
            return Ok(Flow::Continue);
        }
        match cmd {
            Command::MessageBroadcastRequest => self.relay_message().await,
            Command::ClientListUpdateRequest => self.send_client_list().await,
            Command::MessageListUpdateRequest => self.send_message_lists().await,
            Command::DisconnectionRequest => {
                self.conn
                    .lock_writer()
                    .await
                    .send_command(Command::DisconnectionAck)
                    .await?;
                info!(username = %self.conn.username, "Client requested disconnect");
                Ok(Flow::Disconnect)
            }
            // Reply to a relay-initiated DISCONNECTION_REQUEST.
            Command::DisconnectionAck => Ok(Flow::Disconnect),
            other => {
                warn!(username = %self.conn.username, command = %other, "Ignoring unexpected command");
                Ok(Flow::Continue)
            }
        }
    }

    /// Read the next frame of an in-flight request, giving up if the
    /// connection is closed meanwhile.
    async fn read_in_request(&mut self) -> Result<Frame, ProtocolError> {
        tokio::select! {
            () = self.conn.closed() => Err(ProtocolError::Closed),
            frame = self.reader.read_frame() => frame,
        }
    }

    async fn relay_message(&mut self) -> Result<Flow, HandlerError> {
        self.conn
            .lock_writer()
            .await
            .send_command(Command::MessageBroadcastAck)
            .await?;

        let frame = self.read_in_request().await?;
        let message: Message = match frame.decode() {
            Ok(m) => m,
            Err(e) => {
                warn!(username = %self.conn.username, error = %e, "Unreadable message");
                self.send_receipt(BroadcastReceipt::rejected()).await?;
                return Ok(Flow::Continue);
            }
        };

        if let Err(reason) = self.check_message(&message).await {
            warn!(username = %self.conn.username, reason = %reason, "Message refused");
            self.send_receipt(BroadcastReceipt::rejected()).await?;
            return Ok(Flow::Continue);
        }

        let receiver_online = self.state.registry.is_connected(&message.receiver_id).await;
        let stamped = Message {
            timestamp: unix_timestamp(),
            sender_acknowledged: true,
            receiver_acknowledged: receiver_online,
            ..message
        };

        let stored = match self.state.gateway.insert_message(&stamped).await {
            Ok(stored) => stored,
            Err(e) => {
                self.send_receipt(BroadcastReceipt::rejected()).await?;
                return Err(e.into());
            }
        };
        self.send_receipt(BroadcastReceipt {
            stored: true,
            receiver_acknowledged: stored.receiver_acknowledged,
        })
        .await?;

        if let Err(e) = self
            .conn
            .push_to_client(Command::MessageListUpdateMandate)
            .await
        {
            debug!(username = %self.conn.username, error = %e, "Push to sender failed");
        }
        if receiver_online {
            self.state
                .registry
                .push_to(&stored.receiver_id, Command::MessageListUpdateMandate)
                .await;
        }
        Ok(Flow::Continue)
    }

    async fn check_message(&mut self, message: &Message) -> Result<(), String> {
        if message.sender_id != self.conn.identifier {
            return Err("sender does not match session".to_string());
        }
        if message.receiver_id == message.sender_id {
            return Err("receiver equals sender".to_string());
        }
        validate_content(&message.content).map_err(|e| e.to_string())?;
        match self.state.gateway.poll_client_by_id(&message.receiver_id).await {
            Ok(Some(_)) => Ok(()),
            Ok(None) => Err("unknown receiver".to_string()),
            Err(e) => Err(e.to_string()),
        }
    }

    async fn send_receipt(&mut self, receipt: BroadcastReceipt) -> Result<(), ProtocolError> {
        self.conn.lock_writer().await.send_payload(&receipt).await
    }

    async fn send_client_list(&mut self) -> Result<Flow, HandlerError> {
        let listed = self.state.gateway.poll_clients().await;
        let online = self.state.registry.connected_identifiers().await;

        let mut writer = self.conn.lock_writer().await;
        writer.send_command(Command::ClientListUpdateAck).await?;
        match listed {
            Ok(clients) => {
                let summaries: Vec<ClientSummary> = clients
                    .iter()
                    .map(|c| c.summary(online.contains(&c.id)))
                    .collect();
                writer.send_payload(&summaries).await?;
                Ok(Flow::Continue)
            }
            Err(e) => {
                // A null body fails the client's decode, so it retries.
                writer.send_payload(&serde_json::Value::Null).await?;
                Err(e.into())
            }
        }
    }

    async fn send_message_lists(&mut self) -> Result<Flow, HandlerError> {
        let lists = self
            .state
            .gateway
            .poll_sent_and_received(&self.conn.username)
            .await;

        let mut writer = self.conn.lock_writer().await;
        writer.send_command(Command::MessageListUpdateAck).await?;
        match lists {
            Ok(lists) => {
                writer.send_payload(&lists).await?;
                Ok(Flow::Continue)
            }
            Err(e) => {
                writer.send_payload(&serde_json::Value::Null).await?;
                Err(e.into())
            }
        }
    }

    /// `DISCONNECTING -> CLOSED`.
    async fn finish(self) {
        let removed = self.state.registry.unregister_connection(&self.conn).await;
        self.conn.close().await;
        if removed {
            self.state
                .registry
                .broadcast(Command::ClientListUpdateMandate)
                .await;
        }
    }
}
