//! Client Session Engine.
//!
//! [`ClientSession::authenticate`] performs the handshake once and returns a
//! shared session. Each request cycle holds the transport's exchange lock for
//! its whole request/ack/payload sequence. Relay pushes are handled by a
//! background event pump that refreshes the observable collections.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use lanchat_core::config::ClientConfig;
use lanchat_proto::{
    AuthResponse, BroadcastReceipt, ClientSummary, Command, Credentials, Message, MessageLists,
    validate_content, validate_password, validate_username,
};

use crate::error::SessionError;
use crate::filter::{RoleGroups, group_by_role};
use crate::observable::Observable;
use crate::retry::RetryPolicy;
use crate::transport::{Event, Transport};

/// Upper bound for [`ClientSession::filter_by_role`].
pub const FILTER_TIMEOUT: Duration = Duration::from_secs(10);

pub struct ClientSession {
    transport: Transport,
    identifier: String,
    username: String,
    clients: Observable<Vec<ClientSummary>>,
    messages: Observable<MessageLists>,
    send_policy: RetryPolicy,
    refresh_policy: RetryPolicy,
    closed: CancellationToken,
}

impl ClientSession {
    /// Connect and run the handshake exactly once.
    ///
    /// Input is checked before any connection is opened. A rejected login
    /// or an unreachable relay is returned as is, without retrying.
    #[instrument(skip(config, password), fields(addr = %config.addr))]
    pub async fn authenticate(
        config: &ClientConfig,
        username: &str,
        password: &str,
    ) -> Result<Arc<Self>, SessionError> {
        validate_username(username)?;
        validate_password(password)?;

        let (transport, events) =
            Transport::connect(config.addr, config.connect_timeout(), config.read_timeout())
                .await?;
        let identifier = match handshake(&transport, username, password).await {
            Ok(identifier) => identifier,
            Err(e) => {
                transport.release().await;
                return Err(e);
            }
        };
        info!(username = %username, "Authenticated");

        let session = Arc::new(Self {
            transport,
            identifier,
            username: username.to_string(),
            clients: Observable::default(),
            messages: Observable::default(),
            send_policy: RetryPolicy::SEND,
            refresh_policy: RetryPolicy::REFRESH,
            closed: CancellationToken::new(),
        });
        tokio::spawn(pump(Arc::downgrade(&session), events));
        Ok(session)
    }

    /// The identifier the relay stored for this account.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Every stored identity, with its online flag.
    pub const fn clients(&self) -> &Observable<Vec<ClientSummary>> {
        &self.clients
    }

    /// This user's history as `sent` and `received`.
    pub const fn messages(&self) -> &Observable<MessageLists> {
        &self.messages
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once the session has released its connection.
    pub async fn closed(&self) {
        self.closed.cancelled().await;
    }

    /// Submit a message to `receiver_id`.
    ///
    /// Returns `Ok(true)` once the relay stored it, `Ok(false)` if the relay
    /// refused it or every attempt failed.
    #[instrument(skip(self, content), fields(username = %self.username))]
    pub async fn send_message(&self, receiver_id: &str, content: &str) -> Result<bool, SessionError> {
        if receiver_id.is_empty() {
            return Err(SessionError::InvalidInput("receiver is required".to_string()));
        }
        if receiver_id == self.identifier {
            return Err(SessionError::InvalidInput(
                "cannot send a message to yourself".to_string(),
            ));
        }
        validate_content(content)?;

        let message = &Message::outgoing(&self.identifier, receiver_id, content);
        let outcome = self
            .send_policy
            .run("send_message", move || self.send_cycle(message))
            .await;
        match outcome {
            Ok(receipt) if receipt.stored => Ok(true),
            Ok(_) => {
                warn!("Relay refused the message");
                Ok(false)
            }
            Err(SessionError::Closed) => Err(SessionError::Closed),
            Err(e) => {
                warn!(error = %e, "Message not delivered");
                Ok(false)
            }
        }
    }

    async fn send_cycle(&self, message: &Message) -> Result<BroadcastReceipt, SessionError> {
        let mut ex = self.transport.exchange().await?;
        ex.send_command(Command::MessageBroadcastRequest).await?;
        ex.expect(Command::MessageBroadcastAck).await?;
        ex.send_payload(message).await?;
        ex.read_payload().await
    }

    /// Fetch the identity list and replace [`clients`](Self::clients).
    /// On failure the collection is left as it was.
    pub async fn refresh_client_list(&self) -> Result<(), SessionError> {
        let list = self
            .refresh_policy
            .run("refresh_client_list", move || self.client_list_cycle())
            .await?;
        if self.transport.is_released() {
            return Err(SessionError::Closed);
        }
        debug!(count = list.len(), "Client list refreshed");
        self.clients.replace(list);
        Ok(())
    }

    async fn client_list_cycle(&self) -> Result<Vec<ClientSummary>, SessionError> {
        let mut ex = self.transport.exchange().await?;
        ex.send_command(Command::ClientListUpdateRequest).await?;
        ex.expect(Command::ClientListUpdateAck).await?;
        ex.read_payload().await
    }

    /// Fetch this user's history and replace [`messages`](Self::messages).
    /// On failure the collection is left as it was.
    pub async fn refresh_message_lists(&self) -> Result<(), SessionError> {
        let lists = self
            .refresh_policy
            .run("refresh_message_lists", move || self.message_lists_cycle())
            .await?;
        debug!(
            sent = lists.sent.len(),
            received = lists.received.len(),
            "Message lists refreshed"
        );
        self.messages.replace(lists);
        Ok(())
    }

    async fn message_lists_cycle(&self) -> Result<MessageLists, SessionError> {
        let mut ex = self.transport.exchange().await?;
        ex.send_command(Command::MessageListUpdateRequest).await?;
        ex.expect(Command::MessageListUpdateAck).await?;
        ex.read_payload().await
    }

    /// Refresh the history and return what was exchanged with `peer_id`,
    /// grouped by this user's role. Bounded by [`FILTER_TIMEOUT`].
    pub async fn filter_by_role(&self, peer_id: &str) -> Result<RoleGroups, SessionError> {
        tokio::time::timeout(FILTER_TIMEOUT, self.refresh_message_lists())
            .await
            .map_err(|_| SessionError::Timeout)??;
        Ok(group_by_role(&self.messages.snapshot(), peer_id))
    }

    /// Say goodbye to the relay, then release the connection.
    ///
    /// Local cleanup happens whatever the relay answers. Returns whether the
    /// relay acknowledged.
    pub async fn disconnect(&self) -> bool {
        if self.transport.is_released() {
            return false;
        }
        let acknowledged = self
            .send_policy
            .run("disconnect", move || self.disconnect_cycle())
            .await;
        if let Err(e) = &acknowledged {
            warn!(error = %e, "Relay did not acknowledge disconnect");
        }
        self.release().await;
        acknowledged.is_ok()
    }

    async fn disconnect_cycle(&self) -> Result<(), SessionError> {
        let mut ex = self.transport.exchange().await?;
        ex.send_command(Command::DisconnectionRequest).await?;
        ex.expect(Command::DisconnectionAck).await
    }

    /// Close the connection locally. Presence is meaningless once
    /// released, so the identity list is emptied; history is kept.
    async fn release(&self) {
        self.transport.release().await;
        self.clients.clear();
        self.closed.cancel();
    }

    async fn handle_event(&self, event: Event) {
        match event {
            Event::Mandate(Command::ClientListUpdateMandate) => {
                if let Err(e) = self.refresh_client_list().await {
                    warn!(error = %e, "Client list refresh failed");
                }
            }
            Event::Mandate(Command::MessageListUpdateMandate) => {
                if let Err(e) = self.refresh_message_lists().await {
                    warn!(error = %e, "Message list refresh failed");
                }
            }
            Event::Mandate(Command::ShutdownMandate) => {
                info!("Relay is shutting down");
                self.release().await;
            }
            Event::Mandate(other) => debug!(command = %other, "Ignoring push"),
            Event::DisconnectRequested => {
                if let Ok(mut ex) = self.transport.exchange().await {
                    if let Err(e) = ex.send_command(Command::DisconnectionAck).await {
                        debug!(error = %e, "Could not acknowledge relay disconnect");
                    }
                }
                self.release().await;
            }
            Event::Closed => self.release().await,
        }
    }
}

async fn handshake(
    transport: &Transport,
    username: &str,
    password: &str,
) -> Result<String, SessionError> {
    let mut ex = transport.exchange().await?;
    ex.send_command(Command::AuthRequest).await?;
    ex.expect(Command::AuthRequestAck).await?;
    ex.send_payload(&Credentials::new(username, password)).await?;
    let response: AuthResponse = ex.read_payload().await?;
    if !response.success {
        let reason = response.reason.unwrap_or_else(|| "rejected".to_string());
        warn!(username = %username, reason = %reason, "Login rejected");
        return Err(SessionError::Rejected(reason));
    }
    ex.read_payload().await
}

async fn pump(session: Weak<ClientSession>, mut events: mpsc::UnboundedReceiver<Event>) {
    while let Some(event) = events.recv().await {
        let Some(session) = session.upgrade() else {
            break;
        };
        // Collapse a burst of identical pushes into one refresh.
        let mut next = Some(event);
        while let Some(event) = next.take() {
            while let Ok(queued) = events.try_recv() {
                if queued != event {
                    next = Some(queued);
                    break;
                }
            }
            session.handle_event(event).await;
            if session.is_closed() {
                return;
            }
        }
    }
}
