//! TCP accept loop and ordered shutdown.

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use lanchat_proto::{Command, MAX_FRAME_BYTES};

use super::admin::AdminService;
use super::handler::handle_connection;
use super::RelayState;
use crate::registry::ConnectionRegistry;
use crate::storage::PersistenceGateway;

pub struct RelayServer {
    listener: TcpListener,
    state: RelayState,
    admin: AdminService,
    shutdown: CancellationToken,
    max_frame_bytes: usize,
}

impl RelayServer {
    pub async fn bind(addr: SocketAddr, gateway: PersistenceGateway) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let state = RelayState::new(gateway);
        Ok(Self {
            listener,
            admin: AdminService::new(state.clone()),
            state,
            shutdown: CancellationToken::new(),
            max_frame_bytes: MAX_FRAME_BYTES,
        })
    }

    #[must_use]
    pub fn with_max_frame_bytes(mut self, max_frame_bytes: usize) -> Self {
        self.max_frame_bytes = max_frame_bytes;
        self
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn admin(&self) -> AdminService {
        self.admin.clone()
    }

    pub fn registry(&self) -> ConnectionRegistry {
        self.state.registry.clone()
    }

    pub fn gateway(&self) -> PersistenceGateway {
        self.state.gateway.clone()
    }

    /// Cancelling this token makes [`run`](Self::run) shut down and return.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Accept connections until the shutdown token fires, then tear down in
    /// order: notify clients, drain database workers, stop connection tasks,
    /// close storage.
    pub async fn run(self) {
        let Self {
            listener,
            state,
            admin,
            shutdown,
            max_frame_bytes,
        } = self;

        if let Ok(addr) = listener.local_addr() {
            info!(addr = %addr, "Relay listening");
        }

        let connections = TaskTracker::new();
        let handshakes = CancellationToken::new();
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!(peer = %peer, "Accepted connection");
                        if let Err(e) = stream.set_nodelay(true) {
                            debug!(peer = %peer, error = %e, "Failed to set TCP_NODELAY");
                        }
                        connections.spawn(handle_connection(
                            state.clone(),
                            stream,
                            peer,
                            max_frame_bytes,
                            handshakes.clone(),
                        ));
                    }
                    Err(e) => warn!(error = %e, "Accept failed"),
                },
            }
        }
        drop(listener);

        let remaining = state.registry.connection_count().await;
        info!(connections = remaining, "Shutting down relay");
        for conn in state.registry.snapshot().await {
            for cmd in [Command::ShutdownMandate, Command::DisconnectionRequest] {
                if let Err(e) = conn.push_to_client(cmd).await {
                    debug!(username = %conn.username, error = %e, "Shutdown notice not delivered");
                    break;
                }
            }
        }

        admin.close().await;

        handshakes.cancel();
        close_all(&state.registry).await;
        connections.close();
        connections.wait().await;
        // Anything that registered while the first drain ran.
        close_all(&state.registry).await;

        state.gateway.close().await;
        info!("Relay stopped");
    }
}

async fn close_all(registry: &ConnectionRegistry) {
    for conn in registry.drain().await {
        conn.close().await;
    }
}
