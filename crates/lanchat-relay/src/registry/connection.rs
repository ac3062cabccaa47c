//! In-memory connection registry for authenticated clients.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, MutexGuard, RwLock};
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::{debug, info};

use lanchat_proto::{Command, FrameWriter, ProtocolError};

/// An authenticated connection as seen by the rest of the relay.
///
/// The writer mutex is the per-connection send lock: a response and an
/// unrelated push can never interleave on the stream.
pub struct ClientConnection {
    pub identifier: String,
    pub username: String,
    writer: Mutex<FrameWriter>,
    running: AtomicBool,
    cancel: CancellationToken,
}

impl ClientConnection {
    pub fn new(identifier: String, username: String, writer: FrameWriter) -> Self {
        Self {
            identifier,
            username,
            writer: Mutex::new(writer),
            running: AtomicBool::new(true),
            cancel: CancellationToken::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Exclusive access to the outbound stream for a multi-frame response.
    pub async fn lock_writer(&self) -> MutexGuard<'_, FrameWriter> {
        self.writer.lock().await
    }

    /// Push a relay-initiated frame to this client.
    ///
    /// Only writes outward; never touches the read side.
    pub async fn push_to_client(&self, cmd: Command) -> Result<(), ProtocolError> {
        if !self.is_running() {
            return Err(ProtocolError::Closed);
        }
        self.writer.lock().await.send_command(cmd).await
    }

    /// Resolves once [`close`](Self::close) has been called.
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    /// Stop the read loop and shut down the write direction. Idempotent.
    pub async fn close(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        self.cancel.cancel();
        if let Err(e) = self.writer.lock().await.close().await {
            debug!(username = %self.username, error = %e, "Stream already gone while closing");
        }
        info!(username = %self.username, "Connection closed");
    }
}

impl std::fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConnection")
            .field("identifier", &self.identifier)
            .field("username", &self.username)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("{0} already has a registered connection")]
    AlreadyConnected(String),
}

#[derive(Default)]
struct Maps {
    by_identifier: HashMap<String, Arc<ClientConnection>>,
    identifier_by_username: HashMap<String, String>,
}

impl Maps {
    fn remove_identifier(&mut self, identifier: &str) -> Option<Arc<ClientConnection>> {
        let conn = self.by_identifier.remove(identifier)?;
        self.identifier_by_username.remove(&conn.username);
        Some(conn)
    }
}

/// Thread-safe registry keyed by identifier and by username.
///
/// Both indexes live behind one lock, so every reader sees them agree.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<RwLock<Maps>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection. Refused when the username or identifier is
    /// already present.
    pub async fn register(&self, conn: Arc<ClientConnection>) -> Result<(), RegistryError> {
        let mut maps = self.inner.write().await;
        if maps.identifier_by_username.contains_key(&conn.username)
            || maps.by_identifier.contains_key(&conn.identifier)
        {
            return Err(RegistryError::AlreadyConnected(conn.username.clone()));
        }
        maps.identifier_by_username
            .insert(conn.username.clone(), conn.identifier.clone());
        maps.by_identifier
            .insert(conn.identifier.clone(), Arc::clone(&conn));
        info!(username = %conn.username, "Connection registered");
        Ok(())
    }

    /// Remove `conn` from both indexes, but only if it is still the
    /// registered connection for its identifier.
    pub async fn unregister_connection(&self, conn: &Arc<ClientConnection>) -> bool {
        let mut maps = self.inner.write().await;
        let current = maps
            .by_identifier
            .get(&conn.identifier)
            .is_some_and(|c| Arc::ptr_eq(c, conn));
        if current {
            maps.remove_identifier(&conn.identifier);
            info!(username = %conn.username, "Connection unregistered");
        }
        current
    }

    pub async fn unregister_username(&self, username: &str) -> Option<Arc<ClientConnection>> {
        let mut maps = self.inner.write().await;
        let identifier = maps.identifier_by_username.get(username)?.clone();
        let conn = maps.remove_identifier(&identifier);
        if conn.is_some() {
            info!(username = %username, "Connection unregistered");
        }
        conn
    }

    pub async fn get(&self, identifier: &str) -> Option<Arc<ClientConnection>> {
        self.inner.read().await.by_identifier.get(identifier).cloned()
    }

    pub async fn get_by_username(&self, username: &str) -> Option<Arc<ClientConnection>> {
        let maps = self.inner.read().await;
        let identifier = maps.identifier_by_username.get(username)?;
        maps.by_identifier.get(identifier).cloned()
    }

    pub async fn is_connected(&self, identifier: &str) -> bool {
        self.inner.read().await.by_identifier.contains_key(identifier)
    }

    pub async fn connected_identifiers(&self) -> HashSet<String> {
        self.inner.read().await.by_identifier.keys().cloned().collect()
    }

    pub async fn connected_usernames(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .read()
            .await
            .identifier_by_username
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.read().await.by_identifier.len()
    }

    pub async fn snapshot(&self) -> Vec<Arc<ClientConnection>> {
        self.inner.read().await.by_identifier.values().cloned().collect()
    }

    /// Remove and return every connection.
    pub async fn drain(&self) -> Vec<Arc<ClientConnection>> {
        let mut maps = self.inner.write().await;
        maps.identifier_by_username.clear();
        maps.by_identifier.drain().map(|(_, c)| c).collect()
    }

    /// Push `cmd` to every registered connection. Returns how many pushes
    /// succeeded. The registry lock is not held while writing.
    pub async fn broadcast(&self, cmd: Command) -> usize {
        let mut delivered = 0;
        for conn in self.snapshot().await {
            match conn.push_to_client(cmd).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    debug!(username = %conn.username, command = %cmd, error = %e, "Push failed");
                }
            }
        }
        delivered
    }

    /// Push `cmd` to one identity if it is registered.
    pub async fn push_to(&self, identifier: &str, cmd: Command) -> bool {
        let Some(conn) = self.get(identifier).await else {
            return false;
        };
        match conn.push_to_client(cmd).await {
            Ok(()) => true,
            Err(e) => {
                debug!(username = %conn.username, command = %cmd, error = %e, "Push failed");
                false
            }
        }
    }
}
