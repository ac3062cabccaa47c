//! Server-wide account administration.
//!
//! [`AdminService`] runs each operation as a task on its own tracker (the
//! relay's database workers) and hands back the join handle. The free
//! functions do the storage part alone and back the offline subcommands.

use std::future::Future;

use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{info, instrument, warn};
use zeroize::Zeroizing;

use lanchat_crypto::{CredentialError, derive_identifier, hash_password};
use lanchat_proto::{
    ClientSummary, Command, ValidationError, validate_password, validate_username,
};

use super::RelayState;
use crate::storage::{Client, DatabaseError, PersistenceGateway};

#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Username {0} is already taken")]
    AlreadyExists(String),

    #[error("No such user: {0}")]
    NotFound(String),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error("Storage error: {0}")]
    Storage(#[from] DatabaseError),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Relay is shutting down")]
    ShuttingDown,
}

/// Hash the password, derive the identifier once, and store the identity.
pub async fn create_account(
    gateway: &PersistenceGateway,
    username: &str,
    password: &str,
) -> Result<Client, AdminError> {
    validate_username(username)?;
    validate_password(password)?;
    if gateway.poll_client_by_username(username).await?.is_some() {
        return Err(AdminError::AlreadyExists(username.to_string()));
    }

    let password = Zeroizing::new(password.to_string());
    let digest = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| AdminError::Internal(format!("hashing task failed: {e}")))??;

    let identifier = derive_identifier(username);
    match gateway.insert_client(&identifier, username, &digest).await {
        Ok(client) => Ok(client),
        // Lost a race with a concurrent create.
        Err(DatabaseError::Constraint(_)) => Err(AdminError::AlreadyExists(username.to_string())),
        Err(e) => Err(e.into()),
    }
}

/// Remove the identity and all of its messages.
pub async fn delete_account(gateway: &PersistenceGateway, username: &str) -> Result<(), AdminError> {
    if gateway.delete_client_by_username(username).await? {
        Ok(())
    } else {
        Err(AdminError::NotFound(username.to_string()))
    }
}

#[derive(Clone)]
pub struct AdminService {
    state: RelayState,
    tracker: TaskTracker,
}

impl AdminService {
    pub fn new(state: RelayState) -> Self {
        Self {
            state,
            tracker: TaskTracker::new(),
        }
    }

    fn spawn<T, F>(&self, work: F) -> JoinHandle<Result<T, AdminError>>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, AdminError>> + Send + 'static,
    {
        if self.tracker.is_closed() {
            return self.tracker.spawn(async { Err(AdminError::ShuttingDown) });
        }
        self.tracker.spawn(work)
    }

    #[instrument(skip(self, password))]
    pub fn create_account(
        &self,
        username: String,
        password: String,
    ) -> JoinHandle<Result<ClientSummary, AdminError>> {
        let state = self.state.clone();
        let password = Zeroizing::new(password);
        self.spawn(async move {
            let client = create_account(&state.gateway, &username, &password).await?;
            info!(username = %client.username, "Account created");
            state.registry.broadcast(Command::ClientListUpdateMandate).await;
            Ok(client.summary(false))
        })
    }

    /// Delete the account. A live connection for it is closed and removed
    /// from the registry before the returned task completes.
    #[instrument(skip(self))]
    pub fn delete_account(&self, username: String) -> JoinHandle<Result<(), AdminError>> {
        let state = self.state.clone();
        self.spawn(async move {
            delete_account(&state.gateway, &username).await?;
            if let Some(conn) = state.registry.unregister_username(&username).await {
                conn.close().await;
                info!(username = %username, "Closed connection of deleted account");
            }
            info!(username = %username, "Account deleted");
            state.registry.broadcast(Command::ClientListUpdateMandate).await;
            Ok(())
        })
    }

    /// Remove every message the user sent or received. Returns the count.
    #[instrument(skip(self))]
    pub fn delete_messages(&self, username: String) -> JoinHandle<Result<u64, AdminError>> {
        let state = self.state.clone();
        self.spawn(async move {
            let removed = state.gateway.delete_messages_by_username(&username).await?;
            state
                .registry
                .broadcast(Command::MessageListUpdateMandate)
                .await;
            Ok(removed)
        })
    }

    /// Stop accepting work and wait for in-flight tasks.
    pub async fn close(&self) {
        self.tracker.close();
        if !self.tracker.is_empty() {
            info!(pending = self.tracker.len(), "Waiting for admin tasks");
        }
        self.tracker.wait().await;
    }
}

/// Await an admin task, folding a panicked or cancelled task into
/// [`AdminError::Internal`].
pub async fn join<T>(handle: JoinHandle<Result<T, AdminError>>) -> Result<T, AdminError> {
    match handle.await {
        Ok(result) => result,
        Err(e) => {
            warn!(error = %e, "Admin task did not complete");
            Err(AdminError::Internal(e.to_string()))
        }
    }
}
