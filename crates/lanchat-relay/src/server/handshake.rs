//! `AUTH_REQUEST` handshake.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use lanchat_crypto::verify_password;
use lanchat_proto::{
    AuthResponse, Command, Credentials, FrameReader, FrameWriter, validate_password,
    validate_username,
};

use super::{HandlerError, RelayState};
use crate::registry::{ClientConnection, RegistryError};

const INVALID_CREDENTIALS: &str = "invalid credentials";
const MALFORMED_CREDENTIALS: &str = "malformed credentials";
const ALREADY_CONNECTED: &str = "already connected";
const UNAVAILABLE: &str = "relay unavailable";

/// Run the handshake on a fresh stream.
///
/// On success the connection is registered and the writer now lives inside
/// the returned [`ClientConnection`]. On any failure nothing is registered
/// and the writer has been closed.
#[instrument(skip_all)]
pub(crate) async fn authenticate(
    state: &RelayState,
    reader: &mut FrameReader,
    mut writer: FrameWriter,
) -> Result<Arc<ClientConnection>, HandlerError> {
    reader.expect_command(Command::AuthRequest).await?;
    writer.send_command(Command::AuthRequestAck).await?;

    let credentials: Credentials = match reader.read_frame().await?.decode() {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "Unreadable credentials");
            return Err(reject(&mut writer, MALFORMED_CREDENTIALS).await);
        }
    };
    let username = credentials.username.clone();

    if validate_username(&username).is_err() || validate_password(&credentials.password).is_err()
    {
        warn!(username = %username, "Failed login attempt");
        return Err(reject(&mut writer, INVALID_CREDENTIALS).await);
    }

    let client = match state.gateway.poll_client_by_username(&username).await {
        Ok(Some(client)) => client,
        Ok(None) => {
            warn!(username = %username, "Failed login attempt");
            return Err(reject(&mut writer, INVALID_CREDENTIALS).await);
        }
        Err(e) => {
            warn!(username = %username, error = %e, "Identity lookup failed");
            let _ = reject(&mut writer, UNAVAILABLE).await;
            return Err(e.into());
        }
    };

    let digest = client.digest();
    let verified =
        tokio::task::spawn_blocking(move || verify_password(&credentials.password, &digest))
            .await
            .map_err(|e| HandlerError::Internal(format!("verification task failed: {e}")))?;
    match verified {
        Ok(true) => {}
        Ok(false) => {
            warn!(username = %username, "Failed login attempt");
            return Err(reject(&mut writer, INVALID_CREDENTIALS).await);
        }
        Err(e) => {
            warn!(username = %username, error = %e, "Stored digest unusable");
            return Err(reject(&mut writer, INVALID_CREDENTIALS).await);
        }
    }

    let conn = Arc::new(ClientConnection::new(client.id, client.username, writer));
    {
        // Register under the send lock so no push overtakes the identifier.
        let mut writer = conn.lock_writer().await;
        if let Err(RegistryError::AlreadyConnected(name)) =
            state.registry.register(Arc::clone(&conn)).await
        {
            warn!(username = %name, "Duplicate login refused");
            return Err(reject(&mut writer, ALREADY_CONNECTED).await);
        }
        // The account may have been deleted while the password was being
        // verified. Deletion commits before it unregisters, so checking
        // again after registering leaves no gap.
        let stored = state.gateway.poll_client_by_id(&conn.identifier).await;
        if !matches!(stored, Ok(Some(_))) {
            state.registry.unregister_connection(&conn).await;
            let reason = match stored {
                Err(e) => {
                    warn!(username = %conn.username, error = %e, "Identity re-check failed");
                    UNAVAILABLE
                }
                _ => {
                    warn!(username = %conn.username, "Account deleted during login");
                    INVALID_CREDENTIALS
                }
            };
            let err = reject(&mut writer, reason).await;
            drop(writer);
            conn.close().await;
            return Err(err);
        }
        let sent = async {
            writer.send_payload(&AuthResponse::accepted()).await?;
            writer.send_payload(&conn.identifier).await
        }
        .await;
        if let Err(e) = sent {
            drop(writer);
            state.registry.unregister_connection(&conn).await;
            conn.close().await;
            return Err(e.into());
        }
    }

    info!(username = %conn.username, "Client authenticated");
    Ok(conn)
}

async fn reject(writer: &mut FrameWriter, reason: &str) -> HandlerError {
    if let Err(e) = writer.send_payload(&AuthResponse::rejected(reason)).await {
        return e.into();
    }
    let _ = writer.close().await;
    HandlerError::Rejected(reason.to_string())
}
