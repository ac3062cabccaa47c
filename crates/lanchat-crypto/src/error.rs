//! Credential error types.

/// Errors from credential operations.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("Password must not be empty")]
    EmptyPassword,

    #[error("Stored {field} is not valid base64: {reason}")]
    MalformedDigest { field: &'static str, reason: String },

    #[error("Key derivation failed: {0}")]
    KeyDerivationFailed(String),
}
