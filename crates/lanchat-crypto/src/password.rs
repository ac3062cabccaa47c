//! Password hashing and verification using PBKDF2-HMAC-SHA256.
//!
//! Every intermediate buffer holding salt or key material is wrapped in
//! [`Zeroizing`], so it is wiped on every exit path including early `?`
//! returns.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::Hmac;
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::error::CredentialError;

/// PBKDF2 iteration count (2^16).
pub const PBKDF2_ITERATIONS: u32 = 1 << 16;

/// Salt length in bytes (128 bits).
pub const SALT_LEN: usize = 16;

/// Derived key length in bytes (256 bits).
pub const KEY_LEN: usize = 32;

/// A stored password: base64 hash and base64 salt.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordDigest {
    pub hash: String,
    pub salt: String,
}

impl std::fmt::Debug for PasswordDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordDigest")
            .field("hash", &"[REDACTED]")
            .field("salt", &"[REDACTED]")
            .finish()
    }
}

fn derive_key(password: &[u8], salt: &[u8]) -> Result<Zeroizing<[u8; KEY_LEN]>, CredentialError> {
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    pbkdf2::pbkdf2::<Hmac<Sha256>>(password, salt, PBKDF2_ITERATIONS, key.as_mut_slice())
        .map_err(|e| CredentialError::KeyDerivationFailed(e.to_string()))?;
    Ok(key)
}

fn decode_field(field: &'static str, value: &str) -> Result<Zeroizing<Vec<u8>>, CredentialError> {
    if value.is_empty() {
        return Err(CredentialError::MalformedDigest {
            field,
            reason: "empty".to_string(),
        });
    }
    BASE64
        .decode(value)
        .map(Zeroizing::new)
        .map_err(|e| CredentialError::MalformedDigest {
            field,
            reason: e.to_string(),
        })
}

/// Hash a password with a fresh random salt.
pub fn hash_password(password: &str) -> Result<PasswordDigest, CredentialError> {
    if password.is_empty() {
        return Err(CredentialError::EmptyPassword);
    }

    let mut salt = Zeroizing::new([0u8; SALT_LEN]);
    OsRng.fill_bytes(salt.as_mut_slice());
    let key = derive_key(password.as_bytes(), salt.as_slice())?;

    Ok(PasswordDigest {
        hash: BASE64.encode(key.as_slice()),
        salt: BASE64.encode(salt.as_slice()),
    })
}

/// Verify a candidate password against a stored digest.
///
/// Returns `Ok(false)` on any mismatch, including an empty candidate. Errors
/// only when the stored digest is not valid base64.
pub fn verify_password(password: &str, digest: &PasswordDigest) -> Result<bool, CredentialError> {
    let salt = decode_field("salt", &digest.salt)?;
    let expected = decode_field("hash", &digest.hash)?;

    if password.is_empty() {
        return Ok(false);
    }

    let derived = derive_key(password.as_bytes(), &salt)?;
    Ok(derived.as_slice().ct_eq(&expected).into())
}
