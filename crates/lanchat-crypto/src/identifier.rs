//! Pseudo-unique client identifiers.
//!
//! An identifier is the hex SHA-256 of the username followed by a random
//! decimal suffix. Derivation is deliberately not idempotent: call it once
//! when the identity is created and persist the result. Never re-derive an
//! identifier to look an identity up.

use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

/// Derive a fresh identifier for `username`.
pub fn derive_identifier(username: &str) -> String {
    let digest = Sha256::digest(username.as_bytes());
    let suffix = OsRng.next_u64();
    format!("{}{suffix}", hex::encode(digest))
}

/// Whether `identifier` was derived from `username`.
pub fn derived_from(identifier: &str, username: &str) -> bool {
    let prefix = hex::encode(Sha256::digest(username.as_bytes()));
    identifier
        .strip_prefix(prefix.as_str())
        .is_some_and(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
}
