//! `LanChat` credential primitives.
//!
//! ## Primitives
//!
//! - **Password hashing**: PBKDF2-HMAC-SHA256, 2^16 iterations, 128-bit random
//!   salt, 256-bit derived key, both stored base64-encoded
//! - **Verification**: re-derivation with the stored salt and a constant-time
//!   comparison
//! - **Identifiers**: hex SHA-256 of the username plus a random decimal
//!   suffix, derived once per identity

pub mod error;
pub mod identifier;
pub mod password;

pub use error::CredentialError;
pub use identifier::{derive_identifier, derived_from};
pub use password::{PBKDF2_ITERATIONS, PasswordDigest, hash_password, verify_password};
