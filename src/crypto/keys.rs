//! Key derivation module
//!
//! Derives the symmetric payload key from the shared secret using Argon2id,
//! so brute-forcing the secret from a captured key stays expensive.

use anyhow::Result;
use argon2::{Algorithm, Argon2, Params, Version};
use tracing::debug;

use crate::error::ShareError;

/// Size of the derived key in bytes
pub const KEY_SIZE: usize = 32;

/// Fixed application salt; the same secret must always yield the same key
/// so that node and client derive matching keys independently
const KEY_SALT: &[u8] = b"p2p-fileshare-key-v1";

/// Symmetric key derived from the shared secret
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey {
    key: [u8; KEY_SIZE],
}

impl SecretKey {
    /// Get the raw key bytes
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.key
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never log key material
        write!(f, "SecretKey(..)")
    }
}

/// Derive the payload key from the shared secret
///
/// Deterministic: the same secret always yields the same key. Fails with
/// `InvalidSecret` if the secret is empty.
pub fn derive_key(secret: &str) -> Result<SecretKey> {
    if secret.is_empty() {
        return Err(ShareError::invalid_secret("secret must not be empty").into());
    }

    // Argon2id parameters (OWASP recommendation: 19 MiB, 2 iterations)
    let params = Params::new(19 * 1024, 2, 1, Some(KEY_SIZE))
        .map_err(|e| ShareError::invalid_secret(format!("invalid derivation parameters: {}", e)))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut key = [0u8; KEY_SIZE];
    argon2
        .hash_password_into(secret.as_bytes(), KEY_SALT, &mut key)
        .map_err(|e| ShareError::invalid_secret(format!("key derivation failed: {}", e)))?;

    debug!("Derived payload key from shared secret");
    Ok(SecretKey { key })
}
