//! Authenticated encryption module
//!
//! Encrypts and decrypts payloads with ChaCha20-Poly1305. A fresh random
//! nonce is generated per message so repeated plaintexts never produce
//! repeated ciphertexts; the Poly1305 tag makes every chunk independently
//! verifiable, and a failed tag check is the protocol's authentication
//! rejection signal.

use anyhow::Result;
use chacha20poly1305::{
    aead::{rand_core::RngCore, Aead, KeyInit, OsRng},
    ChaCha20Poly1305, Nonce,
};

use crate::crypto::keys::SecretKey;
use crate::error::ShareError;

/// Nonce size for ChaCha20-Poly1305 (96 bits)
pub const NONCE_SIZE: usize = 12;

/// Poly1305 tag size appended to every ciphertext
pub const TAG_SIZE: usize = 16;

/// Encrypts and decrypts payloads under the derived shared key
#[derive(Clone)]
pub struct PayloadCipher {
    cipher: ChaCha20Poly1305,
}

impl PayloadCipher {
    /// Create a cipher from a derived key
    pub fn new(key: &SecretKey) -> Self {
        let cipher = ChaCha20Poly1305::new(key.as_bytes().into());
        Self { cipher }
    }

    /// Encrypt a payload
    ///
    /// Returns the nonce and the ciphertext with the tag appended.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<([u8; NONCE_SIZE], Vec<u8>)> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| ShareError::protocol_error("Payload encryption failed"))?;

        Ok((nonce_bytes, ciphertext))
    }

    /// Decrypt a payload
    ///
    /// Fails with `AuthenticationFailed` if the tag does not verify, which
    /// covers both tampered data and a wrong shared secret.
    pub fn decrypt(&self, nonce: &[u8; NONCE_SIZE], ciphertext: &[u8]) -> Result<Vec<u8>> {
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| {
                ShareError::authentication_failed("payload did not authenticate (wrong secret or tampered data)")
                    .into()
            })
    }
}

impl std::fmt::Debug for PayloadCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PayloadCipher(..)")
    }
}
