//! Crypto module
//!
//! Key derivation and authenticated encryption for all transferred payloads.

pub mod cipher;
pub mod keys;

// Re-export main types
pub use cipher::{PayloadCipher, NONCE_SIZE, TAG_SIZE};
pub use keys::{derive_key, SecretKey, KEY_SIZE};
