//! Cryptographic envelope for SharpCoreDB (`spec.md` §4.1, component C1).
//!
//! This crate derives a data-encryption key from a password via Argon2id
//! and provides AES-256-GCM authenticated encryption of individual blocks,
//! with a nonce and AAD derived from the block's offset and version so the
//! storage layer never has to manage nonce state itself.
//!
//! Key rotation is explicitly out of scope (`spec.md` §4.1 Non-goals); this
//! crate does not interpret the plaintext it encrypts.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod aead;
pub mod kdf;

pub use aead::{AesGcmCryptor, BlockId, Cryptor};
pub use kdf::{derive_key, generate_salt, DataKey, KEY_LEN, SALT_LEN};
