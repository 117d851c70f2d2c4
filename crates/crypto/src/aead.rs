//! Authenticated block encryption (`spec.md` §4.1).
//!
//! Every block is encrypted with AES-256-GCM. The nonce is derived
//! deterministically from `(block_offset, version)` so that two writes of
//! the same offset never reuse a nonce under the same key, without needing
//! a nonce counter persisted anywhere. The block's identity is also mixed
//! in as associated data, so ciphertext from one block can never be
//! authenticated as belonging to another.

use crate::kdf::DataKey;
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use sha2::{Digest, Sha256};
use sharpcore_core::{Error, Result, Version};

/// Identifies exactly one on-disk write of a block, for the purposes of
/// nonce derivation and AEAD associated data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockId {
    /// Absolute byte offset the block is framed at.
    pub offset: u64,
    /// The write's version counter.
    pub version: Version,
}

impl BlockId {
    /// Build a block id from its offset and version.
    pub fn new(offset: u64, version: Version) -> Self {
        BlockId { offset, version }
    }

    fn nonce(&self) -> [u8; 12] {
        let mut hasher = Sha256::new();
        hasher.update(self.offset.to_le_bytes());
        hasher.update(self.version.0.to_le_bytes());
        hasher.update(b"sharpcoredb-nonce");
        let digest = hasher.finalize();
        let mut nonce = [0u8; 12];
        nonce.copy_from_slice(&digest[0..12]);
        nonce
    }

    fn aad(&self) -> [u8; 16] {
        let mut aad = [0u8; 16];
        aad[0..8].copy_from_slice(&self.offset.to_le_bytes());
        aad[8..16].copy_from_slice(&self.version.0.to_le_bytes());
        aad
    }
}

/// The cryptographic envelope's contract: encrypt/decrypt a single block's
/// plaintext, bound to its `BlockId`.
///
/// This is the seam the block store holds as `Box<dyn Cryptor>`, the way
/// the teacher's storage layer holds a `Box<dyn StorageCodec>`.
pub trait Cryptor: Send + Sync {
    /// Encrypt `plaintext`, returning ciphertext with an appended AEAD tag.
    fn encrypt(&self, id: BlockId, plaintext: &[u8]) -> Vec<u8>;

    /// Decrypt `ciphertext_and_tag`, verifying the AEAD tag and the block's
    /// identity binding. Returns `Error::AuthError` on any failure — a bad
    /// tag is never silently treated as a zeroed block.
    fn decrypt(&self, id: BlockId, ciphertext_and_tag: &[u8]) -> Result<Vec<u8>>;

    /// Stable identifier for the encryption algorithm, persisted in the
    /// file header so a reopen can refuse an incompatible envelope.
    fn algo_id(&self) -> &'static str;
}

/// AES-256-GCM implementation of [`Cryptor`].
pub struct AesGcmCryptor {
    cipher: Aes256Gcm,
}

impl AesGcmCryptor {
    /// Build a cryptor from a derived data key.
    pub fn new(key: &DataKey) -> Self {
        let cipher = Aes256Gcm::new_from_slice(key.as_bytes()).expect("key is exactly 32 bytes");
        AesGcmCryptor { cipher }
    }
}

impl Cryptor for AesGcmCryptor {
    fn encrypt(&self, id: BlockId, plaintext: &[u8]) -> Vec<u8> {
        let nonce = id.nonce();
        let aad = id.aad();
        self.cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: plaintext,
                    aad: &aad,
                },
            )
            .expect("AES-256-GCM encryption with a 12-byte nonce cannot fail")
    }

    fn decrypt(&self, id: BlockId, ciphertext_and_tag: &[u8]) -> Result<Vec<u8>> {
        let nonce = id.nonce();
        let aad = id.aad();
        self.cipher
            .decrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: ciphertext_and_tag,
                    aad: &aad,
                },
            )
            .map_err(|_| {
                Error::AuthError(format!(
                    "AEAD tag verification failed at offset {} version {}",
                    id.offset, id.version
                ))
            })
    }

    fn algo_id(&self) -> &'static str {
        "aes-256-gcm"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kdf::{derive_key, generate_salt};
    use sharpcore_config::KdfParams;

    fn cryptor() -> AesGcmCryptor {
        let salt = generate_salt();
        let key = derive_key("pw", &salt, &KdfParams::default()).unwrap();
        AesGcmCryptor::new(&key)
    }

    #[test]
    fn round_trips() {
        let c = cryptor();
        let id = BlockId::new(4096, Version(3));
        let plaintext = b"row payload bytes".to_vec();
        let ciphertext = c.encrypt(id, &plaintext);
        let decrypted = c.decrypt(id, &ciphertext).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn decrypt_fails_for_different_id() {
        let c = cryptor();
        let id = BlockId::new(4096, Version(3));
        let other_id = BlockId::new(4096, Version(4));
        let ciphertext = c.encrypt(id, b"payload");
        assert!(c.decrypt(other_id, &ciphertext).is_err());
    }

    #[test]
    fn distinct_versions_produce_distinct_ciphertext() {
        let c = cryptor();
        let plaintext = b"same bytes every time".to_vec();
        let ct1 = c.encrypt(BlockId::new(0, Version(1)), &plaintext);
        let ct2 = c.encrypt(BlockId::new(0, Version(2)), &plaintext);
        assert_ne!(ct1, ct2);
    }

    #[test]
    fn truncated_ciphertext_fails_to_decrypt() {
        let c = cryptor();
        let id = BlockId::new(0, Version(1));
        let mut ciphertext = c.encrypt(id, b"0123456789");
        ciphertext.pop();
        assert!(c.decrypt(id, &ciphertext).is_err());
    }

    #[test]
    fn different_key_fails_to_decrypt() {
        let c1 = cryptor();
        let c2 = cryptor();
        let id = BlockId::new(0, Version(1));
        let ciphertext = c1.encrypt(id, b"payload");
        assert!(c2.decrypt(id, &ciphertext).is_err());
    }
}
