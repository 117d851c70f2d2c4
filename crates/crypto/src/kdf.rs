//! Password-to-key derivation (`spec.md` §4.1).
//!
//! The KDF is Argon2id, a memory-hard function, so that an attacker who
//! steals the file cannot brute-force the password with commodity GPUs.
//! Cost parameters are stored in the file header (`KdfParams`) so an
//! existing database can be reopened with the exact parameters it was
//! created with, even if the library's defaults change later.

use argon2::{Algorithm, Argon2, Params, Version as Argon2Version};
use sharpcore_config::KdfParams;
use sharpcore_core::{Error, Result};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Length of the derived data-encryption key, in bytes (AES-256).
pub const KEY_LEN: usize = 32;

/// Length of the KDF salt stored in the file header.
pub const SALT_LEN: usize = 16;

/// A derived 256-bit data-encryption key. Zeroized on drop so a stale copy
/// never lingers in process memory after the database is closed.
#[derive(Clone, ZeroizeOnDrop)]
pub struct DataKey(pub(crate) [u8; KEY_LEN]);

impl DataKey {
    /// Borrow the raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for DataKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DataKey(..)")
    }
}

/// Generate a fresh random KDF salt for a new database.
pub fn generate_salt() -> [u8; SALT_LEN] {
    use rand::RngCore;
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}

/// Derive a 256-bit data-encryption key from a password, salt, and cost
/// parameters using Argon2id.
///
/// Returns `Error::AuthError` if the parameters themselves are invalid
/// (e.g. a memory cost too small for the configured parallelism); a wrong
/// password is indistinguishable from a correct one at this stage — it is
/// only detected later when the header checksum or first block's AEAD tag
/// fails to verify.
pub fn derive_key(password: &str, salt: &[u8; SALT_LEN], params: &KdfParams) -> Result<DataKey> {
    let argon2_params = Params::new(
        params.memory_kib,
        params.iterations,
        params.parallelism,
        Some(KEY_LEN),
    )
    .map_err(|e| Error::AuthError(format!("invalid KDF parameters: {e}")))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Argon2Version::V0x13, argon2_params);

    let mut out = [0u8; KEY_LEN];
    argon2
        .hash_password_into(password.as_bytes(), salt, &mut out)
        .map_err(|e| Error::AuthError(format!("key derivation failed: {e}")))?;

    let key = DataKey(out);
    out.zeroize();
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_password_and_salt_derive_same_key() {
        let salt = [7u8; SALT_LEN];
        let params = KdfParams::default();
        let k1 = derive_key("correct horse", &salt, &params).unwrap();
        let k2 = derive_key("correct horse", &salt, &params).unwrap();
        assert_eq!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn different_password_derives_different_key() {
        let salt = [7u8; SALT_LEN];
        let params = KdfParams::default();
        let k1 = derive_key("correct horse", &salt, &params).unwrap();
        let k2 = derive_key("incorrect horse", &salt, &params).unwrap();
        assert_ne!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn different_salt_derives_different_key() {
        let params = KdfParams::default();
        let k1 = derive_key("pw", &[1u8; SALT_LEN], &params).unwrap();
        let k2 = derive_key("pw", &[2u8; SALT_LEN], &params).unwrap();
        assert_ne!(k1.as_bytes(), k2.as_bytes());
    }
}
