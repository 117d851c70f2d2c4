//! The block store (`spec.md` §4.2, component C2): the only code that
//! actually reads and writes bytes on disk.
//!
//! A block is framed as:
//!
//! ```text
//! [frame_len: u32 LE][version: u64 LE][ciphertext + AEAD tag][crc32: u32 LE]
//! ```
//!
//! `frame_len` covers everything between it and the trailing CRC32
//! (inclusive of the version field). The CRC32 is checked first, because it
//! is cheap and catches a torn write without paying for an AEAD decrypt; the
//! AEAD tag is the actual authenticity check once the frame is known to be
//! whole. Every read attempts the CRC32 check before decryption is even
//! attempted, per `spec.md` invariant #6 ("a write that did not complete is
//! never returned to a reader as decrypted data").

use parking_lot::Mutex;
use sharpcore_core::{Error, Result, Severity, Version};
use sharpcore_crypto::{BlockId, Cryptor};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::Arc;

const FRAME_LEN_SIZE: usize = 4;
const VERSION_SIZE: usize = 8;
const CRC_SIZE: usize = 4;
/// Bytes of fixed overhead a block incurs beyond its ciphertext: length
/// prefix, version, AEAD tag (16 bytes), and trailing CRC32.
pub const FRAME_OVERHEAD: usize = FRAME_LEN_SIZE + VERSION_SIZE + 16 + CRC_SIZE;

/// A block read back from disk: its decrypted payload and the version it
/// was written at, so callers can derive the next version on rewrite.
#[derive(Debug, Clone)]
pub struct BlockRead {
    /// Decrypted plaintext payload.
    pub data: Vec<u8>,
    /// The version this block was written with.
    pub version: Version,
}

/// Owns the underlying file handle and the cryptor; every block read/write
/// passes through here.
///
/// Portable `read_at`/`write_at` are implemented with seek + read_exact /
/// write_all under a single `Mutex<File>`, rather than relying on Unix-only
/// `FileExt::read_at`/`write_at`, so the store behaves the same on every
/// target the rest of the workspace supports.
pub struct BlockStore {
    file: Mutex<File>,
    cryptor: Arc<dyn Cryptor>,
}

impl BlockStore {
    /// Wrap an already-open file and a cryptor.
    pub fn new(file: File, cryptor: Arc<dyn Cryptor>) -> Self {
        BlockStore {
            file: Mutex::new(file),
            cryptor,
        }
    }

    /// Encrypt and frame `plaintext`, writing it at `offset`. Returns the
    /// number of bytes the frame occupies on disk.
    pub fn write_block(&self, offset: u64, version: Version, plaintext: &[u8]) -> Result<u64> {
        let id = BlockId::new(offset, version);
        let ciphertext = self.cryptor.encrypt(id, plaintext);

        let body_len = VERSION_SIZE + ciphertext.len();
        let mut frame = Vec::with_capacity(FRAME_LEN_SIZE + body_len + CRC_SIZE);
        frame.extend_from_slice(&(body_len as u32).to_le_bytes());
        frame.extend_from_slice(&version.0.to_le_bytes());
        frame.extend_from_slice(&ciphertext);
        let crc = crc32fast::hash(&frame[FRAME_LEN_SIZE..]);
        frame.extend_from_slice(&crc.to_le_bytes());

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&frame)?;
        Ok(frame.len() as u64)
    }

    /// Read and verify the block framed at `offset`: CRC32 first, then AEAD
    /// decryption bound to the frame's own `(offset, version)`.
    pub fn read_block(&self, offset: u64) -> Result<BlockRead> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;

        let mut len_buf = [0u8; FRAME_LEN_SIZE];
        file.read_exact(&mut len_buf).map_err(|e| {
            torn_write_error(offset, &format!("could not read frame length: {e}"))
        })?;
        let body_len = u32::from_le_bytes(len_buf) as usize;

        let mut body = vec![0u8; body_len];
        file.read_exact(&mut body).map_err(|e| {
            torn_write_error(offset, &format!("frame body shorter than declared length: {e}"))
        })?;

        let mut crc_buf = [0u8; CRC_SIZE];
        file.read_exact(&mut crc_buf).map_err(|e| {
            torn_write_error(offset, &format!("could not read frame checksum: {e}"))
        })?;
        drop(file);

        let stored_crc = u32::from_le_bytes(crc_buf);
        let computed_crc = crc32fast::hash(&body);
        if stored_crc != computed_crc {
            return Err(torn_write_error(
                offset,
                "frame CRC32 mismatch; write was torn or block is corrupted",
            ));
        }

        if body.len() < VERSION_SIZE {
            return Err(torn_write_error(offset, "frame body too short for version field"));
        }
        let mut version_buf = [0u8; VERSION_SIZE];
        version_buf.copy_from_slice(&body[0..VERSION_SIZE]);
        let version = Version(u64::from_le_bytes(version_buf));
        let ciphertext = &body[VERSION_SIZE..];

        let id = BlockId::new(offset, version);
        let data = self.cryptor.decrypt(id, ciphertext)?;

        Ok(BlockRead { data, version })
    }

    /// Flush the OS write buffer and `fsync` the underlying file.
    pub fn sync(&self) -> Result<()> {
        self.file.lock().sync_all()?;
        Ok(())
    }

    /// Current file length in bytes.
    pub fn len(&self) -> Result<u64> {
        Ok(self.file.lock().metadata()?.len())
    }

    /// Whether the file is currently empty.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Grow the file to at least `len` bytes, for pre-allocating extents.
    pub fn set_min_len(&self, len: u64) -> Result<()> {
        let file = self.file.lock();
        if file.metadata()?.len() < len {
            file.set_len(len)?;
        }
        Ok(())
    }

    /// Write unframed bytes at `offset`, bypassing block framing
    /// entirely. The only legitimate use is the fixed file header, which
    /// carries its own magic and checksum and is never encrypted.
    pub fn write_raw_at(&self, offset: u64, bytes: &[u8]) -> Result<()> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(bytes)?;
        Ok(())
    }

    /// Read `len` unframed bytes at `offset`. See [`BlockStore::write_raw_at`].
    pub fn read_raw_at(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len];
        file.read_exact(&mut buf)?;
        Ok(buf)
    }
}

fn torn_write_error(offset: u64, detail: &str) -> Error {
    Error::corruption(Severity::Severe, format!("block@{offset}"), detail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sharpcore_config::KdfParams;
    use sharpcore_crypto::{derive_key, generate_salt, AesGcmCryptor};
    use std::io::Write as _;
    use tempfile::NamedTempFile;

    fn store() -> BlockStore {
        let salt = generate_salt();
        let key = derive_key("pw", &salt, &KdfParams::default()).unwrap();
        let cryptor = Arc::new(AesGcmCryptor::new(&key));
        let tmp = NamedTempFile::new().unwrap();
        let file = tmp.reopen().unwrap();
        std::mem::forget(tmp); // keep backing file alive for the test
        BlockStore::new(file, cryptor)
    }

    #[test]
    fn round_trips_a_block() {
        let store = store();
        store.write_block(0, Version::INITIAL, b"hello block").unwrap();
        let read = store.read_block(0).unwrap();
        assert_eq!(read.data, b"hello block");
        assert_eq!(read.version, Version::INITIAL);
    }

    #[test]
    fn rewrite_at_same_offset_uses_new_version() {
        let store = store();
        store.write_block(0, Version(1), b"first").unwrap();
        store.write_block(0, Version(2), b"second").unwrap();
        let read = store.read_block(0).unwrap();
        assert_eq!(read.data, b"second");
        assert_eq!(read.version, Version(2));
    }

    #[test]
    fn detects_crc_corruption() {
        let store = store();
        store.write_block(0, Version::INITIAL, b"payload").unwrap();
        {
            let mut file = store.file.lock();
            file.seek(SeekFrom::Start(FRAME_LEN_SIZE as u64 + VERSION_SIZE as u64))
                .unwrap();
            file.write_all(&[0xFF]).unwrap();
        }
        let err = store.read_block(0).unwrap_err();
        assert!(matches!(err, Error::Corruption { .. }));
    }

    #[test]
    fn detects_truncated_frame() {
        let store = store();
        let written = store.write_block(0, Version::INITIAL, b"payload").unwrap();
        {
            let file = store.file.lock();
            file.set_len(written - 1).unwrap();
        }
        assert!(store.read_block(0).is_err());
    }

    #[test]
    fn multiple_blocks_at_distinct_offsets() {
        let store = store();
        let first_len = store.write_block(0, Version::INITIAL, b"alpha block payload").unwrap();
        store
            .write_block(first_len, Version::INITIAL, b"beta block payload")
            .unwrap();
        assert_eq!(store.read_block(0).unwrap().data, b"alpha block payload");
        assert_eq!(
            store.read_block(first_len).unwrap().data,
            b"beta block payload"
        );
    }
}
