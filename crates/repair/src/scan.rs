//! Brute-force frame scanner (`spec.md` §4.12: "rebuilds registry by
//! scanning framed blocks").
//!
//! Used when the registry block itself cannot be trusted, so the usual
//! name → offset indirection is unavailable. Walks the byte range looking
//! for anything that decodes as a valid block frame, peeking the 4-byte
//! length prefix before paying for a full CRC32 + AEAD verification, and
//! resyncing one byte at a time past anything that doesn't pan out.

use sharpcore_concurrency::{CancellationToken, ChunkPacer};
use sharpcore_core::{Error, Result, Version};
use sharpcore_storage::{BlockStore, FRAME_OVERHEAD};

const LEN_PREFIX_SIZE: u64 = 4;
const TRAILER_SIZE: u64 = 4;
/// `body_len` is `version(8) + ciphertext.len()`, and ciphertext can be as
/// short as a bare 16-byte AEAD tag over an empty plaintext.
const MIN_BODY_LEN: u64 = 8 + 16;

/// A block frame recovered by brute-force scanning: its offset, the
/// version it was written with, and its decrypted payload.
#[derive(Debug, Clone)]
pub struct RecoveredBlock {
    /// Absolute offset the frame starts at.
    pub offset: u64,
    /// The write's version.
    pub version: Version,
    /// Decrypted plaintext payload.
    pub plaintext: Vec<u8>,
}

/// Scan `[start, end)` for every byte-verified, AEAD-verified block frame.
///
/// Invoked with `start` at the first byte past the fixed header — the
/// registry and every data/WAL-segment block live somewhere in that range,
/// framed the same way regardless of what the (possibly corrupted)
/// registry currently claims about them.
pub fn scan_blocks(
    store: &BlockStore,
    start: u64,
    end: u64,
    token: Option<&CancellationToken>,
) -> Result<Vec<RecoveredBlock>> {
    let mut found = Vec::new();
    let mut cursor = start;
    let mut pacer = ChunkPacer::new();

    while cursor + LEN_PREFIX_SIZE <= end {
        if pacer.chunk_elapsed() {
            if let Some(token) = token {
                if token.is_cancelled() {
                    return Err(Error::Cancelled("block scan".to_string()));
                }
            }
            pacer.reset();
        }

        let len_bytes = store.read_raw_at(cursor, LEN_PREFIX_SIZE as usize)?;
        let body_len = u32::from_le_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]]) as u64;
        let frame_len = LEN_PREFIX_SIZE + body_len + TRAILER_SIZE;
        let plausible = body_len >= MIN_BODY_LEN
            && frame_len <= FRAME_OVERHEAD as u64 + (end - start)
            && cursor + frame_len <= end;

        if plausible {
            if let Ok(read) = store.read_block(cursor) {
                found.push(RecoveredBlock {
                    offset: cursor,
                    version: read.version,
                    plaintext: read.data,
                });
                cursor += frame_len;
                continue;
            }
        }
        cursor += 1;
    }

    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sharpcore_config::KdfParams;
    use sharpcore_crypto::{derive_key, generate_salt, AesGcmCryptor};
    use std::sync::Arc;
    use tempfile::NamedTempFile;

    fn store() -> BlockStore {
        let salt = generate_salt();
        let key = derive_key("pw", &salt, &KdfParams::default()).unwrap();
        let cryptor = Arc::new(AesGcmCryptor::new(&key));
        let tmp = NamedTempFile::new().unwrap();
        let file = tmp.reopen().unwrap();
        std::mem::forget(tmp);
        BlockStore::new(file, cryptor)
    }

    #[test]
    fn finds_blocks_packed_with_no_gaps() {
        let store = store();
        let first_len = store.write_block(0, Version::INITIAL, b"alpha payload bytes").unwrap();
        store.write_block(first_len, Version(2), b"beta payload bytes here").unwrap();
        let end = store.len().unwrap();

        let found = scan_blocks(&store, 0, end, None).unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].offset, 0);
        assert_eq!(found[0].plaintext, b"alpha payload bytes");
        assert_eq!(found[1].plaintext, b"beta payload bytes here");
    }

    #[test]
    fn resyncs_past_garbage_between_blocks() {
        let store = store();
        let first_len = store.write_block(0, Version::INITIAL, b"alpha payload bytes").unwrap();
        store.write_raw_at(first_len, &[0xAA; 37]).unwrap();
        let gap_end = first_len + 37;
        store.write_block(gap_end, Version::INITIAL, b"beta payload bytes here").unwrap();
        let end = store.len().unwrap();

        let found = scan_blocks(&store, 0, end, None).unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[1].offset, gap_end);
    }

    #[test]
    fn skips_a_block_whose_aead_tag_was_corrupted() {
        let store = store();
        let len = store.write_block(0, Version::INITIAL, b"alpha payload bytes").unwrap();
        store.write_raw_at(len - 5, &[0xFF; 1]).unwrap();
        store.write_block(len, Version::INITIAL, b"beta payload bytes here").unwrap();
        let end = store.len().unwrap();

        let found = scan_blocks(&store, 0, end, None).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].plaintext, b"beta payload bytes here");
    }
}
