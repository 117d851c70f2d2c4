//! Core value types shared across every SharpCoreDB crate.
//!
//! These are the data-model primitives of `spec.md` §3: the logical block
//! name, the SHA-256 checksum, the monotonic version counter, and the
//! storage reference a row resolves to once it picks a tier.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A stable, UTF-8 logical identifier for a block, e.g. `table:orders:data`,
/// `page:users:42`, `column:sales:revenue`, `wal:segment:7`.
///
/// Names are opaque to the storage layer; callers impose their own
/// namespacing convention by choosing the string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockName(String);

impl BlockName {
    /// Build a block name from any stringable value.
    pub fn new(name: impl Into<String>) -> Self {
        BlockName(name.into())
    }

    /// Borrow the name as `&str`.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Reserved prefix for WAL segment blocks (`wal:<n>`).
    pub fn wal_segment(n: u64) -> Self {
        BlockName(format!("wal:{n}"))
    }

    /// Reserved name for the registry block.
    pub fn registry() -> Self {
        BlockName("__registry__".to_string())
    }

    /// Reserved name for the free-space manager block.
    pub fn fsm() -> Self {
        BlockName("__fsm__".to_string())
    }

    /// An overflow chain page name: `overflow:<table>:<chain-id>:<seq>`.
    pub fn overflow_page(table: &str, chain_id: u64, seq: u32) -> Self {
        BlockName(format!("overflow:{table}:{chain_id}:{seq}"))
    }
}

impl fmt::Display for BlockName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BlockName {
    fn from(s: &str) -> Self {
        BlockName(s.to_string())
    }
}

impl From<String> for BlockName {
    fn from(s: String) -> Self {
        BlockName(s)
    }
}

/// A SHA-256 digest of a block's plaintext payload.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Checksum(pub [u8; 32]);

impl Checksum {
    /// Compute the checksum of a byte slice.
    pub fn of(data: &[u8]) -> Self {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(data);
        let digest = hasher.finalize();
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        Checksum(out)
    }

    /// The all-zero checksum, used only as a placeholder before first write.
    pub const ZERO: Checksum = Checksum([0u8; 32]);
}

impl fmt::Debug for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Checksum({})", hex::encode(self.0))
    }
}

/// A monotonically increasing per-block write counter, used to derive
/// distinct AEAD nonces for rewrites of the same block offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Version(pub u64);

impl Version {
    /// The version a freshly created block starts at.
    pub const INITIAL: Version = Version(1);

    /// The next version after this one.
    pub fn next(self) -> Version {
        Version(self.0 + 1)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A 128-bit random identifier used for externalized blob files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlobId(pub [u8; 16]);

impl BlobId {
    /// Generate a fresh random id.
    pub fn random() -> Self {
        use rand::RngCore;
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        BlobId(bytes)
    }

    /// Render as lowercase hex, the form used in `blobs/<aa>/<bb>/<hex>.bin`.
    pub fn to_hex(self) -> String {
        hex::encode(self.0)
    }

    /// The two-level fan-out directory components for this id.
    pub fn fan_out(self) -> (String, String) {
        let hex = self.to_hex();
        (hex[0..2].to_string(), hex[2..4].to_string())
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// A pointer to a row externalized to its own file under `blobs/`.
///
/// Mirrors `spec.md` §3's `FilePointer = {file-id, relative-path, size, checksum}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilePointer {
    /// Random id identifying the blob file.
    pub file_id: BlobId,
    /// Path relative to the database's `blobs/` directory.
    pub relative_path: String,
    /// Size of the referenced payload in bytes.
    pub size: u64,
    /// SHA-256 checksum of the referenced payload.
    pub checksum: Checksum,
}

impl FilePointer {
    /// Build the canonical `blobs/<aa>/<bb>/<hex>.bin` pointer for a fresh id.
    pub fn new(file_id: BlobId, size: u64, checksum: Checksum) -> Self {
        let (aa, bb) = file_id.fan_out();
        FilePointer {
            file_id,
            relative_path: format!("{aa}/{bb}/{}.bin", file_id.to_hex()),
            size,
            checksum,
        }
    }

    /// The sidecar `.meta` path for this pointer.
    pub fn meta_relative_path(&self) -> String {
        self.relative_path.replace(".bin", ".meta")
    }
}

/// Which tier a row's bytes are stored in, per `spec.md` §4.8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RowTier {
    /// Stored inline in a page's row heap.
    Inline,
    /// Stored in a chain of dedicated overflow blocks.
    Overflow,
    /// Stored in a separate file under `blobs/`.
    External,
}

impl fmt::Display for RowTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RowTier::Inline => "inline",
            RowTier::Overflow => "overflow",
            RowTier::External => "external",
        };
        f.write_str(s)
    }
}

/// Where a row's bytes can be found, once `select_tier` has decided.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageRef {
    /// Inline in a page's row heap, identified by slot.
    Paged {
        /// Owning table name.
        table: String,
        /// Page block this row lives in.
        page_id: u64,
        /// Stable slot index within the page.
        slot_id: u32,
    },
    /// The head of an overflow chain.
    Overflow {
        /// Owning table name.
        table: String,
        /// Chain identifier (stable for the row's lifetime).
        chain_id: u64,
    },
    /// Externalized to a blob file.
    External(FilePointer),
}

impl StorageRef {
    /// The tier this reference belongs to.
    pub fn tier(&self) -> RowTier {
        match self {
            StorageRef::Paged { .. } => RowTier::Inline,
            StorageRef::Overflow { .. } => RowTier::Overflow,
            StorageRef::External(_) => RowTier::External,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_is_deterministic() {
        let a = Checksum::of(b"hello");
        let b = Checksum::of(b"hello");
        assert_eq!(a, b);
        let c = Checksum::of(b"hellp");
        assert_ne!(a, c);
    }

    #[test]
    fn version_increments() {
        let v = Version::INITIAL;
        assert_eq!(v.next(), Version(2));
    }

    #[test]
    fn blob_id_fan_out_matches_hex_prefix() {
        let id = BlobId([0xab, 0xcd, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        let (aa, bb) = id.fan_out();
        assert_eq!(aa, "ab");
        assert_eq!(bb, "cd");
    }

    #[test]
    fn file_pointer_path_matches_fan_out() {
        let id = BlobId([0x11; 16]);
        let fp = FilePointer::new(id, 42, Checksum::ZERO);
        assert!(fp.relative_path.starts_with("11/11/"));
        assert!(fp.relative_path.ends_with(".bin"));
        assert_eq!(fp.meta_relative_path(), fp.relative_path.replace(".bin", ".meta"));
    }

    #[test]
    fn storage_ref_tier() {
        let paged = StorageRef::Paged {
            table: "orders".into(),
            page_id: 1,
            slot_id: 0,
        };
        assert_eq!(paged.tier(), RowTier::Inline);
    }
}
