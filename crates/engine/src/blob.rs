//! External blob files (`spec.md` §4.8, the `External` row tier).
//!
//! Each externalized row lives at `blobs/<aa>/<bb>/<hex32>.bin` under the
//! database's directory, fanned out two hex levels deep so no single
//! directory accumulates more entries than the filesystem handles well. A
//! sidecar `<hex32>.meta` carries the 40-byte `{size: u64 | sha256: 32
//! bytes}` record from `spec.md` §6, so a reader can validate a blob
//! without decoding the row format that lives inside it.

use byteorder::{ByteOrder, LittleEndian};
use sharpcore_core::{BlobId, Checksum, Error, FilePointer, Result, Severity};
use std::fs;
use std::path::{Path, PathBuf};

const META_LEN: usize = 40;

/// Owns the `blobs/` directory for one database.
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    /// The `blobs/` directory sibling to `db_path`.
    pub fn for_database(db_path: &Path) -> Self {
        let root = db_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join("blobs");
        BlobStore { root }
    }

    fn bin_path(&self, pointer: &FilePointer) -> PathBuf {
        self.root.join(&pointer.relative_path)
    }

    fn meta_path(&self, pointer: &FilePointer) -> PathBuf {
        self.root.join(pointer.meta_relative_path())
    }

    /// Write a new blob, returning the `FilePointer` a row stores to find
    /// it again.
    pub fn put(&self, payload: &[u8]) -> Result<FilePointer> {
        let id = BlobId::random();
        let checksum = Checksum::of(payload);
        let pointer = FilePointer::new(id, payload.len() as u64, checksum);

        let bin_path = self.bin_path(&pointer);
        if let Some(dir) = bin_path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&bin_path, payload)?;

        let mut meta = [0u8; META_LEN];
        LittleEndian::write_u64(&mut meta[0..8], pointer.size);
        meta[8..40].copy_from_slice(&checksum.0);
        fs::write(self.meta_path(&pointer), meta)?;

        Ok(pointer)
    }

    /// Read a blob's payload back, verifying it against its sidecar
    /// `.meta` checksum.
    pub fn get(&self, pointer: &FilePointer) -> Result<Vec<u8>> {
        let bin_path = self.bin_path(pointer);
        let payload = fs::read(&bin_path).map_err(|e| {
            Error::corruption(
                Severity::Severe,
                pointer.relative_path.clone(),
                format!("blob file missing or unreadable: {e}"),
            )
        })?;

        let meta = self.read_meta(pointer)?;
        if meta.size != payload.len() as u64 || meta.checksum != Checksum::of(&payload) {
            return Err(Error::corruption(
                Severity::Severe,
                pointer.relative_path.clone(),
                "blob payload does not match its sidecar .meta checksum",
            ));
        }
        Ok(payload)
    }

    fn read_meta(&self, pointer: &FilePointer) -> Result<BlobMeta> {
        let bytes = fs::read(self.meta_path(pointer)).map_err(|e| {
            Error::corruption(
                Severity::Severe,
                pointer.meta_relative_path(),
                format!("blob .meta file missing or unreadable: {e}"),
            )
        })?;
        if bytes.len() != META_LEN {
            return Err(Error::corruption(
                Severity::Severe,
                pointer.meta_relative_path(),
                format!("expected a {META_LEN}-byte .meta record, found {}", bytes.len()),
            ));
        }
        let size = LittleEndian::read_u64(&bytes[0..8]);
        let mut checksum = [0u8; 32];
        checksum.copy_from_slice(&bytes[8..40]);
        Ok(BlobMeta {
            size,
            checksum: Checksum(checksum),
        })
    }

    /// Delete a blob and its sidecar, tolerating either already being gone.
    pub fn remove(&self, pointer: &FilePointer) -> Result<()> {
        let bin_path = self.bin_path(pointer);
        let meta_path = self.meta_path(pointer);
        if bin_path.exists() {
            fs::remove_file(&bin_path)?;
        }
        if meta_path.exists() {
            fs::remove_file(&meta_path)?;
        }
        Ok(())
    }

    /// List every `.bin` file's relative path currently present under
    /// `blobs/`, for the orphan scan.
    pub fn list_relative_paths(&self) -> Result<Vec<String>> {
        let mut out = Vec::new();
        if !self.root.exists() {
            return Ok(out);
        }
        for aa in fs::read_dir(&self.root)? {
            let aa = aa?;
            if !aa.file_type()?.is_dir() {
                continue;
            }
            for bb in fs::read_dir(aa.path())? {
                let bb = bb?;
                if !bb.file_type()?.is_dir() {
                    continue;
                }
                for entry in fs::read_dir(bb.path())? {
                    let entry = entry?;
                    let path = entry.path();
                    if path.extension().and_then(|e| e.to_str()) == Some("bin") {
                        if let Ok(relative) = path.strip_prefix(&self.root) {
                            out.push(relative.to_string_lossy().replace('\\', "/"));
                        }
                    }
                }
            }
        }
        Ok(out)
    }

    /// File modification time of a blob, used to gate orphan deletion on
    /// `orphan_retention_secs`.
    pub fn mtime_unix(&self, relative_path: &str) -> Result<u64> {
        let metadata = fs::metadata(self.root.join(relative_path))?;
        let modified = metadata.modified()?;
        Ok(modified
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0))
    }

    /// Remove a blob (and its sidecar) addressed only by relative path,
    /// for orphan cleanup where no `FilePointer` is held.
    pub fn remove_by_relative_path(&self, relative_path: &str) -> Result<()> {
        let bin_path = self.root.join(relative_path);
        let meta_path = self.root.join(relative_path.replace(".bin", ".meta"));
        if bin_path.exists() {
            fs::remove_file(&bin_path)?;
        }
        if meta_path.exists() {
            fs::remove_file(&meta_path)?;
        }
        Ok(())
    }
}

struct BlobMeta {
    size: u64,
    checksum: Checksum,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn put_then_get_round_trips() {
        let dir = tempdir().unwrap();
        let store = BlobStore::for_database(&dir.path().join("db.scdb"));
        let pointer = store.put(b"row payload bytes").unwrap();
        let payload = store.get(&pointer).unwrap();
        assert_eq!(payload, b"row payload bytes");
    }

    #[test]
    fn get_detects_tampered_payload() {
        let dir = tempdir().unwrap();
        let store = BlobStore::for_database(&dir.path().join("db.scdb"));
        let pointer = store.put(b"original").unwrap();
        fs::write(store.bin_path(&pointer), b"tampered").unwrap();
        let err = store.get(&pointer).unwrap_err();
        assert!(matches!(err, Error::Corruption { .. }));
    }

    #[test]
    fn remove_deletes_both_files() {
        let dir = tempdir().unwrap();
        let store = BlobStore::for_database(&dir.path().join("db.scdb"));
        let pointer = store.put(b"data").unwrap();
        store.remove(&pointer).unwrap();
        assert!(!store.bin_path(&pointer).exists());
        assert!(!store.meta_path(&pointer).exists());
    }

    #[test]
    fn list_relative_paths_finds_written_blobs() {
        let dir = tempdir().unwrap();
        let store = BlobStore::for_database(&dir.path().join("db.scdb"));
        let pointer = store.put(b"data").unwrap();
        let listed = store.list_relative_paths().unwrap();
        assert_eq!(listed, vec![pointer.relative_path]);
    }
}
