//! `VACUUM Full` (`spec.md` §4.7/§4.12): rewrite the file with no gaps,
//! rebuild the registry, atomic rename. The facade in `sharpcore-engine`
//! forwards `vacuum(VacuumMode::Full)` here, since a full rewrite needs to
//! enumerate every block directly rather than go through `Database`'s
//! transactional write path.

use std::fs::OpenOptions;
use std::io::Read as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::info;

use sharpcore_concurrency::{CancellationToken, ChunkPacer};
use sharpcore_config::KdfParams;
use sharpcore_core::{BlockName, Checksum, Error, Result, Severity, Version};
use sharpcore_crypto::{derive_key, AesGcmCryptor, Cryptor};
use sharpcore_storage::{
    BlockRegistry, BlockStore, EntryFlags, FileHeader, FreeSpaceManager, RegistryEntry,
    FRAME_OVERHEAD, HEADER_SIZE,
};

/// What `vacuum_full` changed, for the caller to log or report to the user
/// (open question #3, `SPEC_FULL.md` §16).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VacuumReport {
    /// Wall-clock time the rewrite took.
    pub elapsed: std::time::Duration,
    /// Bytes the file shrank by.
    pub bytes_reclaimed: u64,
}

/// Rewrite `path` into a freshly packed file with no free-space gaps and no
/// WAL history, then atomically rename it over the original. Only
/// registered data blocks survive; `wal:<n>` segments are intentionally
/// not carried over, since a full VACUUM is itself the new baseline a
/// reopen's WAL replay starts from.
///
/// Assumes a healthy database (a valid header and registry); repair a
/// corrupted file with [`crate::repair::repair`] first.
pub fn vacuum_full(
    path: impl AsRef<Path>,
    password: &str,
    token: Option<&CancellationToken>,
) -> Result<VacuumReport> {
    let started = Instant::now();
    let path = path.as_ref();

    let file = OpenOptions::new().read(true).write(true).open(path)?;
    let mut header_buf = [0u8; HEADER_SIZE];
    {
        let mut f = file.try_clone()?;
        f.read_exact(&mut header_buf)?;
    }
    let header = FileHeader::from_bytes(&header_buf)?;

    let kdf_params = KdfParams {
        memory_kib: header.kdf_memory_kib,
        iterations: header.kdf_iterations,
        parallelism: header.kdf_parallelism,
    };
    let key = derive_key(password, &header.kdf_salt, &kdf_params)?;
    let cryptor: Arc<dyn Cryptor> = Arc::new(AesGcmCryptor::new(&key));
    let store = BlockStore::new(file, cryptor.clone());
    let old_file_len = store.len()?;

    let registry_read = store.read_block(header.registry_block_offset)?;
    let registry = BlockRegistry::from_bytes(&registry_read.data)?;

    let mut surviving: Vec<(BlockName, Vec<u8>)> = Vec::new();
    let mut pacer = ChunkPacer::new();
    for (name, entry) in registry.snapshot() {
        if name.as_str().starts_with("wal:") {
            continue;
        }
        if pacer.chunk_elapsed() {
            if let Some(token) = token {
                if token.is_cancelled() {
                    return Err(Error::Cancelled("vacuum full".to_string()));
                }
            }
            pacer.reset();
        }
        let read = store.read_block(entry.offset)?;
        if Checksum::of(&read.data) != entry.checksum {
            return Err(Error::corruption(
                Severity::Severe,
                name.to_string(),
                "block failed checksum verification during vacuum; run repair first",
            ));
        }
        surviving.push((name, read.data));
    }

    let tmp_path = vacuum_tmp_path(path);
    let tmp_file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(&tmp_path)?;
    let new_store = BlockStore::new(tmp_file, cryptor);
    new_store.set_min_len(HEADER_SIZE as u64)?;

    let new_registry = BlockRegistry::new();
    let mut cursor = HEADER_SIZE as u64;
    for (name, data) in surviving {
        new_store.write_block(cursor, Version::INITIAL, &data)?;
        let extent_size =
            FreeSpaceManager::round_allocation_size(data.len() as u64 + FRAME_OVERHEAD as u64);
        new_registry.put(
            name,
            RegistryEntry {
                offset: cursor,
                extent_size,
                checksum: Checksum::of(&data),
                version: Version::INITIAL,
                flags: EntryFlags::default(),
            },
        );
        cursor += extent_size;
    }

    let registry_bytes = new_registry.to_bytes()?;
    let registry_offset = cursor;
    new_store.write_block(registry_offset, Version::INITIAL, &registry_bytes)?;
    let registry_extent = FreeSpaceManager::round_allocation_size(
        registry_bytes.len() as u64 + FRAME_OVERHEAD as u64,
    );
    let wal_origin = registry_offset + registry_extent;
    new_store.set_min_len(wal_origin)?;

    let mut new_header = header.clone();
    new_header.registry_block_offset = registry_offset;
    new_header.wal_origin_offset = wal_origin;
    new_header.last_checkpoint_lsn = 0;
    new_store.write_raw_at(0, &new_header.to_bytes())?;
    new_store.sync()?;
    drop(new_store);

    std::fs::rename(&tmp_path, path)?;

    let new_file_len = wal_origin;
    let report = VacuumReport {
        elapsed: started.elapsed(),
        bytes_reclaimed: old_file_len.saturating_sub(new_file_len),
    };
    info!(
        path = %path.display(),
        bytes_reclaimed = report.bytes_reclaimed,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "vacuum full complete"
    );
    Ok(report)
}

fn vacuum_tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".vacuum.tmp");
    path.with_file_name(name)
}
