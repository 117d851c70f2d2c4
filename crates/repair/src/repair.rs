//! Repair (`spec.md` §4.12): rebuild what scanning can recover, excise what
//! it can't under the configured policy, and never touch the original file
//! without a byte-copy backup already in place.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Read as _;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use sharpcore_concurrency::CancellationToken;
use sharpcore_config::{KdfParams, RepairPolicy, ValidationMode};
use sharpcore_core::{BlockName, Checksum, Error, Result, Severity, Version};
use sharpcore_crypto::{derive_key, AesGcmCryptor, Cryptor};
use sharpcore_durability::{build_replay_plan, redo_writes, RedoWrite};
use sharpcore_storage::{
    BlockRegistry, BlockStore, EntryFlags, FileHeader, FreeSpaceManager, RegistryEntry,
    FRAME_OVERHEAD, HEADER_SIZE,
};

use crate::rebuild::rebuild_registry;
use crate::report::ValidationReport;
use crate::scan::scan_blocks;
use crate::validate::validate;

/// A serializable record of what repair changed, so a caller can persist
/// or audit it (`SPEC_FULL.md` C12 supplement).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepairManifest {
    /// Names dropped entirely: unreadable directly and their newest WAL
    /// redo (if any) also failed to verify.
    pub lost_block_names: Vec<String>,
    /// Offsets of recovered blocks whose logical name could not be
    /// reconstructed from the WAL (present in the file, but un-addressable
    /// through the registry).
    pub unnamed_block_offsets: Vec<u64>,
    /// Byte offset WAL replay stopped at, if short of the log's logical
    /// end.
    pub wal_truncated_at: Option<u64>,
    /// Bytes of the file identified as free (not owned by the header or
    /// any registered extent) after repair. Informational only — the
    /// free-space manager itself is never persisted; a fresh one is
    /// rebuilt empty at the next `open`.
    pub reclaimed_free_bytes: u64,
}

/// The outcome of a `repair` run: what got fixed, plus a post-repair
/// `Standard` validation report confirming the file is usable again.
#[derive(Debug, Clone)]
pub struct RepairResult {
    /// What repair changed.
    pub manifest: RepairManifest,
    /// A `Standard`-mode validation report taken after repair, before the
    /// caller is told it succeeded.
    pub report: ValidationReport,
}

/// Repair the database file at `path`, always taking a byte-copy backup at
/// `backup_path` first. On any failure — including a repaired file that
/// still fails its post-check — the original is restored from that backup
/// and an error is returned (`spec.md` §4.12's "always... restore from the
/// backup and surface an unrecoverable error").
pub fn repair(
    path: impl AsRef<Path>,
    password: &str,
    policy: RepairPolicy,
    backup_path: impl AsRef<Path>,
    token: Option<&CancellationToken>,
) -> Result<RepairResult> {
    let path = path.as_ref();
    let backup_path = backup_path.as_ref();
    std::fs::copy(path, backup_path)?;
    info!(path = %path.display(), backup = %backup_path.display(), ?policy, "starting repair");

    match run_repair(path, password, policy, token) {
        Ok(result) if result.report.is_healthy() => {
            info!(
                lost = result.manifest.lost_block_names.len(),
                unnamed = result.manifest.unnamed_block_offsets.len(),
                "repair succeeded"
            );
            Ok(result)
        }
        Ok(_) => {
            warn!("repair's post-check still reported Severe/Fatal findings; restoring backup");
            std::fs::copy(backup_path, path)?;
            Err(Error::corruption(
                Severity::Fatal,
                path.display().to_string(),
                "repair completed but its post-check still reported Severe/Fatal findings; restored from backup",
            ))
        }
        Err(e) => {
            error!(error = %e, "repair failed; restoring backup");
            std::fs::copy(backup_path, path)?;
            Err(e)
        }
    }
}

fn run_repair(
    path: &Path,
    password: &str,
    policy: RepairPolicy,
    token: Option<&CancellationToken>,
) -> Result<RepairResult> {
    let file = OpenOptions::new().read(true).write(true).open(path)?;
    let mut header_buf = [0u8; HEADER_SIZE];
    {
        let mut f = file.try_clone()?;
        f.read_exact(&mut header_buf)?;
    }
    let header = FileHeader::from_bytes(&header_buf).map_err(|e| {
        Error::corruption(
            Severity::Fatal,
            "header",
            format!("header bytes lost; no cryptographic recovery is possible without the KDF salt ({e})"),
        )
    })?;

    let kdf_params = KdfParams {
        memory_kib: header.kdf_memory_kib,
        iterations: header.kdf_iterations,
        parallelism: header.kdf_parallelism,
    };
    let key = derive_key(password, &header.kdf_salt, &kdf_params)?;
    let cryptor: Arc<dyn Cryptor> = Arc::new(AesGcmCryptor::new(&key));
    let store = BlockStore::new(file, cryptor);
    let file_len = store.len()?;

    let mut manifest = RepairManifest::default();

    let mut registry = match store
        .read_block(header.registry_block_offset)
        .ok()
        .and_then(|read| BlockRegistry::from_bytes(&read.data).ok())
    {
        Some(r) => r,
        None => {
            let scanned = scan_blocks(&store, HEADER_SIZE as u64, file_len, token)?;
            let rebuilt = rebuild_registry(scanned)?;
            manifest.unnamed_block_offsets = rebuilt.unnamed_block_offsets;
            rebuilt.registry
        }
    };

    let redo_by_name = latest_redo_by_name(&store, &registry)?;
    let names: Vec<BlockName> = registry.snapshot().into_iter().map(|(name, _)| name).collect();
    for name in &names {
        if name.as_str().starts_with("wal:") {
            continue;
        }
        let entry = registry.require(name)?;
        let direct_ok = store
            .read_block(entry.offset)
            .map(|read| Checksum::of(&read.data) == entry.checksum)
            .unwrap_or(false);
        if direct_ok {
            continue;
        }

        if let Some(redo) = redo_by_name.get(name) {
            if Checksum::of(&redo.payload) == redo.checksum {
                registry.put(
                    name.clone(),
                    RegistryEntry {
                        offset: redo.offset,
                        extent_size: FreeSpaceManager::round_allocation_size(
                            redo.payload.len() as u64 + FRAME_OVERHEAD as u64,
                        ),
                        checksum: redo.checksum,
                        version: redo.version,
                        flags: EntryFlags::default(),
                    },
                );
                continue;
            }
        }

        match policy {
            RepairPolicy::Conservative => {
                return Err(Error::corruption(
                    Severity::Fatal,
                    name.to_string(),
                    "unreadable directly and its newest WAL redo also fails; Conservative policy refuses to drop data — retry with Moderate/Aggressive or restore from backup",
                ));
            }
            RepairPolicy::Moderate | RepairPolicy::Aggressive => {
                warn!(block = %name, ?policy, "excising unreadable block");
                registry.delete(name);
                manifest.lost_block_names.push(name.to_string());
            }
        }
    }

    manifest.reclaimed_free_bytes = reclaimed_free_bytes(&registry, file_len);

    let bytes = registry.to_bytes()?;
    let new_offset = store.len()?;
    store.write_block(new_offset, Version::INITIAL, &bytes)?;

    let mut new_header = header.clone();
    new_header.registry_block_offset = new_offset;
    store.write_raw_at(0, &new_header.to_bytes())?;
    store.sync()?;

    let report = validate(path, password, ValidationMode::Standard, token)?;
    manifest.wal_truncated_at = report.wal_truncated_at;

    Ok(RepairResult { manifest, report })
}

/// Replay every WAL segment the registry currently knows about, returning
/// the most recently committed write for each name — the redo path an
/// excise decision checks before giving up on a block.
fn latest_redo_by_name(store: &BlockStore, registry: &BlockRegistry) -> Result<HashMap<BlockName, RedoWrite>> {
    let mut segment_id = 0u64;
    let mut combined = Vec::new();
    loop {
        let name = BlockName::wal_segment(segment_id);
        let Some(entry) = registry.get(&name) else { break };
        match store.read_block(entry.offset) {
            Ok(read) => combined.extend_from_slice(&read.data),
            Err(_) => break,
        }
        segment_id += 1;
    }

    let mut map = HashMap::new();
    if !combined.is_empty() {
        if let Ok(plan) = build_replay_plan(&combined) {
            for write in redo_writes(&plan) {
                map.insert(write.name.clone(), write);
            }
        }
    }
    Ok(map)
}

/// `whole-file − (header ∪ registered extents)`, per `spec.md` §4.12's
/// free-extent re-hash strategy — reported, not persisted, since the FSM
/// has no on-disk representation of its own to rewrite.
fn reclaimed_free_bytes(registry: &BlockRegistry, file_len: u64) -> u64 {
    let mut owned: Vec<(u64, u64)> = vec![(0, HEADER_SIZE as u64)];
    for (_, entry) in registry.snapshot() {
        owned.push((entry.offset, entry.offset + entry.extent_size));
    }
    owned.sort();

    let mut free = 0u64;
    let mut cursor = 0u64;
    for (start, end) in owned {
        if start > cursor {
            free += start - cursor;
        }
        cursor = cursor.max(end);
    }
    if file_len > cursor {
        free += file_len - cursor;
    }
    free
}
