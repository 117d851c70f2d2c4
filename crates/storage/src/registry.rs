//! The block registry (`spec.md` §4.3, component C3): the single source of
//! truth mapping a logical [`BlockName`] to where its current bytes live.
//!
//! The registry itself is one serialized block, rewritten as a whole on
//! every flush: a fresh copy is written to a newly allocated offset, the
//! file header's `registry_block_offset` is updated to point at it, and
//! only then is the old copy's extent released back to the free-space
//! manager. A crash between those steps leaves the header still pointing at
//! the previous, still-valid copy — the registry is never torn.
//!
//! In memory the registry is a `DashMap` so many concurrent readers can look
//! up a block's location without contending with each other; structural
//! changes (`put`/`delete`) still go through a single writer at a time,
//! enforced by the engine's transaction discipline rather than by this
//! type.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sharpcore_core::{BlockName, Checksum, Error, Result, Version};
use std::sync::atomic::{AtomicBool, Ordering};

/// Flags recorded alongside a registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct EntryFlags {
    /// Set on blocks belonging to a transaction that has not yet committed;
    /// cleared on commit, removed entirely on rollback.
    pub provisional: bool,
}

/// One registry entry: where a block's current bytes live, and enough
/// metadata to validate them without reading them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    /// Absolute byte offset of the block's current frame.
    pub offset: u64,
    /// Size of the allocated extent backing this block, in bytes (may
    /// exceed the frame's actual length; power-of-two rounded).
    pub extent_size: u64,
    /// SHA-256 checksum of the block's plaintext payload.
    pub checksum: Checksum,
    /// The block's current write version.
    pub version: Version,
    /// Bookkeeping flags.
    pub flags: EntryFlags,
}

/// In-memory block registry, persisted as a single dedicated block.
///
/// This is the "non-overlapping with the free-space manager" half of
/// `spec.md` invariant #2: every byte in the file is owned by exactly one
/// of `BlockRegistry` or `FreeSpaceManager`, never both.
pub struct BlockRegistry {
    entries: DashMap<BlockName, RegistryEntry>,
    dirty: AtomicBool,
}

impl BlockRegistry {
    /// An empty registry, as created for a brand-new database.
    pub fn new() -> Self {
        BlockRegistry {
            entries: DashMap::new(),
            dirty: AtomicBool::new(false),
        }
    }

    /// Look up a block's current location.
    pub fn get(&self, name: &BlockName) -> Option<RegistryEntry> {
        self.entries.get(name).map(|e| e.clone())
    }

    /// Insert or replace a block's location.
    pub fn put(&self, name: BlockName, entry: RegistryEntry) {
        self.entries.insert(name, entry);
        self.dirty.store(true, Ordering::Release);
    }

    /// Remove a block's registry entry, returning the prior value if any.
    pub fn delete(&self, name: &BlockName) -> Option<RegistryEntry> {
        let prior = self.entries.remove(name).map(|(_, v)| v);
        if prior.is_some() {
            self.dirty.store(true, Ordering::Release);
        }
        prior
    }

    /// Look up a block, returning `Error::NotFound` if absent.
    pub fn require(&self, name: &BlockName) -> Result<RegistryEntry> {
        self.get(name)
            .ok_or_else(|| Error::NotFound(format!("block {name}")))
    }

    /// Number of registered blocks.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether any mutation has happened since the last `mark_clean`.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Clear the dirty flag after a successful flush.
    pub fn mark_clean(&self) {
        self.dirty.store(false, Ordering::Release);
    }

    /// Snapshot every `(name, entry)` pair, for serialization or iteration.
    pub fn snapshot(&self) -> Vec<(BlockName, RegistryEntry)> {
        self.entries
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    /// Rebuild the registry from a previously serialized snapshot, as on
    /// database open.
    pub fn from_snapshot(pairs: Vec<(BlockName, RegistryEntry)>) -> Self {
        let entries = DashMap::new();
        for (name, entry) in pairs {
            entries.insert(name, entry);
        }
        BlockRegistry {
            entries,
            dirty: AtomicBool::new(false),
        }
    }

    /// Serialize the registry to bytes (rmp-serde; this is in-memory/
    /// transit data, unlike the fixed-layout file header and block frames).
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let pairs = self.snapshot();
        rmp_serde::to_vec(&pairs).map_err(|e| Error::SerializationError(e.to_string()))
    }

    /// Deserialize a registry previously produced by `to_bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let pairs: Vec<(BlockName, RegistryEntry)> =
            rmp_serde::from_slice(bytes).map_err(|e| Error::SerializationError(e.to_string()))?;
        Ok(Self::from_snapshot(pairs))
    }

    /// Remove every entry still flagged `provisional`, as on crash recovery
    /// when a transaction's WAL records never reached a Commit record.
    pub fn discard_provisional(&self) {
        let stale: Vec<BlockName> = self
            .entries
            .iter()
            .filter(|e| e.value().flags.provisional)
            .map(|e| e.key().clone())
            .collect();
        if stale.is_empty() {
            return;
        }
        for name in &stale {
            self.entries.remove(name);
        }
        self.dirty.store(true, Ordering::Release);
    }
}

impl Default for BlockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(offset: u64) -> RegistryEntry {
        RegistryEntry {
            offset,
            extent_size: 4096,
            checksum: Checksum::of(b"payload"),
            version: Version::INITIAL,
            flags: EntryFlags::default(),
        }
    }

    #[test]
    fn put_then_get_round_trips() {
        let registry = BlockRegistry::new();
        let name = BlockName::new("table:orders:data");
        registry.put(name.clone(), entry(4096));
        let found = registry.get(&name).unwrap();
        assert_eq!(found.offset, 4096);
        assert!(registry.is_dirty());
    }

    #[test]
    fn require_errors_on_missing_name() {
        let registry = BlockRegistry::new();
        let err = registry.require(&BlockName::new("missing")).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn delete_removes_entry() {
        let registry = BlockRegistry::new();
        let name = BlockName::new("k1");
        registry.put(name.clone(), entry(0));
        assert!(registry.delete(&name).is_some());
        assert!(registry.get(&name).is_none());
    }

    #[test]
    fn snapshot_round_trips_through_bytes() {
        let registry = BlockRegistry::new();
        registry.put(BlockName::new("a"), entry(0));
        registry.put(BlockName::new("b"), entry(4096));
        let bytes = registry.to_bytes().unwrap();
        let restored = BlockRegistry::from_bytes(&bytes).unwrap();
        assert_eq!(restored.len(), 2);
        assert_eq!(restored.get(&BlockName::new("a")).unwrap().offset, 0);
        assert_eq!(restored.get(&BlockName::new("b")).unwrap().offset, 4096);
    }

    #[test]
    fn discard_provisional_removes_only_flagged_entries() {
        let registry = BlockRegistry::new();
        let mut provisional = entry(0);
        provisional.flags.provisional = true;
        registry.put(BlockName::new("uncommitted"), provisional);
        registry.put(BlockName::new("committed"), entry(4096));

        registry.discard_provisional();

        assert!(registry.get(&BlockName::new("uncommitted")).is_none());
        assert!(registry.get(&BlockName::new("committed")).is_some());
    }
}
