//! Rebuilding a registry from brute-force-scanned blocks (`spec.md` §4.12's
//! "repair(Conservative) rebuilds registry by scanning framed blocks").
//!
//! A recovered block's own bytes carry no name — that indirection lives
//! only in the registry we just lost. The one place a name survives is the
//! WAL: every committed `BlockWrite` record carries the block's name
//! alongside the offset/version/payload it wrote, so replaying the WAL
//! segments found by the scan reconstructs the name → offset mapping
//! exactly the way a normal `open` does, just starting from scanned bytes
//! instead of registry-directed reads.

use sharpcore_core::{BlockName, Checksum, Result};
use sharpcore_durability::{build_replay_plan, looks_like_wal_segment, redo_writes};
use sharpcore_storage::{BlockRegistry, EntryFlags, FreeSpaceManager, RegistryEntry, FRAME_OVERHEAD};
use std::collections::HashSet;

use crate::scan::RecoveredBlock;

/// A registry rebuilt from a brute-force scan, plus whatever the scan
/// turned up that no WAL record could attach a name to.
pub struct RebuiltRegistry {
    /// The reconstructed registry, including `wal:<n>` entries for every
    /// WAL segment the scan found (renumbered by ascending offset, so
    /// `sharpcore_engine`'s `recover_wal` can find them by the usual
    /// contiguous `segment_id` lookup on the next open).
    pub registry: BlockRegistry,
    /// Offsets of recovered blocks that verified under AEAD but whose
    /// logical name could not be reconstructed from the WAL.
    pub unnamed_block_offsets: Vec<u64>,
}

/// Rebuild a registry from every block a scan recovered.
pub fn rebuild_registry(blocks: Vec<RecoveredBlock>) -> Result<RebuiltRegistry> {
    let mut wal_segments: Vec<&RecoveredBlock> = blocks
        .iter()
        .filter(|b| looks_like_wal_segment(&b.plaintext))
        .collect();
    wal_segments.sort_by_key(|b| b.offset);

    let mut combined = Vec::new();
    for segment in &wal_segments {
        combined.extend_from_slice(&segment.plaintext);
    }

    let registry = BlockRegistry::new();
    let mut named_offsets: HashSet<u64> = HashSet::new();

    if !combined.is_empty() {
        let plan = build_replay_plan(&combined)?;
        for write in redo_writes(&plan) {
            if Checksum::of(&write.payload) != write.checksum {
                // Redone but doesn't match what was committed; leave it
                // out of the rebuilt registry rather than publish a name
                // that points at bytes that don't match the commit.
                continue;
            }
            named_offsets.insert(write.offset);
            registry.put(
                write.name.clone(),
                RegistryEntry {
                    offset: write.offset,
                    extent_size: FreeSpaceManager::round_allocation_size(
                        write.payload.len() as u64 + FRAME_OVERHEAD as u64,
                    ),
                    checksum: write.checksum,
                    version: write.version,
                    flags: EntryFlags::default(),
                },
            );
        }
    }

    for (i, segment) in wal_segments.iter().enumerate() {
        registry.put(
            BlockName::wal_segment(i as u64),
            RegistryEntry {
                offset: segment.offset,
                extent_size: FreeSpaceManager::round_allocation_size(
                    segment.plaintext.len() as u64 + FRAME_OVERHEAD as u64,
                ),
                checksum: Checksum::ZERO,
                version: segment.version,
                flags: EntryFlags::default(),
            },
        );
    }

    let unnamed_block_offsets = blocks
        .iter()
        .filter(|b| !looks_like_wal_segment(&b.plaintext) && !named_offsets.contains(&b.offset))
        .map(|b| b.offset)
        .collect();

    registry.mark_clean();
    Ok(RebuiltRegistry {
        registry,
        unnamed_block_offsets,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sharpcore_core::Version;
    use sharpcore_durability::frame::encode_record;
    use sharpcore_durability::{RecordKind, WalRecord};

    fn wal_frame(records: &[WalRecord]) -> Vec<u8> {
        let mut buf = Vec::new();
        for r in records {
            buf.extend(encode_record(r).unwrap());
        }
        buf
    }

    #[test]
    fn rebuilds_names_from_committed_wal_records() {
        let wal_bytes = wal_frame(&[
            WalRecord { lsn: 1, kind: RecordKind::BeginTxn { txn: 1 } },
            WalRecord {
                lsn: 2,
                kind: RecordKind::BlockWrite {
                    txn: 1,
                    name: BlockName::new("table:orders:data"),
                    offset: 4096,
                    version: Version::INITIAL,
                    payload: b"row bytes".to_vec(),
                    checksum: Checksum::of(b"row bytes"),
                },
            },
            WalRecord { lsn: 3, kind: RecordKind::CommitTxn { txn: 1 } },
        ]);

        let blocks = vec![RecoveredBlock {
            offset: 0,
            version: Version::INITIAL,
            plaintext: wal_bytes,
        }];

        let rebuilt = rebuild_registry(blocks).unwrap();
        let entry = rebuilt.registry.get(&BlockName::new("table:orders:data")).unwrap();
        assert_eq!(entry.offset, 4096);
        assert!(rebuilt.unnamed_block_offsets.is_empty());
        assert!(rebuilt.registry.get(&BlockName::wal_segment(0)).is_some());
    }

    #[test]
    fn a_data_block_with_no_matching_wal_record_is_reported_unnamed() {
        let blocks = vec![RecoveredBlock {
            offset: 4096,
            version: Version::INITIAL,
            plaintext: b"bytes with no WAL record behind them".to_vec(),
        }];

        let rebuilt = rebuild_registry(blocks).unwrap();
        assert_eq!(rebuilt.unnamed_block_offsets, vec![4096]);
    }
}
