//! WAL replay and crash recovery (`spec.md` §4.6's "Recovery on open").
//!
//! Recovery scans forward from the last checkpoint, redoes every
//! `BlockWrite` belonging to a transaction that committed, and stops at
//! the first frame that fails to decode — that is simply the end of the
//! durable log, not corruption, per the spec's failure semantics.

use sharpcore_core::{BlockName, Checksum, Result, Version};
use std::collections::{HashMap, HashSet};

use crate::frame::{decode_record, DecodeOutcome};
use crate::record::{RecordKind, TxnId, WalRecord};

/// One redoable write recovered from the log: everything the engine needs
/// to reapply it to the data file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedoWrite {
    /// The block to rewrite.
    pub name: BlockName,
    /// Absolute offset to write the frame at.
    pub offset: u64,
    /// The write's version.
    pub version: Version,
    /// The plaintext payload to write.
    pub payload: Vec<u8>,
    /// Expected checksum of `payload`, for a post-redo sanity check.
    pub checksum: Checksum,
}

/// Extract every redoable `BlockWrite` from an already-filtered
/// [`ReplayPlan`], in log order.
pub fn redo_writes(plan: &ReplayPlan) -> Vec<RedoWrite> {
    plan.records
        .iter()
        .filter_map(|record| match &record.kind {
            RecordKind::BlockWrite {
                name,
                offset,
                version,
                payload,
                checksum,
                ..
            } => Some(RedoWrite {
                name: name.clone(),
                offset: *offset,
                version: *version,
                payload: payload.clone(),
                checksum: *checksum,
            }),
            _ => None,
        })
        .collect()
}

/// The result of scanning a WAL region: every record from a committed
/// transaction, in log order, plus the highest LSN observed.
#[derive(Debug, Clone, Default)]
pub struct ReplayPlan {
    /// Records to redo, in the order they should be applied.
    pub records: Vec<WalRecord>,
    /// Highest LSN seen in the scanned region (including records from
    /// transactions later found to be uncommitted).
    pub highest_lsn: Option<u64>,
}

/// Scan a buffer of concatenated record frames (as written by
/// [`crate::writer::WalWriter`]) and build a [`ReplayPlan`] containing only
/// records from transactions that reached a `CommitTxn` record within the
/// same scanned region.
///
/// This is a two-pass scan: the first pass classifies every transaction id
/// as committed, aborted, or still-open (never reached a terminal record);
/// the second keeps only records belonging to committed transactions,
/// in their original order. `Checkpoint` records pass through unchanged.
pub fn build_replay_plan(buf: &[u8]) -> Result<ReplayPlan> {
    let mut raw_records = Vec::new();
    let mut cursor = 0usize;
    let mut highest_lsn = None;

    loop {
        if cursor >= buf.len() {
            break;
        }
        match decode_record(&buf[cursor..])? {
            DecodeOutcome::Record(record, consumed) => {
                highest_lsn = Some(highest_lsn.map_or(record.lsn, |h: u64| h.max(record.lsn)));
                cursor += consumed;
                raw_records.push(record);
            }
            DecodeOutcome::EndOfLog => break,
        }
    }

    let mut committed: HashSet<TxnId> = HashSet::new();
    let mut aborted: HashSet<TxnId> = HashSet::new();
    for record in &raw_records {
        match &record.kind {
            RecordKind::CommitTxn { txn } => {
                committed.insert(*txn);
            }
            RecordKind::AbortTxn { txn } => {
                aborted.insert(*txn);
            }
            _ => {}
        }
    }

    let records = raw_records
        .into_iter()
        .filter(|record| match record.kind.txn_id() {
            Some(txn) => committed.contains(&txn) && !aborted.contains(&txn),
            None => true, // Checkpoint records always apply.
        })
        .collect();

    Ok(ReplayPlan { records, highest_lsn })
}

/// Walk a [`ReplayPlan`]'s `BlockWrite` records, returning the checksum
/// each redone offset is expected to end up with, keyed by block name.
///
/// The engine uses this to verify a redo actually reproduced what was
/// committed: replay the bytes, recompute their checksum, and compare
/// against the value recorded here.
pub fn expected_checksums(plan: &ReplayPlan) -> HashMap<String, Checksum> {
    let mut out = HashMap::new();
    for record in &plan.records {
        if let RecordKind::BlockWrite { name, checksum, .. } = &record.kind {
            out.insert(name.as_str().to_string(), *checksum);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::encode_record;
    use sharpcore_core::{BlockName, Version};

    fn rec(lsn: u64, kind: RecordKind) -> WalRecord {
        WalRecord { lsn, kind }
    }

    #[test]
    fn committed_transaction_is_kept() {
        let mut buf = Vec::new();
        buf.extend(encode_record(&rec(1, RecordKind::BeginTxn { txn: 1 })).unwrap());
        buf.extend(
            encode_record(&rec(
                2,
                RecordKind::BlockWrite {
                    txn: 1,
                    name: BlockName::new("a"),
                    offset: 0,
                    version: Version::INITIAL,
                    payload: b"x".to_vec(),
                    checksum: Checksum::of(b"x"),
                },
            ))
            .unwrap(),
        );
        buf.extend(encode_record(&rec(3, RecordKind::CommitTxn { txn: 1 })).unwrap());

        let plan = build_replay_plan(&buf).unwrap();
        assert_eq!(plan.records.len(), 3);
        assert_eq!(plan.highest_lsn, Some(3));
    }

    #[test]
    fn uncommitted_transaction_is_discarded() {
        let mut buf = Vec::new();
        buf.extend(encode_record(&rec(1, RecordKind::BeginTxn { txn: 1 })).unwrap());
        buf.extend(
            encode_record(&rec(
                2,
                RecordKind::BlockWrite {
                    txn: 1,
                    name: BlockName::new("a"),
                    offset: 0,
                    version: Version::INITIAL,
                    payload: b"x".to_vec(),
                    checksum: Checksum::of(b"x"),
                },
            ))
            .unwrap(),
        );
        // No CommitTxn follows; simulates a crash mid-transaction.

        let plan = build_replay_plan(&buf).unwrap();
        assert!(plan.records.is_empty());
    }

    #[test]
    fn aborted_transaction_is_discarded_even_if_a_commit_record_is_injected_for_another_txn() {
        let mut buf = Vec::new();
        buf.extend(encode_record(&rec(1, RecordKind::BeginTxn { txn: 1 })).unwrap());
        buf.extend(
            encode_record(&rec(
                2,
                RecordKind::BlockWrite {
                    txn: 1,
                    name: BlockName::new("a"),
                    offset: 0,
                    version: Version::INITIAL,
                    payload: b"x".to_vec(),
                    checksum: Checksum::of(b"x"),
                },
            ))
            .unwrap(),
        );
        buf.extend(encode_record(&rec(3, RecordKind::AbortTxn { txn: 1 })).unwrap());
        buf.extend(encode_record(&rec(4, RecordKind::BeginTxn { txn: 2 })).unwrap());
        buf.extend(encode_record(&rec(5, RecordKind::CommitTxn { txn: 2 })).unwrap());

        let plan = build_replay_plan(&buf).unwrap();
        assert!(plan
            .records
            .iter()
            .all(|r| r.kind.txn_id() != Some(1) || matches!(r.kind, RecordKind::AbortTxn { .. })));
    }

    #[test]
    fn truncated_tail_frame_ends_the_scan_without_error() {
        let mut buf = Vec::new();
        buf.extend(encode_record(&rec(1, RecordKind::Checkpoint { lsn_ckpt: 0 })).unwrap());
        buf.push(0xAB); // a stray partial frame start

        let plan = build_replay_plan(&buf).unwrap();
        assert_eq!(plan.records.len(), 1);
    }

    #[test]
    fn expected_checksums_indexes_by_block_name() {
        let mut buf = Vec::new();
        buf.extend(encode_record(&rec(1, RecordKind::BeginTxn { txn: 1 })).unwrap());
        buf.extend(
            encode_record(&rec(
                2,
                RecordKind::BlockWrite {
                    txn: 1,
                    name: BlockName::new("a"),
                    offset: 0,
                    version: Version::INITIAL,
                    payload: b"payload".to_vec(),
                    checksum: Checksum::of(b"payload"),
                },
            ))
            .unwrap(),
        );
        buf.extend(encode_record(&rec(3, RecordKind::CommitTxn { txn: 1 })).unwrap());

        let plan = build_replay_plan(&buf).unwrap();
        let checksums = expected_checksums(&plan);
        assert_eq!(checksums.get("a"), Some(&Checksum::of(b"payload")));
    }

    #[test]
    fn redo_writes_carries_the_payload_forward() {
        let mut buf = Vec::new();
        buf.extend(encode_record(&rec(1, RecordKind::BeginTxn { txn: 1 })).unwrap());
        buf.extend(
            encode_record(&rec(
                2,
                RecordKind::BlockWrite {
                    txn: 1,
                    name: BlockName::new("a"),
                    offset: 4096,
                    version: Version::INITIAL,
                    payload: b"payload".to_vec(),
                    checksum: Checksum::of(b"payload"),
                },
            ))
            .unwrap(),
        );
        buf.extend(encode_record(&rec(3, RecordKind::CommitTxn { txn: 1 })).unwrap());

        let plan = build_replay_plan(&buf).unwrap();
        let writes = redo_writes(&plan);
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].offset, 4096);
        assert_eq!(writes[0].payload, b"payload".to_vec());
    }
}
