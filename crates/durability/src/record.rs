//! WAL record types (`spec.md` §4.6).
//!
//! Every record carries an `lsn`, a `kind`, a payload, and its own CRC32 so
//! recovery can tell a genuine end-of-log from a torn trailing write. The
//! kind set is deliberately small: enough to redo a committed transaction's
//! block writes and frees, and to mark where a checkpoint already made
//! everything before it durable.

use serde::{Deserialize, Serialize};
use sharpcore_core::{BlockName, Checksum, Version};

/// A transaction identifier, unique within one open database session.
pub type TxnId = u64;

/// A write-ahead log record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalRecord {
    /// Monotonically increasing log sequence number.
    pub lsn: u64,
    /// What this record represents.
    pub kind: RecordKind,
}

/// The payload carried by a [`WalRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordKind {
    /// Marks the start of a transaction.
    BeginTxn {
        /// The transaction this record starts.
        txn: TxnId,
    },
    /// A block write performed within a transaction, redoable on recovery.
    BlockWrite {
        /// Owning transaction.
        txn: TxnId,
        /// The block written.
        name: BlockName,
        /// Absolute offset the block's frame was written at.
        offset: u64,
        /// The write's version.
        version: Version,
        /// The plaintext payload, so recovery can redo the write without
        /// needing the data file's copy to have survived.
        payload: Vec<u8>,
        /// Checksum of `payload`, checked after redo to confirm the
        /// replayed block matches what was originally committed.
        checksum: Checksum,
    },
    /// A block deallocation performed within a transaction.
    BlockFree {
        /// Owning transaction.
        txn: TxnId,
        /// The block freed.
        name: BlockName,
    },
    /// Marks a transaction durable; every prior record from `txn` may now
    /// be redone on recovery.
    CommitTxn {
        /// The transaction committed.
        txn: TxnId,
    },
    /// Marks a transaction abandoned; every prior record from `txn` must
    /// be ignored on recovery.
    AbortTxn {
        /// The transaction aborted.
        txn: TxnId,
    },
    /// Marks that every write with LSN at or below `lsn_ckpt` is already
    /// durable in the data file; recovery may start scanning after this
    /// record instead of from the beginning of the log.
    Checkpoint {
        /// Highest LSN covered by this checkpoint.
        lsn_ckpt: u64,
    },
}

impl RecordKind {
    /// The transaction this record belongs to, if any (`Checkpoint`
    /// records belong to none).
    pub fn txn_id(&self) -> Option<TxnId> {
        match self {
            RecordKind::BeginTxn { txn }
            | RecordKind::BlockWrite { txn, .. }
            | RecordKind::BlockFree { txn, .. }
            | RecordKind::CommitTxn { txn }
            | RecordKind::AbortTxn { txn } => Some(*txn),
            RecordKind::Checkpoint { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn txn_id_extraction() {
        let write = RecordKind::BlockWrite {
            txn: 7,
            name: BlockName::new("k"),
            offset: 0,
            version: Version::INITIAL,
            payload: Vec::new(),
            checksum: Checksum::ZERO,
        };
        assert_eq!(write.txn_id(), Some(7));
        assert_eq!(RecordKind::Checkpoint { lsn_ckpt: 3 }.txn_id(), None);
    }
}
