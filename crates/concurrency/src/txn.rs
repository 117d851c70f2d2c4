//! Transaction handles (`spec.md` §4.7/§5): `begin → (write|free)* →
//! commit|abort`, with read-your-writes within the transaction.

use sharpcore_core::BlockName;
use std::collections::{HashMap, HashSet};

/// A transaction identifier, unique within one open database session.
pub type TxnId = u64;

/// Lifecycle state of a [`Transaction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    /// Accepting writes; not yet committed or rolled back.
    Active,
    /// Committed; its writes are now globally visible.
    Committed,
    /// Rolled back; its writes must never become visible.
    RolledBack,
}

/// An in-flight transaction: its id, state, and the blocks it has written
/// or freed so far within this transaction (read-your-writes support and
/// conflict-set release on commit/rollback).
pub struct Transaction {
    id: TxnId,
    state: TxnState,
    /// Pending writes not yet flushed to the block store, keyed by block
    /// name so a later read within the same transaction sees its own
    /// uncommitted write.
    pending_writes: HashMap<BlockName, Vec<u8>>,
    /// Blocks freed within this transaction.
    pending_frees: HashSet<BlockName>,
}

impl Transaction {
    /// Start a new, empty transaction with the given id.
    pub fn new(id: TxnId) -> Self {
        Transaction {
            id,
            state: TxnState::Active,
            pending_writes: HashMap::new(),
            pending_frees: HashSet::new(),
        }
    }

    /// This transaction's id.
    pub fn id(&self) -> TxnId {
        self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TxnState {
        self.state
    }

    /// Record a pending write, visible to subsequent reads within this
    /// same transaction (read-your-writes, `spec.md` §5 ordering
    /// guarantee #2).
    pub fn stage_write(&mut self, name: BlockName, data: Vec<u8>) {
        self.pending_frees.remove(&name);
        self.pending_writes.insert(name, data);
    }

    /// Record a pending free.
    pub fn stage_free(&mut self, name: BlockName) {
        self.pending_writes.remove(&name);
        self.pending_frees.insert(name);
    }

    /// A block this transaction has staged a write for, if any.
    pub fn staged_write(&self, name: &BlockName) -> Option<&[u8]> {
        self.pending_writes.get(name).map(|v| v.as_slice())
    }

    /// Whether this transaction has staged a free for `name`.
    pub fn has_staged_free(&self, name: &BlockName) -> bool {
        self.pending_frees.contains(name)
    }

    /// Every block name this transaction has touched (written or freed),
    /// the set the lock table acquires and releases as a unit.
    pub fn touched_blocks(&self) -> HashSet<BlockName> {
        self.pending_writes
            .keys()
            .cloned()
            .chain(self.pending_frees.iter().cloned())
            .collect()
    }

    /// Drain the staged writes, consuming the transaction's buffer. Called
    /// by the engine at commit time once it has the write lock.
    pub fn take_pending_writes(&mut self) -> HashMap<BlockName, Vec<u8>> {
        std::mem::take(&mut self.pending_writes)
    }

    /// Drain the staged frees.
    pub fn take_pending_frees(&mut self) -> HashSet<BlockName> {
        std::mem::take(&mut self.pending_frees)
    }

    /// Transition to `Committed`. Panics if not currently `Active`; the
    /// engine must never call this twice or after a rollback.
    pub fn mark_committed(&mut self) {
        debug_assert_eq!(self.state, TxnState::Active);
        self.state = TxnState::Committed;
    }

    /// Transition to `RolledBack`.
    pub fn mark_rolled_back(&mut self) {
        debug_assert_eq!(self.state, TxnState::Active);
        self.state = TxnState::RolledBack;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_your_writes() {
        let mut txn = Transaction::new(1);
        txn.stage_write(BlockName::new("a"), b"v1".to_vec());
        assert_eq!(txn.staged_write(&BlockName::new("a")), Some(&b"v1"[..]));
    }

    #[test]
    fn free_after_write_clears_the_write() {
        let mut txn = Transaction::new(1);
        txn.stage_write(BlockName::new("a"), b"v1".to_vec());
        txn.stage_free(BlockName::new("a"));
        assert!(txn.staged_write(&BlockName::new("a")).is_none());
        assert!(txn.has_staged_free(&BlockName::new("a")));
    }

    #[test]
    fn write_after_free_clears_the_free() {
        let mut txn = Transaction::new(1);
        txn.stage_free(BlockName::new("a"));
        txn.stage_write(BlockName::new("a"), b"v1".to_vec());
        assert!(!txn.has_staged_free(&BlockName::new("a")));
    }

    #[test]
    fn touched_blocks_covers_writes_and_frees() {
        let mut txn = Transaction::new(1);
        txn.stage_write(BlockName::new("a"), b"v".to_vec());
        txn.stage_free(BlockName::new("b"));
        let touched = txn.touched_blocks();
        assert!(touched.contains(&BlockName::new("a")));
        assert!(touched.contains(&BlockName::new("b")));
    }

    #[test]
    fn commit_transitions_state() {
        let mut txn = Transaction::new(1);
        txn.mark_committed();
        assert_eq!(txn.state(), TxnState::Committed);
    }
}
