//! SharpCoreDB: an embedded, single-file encrypted SQL storage engine.
//!
//! This crate is the top-level facade (`spec.md` §6): it wires the storage
//! provider facade (`sharpcore-engine`), the columnar codec
//! (`sharpcore-columnar`), the SIMD kernels and optimizer
//! (`sharpcore-exec`), and corruption detection/repair
//! (`sharpcore-repair`) behind one entry point, [`SharpCoreDb`].
//!
//! Table/row semantics above the block level (schema, indexes, a query
//! planner driving real execution) are out of scope — this crate exposes
//! the row/columnar/analytics primitives a table layer would consume, not
//! the table layer itself.

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::collections::HashSet;
use std::path::Path;

use sharpcore_concurrency::TxnId;
use sharpcore_config::{DatabaseOptions, VacuumMode};
use sharpcore_core::{BlockName, Result, StorageRef};
use sharpcore_engine::{select_tier, BlobStore, Database, OverflowChain};

pub use sharpcore_columnar::{
    column_stats, decode_column, decode_table, encode_column, encode_table, select_encoding,
    ColumnMeta, ColumnStats, ColumnType, ColumnValues, Encoding, Histogram, NullBitmap, RelOp,
    Scalar,
};
pub use sharpcore_concurrency::CancellationToken as Cancellation;
pub use sharpcore_config::{DatabaseOptions as Options, KdfParams};
pub use sharpcore_core::{
    BlobId, BlockName as Name, Checksum, Error, FilePointer, RowTier, StorageRef as RowRef, Version,
};
pub use sharpcore_engine::{clean, now_unix, scan, Missing, Orphan, ScanReport};
pub use sharpcore_exec::{
    bitmap_and, bitmap_not, bitmap_or, decode_for_kernels, plan_query, popcount, simd_avg,
    simd_count, simd_filter, simd_max, simd_min, simd_sum, CostModel, Plan, PlanCache, PlanKind,
    Predicate, QuerySpec,
};
pub use sharpcore_repair::{
    rebuild_registry, repair, scan_blocks, vacuum_full, validate, Finding, RebuiltRegistry,
    RecoveredBlock, RepairManifest, RepairResult, ValidationReport, VacuumReport,
};

/// An open SharpCoreDB database: the block-level facade plus the
/// row-overflow and external-blob tiers layered on top of it.
pub struct SharpCoreDb {
    db: Database,
    blobs: BlobStore,
}

impl SharpCoreDb {
    /// Create a brand-new database file at `path`, encrypted under
    /// `password`.
    pub fn create(path: impl AsRef<Path>, password: &str, options: DatabaseOptions) -> Result<Self> {
        let path = path.as_ref();
        let blobs = BlobStore::for_database(path);
        let db = Database::create(path, password, options)?;
        Ok(SharpCoreDb { db, blobs })
    }

    /// Open an existing database file.
    pub fn open(path: impl AsRef<Path>, password: &str) -> Result<Self> {
        let path = path.as_ref();
        let blobs = BlobStore::for_database(path);
        let db = Database::open(path, password)?;
        Ok(SharpCoreDb { db, blobs })
    }

    /// Flush and fsync everything, then drop the database handle.
    pub fn close(self) -> Result<()> {
        self.db.close()
    }

    /// Begin a new transaction.
    pub fn begin(&self) -> TxnId {
        self.db.begin()
    }

    /// Commit a transaction.
    pub fn commit(&self, txn: TxnId) -> Result<()> {
        self.db.commit(txn)
    }

    /// Discard a transaction's staged writes.
    pub fn rollback(&self, txn: TxnId) -> Result<()> {
        self.db.rollback(txn)
    }

    /// Read a named block's current plaintext.
    pub fn read_block(&self, txn: Option<TxnId>, name: &BlockName) -> Result<Vec<u8>> {
        self.db.read_block(txn, name)
    }

    /// Write a named block. Outside a transaction, commits immediately.
    pub fn write_block(&self, txn: Option<TxnId>, name: BlockName, data: Vec<u8>) -> Result<()> {
        self.db.write_block(txn, name, data)
    }

    /// Delete a named block. Outside a transaction, commits immediately.
    pub fn delete_block(&self, txn: Option<TxnId>, name: BlockName) -> Result<()> {
        self.db.delete_block(txn, name)
    }

    /// Flush the registry (if dirty); does not necessarily fsync.
    pub fn flush(&self) -> Result<()> {
        self.db.flush()
    }

    /// Force every buffered write to durable storage and checkpoint.
    pub fn force_save(&self) -> Result<()> {
        self.db.force_save()
    }

    /// Run `Quick` or `Incremental` VACUUM in place. `Full` is not
    /// performed by an open handle — close the database and call
    /// [`vacuum_full`] on its path instead, since a full rewrite needs
    /// exclusive access to the file.
    pub fn vacuum(&self, mode: VacuumMode) -> Result<()> {
        self.db.vacuum(mode)
    }

    /// The path this database was opened from.
    pub fn path(&self) -> &Path {
        self.db.path()
    }

    /// The effective configuration this database was opened/created with.
    pub fn options(&self) -> &DatabaseOptions {
        self.db.options()
    }

    /// Store `payload` for `table`/`row_id`, in whichever tier
    /// `select_tier` assigns it to, returning the reference a caller's row
    /// metadata should keep.
    ///
    /// There is no shared-page row heap in this implementation (building
    /// one belongs to the table layer this crate doesn't provide), so the
    /// `Inline` tier stores the payload as its own named block
    /// (`row:<table>:<row_id>`) and reports it back as
    /// `StorageRef::Paged { page_id: row_id, slot_id: 0, .. }` — a
    /// documented simplification, not a smaller page shared across rows.
    pub fn row_put(
        &self,
        txn: Option<TxnId>,
        table: &str,
        row_id: u64,
        payload: &[u8],
    ) -> Result<StorageRef> {
        let options = self.db.options();
        match select_tier(payload.len() as u64, options.inline_threshold, options.overflow_threshold) {
            RowTier::Inline => {
                self.db
                    .write_block(txn, row_block_name(table, row_id), payload.to_vec())?;
                Ok(StorageRef::Paged {
                    table: table.to_string(),
                    page_id: row_id,
                    slot_id: 0,
                })
            }
            RowTier::Overflow => OverflowChain::new(&self.db).write(txn, table, row_id, payload),
            RowTier::External => {
                let pointer = self.blobs.put(payload)?;
                Ok(StorageRef::External(pointer))
            }
        }
    }

    /// Read a row's payload back, wherever its tier placed it.
    pub fn row_get(&self, reference: &StorageRef) -> Result<Vec<u8>> {
        match reference {
            StorageRef::Paged { table, page_id, .. } => {
                self.db.read_block(None, &row_block_name(table, *page_id))
            }
            StorageRef::Overflow { table, chain_id } => {
                OverflowChain::new(&self.db).read(table, *chain_id)
            }
            StorageRef::External(pointer) => self.blobs.get(pointer),
        }
    }

    /// Replace a row's payload, re-deciding its tier from scratch (a row
    /// that grows past `inline_threshold` migrates to `Overflow`, and so
    /// on). Returns the new reference; the old one is no longer valid.
    ///
    /// A caller-supplied `txn` already determines atomicity and the
    /// delete/put pair simply rides along inside it. With `txn = None`,
    /// `spec.md` §6's untransacted row API still implies the migration as
    /// a whole is atomic, so an internal transaction is opened here and
    /// committed (or rolled back) around both halves rather than letting
    /// the delete and the put each auto-commit independently.
    pub fn row_update(
        &self,
        txn: Option<TxnId>,
        table: &str,
        row_id: u64,
        old: &StorageRef,
        payload: &[u8],
    ) -> Result<StorageRef> {
        match txn {
            Some(id) => {
                self.row_delete(Some(id), old)?;
                self.row_put(Some(id), table, row_id, payload)
            }
            None => {
                let id = self.db.begin();
                match self
                    .row_delete(Some(id), old)
                    .and_then(|()| self.row_put(Some(id), table, row_id, payload))
                {
                    Ok(new_ref) => {
                        self.db.commit(id)?;
                        Ok(new_ref)
                    }
                    Err(e) => {
                        let _ = self.db.rollback(id);
                        Err(e)
                    }
                }
            }
        }
    }

    /// Delete a row wherever its tier placed it.
    pub fn row_delete(&self, txn: Option<TxnId>, reference: &StorageRef) -> Result<()> {
        match reference {
            StorageRef::Paged { table, page_id, .. } => {
                self.db.delete_block(txn, row_block_name(table, *page_id))
            }
            StorageRef::Overflow { table, chain_id } => {
                OverflowChain::new(&self.db).delete(txn, table, *chain_id)
            }
            StorageRef::External(pointer) => self.blobs.remove(pointer),
        }
    }

    /// Scan `blobs/` against the set of relative paths currently
    /// referenced by live rows, classifying orphans and missing files.
    /// The caller supplies `referenced` since tracking which rows
    /// reference which blob belongs to the table layer above this crate.
    pub fn find_orphans(&self, referenced: &HashSet<String>) -> Result<ScanReport> {
        scan(&self.blobs, referenced)
    }

    /// Delete orphans past `retention_secs`, re-validating each against
    /// `still_referenced` immediately before deleting it.
    pub fn clean_orphans(
        &self,
        report: &ScanReport,
        retention_secs: u64,
        dry_run: bool,
        still_referenced: impl Fn(&str) -> bool,
    ) -> Result<Vec<String>> {
        clean(&self.blobs, report, retention_secs, now_unix(), dry_run, still_referenced)
    }
}

// `validate`/`repair`/`vacuum_full` (re-exported above from
// `sharpcore-repair`) deliberately take `path`/`password` rather than a
// `&SharpCoreDb`: repair's whole point is to produce a report when the
// normal open path itself fails, so it can't depend on an already-open
// handle succeeding first.

fn row_block_name(table: &str, row_id: u64) -> BlockName {
    BlockName::new(format!("row:{table}:{row_id}"))
}

/// Repair aggressiveness and validation thoroughness, re-exported for
/// callers that don't otherwise depend on `sharpcore-config`.
pub mod config {
    pub use sharpcore_config::{RepairPolicy, ValidationMode, VacuumMode};
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn options() -> DatabaseOptions {
        DatabaseOptions::new()
    }

    #[test]
    fn row_put_get_round_trips_across_every_tier() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db.scdb");
        let db = SharpCoreDb::create(&path, "hunter2", options()).unwrap();

        let inline_ref = db.row_put(None, "orders", 1, b"small row").unwrap();
        assert!(matches!(inline_ref, StorageRef::Paged { .. }));
        assert_eq!(db.row_get(&inline_ref).unwrap(), b"small row");

        let overflow_payload = vec![7u8; 8 * 1024];
        let overflow_ref = db.row_put(None, "orders", 2, &overflow_payload).unwrap();
        assert!(matches!(overflow_ref, StorageRef::Overflow { .. }));
        assert_eq!(db.row_get(&overflow_ref).unwrap(), overflow_payload);

        let external_payload = vec![9u8; 300_000];
        let external_ref = db.row_put(None, "orders", 3, &external_payload).unwrap();
        assert!(matches!(external_ref, StorageRef::External(_)));
        assert_eq!(db.row_get(&external_ref).unwrap(), external_payload);

        db.row_delete(None, &inline_ref).unwrap();
        assert!(db.row_get(&inline_ref).is_err());
    }

    #[test]
    fn row_update_migrates_tiers_as_size_changes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db.scdb");
        let db = SharpCoreDb::create(&path, "hunter2", options()).unwrap();

        let small = db.row_put(None, "orders", 1, b"tiny").unwrap();
        let big_payload = vec![1u8; 8 * 1024];
        let grown = db.row_update(None, "orders", 1, &small, &big_payload).unwrap();
        assert!(matches!(grown, StorageRef::Overflow { .. }));
        assert_eq!(db.row_get(&grown).unwrap(), big_payload);
    }

    #[test]
    fn reopen_preserves_committed_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db.scdb");
        let db = SharpCoreDb::create(&path, "hunter2", options()).unwrap();
        let reference = db.row_put(None, "orders", 1, b"durable row").unwrap();
        db.close().unwrap();

        let reopened = SharpCoreDb::open(&path, "hunter2").unwrap();
        assert_eq!(reopened.row_get(&reference).unwrap(), b"durable row");
    }
}
