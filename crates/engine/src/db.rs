//! The storage provider facade (`spec.md` §4.7, component C7): the single
//! type every other part of SharpCoreDB (and eventually a table layer
//! above it) talks to. Wires together the cryptographic envelope, block
//! store, registry, free-space manager, page cache, WAL, and the
//! concurrency primitives into `open`/`create`/`read_block`/`write_block`/
//! `begin`/`commit`/`rollback`/`flush`/`force_save`/`close`/`vacuum`.

use dashmap::DashMap;
use parking_lot::Mutex;
use sharpcore_concurrency::{FairRwLock, LockTable, Transaction, TxnId, TxnState};
use sharpcore_config::{DatabaseOptions, VacuumMode};
use sharpcore_core::{BlockName, Checksum, Error, Result, Version};
use sharpcore_crypto::{derive_key, generate_salt, AesGcmCryptor, Cryptor};
use sharpcore_durability::{
    build_replay_plan, redo_writes, CheckpointTrigger, DurabilityMode, RecordKind, WalRecord,
    WalWriter,
};
use sharpcore_storage::{
    BlockRegistry, BlockStore, EntryFlags, Extent, FileHeader, FreeSpaceManager, PageCache,
    RegistryEntry, HEADER_SIZE,
};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// An open SharpCoreDB database.
pub struct Database {
    path: PathBuf,
    store: Arc<BlockStore>,
    cryptor: Arc<dyn Cryptor>,
    registry: FairRwLock<BlockRegistry>,
    fsm: FairRwLock<FreeSpaceManager>,
    cache: PageCache,
    wal: WalWriter,
    lock_table: LockTable,
    txns: DashMap<TxnId, Mutex<Transaction>>,
    next_txn_id: AtomicU64,
    options: DatabaseOptions,
    header: Mutex<FileHeader>,
    checkpoint_trigger: Mutex<CheckpointTrigger>,
}

impl Database {
    /// Create a brand-new database file at `path`, encrypted under
    /// `password`.
    pub fn create(path: impl AsRef<Path>, password: &str, options: DatabaseOptions) -> Result<Self> {
        if !options.page_size_is_valid() {
            return Err(Error::FormatError(format!(
                "page_size {} is not a power of two",
                options.page_size
            )));
        }

        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)?;

        let salt = generate_salt();
        let key = derive_key(password, &salt, &options.kdf_params)?;
        let cryptor: Arc<dyn Cryptor> = Arc::new(AesGcmCryptor::new(&key));
        let store = Arc::new(BlockStore::new(file, cryptor.clone()));

        let mut uuid = [0u8; 16];
        {
            use rand::RngCore;
            rand::thread_rng().fill_bytes(&mut uuid);
        }

        let mut header = FileHeader::new(
            uuid,
            options.page_size,
            salt,
            options.kdf_params.memory_kib,
            options.kdf_params.iterations,
            options.kdf_params.parallelism,
            now_unix(),
        );

        // Layout: [header][registry][wal...]. The registry starts empty,
        // so its first copy is tiny; FSM starts with nothing free because
        // nothing has been allocated and freed yet.
        let registry = BlockRegistry::new();
        let registry_bytes = registry.to_bytes()?;
        let registry_offset = HEADER_SIZE as u64;
        let registry_extent = FreeSpaceManager::round_allocation_size(
            registry_bytes.len() as u64 + sharpcore_storage::FRAME_OVERHEAD as u64,
        );
        store.write_block(registry_offset, Version::INITIAL, &registry_bytes)?;

        let wal_origin = registry_offset + registry_extent;
        header.registry_block_offset = registry_offset;
        header.wal_origin_offset = wal_origin;
        store.set_min_len(wal_origin)?;

        let header_bytes = header.to_bytes();
        write_header_frame(&store, &header_bytes)?;
        store.sync()?;

        let fsm = FreeSpaceManager::new(options.page_size as u64, wal_origin);
        let wal = WalWriter::new(
            store.clone(),
            &options,
            DurabilityMode::Strict,
            wal_origin,
            0,
            1,
        );

        // The registry block written above predates the WAL writer and so
        // has no entry for its first segment yet. Register it and rewrite
        // the registry now, synchronously, so a crash before the first
        // commit still leaves that segment discoverable by `recover_wal`
        // on the next open (`spec.md` §8 invariant 4).
        registry.put(
            wal.current_segment_name(),
            RegistryEntry {
                offset: wal.current_segment_offset(),
                extent_size: options.wal_segment_size,
                checksum: Checksum::ZERO,
                version: Version::INITIAL,
                flags: EntryFlags::default(),
            },
        );
        let registry_bytes = registry.to_bytes()?;
        store.write_block(registry_offset, Version::INITIAL, &registry_bytes)?;
        store.sync()?;
        registry.mark_clean();

        info!(path = %path.display(), page_size = options.page_size, "created new database");

        let checkpoint_trigger = CheckpointTrigger::new(
            options.checkpoint_interval_bytes,
            options.checkpoint_idle_ms,
            Instant::now(),
        );

        Ok(Database {
            path,
            store,
            cryptor,
            registry: FairRwLock::new(registry),
            fsm: FairRwLock::new(fsm),
            cache: PageCache::new(options.cache_pages),
            wal,
            lock_table: LockTable::new(),
            txns: DashMap::new(),
            next_txn_id: AtomicU64::new(1),
            options,
            header: Mutex::new(header),
            checkpoint_trigger: Mutex::new(checkpoint_trigger),
        })
    }

    /// Open an existing database file, deriving the data key from
    /// `password` and replaying the WAL forward from the last checkpoint.
    pub fn open(path: impl AsRef<Path>, password: &str) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().read(true).write(true).open(&path)?;

        let mut header_buf = [0u8; HEADER_SIZE];
        {
            use std::io::Read;
            let mut f = file.try_clone()?;
            f.read_exact(&mut header_buf)?;
        }
        let header = FileHeader::from_bytes(&header_buf)?;

        let kdf_params = sharpcore_config::KdfParams {
            memory_kib: header.kdf_memory_kib,
            iterations: header.kdf_iterations,
            parallelism: header.kdf_parallelism,
        };
        let key = derive_key(password, &header.kdf_salt, &kdf_params)?;
        let cryptor: Arc<dyn Cryptor> = Arc::new(AesGcmCryptor::new(&key));
        let store = Arc::new(BlockStore::new(file, cryptor.clone()));

        // A wrong password produces a key that fails to open the registry
        // block's AEAD tag; that failure is the actual authentication
        // check, the header checksum only rules out a non-SCDB file. A torn
        // or corrupted registry frame fails its CRC32 first and is always a
        // `Corruption`, never mistaken for a bad password; it is escalated
        // to `Fatal` here since without the registry nothing in the file is
        // addressable until `repair(Conservative)` rebuilds it.
        let registry_read = store
            .read_block(header.registry_block_offset)
            .map_err(escalate_to_fatal)?;
        let mut registry = BlockRegistry::from_bytes(&registry_read.data)?;

        let file_end = store.len()?;
        let mut fsm = FreeSpaceManager::new(header.page_size as u64, file_end);

        let next_segment_id = recover_wal(&store, &header, &mut registry, &mut fsm)?;

        registry.discard_provisional();
        registry.mark_clean();

        let options = DatabaseOptions::new()
            .page_size(header.page_size)
            .kdf_params(kdf_params);

        let wal = WalWriter::new(
            store.clone(),
            &options,
            DurabilityMode::Strict,
            file_end,
            next_segment_id,
            header.last_checkpoint_lsn + 1,
        );

        let checkpoint_trigger = CheckpointTrigger::new(
            options.checkpoint_interval_bytes,
            options.checkpoint_idle_ms,
            Instant::now(),
        );

        let db = Database {
            path,
            store,
            cryptor,
            registry: FairRwLock::new(registry),
            fsm: FairRwLock::new(fsm),
            cache: PageCache::new(options.cache_pages),
            wal,
            lock_table: LockTable::new(),
            txns: DashMap::new(),
            next_txn_id: AtomicU64::new(1),
            options,
            header: Mutex::new(header),
            checkpoint_trigger: Mutex::new(checkpoint_trigger),
        };

        // This session's WAL writer starts a segment no prior registry
        // snapshot could have known about; register and persist it now so
        // a crash before the first commit still leaves it discoverable.
        db.registry.write().put(
            db.wal.current_segment_name(),
            RegistryEntry {
                offset: db.wal.current_segment_offset(),
                extent_size: db.options.wal_segment_size,
                checksum: Checksum::ZERO,
                version: Version::INITIAL,
                flags: EntryFlags::default(),
            },
        );
        db.flush_registry_if_dirty()?;

        info!(
            path = %db.path.display(),
            resumed_at_lsn = db.header.lock().last_checkpoint_lsn + 1,
            "opened database"
        );

        Ok(db)
    }

    /// Begin a new transaction, returning its id.
    pub fn begin(&self) -> TxnId {
        let id = self.next_txn_id.fetch_add(1, Ordering::AcqRel);
        self.txns.insert(id, Mutex::new(Transaction::new(id)));
        id
    }

    /// Read a block's current plaintext, honoring read-your-writes if
    /// `txn` has a pending write or free for it.
    pub fn read_block(&self, txn: Option<TxnId>, name: &BlockName) -> Result<Vec<u8>> {
        if let Some(txn) = txn {
            if let Some(entry) = self.txns.get(&txn) {
                let guard = entry.lock();
                if guard.has_staged_free(name) {
                    return Err(Error::NotFound(format!("block {name}")));
                }
                if let Some(data) = guard.staged_write(name) {
                    return Ok(data.to_vec());
                }
            }
        }

        if let Some(handle) = self.cache.get(name) {
            return Ok((*handle.data()).clone());
        }

        let registry = self.registry.read();
        let entry = registry.require(name)?;
        drop(registry);

        let read = self.store.read_block(entry.offset)?;
        if Checksum::of(&read.data) != entry.checksum {
            return Err(Error::corruption(
                sharpcore_core::Severity::Severe,
                name.to_string(),
                "decrypted block does not match its registry checksum",
            ));
        }
        self.cache
            .insert(name.clone(), read.data.clone(), entry.version.0)?;
        Ok(read.data)
    }

    /// Stage a write. Outside a transaction (`txn = None`), this commits
    /// immediately as a single-operation transaction.
    pub fn write_block(&self, txn: Option<TxnId>, name: BlockName, data: Vec<u8>) -> Result<()> {
        match txn {
            Some(id) => {
                let entry = self
                    .txns
                    .get(&id)
                    .ok_or_else(|| Error::NotFound(format!("transaction {id}")))?;
                entry.lock().stage_write(name, data);
                Ok(())
            }
            None => {
                let id = self.begin();
                self.write_block(Some(id), name, data)?;
                self.commit(id)
            }
        }
    }

    /// Stage a delete. Outside a transaction, commits immediately. Fails
    /// with `Error::NotFound` if `name` does not currently exist (neither
    /// staged as a write within `txn` nor present in the registry), so
    /// callers that delete a chain of blocks until one is missing (e.g.
    /// `OverflowChain::delete`) have a way to detect the end of it.
    pub fn delete_block(&self, txn: Option<TxnId>, name: BlockName) -> Result<()> {
        match txn {
            Some(id) => {
                let entry = self
                    .txns
                    .get(&id)
                    .ok_or_else(|| Error::NotFound(format!("transaction {id}")))?;
                let staged_write = {
                    let guard = entry.lock();
                    if guard.has_staged_free(&name) {
                        return Err(Error::NotFound(format!("block {name}")));
                    }
                    guard.staged_write(&name).is_some()
                };
                if !staged_write
                    && self.cache.get(&name).is_none()
                    && self.registry.read().get(&name).is_none()
                {
                    return Err(Error::NotFound(format!("block {name}")));
                }
                entry.lock().stage_free(name);
                Ok(())
            }
            None => {
                let id = self.begin();
                self.delete_block(Some(id), name)?;
                self.commit(id)
            }
        }
    }

    /// Commit a transaction: acquire locks on every block it touched,
    /// append its WAL records and fsync, then persist the writes to the
    /// data file and update the registry/FSM.
    pub fn commit(&self, txn: TxnId) -> Result<()> {
        let (_, txn_cell) = self
            .txns
            .remove(&txn)
            .ok_or_else(|| Error::NotFound(format!("transaction {txn}")))?;
        let mut transaction = txn_cell.into_inner();

        let touched = transaction.touched_blocks();
        self.lock_table.acquire_all(txn, touched.iter())?;

        let writes = transaction.take_pending_writes();
        let frees = transaction.take_pending_frees();

        let commit_result = self.apply_commit(txn, writes, frees);
        self.lock_table.release_all(txn, touched);

        match commit_result {
            Ok(()) => {
                transaction.mark_committed();
                Ok(())
            }
            Err(e) => {
                transaction.mark_rolled_back();
                Err(e)
            }
        }
    }

    fn apply_commit(
        &self,
        txn: TxnId,
        writes: std::collections::HashMap<BlockName, Vec<u8>>,
        frees: std::collections::HashSet<BlockName>,
    ) -> Result<()> {
        let mut wal_bytes = self.wal.append(&WalRecord {
            lsn: self.wal.next_lsn(),
            kind: RecordKind::BeginTxn { txn },
        })?;

        let mut planned = Vec::with_capacity(writes.len());
        {
            let registry = self.registry.read();
            let mut fsm = self.fsm.write();
            for (name, data) in &writes {
                let version = registry
                    .get(name)
                    .map(|e| e.version.next())
                    .unwrap_or(Version::INITIAL);
                let extent_size = FreeSpaceManager::round_allocation_size(
                    data.len() as u64 + sharpcore_storage::FRAME_OVERHEAD as u64,
                );
                let extent = fsm.allocate(extent_size);
                planned.push((name.clone(), data.clone(), version, extent));
            }
        }

        for (name, data, version, extent) in &planned {
            wal_bytes += self.wal.append(&WalRecord {
                lsn: self.wal.next_lsn(),
                kind: RecordKind::BlockWrite {
                    txn,
                    name: name.clone(),
                    offset: extent.offset,
                    version: *version,
                    payload: data.clone(),
                    checksum: Checksum::of(data),
                },
            })?;
        }
        for name in &frees {
            wal_bytes += self.wal.append(&WalRecord {
                lsn: self.wal.next_lsn(),
                kind: RecordKind::BlockFree {
                    txn,
                    name: name.clone(),
                },
            })?;
        }

        wal_bytes += self.wal.append(&WalRecord {
            lsn: self.wal.next_lsn(),
            kind: RecordKind::CommitTxn { txn },
        })?;
        self.wal.sync_for_commit()?;

        // Register the segment just flushed so a later `open` can find it
        // by name; `recover_wal` looks up `wal:<n>` through the registry
        // the same way it looks up any other block. The checksum is not
        // load-bearing here — WAL replay's own per-record CRC32 and
        // commit-set filtering is what authenticates the segment's
        // contents, not the registry entry. A mid-session rotation starts
        // a segment no persisted registry snapshot has seen before, so
        // that first commit against it flushes the registry synchronously
        // instead of waiting for the next periodic or explicit flush.
        let segment_name = self.wal.current_segment_name();
        let is_new_segment = self.registry.read().get(&segment_name).is_none();
        self.registry.write().put(
            segment_name,
            RegistryEntry {
                offset: self.wal.current_segment_offset(),
                extent_size: self.options.wal_segment_size,
                checksum: Checksum::ZERO,
                version: Version::INITIAL,
                flags: EntryFlags::default(),
            },
        );
        if is_new_segment {
            self.flush_registry_if_dirty()?;
        }

        for (name, data, version, extent) in &planned {
            if let Err(e) = self.store.write_block(extent.offset, *version, data) {
                // The WAL already holds a durable, committed record of this
                // write; a crash now still redoes it on the next `open` via
                // `recover_wal`. Surfacing the error here still matters so
                // the caller knows this session's in-memory state may be
                // stale until the database is reopened.
                tracing::error!(
                    %txn,
                    block = %name,
                    error = %e,
                    "storage write failed after WAL commit; will be replayed on next open"
                );
                return Err(e);
            }
        }

        {
            let registry = self.registry.write();
            let mut fsm = self.fsm.write();
            for (name, data, version, extent) in planned {
                if let Some(old) = registry.get(&name) {
                    fsm.free(Extent {
                        offset: old.offset,
                        size: old.extent_size,
                    });
                }
                registry.put(
                    name.clone(),
                    RegistryEntry {
                        offset: extent.offset,
                        extent_size: extent.size,
                        checksum: Checksum::of(&data),
                        version,
                        flags: EntryFlags::default(),
                    },
                );
                self.cache.insert(name, data, version.0).ok();
            }
            for name in &frees {
                if let Some(old) = registry.delete(name) {
                    fsm.free(Extent {
                        offset: old.offset,
                        size: old.extent_size,
                    });
                }
                self.cache.invalidate(name).ok();
            }
        }

        self.maybe_checkpoint(wal_bytes)?;

        Ok(())
    }

    /// Record this commit's WAL growth against the checkpoint triggers
    /// (`spec.md` §4.6: WAL-size or idle-time) and run a checkpoint if
    /// either is due. The registry/FSM locks `apply_commit` held above are
    /// already released by this point, so `checkpoint` can take them again.
    fn maybe_checkpoint(&self, wal_bytes: u64) -> Result<()> {
        let now = Instant::now();
        let due = {
            let mut trigger = self.checkpoint_trigger.lock();
            trigger.record_write(wal_bytes, now);
            trigger.is_due(now)
        };
        if due {
            self.checkpoint()?;
            self.checkpoint_trigger.lock().reset(now);
        }
        Ok(())
    }

    /// Discard a transaction's staged writes without applying them.
    pub fn rollback(&self, txn: TxnId) -> Result<()> {
        let (_, txn_cell) = self
            .txns
            .remove(&txn)
            .ok_or_else(|| Error::NotFound(format!("transaction {txn}")))?;
        let mut transaction = txn_cell.into_inner();
        transaction.mark_rolled_back();
        self.wal.append(&WalRecord {
            lsn: self.wal.next_lsn(),
            kind: RecordKind::AbortTxn { txn },
        })?;
        warn!(%txn, "transaction rolled back");
        Ok(())
    }

    /// Flush the registry to disk (if dirty) and the WAL buffer, without
    /// necessarily fsyncing.
    pub fn flush(&self) -> Result<()> {
        self.flush_registry_if_dirty()?;
        Ok(())
    }

    fn flush_registry_if_dirty(&self) -> Result<()> {
        let registry = self.registry.read();
        if !registry.is_dirty() {
            return Ok(());
        }
        let bytes = registry.to_bytes()?;
        drop(registry);

        let extent_size =
            FreeSpaceManager::round_allocation_size(bytes.len() as u64 + sharpcore_storage::FRAME_OVERHEAD as u64);
        let new_extent = {
            let mut fsm = self.fsm.write();
            fsm.allocate(extent_size)
        };
        self.store
            .write_block(new_extent.offset, Version::INITIAL, &bytes)?;

        let old_offset = {
            let mut header = self.header.lock();
            let old = header.registry_block_offset;
            header.registry_block_offset = new_extent.offset;
            let header_bytes = header.to_bytes();
            write_header_frame(&self.store, &header_bytes)?;
            old
        };
        self.store.sync()?;

        if old_offset != new_extent.offset {
            let mut fsm = self.fsm.write();
            fsm.free(Extent {
                offset: old_offset,
                size: extent_size,
            });
        }

        self.registry.read().mark_clean();
        Ok(())
    }

    /// Force every buffered write, the registry, and the header to durable
    /// storage, and append a checkpoint record covering every LSN issued
    /// so far.
    pub fn force_save(&self) -> Result<()> {
        self.flush_registry_if_dirty()?;
        self.checkpoint()?;
        self.checkpoint_trigger.lock().reset(Instant::now());
        Ok(())
    }

    /// Flush and fsync everything, then drop the database handle.
    pub fn close(self) -> Result<()> {
        self.force_save()
    }

    /// Append a `Checkpoint` record covering every LSN issued so far and
    /// record it in the header, so a validator can tell how much of the
    /// WAL is already known-durable (`spec.md` §5: "checkpoint blocks new
    /// WAL appends only while the checkpoint record is being written").
    /// Replay on `open` still scans the WAL from its origin regardless —
    /// `last_checkpoint_lsn` is diagnostic, not (yet) used to bound the
    /// scan, since redoing already-durable writes is idempotent.
    fn checkpoint(&self) -> Result<()> {
        let lsn_ckpt = self.wal.last_allocated_lsn();
        self.wal.append(&WalRecord {
            lsn: self.wal.next_lsn(),
            kind: RecordKind::Checkpoint { lsn_ckpt },
        })?;
        self.wal.force_sync()?;

        let mut header = self.header.lock();
        header.last_checkpoint_lsn = lsn_ckpt;
        let header_bytes = header.to_bytes();
        write_header_frame(&self.store, &header_bytes)?;
        drop(header);
        let result = self.store.sync();
        debug!(lsn_ckpt, "checkpointed");
        result
    }

    /// Run a VACUUM pass. `Quick` flushes dirty state; `Incremental` also
    /// coalesces free extents (already eager in this implementation, so it
    /// reduces to the same work as `Quick` here); `Full` is not yet
    /// supported by this facade and returns `Error::CapacityExceeded`.
    pub fn vacuum(&self, mode: VacuumMode) -> Result<()> {
        match mode {
            VacuumMode::Quick | VacuumMode::Incremental => self.force_save(),
            VacuumMode::Full => Err(Error::CapacityExceeded(
                "VACUUM Full is performed by sharpcore_repair::vacuum_full, not the facade itself"
                    .to_string(),
            )),
        }
    }

    /// The path this database was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The effective configuration this database was opened/created with.
    pub fn options(&self) -> &DatabaseOptions {
        &self.options
    }

    /// Shared handle to the underlying block store, for components
    /// (overflow tier, columnar segments) that need to read/write raw
    /// blocks directly.
    pub fn block_store(&self) -> Arc<BlockStore> {
        self.store.clone()
    }

    /// Shared handle to the cryptor, for components that frame their own
    /// blocks.
    pub fn cryptor(&self) -> Arc<dyn Cryptor> {
        self.cryptor.clone()
    }
}

fn escalate_to_fatal(err: Error) -> Error {
    match err {
        Error::Corruption { severity: _, location, detail } => Error::Corruption {
            severity: sharpcore_core::Severity::Fatal,
            location,
            detail,
        },
        other => other,
    }
}

fn write_header_frame(store: &BlockStore, header_bytes: &[u8; HEADER_SIZE]) -> Result<()> {
    // The header lives unframed at offset 0 (no CRC/version wrapper beyond
    // its own), since FileHeader::to_bytes/from_bytes already carry their
    // own magic and checksum.
    store.set_min_len(HEADER_SIZE as u64)?;
    store.write_raw_at(0, header_bytes)
}

fn recover_wal(
    store: &Arc<BlockStore>,
    header: &FileHeader,
    registry: &mut BlockRegistry,
    fsm: &mut FreeSpaceManager,
) -> Result<u64> {
    let mut segment_id = 0u64;
    let mut combined = Vec::new();
    loop {
        let name = BlockName::wal_segment(segment_id);
        let Some(entry) = registry.get(&name) else {
            break;
        };
        let read = store.read_block(entry.offset)?;
        combined.extend_from_slice(&read.data);
        segment_id += 1;
    }

    if combined.is_empty() {
        return Ok(segment_id);
    }

    let plan = build_replay_plan(&combined)?;
    let redos = redo_writes(&plan);
    debug!(segments = segment_id, redo_count = redos.len(), "replaying WAL");
    for write in redos {
        if Checksum::of(&write.payload) != write.checksum {
            return Err(Error::corruption(
                sharpcore_core::Severity::Severe,
                write.name.to_string(),
                "WAL redo payload does not match its recorded checksum",
            ));
        }
        store.write_block(write.offset, write.version, &write.payload)?;
        if let Some(old) = registry.get(&write.name) {
            fsm.free(Extent {
                offset: old.offset,
                size: old.extent_size,
            });
        }
        registry.put(
            write.name.clone(),
            RegistryEntry {
                offset: write.offset,
                extent_size: FreeSpaceManager::round_allocation_size(
                    write.payload.len() as u64 + sharpcore_storage::FRAME_OVERHEAD as u64,
                ),
                checksum: write.checksum,
                version: write.version,
                flags: EntryFlags::default(),
            },
        );
    }

    let _ = header;
    Ok(segment_id)
}
