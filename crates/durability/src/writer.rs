//! The WAL writer (`spec.md` §4.6).
//!
//! Segments are themselves encrypted blocks (per `spec.md` §4.1) but use a
//! reserved block-name prefix (`wal:<n>`) so the registry never confuses
//! them with user data. The writer appends record frames to the current
//! segment's in-memory buffer and flushes that buffer through the block
//! store under the configured [`DurabilityMode`].

use parking_lot::Mutex;
use sharpcore_config::DatabaseOptions;
use sharpcore_core::{BlockName, Result, Version};
use sharpcore_storage::BlockStore;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

use crate::frame::encode_record;
use crate::record::WalRecord;

/// How aggressively the writer fsyncs after appending records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurabilityMode {
    /// Never fsync explicitly; rely on the OS and an eventual checkpoint.
    /// Fastest, weakest guarantee.
    None,
    /// Fsync after every `CommitTxn` record. The spec's default: a reader
    /// that observes a commit is guaranteed to still see it after a crash.
    Strict,
    /// Fsync once per batch of commits, after at most
    /// `DatabaseOptions::checkpoint_idle_ms` of buffering. Trades a small
    /// durability window for throughput.
    Batched,
}

struct Segment {
    name: BlockName,
    offset: u64,
    buffer: Vec<u8>,
    /// Version to use for the *next* flush of this segment. Bumped every
    /// time `flush_locked` actually writes, so two flushes of the same
    /// segment never reuse an AEAD nonce (`BlockId::new(offset, version)`)
    /// for different plaintexts.
    version: Version,
}

/// Appends WAL records to the current segment and rotates to a fresh one
/// once `wal_segment_size` is reached.
pub struct WalWriter {
    store: Arc<BlockStore>,
    segment: Mutex<Segment>,
    next_segment_id: AtomicU64,
    next_offset: AtomicU64,
    segment_size_limit: u64,
    mode: DurabilityMode,
    next_lsn: AtomicU64,
}

impl WalWriter {
    /// Open a writer starting a fresh segment at `start_offset`, the
    /// extent just past the registry on a newly created database, or the
    /// tail of the WAL region on reopen.
    pub fn new(
        store: Arc<BlockStore>,
        options: &DatabaseOptions,
        mode: DurabilityMode,
        start_offset: u64,
        next_segment_id: u64,
        starting_lsn: u64,
    ) -> Self {
        WalWriter {
            store,
            segment: Mutex::new(Segment {
                name: BlockName::wal_segment(next_segment_id),
                offset: start_offset,
                buffer: Vec::new(),
                version: Version::INITIAL,
            }),
            next_segment_id: AtomicU64::new(next_segment_id + 1),
            next_offset: AtomicU64::new(start_offset),
            segment_size_limit: options.wal_segment_size,
            mode,
            next_lsn: AtomicU64::new(starting_lsn),
        }
    }

    /// Allocate the next LSN for a record about to be appended.
    pub fn next_lsn(&self) -> u64 {
        self.next_lsn.fetch_add(1, Ordering::AcqRel)
    }

    /// Append a record to the current segment's buffer. Does not itself
    /// decide whether to fsync — call [`WalWriter::sync_for_commit`] after
    /// appending a `CommitTxn` record. Returns the encoded frame's length,
    /// for callers (e.g. a checkpoint trigger) that track WAL growth.
    pub fn append(&self, record: &WalRecord) -> Result<u64> {
        let frame = encode_record(record)?;
        trace!(lsn = record.lsn, kind = ?record.kind, "appending WAL record");
        let frame_len = frame.len() as u64;
        let mut segment = self.segment.lock();
        segment.buffer.extend_from_slice(&frame);
        if segment.buffer.len() as u64 >= self.segment_size_limit {
            self.flush_locked(&mut segment)?;
            self.rotate_locked(&mut segment);
        }
        Ok(frame_len)
    }

    /// Writes the segment's accumulated buffer under `segment.version`,
    /// then bumps it. A second flush of the same segment therefore writes
    /// under a fresh `(offset, version)` pair, even though `offset` itself
    /// never changes until the segment rotates — required so the AEAD
    /// nonce (derived solely from offset and version) is never reused for
    /// two different plaintexts.
    fn flush_locked(&self, segment: &mut Segment) -> Result<()> {
        if segment.buffer.is_empty() {
            return Ok(());
        }
        self.store
            .write_block(segment.offset, segment.version, &segment.buffer)?;
        segment.version = segment.version.next();
        Ok(())
    }

    fn rotate_locked(&self, segment: &mut Segment) {
        let id = self.next_segment_id.fetch_add(1, Ordering::AcqRel);
        let next_offset = segment.offset + self.segment_size_limit;
        self.next_offset.store(next_offset, Ordering::Release);
        debug!(old = %segment.name, new_id = id, next_offset, "rotating WAL segment");
        *segment = Segment {
            name: BlockName::wal_segment(id),
            offset: next_offset,
            buffer: Vec::new(),
            version: Version::INITIAL,
        };
    }

    /// Flush the current segment buffer to the block store, then fsync if
    /// `mode` calls for it after a commit. Called after every `CommitTxn`
    /// append.
    pub fn sync_for_commit(&self) -> Result<()> {
        {
            let mut segment = self.segment.lock();
            self.flush_locked(&mut segment)?;
        }
        match self.mode {
            DurabilityMode::Strict => self.store.sync(),
            DurabilityMode::Batched | DurabilityMode::None => Ok(()),
        }
    }

    /// Force a flush and fsync regardless of mode, for `force_save`/`close`.
    pub fn force_sync(&self) -> Result<()> {
        {
            let mut segment = self.segment.lock();
            self.flush_locked(&mut segment)?;
        }
        self.store.sync()
    }

    /// The name of the segment currently being written, for registering
    /// it in the block registry once it is flushed for the first time.
    pub fn current_segment_name(&self) -> BlockName {
        self.segment.lock().name.clone()
    }

    /// The offset the segment currently being written starts at.
    pub fn current_segment_offset(&self) -> u64 {
        self.next_offset.load(Ordering::Acquire)
    }

    /// The highest LSN already handed out by [`WalWriter::next_lsn`],
    /// without allocating a new one. Used by a checkpoint to record which
    /// LSNs it covers.
    pub fn last_allocated_lsn(&self) -> u64 {
        self.next_lsn.load(Ordering::Acquire).saturating_sub(1)
    }
}
