//! The row-overflow tier (`spec.md` §4.8, component C8): decides which of
//! three tiers a row's bytes belong in, and implements the middle one — a
//! chain of dedicated blocks inside the SCDB file.
//!
//! Chain pages are named deterministically (`overflow:<table>:<chain-id>:
//! <seq>`), so unlike a classic linked list there is no stored "next
//! page" pointer to manage: the first page's header records the payload's
//! total size, from which the number of pages that must follow is a pure
//! function of the page capacity. Reading the chain is then a matter of
//! reading pages `0..n` in order and concatenating their slices. This is
//! recorded as a deliberate simplification of the spec's "linked list" in
//! `DESIGN.md`; the on-disk integrity guarantee (whole-payload SHA-256 in
//! the first page) is unchanged.

use byteorder::{ByteOrder, LittleEndian};
use sharpcore_core::{BlockName, Checksum, Error, Result, Severity, StorageRef};

const CHAIN_HEADER_LEN: usize = 8 + 32; // total_size:u64 + checksum:32

/// Which tier a row of `size` bytes belongs in, per `spec.md` §4.8's
/// `select_tier` decision function.
pub fn select_tier(size: u64, inline_threshold: u64, overflow_threshold: u64) -> sharpcore_core::RowTier {
    if size <= inline_threshold {
        sharpcore_core::RowTier::Inline
    } else if size <= overflow_threshold {
        sharpcore_core::RowTier::Overflow
    } else {
        sharpcore_core::RowTier::External
    }
}

/// An accessor for a specific read/write of an overflow chain.
pub struct OverflowChain<'a> {
    db: &'a crate::Database,
    page_capacity: usize,
}

impl<'a> OverflowChain<'a> {
    /// Build a chain accessor for `db`, sizing each page to fit inside one
    /// block frame.
    pub fn new(db: &'a crate::Database) -> Self {
        let page_size = db.options().page_size as usize;
        let overhead = sharpcore_storage::FRAME_OVERHEAD;
        OverflowChain {
            db,
            page_capacity: page_size.saturating_sub(overhead),
        }
    }

    /// Write `payload` as a new chain under `table`/`chain_id`, returning
    /// the `StorageRef` a row should keep.
    ///
    /// A chain can span many pages, each written with its own
    /// `Database::write_block` call. When the caller already has a
    /// transaction (`txn = Some(_)`), those writes ride along inside it and
    /// the caller controls atomicity. When `txn` is `None`, `spec.md` §6's
    /// untransacted row API still implies the whole chain lands or none of
    /// it does, so an internal transaction is opened here and committed
    /// (or rolled back on the first failing page) instead of letting each
    /// page auto-commit on its own.
    pub fn write(&self, txn: Option<sharpcore_concurrency::TxnId>, table: &str, chain_id: u64, payload: &[u8]) -> Result<StorageRef> {
        match txn {
            Some(id) => self.write_pages(Some(id), table, chain_id, payload),
            None => {
                let id = self.db.begin();
                match self.write_pages(Some(id), table, chain_id, payload) {
                    Ok(storage_ref) => {
                        self.db.commit(id)?;
                        Ok(storage_ref)
                    }
                    Err(e) => {
                        let _ = self.db.rollback(id);
                        Err(e)
                    }
                }
            }
        }
    }

    fn write_pages(
        &self,
        txn: Option<sharpcore_concurrency::TxnId>,
        table: &str,
        chain_id: u64,
        payload: &[u8],
    ) -> Result<StorageRef> {
        let checksum = Checksum::of(payload);
        let first_capacity = self.page_capacity.saturating_sub(CHAIN_HEADER_LEN);
        if first_capacity == 0 {
            return Err(Error::CapacityExceeded(
                "page_size too small to hold an overflow chain header".to_string(),
            ));
        }

        let mut seq = 0u32;
        let mut written = 0usize;

        let first_len = first_capacity.min(payload.len());
        let mut first_page = Vec::with_capacity(CHAIN_HEADER_LEN + first_len);
        let mut header = [0u8; CHAIN_HEADER_LEN];
        LittleEndian::write_u64(&mut header[0..8], payload.len() as u64);
        header[8..40].copy_from_slice(&checksum.0);
        first_page.extend_from_slice(&header);
        first_page.extend_from_slice(&payload[0..first_len]);
        self.db.write_block(
            txn,
            BlockName::overflow_page(table, chain_id, seq),
            first_page,
        )?;
        written += first_len;
        seq += 1;

        while written < payload.len() {
            let chunk_len = self.page_capacity.min(payload.len() - written);
            let chunk = payload[written..written + chunk_len].to_vec();
            self.db
                .write_block(txn, BlockName::overflow_page(table, chain_id, seq), chunk)?;
            written += chunk_len;
            seq += 1;
        }

        Ok(StorageRef::Overflow {
            table: table.to_string(),
            chain_id,
        })
    }

    /// Read a chain back and verify its whole-payload checksum.
    pub fn read(&self, table: &str, chain_id: u64) -> Result<Vec<u8>> {
        let first = self
            .db
            .read_block(None, &BlockName::overflow_page(table, chain_id, 0))?;
        if first.len() < CHAIN_HEADER_LEN {
            return Err(Error::corruption(
                Severity::Severe,
                format!("overflow:{table}:{chain_id}:0"),
                "chain head page shorter than its own header",
            ));
        }
        let total_size = LittleEndian::read_u64(&first[0..8]) as usize;
        let mut expected_checksum = [0u8; 32];
        expected_checksum.copy_from_slice(&first[8..40]);
        let expected_checksum = Checksum(expected_checksum);

        let mut payload = Vec::with_capacity(total_size);
        payload.extend_from_slice(&first[CHAIN_HEADER_LEN..]);

        let mut seq = 1u32;
        while payload.len() < total_size {
            let page = self
                .db
                .read_block(None, &BlockName::overflow_page(table, chain_id, seq))?;
            payload.extend_from_slice(&page);
            seq += 1;
        }
        payload.truncate(total_size);

        if Checksum::of(&payload) != expected_checksum {
            return Err(Error::corruption(
                Severity::Severe,
                format!("overflow:{table}:{chain_id}"),
                "reconstructed chain payload does not match its recorded checksum",
            ));
        }
        Ok(payload)
    }

    /// Delete every page in a chain. Stops as soon as a page is missing,
    /// since chain pages are always created contiguously. Same
    /// internal-transaction wrapping as [`OverflowChain::write`] when
    /// `txn` is `None`, so a multi-page chain is removed atomically.
    pub fn delete(&self, txn: Option<sharpcore_concurrency::TxnId>, table: &str, chain_id: u64) -> Result<()> {
        match txn {
            Some(id) => self.delete_pages(Some(id), table, chain_id),
            None => {
                let id = self.db.begin();
                match self.delete_pages(Some(id), table, chain_id) {
                    Ok(()) => self.db.commit(id),
                    Err(e) => {
                        let _ = self.db.rollback(id);
                        Err(e)
                    }
                }
            }
        }
    }

    fn delete_pages(
        &self,
        txn: Option<sharpcore_concurrency::TxnId>,
        table: &str,
        chain_id: u64,
    ) -> Result<()> {
        let mut seq = 0u32;
        loop {
            let name = BlockName::overflow_page(table, chain_id, seq);
            match self.db.delete_block(txn, name) {
                Ok(()) => seq += 1,
                Err(Error::NotFound(_)) => break,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sharpcore_core::RowTier;

    #[test]
    fn select_tier_matches_boundaries() {
        assert_eq!(select_tier(4096, 4096, 262_144), RowTier::Inline);
        assert_eq!(select_tier(4097, 4096, 262_144), RowTier::Overflow);
        assert_eq!(select_tier(262_144, 4096, 262_144), RowTier::Overflow);
        assert_eq!(select_tier(262_145, 4096, 262_144), RowTier::External);
    }
}
