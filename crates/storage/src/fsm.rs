//! The free-space manager (`spec.md` §4.4, component C4): tracks which
//! byte ranges of the file are not currently owned by any registry entry,
//! and hands them back out on allocation.
//!
//! Extents are always disjoint and always a multiple of the page size,
//! which keeps the allocator simple and keeps `spec.md` invariant #2 (every
//! byte belongs to exactly one of the registry or the FSM) checkable by
//! construction rather than by audit.

use serde::{Deserialize, Serialize};
use sharpcore_core::limits::{FIRST_FIT_MAX_MULTIPLE_OF_PAGE, WHOLE_EXTENT_MIN_PAGES};
use std::collections::BTreeMap;

/// A contiguous, currently-unused byte range: `[offset, offset + size)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extent {
    /// Start offset.
    pub offset: u64,
    /// Length in bytes.
    pub size: u64,
}

impl Extent {
    fn end(&self) -> u64 {
        self.offset + self.size
    }
}

/// Allocation strategy chosen by extent size relative to the page size,
/// per `spec.md` §4.4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationPolicy {
    /// Smallest extent size requests: take the first extent that fits.
    FirstFit,
    /// Mid-sized requests: take the tightest-fitting extent, to limit
    /// fragmentation from repeatedly splitting large extents.
    BestFit,
    /// Bulk allocations (columnar segments, overflow chains): prefer a
    /// whole extent at least `WHOLE_EXTENT_MIN_PAGES` pages long, so the
    /// allocation does not fragment the pool further.
    WholeExtentPool,
}

/// Free-space extents, keyed by offset for deterministic iteration and
/// cheap adjacency checks on free.
pub struct FreeSpaceManager {
    extents: BTreeMap<u64, Extent>,
    page_size: u64,
    file_end: u64,
}

impl FreeSpaceManager {
    /// An empty manager over a file whose current end-of-allocation is
    /// `file_end` (new allocations beyond all free extents grow the file).
    pub fn new(page_size: u64, file_end: u64) -> Self {
        FreeSpaceManager {
            extents: BTreeMap::new(),
            page_size,
            file_end,
        }
    }

    fn policy_for(&self, size: u64) -> AllocationPolicy {
        let pages = (size + self.page_size - 1) / self.page_size;
        if pages >= WHOLE_EXTENT_MIN_PAGES {
            AllocationPolicy::WholeExtentPool
        } else if size <= self.page_size * FIRST_FIT_MAX_MULTIPLE_OF_PAGE {
            AllocationPolicy::FirstFit
        } else {
            AllocationPolicy::BestFit
        }
    }

    /// Round `size` up to the next power of two, per `spec.md` §3's
    /// "variable-sized but power-of-two-rounded for allocation".
    pub fn round_allocation_size(size: u64) -> u64 {
        size.next_power_of_two().max(1)
    }

    /// Allocate an extent of at least `requested_size` bytes (already
    /// expected to be power-of-two-rounded by the caller), splitting a
    /// larger free extent if necessary. Grows the file end if no free
    /// extent is suitable.
    pub fn allocate(&mut self, requested_size: u64) -> Extent {
        let policy = self.policy_for(requested_size);
        let chosen = match policy {
            AllocationPolicy::FirstFit => self
                .extents
                .values()
                .find(|e| e.size >= requested_size)
                .copied(),
            AllocationPolicy::BestFit | AllocationPolicy::WholeExtentPool => self
                .extents
                .values()
                .filter(|e| e.size >= requested_size)
                .min_by_key(|e| e.size)
                .copied(),
        };

        match chosen {
            Some(extent) => {
                self.extents.remove(&extent.offset);
                if extent.size > requested_size {
                    let remainder = Extent {
                        offset: extent.offset + requested_size,
                        size: extent.size - requested_size,
                    };
                    self.extents.insert(remainder.offset, remainder);
                }
                Extent {
                    offset: extent.offset,
                    size: requested_size,
                }
            }
            None => {
                let extent = Extent {
                    offset: self.file_end,
                    size: requested_size,
                };
                self.file_end += requested_size;
                extent
            }
        }
    }

    /// Return an extent to the free pool, coalescing with adjacent free
    /// extents on either side.
    pub fn free(&mut self, mut extent: Extent) {
        if let Some((&left_offset, &left)) = self.extents.range(..extent.offset).next_back() {
            if left.end() == extent.offset {
                self.extents.remove(&left_offset);
                extent = Extent {
                    offset: left.offset,
                    size: left.size + extent.size,
                };
            }
        }
        if let Some((&right_offset, &right)) = self.extents.range(extent.end()..).next() {
            if right_offset == extent.end() {
                self.extents.remove(&right_offset);
                extent = Extent {
                    offset: extent.offset,
                    size: extent.size + right.size,
                };
            }
        }
        self.extents.insert(extent.offset, extent);
    }

    /// Total bytes currently free.
    pub fn total_free(&self) -> u64 {
        self.extents.values().map(|e| e.size).sum()
    }

    /// Current logical end of the file (`registry_block_offset` and every
    /// registered extent must lie below this).
    pub fn file_end(&self) -> u64 {
        self.file_end
    }

    /// Ratio in `[0, 1]` of free extents that are smaller than a page,
    /// i.e. too small to satisfy a typical allocation without growing the
    /// file. `0.0` for an empty pool.
    pub fn fragmentation_ratio(&self) -> f64 {
        if self.extents.is_empty() {
            return 0.0;
        }
        let small = self
            .extents
            .values()
            .filter(|e| e.size < self.page_size)
            .count();
        small as f64 / self.extents.len() as f64
    }

    /// All free extents, offset-ordered, for serialization or a VACUUM
    /// pass that wants to walk the whole pool.
    pub fn extents(&self) -> Vec<Extent> {
        self.extents.values().copied().collect()
    }

    /// Rebuild a manager from a previously serialized extent list and the
    /// current file length, as on database open.
    pub fn from_extents(page_size: u64, file_end: u64, extents: Vec<Extent>) -> Self {
        let mut map = BTreeMap::new();
        for e in extents {
            map.insert(e.offset, e);
        }
        FreeSpaceManager {
            extents: map,
            page_size,
            file_end,
        }
    }
}
