//! The bounded page cache (`spec.md` §4.5, component C5): keeps a fixed
//! number of decrypted block frames resident, evicted by a CLOCK
//! (second-chance) policy so a hot read path never has to take a global
//! lock just to bump an LRU list.
//!
//! Each frame carries its own reference bit and pin count as atomics; the
//! id-to-frame-index lookup is a `DashMap`, sharded internally by the
//! `dashmap` crate, so concurrent readers on different blocks don't
//! contend. The only thing serialized through a lock is the CLOCK hand's
//! sweep on eviction, which is rare relative to lookups.

use dashmap::DashMap;
use parking_lot::Mutex;
use sharpcore_core::{BlockName, Error, Result};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

struct Frame {
    name: Mutex<Option<BlockName>>,
    data: Mutex<Arc<Vec<u8>>>,
    referenced: AtomicBool,
    pin_count: AtomicU32,
    dirty: AtomicBool,
    version: AtomicU64,
}

impl Frame {
    fn empty() -> Self {
        Frame {
            name: Mutex::new(None),
            data: Mutex::new(Arc::new(Vec::new())),
            referenced: AtomicBool::new(false),
            pin_count: AtomicU32::new(0),
            dirty: AtomicBool::new(false),
            version: AtomicU64::new(0),
        }
    }
}

/// A pinned handle onto a cached frame. Drop to unpin automatically;
/// eviction can never reclaim a pinned frame.
pub struct PageHandle<'a> {
    cache: &'a PageCache,
    index: usize,
}

impl<'a> PageHandle<'a> {
    /// The decrypted bytes currently resident in this frame.
    pub fn data(&self) -> Arc<Vec<u8>> {
        self.cache.frames[self.index].data.lock().clone()
    }

    /// Mark the frame dirty, so a flush pass knows to write it back.
    pub fn mark_dirty(&self) {
        self.cache.frames[self.index].dirty.store(true, Ordering::Release);
    }

    /// The block's version as last recorded for this frame.
    pub fn version(&self) -> u64 {
        self.cache.frames[self.index].version.load(Ordering::Acquire)
    }
}

impl<'a> Drop for PageHandle<'a> {
    fn drop(&mut self) {
        self.cache.frames[self.index]
            .pin_count
            .fetch_sub(1, Ordering::AcqRel);
    }
}

/// A bounded cache of decrypted block payloads, indexed by `BlockName`.
pub struct PageCache {
    frames: Vec<Frame>,
    index: DashMap<BlockName, usize>,
    clock_hand: Mutex<usize>,
    capacity: usize,
}

impl PageCache {
    /// Build a cache with room for `capacity` frames.
    pub fn new(capacity: usize) -> Self {
        let mut frames = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            frames.push(Frame::empty());
        }
        PageCache {
            frames,
            index: DashMap::new(),
            clock_hand: Mutex::new(0),
            capacity,
        }
    }

    /// Look up a cached block, pinning it and setting its reference bit.
    pub fn get(&self, name: &BlockName) -> Option<PageHandle<'_>> {
        let index = *self.index.get(name)?;
        let frame = &self.frames[index];
        frame.referenced.store(true, Ordering::Release);
        frame.pin_count.fetch_add(1, Ordering::AcqRel);
        Some(PageHandle { cache: self, index })
    }

    /// Insert a freshly-read block, evicting via CLOCK if the cache is
    /// full, and return a pinned handle to it.
    pub fn insert(&self, name: BlockName, data: Vec<u8>, version: u64) -> Result<PageHandle<'_>> {
        if let Some(handle) = self.get(&name) {
            return Ok(handle);
        }

        let index = if self.index.len() < self.capacity {
            self.index.len()
        } else {
            self.evict_one()?
        };

        let frame = &self.frames[index];
        *frame.data.lock() = Arc::new(data);
        *frame.name.lock() = Some(name.clone());
        frame.referenced.store(true, Ordering::Release);
        frame.dirty.store(false, Ordering::Release);
        frame.version.store(version, Ordering::Release);
        frame.pin_count.store(1, Ordering::Release);
        self.index.insert(name, index);

        Ok(PageHandle { cache: self, index })
    }

    fn evict_one(&self) -> Result<usize> {
        let mut hand = self.clock_hand.lock();
        let start = *hand;
        loop {
            let idx = *hand;
            *hand = (*hand + 1) % self.capacity;
            let frame = &self.frames[idx];
            if frame.pin_count.load(Ordering::Acquire) > 0 {
                if *hand == start {
                    return Err(Error::CapacityExceeded(
                        "page cache full and every frame is pinned".to_string(),
                    ));
                }
                continue;
            }
            if frame.referenced.swap(false, Ordering::AcqRel) {
                if *hand == start {
                    // Full second sweep with nothing evictable but pins;
                    // evict this frame now rather than spin forever.
                } else {
                    continue;
                }
            }
            if let Some(old_name) = frame.name.lock().take() {
                trace!(evicted = %old_name, frame = idx, "CLOCK evicted frame");
                self.index.remove(&old_name);
            }
            return Ok(idx);
        }
    }

    /// Remove a block from the cache outright (e.g. after a delete),
    /// regardless of its reference bit. Returns an error if it is pinned.
    pub fn invalidate(&self, name: &BlockName) -> Result<()> {
        let Some(index) = self.index.get(name).map(|e| *e) else {
            return Ok(());
        };
        let frame = &self.frames[index];
        if frame.pin_count.load(Ordering::Acquire) > 0 {
            return Err(Error::CapacityExceeded(format!(
                "cannot invalidate pinned block {name}"
            )));
        }
        *frame.name.lock() = None;
        self.index.remove(name);
        Ok(())
    }

    /// Names of every currently dirty frame, for a flush pass.
    pub fn dirty_names(&self) -> Vec<BlockName> {
        self.index
            .iter()
            .filter(|e| self.frames[*e.value()].dirty.load(Ordering::Acquire))
            .map(|e| e.key().clone())
            .collect()
    }

    /// Clear a frame's dirty bit after it has been written back.
    pub fn mark_clean(&self, name: &BlockName) {
        if let Some(index) = self.index.get(name).map(|e| *e) {
            self.frames[index].dirty.store(false, Ordering::Release);
        }
    }

    /// Number of frames currently occupied.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether the cache currently holds no frames.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_get_round_trips() {
        let cache = PageCache::new(4);
        let name = BlockName::new("a");
        {
            let handle = cache.insert(name.clone(), b"hello".to_vec(), 1).unwrap();
            assert_eq!(*handle.data(), b"hello".to_vec());
        }
        let handle = cache.get(&name).unwrap();
        assert_eq!(*handle.data(), b"hello".to_vec());
    }

    #[test]
    fn evicts_when_full() {
        let cache = PageCache::new(2);
        cache.insert(BlockName::new("a"), vec![1], 1).unwrap();
        cache.insert(BlockName::new("b"), vec![2], 1).unwrap();
        // Neither pinned beyond this scope; c should evict one of a/b.
        cache.insert(BlockName::new("c"), vec![3], 1).unwrap();
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&BlockName::new("c")).is_some());
    }

    #[test]
    fn pinned_frame_is_never_evicted() {
        let cache = PageCache::new(1);
        let pinned = cache.insert(BlockName::new("a"), vec![1], 1).unwrap();
        let err = cache.insert(BlockName::new("b"), vec![2], 1).unwrap_err();
        assert!(matches!(err, Error::CapacityExceeded(_)));
        drop(pinned);
        // Now unpinned, eviction succeeds.
        cache.insert(BlockName::new("b"), vec![2], 1).unwrap();
    }

    #[test]
    fn dirty_tracking() {
        let cache = PageCache::new(2);
        let name = BlockName::new("a");
        {
            let handle = cache.insert(name.clone(), vec![1], 1).unwrap();
            handle.mark_dirty();
        }
        assert_eq!(cache.dirty_names(), vec![name.clone()]);
        cache.mark_clean(&name);
        assert!(cache.dirty_names().is_empty());
    }

    #[test]
    fn invalidate_removes_unpinned_entry() {
        let cache = PageCache::new(2);
        let name = BlockName::new("a");
        cache.insert(name.clone(), vec![1], 1).unwrap();
        cache.invalidate(&name).unwrap();
        assert!(cache.get(&name).is_none());
    }
}
