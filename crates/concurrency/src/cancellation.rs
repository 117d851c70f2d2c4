//! Cooperative cancellation for long-running operations (`spec.md` §5:
//! vacuum, repair, and orphan scans accept a cancellation signal checked
//! between bounded chunks of work of at most `CANCELLATION_CHUNK_MS`).

use sharpcore_core::limits::CANCELLATION_CHUNK_MS;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// A shared flag a caller can set to request cancellation, and a worker
/// can poll between chunks of work.
#[derive(Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// A fresh, not-yet-cancelled token.
    pub fn new() -> Self {
        CancellationToken {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Paces a loop so the cancellation token is only polled once per chunk of
/// `CANCELLATION_CHUNK_MS`, instead of on every single iteration — cheap
/// enough not to matter for tight inner loops, predictable enough that a
/// cancel request is always noticed quickly.
pub struct ChunkPacer {
    chunk_start: Instant,
}

impl ChunkPacer {
    /// Start timing a new chunk.
    pub fn new() -> Self {
        ChunkPacer {
            chunk_start: Instant::now(),
        }
    }

    /// Whether the current chunk has run long enough that cancellation
    /// should be checked again.
    pub fn chunk_elapsed(&self) -> bool {
        self.chunk_start.elapsed().as_millis() as u64 >= CANCELLATION_CHUNK_MS
    }

    /// Begin timing the next chunk.
    pub fn reset(&mut self) {
        self.chunk_start = Instant::now();
    }
}

impl Default for ChunkPacer {
    fn default() -> Self {
        Self::new()
    }
}

/// Error returned by a long operation that observed cancellation mid-run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

impl std::fmt::Display for Cancelled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("operation cancelled")
    }
}

impl std::error::Error for Cancelled {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_uncancelled() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn cancel_is_observed_through_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn chunk_pacer_resets_elapsed_state() {
        let mut pacer = ChunkPacer::new();
        assert!(!pacer.chunk_elapsed());
        pacer.reset();
        assert!(!pacer.chunk_elapsed());
    }
}
