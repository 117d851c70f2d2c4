//! Checkpoint triggers and bookkeeping (`spec.md` §4.6).
//!
//! A checkpoint is the engine's signal that every write at or below
//! `lsn_ckpt` is already durable in the data file, so WAL segments wholly
//! below that LSN can be reused or truncated. This module only decides
//! *when* a checkpoint is due; the engine performs the actual dirty-page
//! flush and appends the `Checkpoint` record itself, since only it can see
//! the page cache's dirty set.

use std::time::{Duration, Instant};

/// Tracks the two triggers from `spec.md` §4.6: WAL bytes written since
/// the last checkpoint, and idle time since the last write.
pub struct CheckpointTrigger {
    interval_bytes: u64,
    idle: Duration,
    bytes_since_checkpoint: u64,
    last_write: Instant,
}

impl CheckpointTrigger {
    /// Build a trigger from the configured interval/idle thresholds.
    pub fn new(interval_bytes: u64, idle_ms: u64, now: Instant) -> Self {
        CheckpointTrigger {
            interval_bytes,
            idle: Duration::from_millis(idle_ms),
            bytes_since_checkpoint: 0,
            last_write: now,
        }
    }

    /// Record that `bytes` of WAL were just appended.
    pub fn record_write(&mut self, bytes: u64, now: Instant) {
        self.bytes_since_checkpoint += bytes;
        self.last_write = now;
    }

    /// Whether a checkpoint is due, either because enough WAL bytes have
    /// accumulated or because the WAL has been idle long enough.
    pub fn is_due(&self, now: Instant) -> bool {
        self.bytes_since_checkpoint >= self.interval_bytes
            || (self.bytes_since_checkpoint > 0 && now.duration_since(self.last_write) >= self.idle)
    }

    /// Reset the byte counter after a checkpoint completes.
    pub fn reset(&mut self, now: Instant) {
        self.bytes_since_checkpoint = 0;
        self.last_write = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn due_after_enough_bytes() {
        let now = Instant::now();
        let mut trigger = CheckpointTrigger::new(1024, 60_000, now);
        assert!(!trigger.is_due(now));
        trigger.record_write(2048, now);
        assert!(trigger.is_due(now));
    }

    #[test]
    fn not_due_with_zero_bytes_regardless_of_idle() {
        let now = Instant::now();
        let trigger = CheckpointTrigger::new(1024, 0, now);
        let later = now + Duration::from_secs(10);
        assert!(!trigger.is_due(later));
    }

    #[test]
    fn reset_clears_the_byte_counter() {
        let now = Instant::now();
        let mut trigger = CheckpointTrigger::new(1024, 60_000, now);
        trigger.record_write(2048, now);
        assert!(trigger.is_due(now));
        trigger.reset(now);
        assert!(!trigger.is_due(now));
    }
}
