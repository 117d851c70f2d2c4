//! Configuration surface for opening/creating a SharpCoreDB database.
//!
//! This crate provides [`DatabaseOptions`], [`KdfParams`], [`VacuumMode`],
//! and [`ValidationMode`] — the caller-supplied struct from `spec.md` §6's
//! configuration table. Every knob there has a field here; all have
//! spec-mandated defaults so `DatabaseOptions::default()` is always valid.

#![warn(missing_docs)]
#![warn(clippy::all)]

use serde::{Deserialize, Serialize};

/// Memory/time/parallelism cost parameters for the password-to-key KDF
/// (`spec.md` §4.1). Consumed by `sharpcore-crypto::derive_key`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Argon2id memory cost, in KiB.
    pub memory_kib: u32,
    /// Argon2id number of passes.
    pub iterations: u32,
    /// Argon2id degree of parallelism.
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        // Argon2id "moderate" profile: adequate for an embedded, single-open
        // database without imposing multi-second open latency.
        KdfParams {
            memory_kib: 19 * 1024,
            iterations: 2,
            parallelism: 1,
        }
    }
}

/// VACUUM intent, per `spec.md` §4.7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum VacuumMode {
    /// Append a Checkpoint, flush dirty pages, trim the WAL. Target: < 20 ms.
    #[default]
    Quick,
    /// Coalesce adjacent free extents, compact the tail. Target: < 200 ms.
    Incremental,
    /// Rewrite the file with no gaps; rebuild the registry; atomic rename.
    /// Target: ≤ 15 s/GiB.
    Full,
}

/// Integrity-validation thoroughness, per `spec.md` §4.12.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ValidationMode {
    /// Header magic/checksum/version only. Target: < 1 ms.
    #[default]
    Quick,
    /// Quick + registry/FSM consistency + every block checksum. Target: < 10 ms/MiB.
    Standard,
    /// Standard + WAL replay dry-run. Target: < 50 ms/MiB.
    Deep,
    /// Deep + re-decode and re-verify every block under AEAD. Target: < 200 ms/MiB.
    Paranoid,
}

/// Repair aggressiveness, per `spec.md` §4.12.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RepairPolicy {
    /// Only structural repairs; never drops data. The default.
    #[default]
    Conservative,
    /// Permits some progressive data drops when conservative repair cannot proceed.
    Moderate,
    /// Permits aggressive data drops to restore openability.
    Aggressive,
}

/// Options for creating or opening a database, covering every row of
/// `spec.md` §6's configuration table.
///
/// Use the builder pattern to configure options; any field left at its
/// default matches the spec's stated default.
///
/// ```ignore
/// use sharpcore_config::{DatabaseOptions, VacuumMode};
///
/// let opts = DatabaseOptions::new()
///     .page_size(4096)
///     .cache_pages(256)
///     .vacuum_default_mode(VacuumMode::Incremental);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseOptions {
    /// Fixed block-framing unit; must be a power of two. Default 4 KiB.
    pub page_size: u32,
    /// Page cache capacity, in frames.
    pub cache_pages: usize,
    /// Rows at or below this size live inline in the page heap.
    pub inline_threshold: u64,
    /// Rows at or below this size (and above `inline_threshold`) use the
    /// overflow chain tier; larger rows externalize to a blob file.
    pub overflow_threshold: u64,
    /// Max bytes per WAL segment before rotation.
    pub wal_segment_size: u64,
    /// Checkpoint trigger: bytes of WAL written since the last checkpoint.
    pub checkpoint_interval_bytes: u64,
    /// Checkpoint trigger: milliseconds of WAL idle time.
    pub checkpoint_idle_ms: u64,
    /// Password-to-key derivation cost parameters.
    pub kdf_params: KdfParams,
    /// Minimum age, in seconds, before an orphaned blob may be deleted.
    pub orphan_retention_secs: u64,
    /// Default VACUUM mode when the caller does not specify one.
    pub vacuum_default_mode: VacuumMode,
    /// Default validation mode when the caller does not specify one.
    pub validation_default_mode: ValidationMode,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        use sharpcore_core::limits::*;
        DatabaseOptions {
            page_size: DEFAULT_PAGE_SIZE,
            cache_pages: DEFAULT_CACHE_PAGES,
            inline_threshold: DEFAULT_INLINE_THRESHOLD,
            overflow_threshold: DEFAULT_OVERFLOW_THRESHOLD,
            wal_segment_size: DEFAULT_WAL_SEGMENT_SIZE,
            checkpoint_interval_bytes: DEFAULT_CHECKPOINT_INTERVAL_BYTES,
            checkpoint_idle_ms: DEFAULT_CHECKPOINT_IDLE_MS,
            kdf_params: KdfParams::default(),
            orphan_retention_secs: DEFAULT_ORPHAN_RETENTION_SECS,
            vacuum_default_mode: VacuumMode::default(),
            validation_default_mode: ValidationMode::default(),
        }
    }
}

impl DatabaseOptions {
    /// Start from spec defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the page size. Must be a power of two; validated at `create`/`open`.
    pub fn page_size(mut self, bytes: u32) -> Self {
        self.page_size = bytes;
        self
    }

    /// Set the page cache capacity, in frames.
    pub fn cache_pages(mut self, frames: usize) -> Self {
        self.cache_pages = frames;
        self
    }

    /// Set both row-tier thresholds.
    pub fn row_tier_thresholds(mut self, inline: u64, overflow: u64) -> Self {
        self.inline_threshold = inline;
        self.overflow_threshold = overflow;
        self
    }

    /// Set the WAL segment rotation size.
    pub fn wal_segment_size(mut self, bytes: u64) -> Self {
        self.wal_segment_size = bytes;
        self
    }

    /// Set the checkpoint triggers.
    pub fn checkpoint_triggers(mut self, interval_bytes: u64, idle_ms: u64) -> Self {
        self.checkpoint_interval_bytes = interval_bytes;
        self.checkpoint_idle_ms = idle_ms;
        self
    }

    /// Set the KDF cost parameters.
    pub fn kdf_params(mut self, params: KdfParams) -> Self {
        self.kdf_params = params;
        self
    }

    /// Set the orphan blob retention window, in seconds.
    pub fn orphan_retention_secs(mut self, secs: u64) -> Self {
        self.orphan_retention_secs = secs;
        self
    }

    /// Set the default VACUUM mode.
    pub fn vacuum_default_mode(mut self, mode: VacuumMode) -> Self {
        self.vacuum_default_mode = mode;
        self
    }

    /// Set the default validation mode.
    pub fn validation_default_mode(mut self, mode: ValidationMode) -> Self {
        self.validation_default_mode = mode;
        self
    }

    /// Whether `page_size` is a valid power of two.
    pub fn page_size_is_valid(&self) -> bool {
        self.page_size > 0 && (self.page_size & (self.page_size - 1)) == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let opts = DatabaseOptions::default();
        assert!(opts.page_size_is_valid());
        assert_eq!(opts.inline_threshold, 4096);
        assert_eq!(opts.overflow_threshold, 256 * 1024);
    }

    #[test]
    fn builder_chains() {
        let opts = DatabaseOptions::new()
            .page_size(8192)
            .cache_pages(16)
            .vacuum_default_mode(VacuumMode::Full);
        assert_eq!(opts.page_size, 8192);
        assert_eq!(opts.cache_pages, 16);
        assert_eq!(opts.vacuum_default_mode, VacuumMode::Full);
    }

    #[test]
    fn rejects_non_power_of_two() {
        let opts = DatabaseOptions::new().page_size(4097);
        assert!(!opts.page_size_is_valid());
    }
}
