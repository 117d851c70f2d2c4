//! Default thresholds and limits from `spec.md` §4.8, §4.10, §4.11, and §6.

/// Rows at or below this size live inline in the page heap.
pub const DEFAULT_INLINE_THRESHOLD: u64 = 4 * 1024;

/// Rows at or below this size (and above `DEFAULT_INLINE_THRESHOLD`) live in
/// an overflow chain; larger rows externalize to a blob file.
pub const DEFAULT_OVERFLOW_THRESHOLD: u64 = 256 * 1024;

/// Default block-framing unit; must be a power of two.
pub const DEFAULT_PAGE_SIZE: u32 = 4096;

/// Default page cache capacity, in frames.
pub const DEFAULT_CACHE_PAGES: usize = 1024;

/// Default maximum bytes per WAL segment before rotation.
pub const DEFAULT_WAL_SEGMENT_SIZE: u64 = 16 * 1024 * 1024;

/// Default checkpoint trigger, in bytes of WAL written since the last one.
pub const DEFAULT_CHECKPOINT_INTERVAL_BYTES: u64 = 8 * 1024 * 1024;

/// Default checkpoint trigger, in milliseconds of WAL idle time.
pub const DEFAULT_CHECKPOINT_IDLE_MS: u64 = 5_000;

/// Default minimum age, in seconds, before an orphaned blob may be deleted.
pub const DEFAULT_ORPHAN_RETENTION_SECS: u64 = 24 * 60 * 60;

/// A whole-extent pool (for bulk allocations) must span at least this many pages.
pub const WHOLE_EXTENT_MIN_PAGES: u64 = 64;

/// Above this size, the free-space manager switches from first-fit to best-fit.
pub const FIRST_FIT_MAX_MULTIPLE_OF_PAGE: u64 = 2;

/// A run-length encoding run must be at least this long to be worthwhile.
pub const MIN_RUN_LENGTH: usize = 4;

/// Dictionary encoding is chosen when `distinct / total <= ` this ratio.
pub const DICTIONARY_SELECTIVITY_THRESHOLD: f64 = 0.1;

/// Number of equi-count histogram buckets kept per column.
pub const HISTOGRAM_BUCKETS: usize = 10;

/// Selectivity the optimizer assumes for a predicate with no histogram to
/// walk (`spec.md` §4.11's "default 0.1 for unknown predicates").
pub const DEFAULT_SELECTIVITY_ESTIMATE: f64 = 0.1;

/// Below this element count, SIMD kernels fall back to scalar loops.
pub const SIMD_SCALAR_FALLBACK_THRESHOLD: usize = 128;

/// Bounded chunk size cooperative-cancellation checks are interleaved at.
pub const CANCELLATION_CHUNK_MS: u64 = 10;

/// Cost-model weight per row scanned.
pub const DEFAULT_COST_ALPHA: f64 = 1.0;

/// Cost-model weight per row emitted.
pub const DEFAULT_COST_BETA: f64 = 1.0;

/// Cost-model weight per predicate evaluated, per row.
pub const DEFAULT_COST_GAMMA: f64 = 0.1;

/// Entries kept in the optimizer's fingerprint-keyed plan cache.
pub const DEFAULT_PLAN_CACHE_CAPACITY: usize = 256;

/// A predicate is pushed into a SIMD FILTER kernel when its estimated
/// selectivity is below this fraction; otherwise the optimizer scans and
/// filters row-by-row.
pub const PUSHDOWN_SELECTIVITY_THRESHOLD: f64 = 0.5;
