//! Orphan detection and cleanup for externalized blob files (`spec.md`
//! §4.8's "Orphan and missing-file detection").
//!
//! A blob is an orphan when its file exists under `blobs/` but no
//! `FilePointer` in the registry's rows references it (the row was deleted,
//! or its write crashed after the blob landed on disk but before the row's
//! commit reached the WAL). A blob is missing when the reverse holds: a row
//! references a `FilePointer` that no longer resolves to a file.

use sharpcore_core::{Error, Result, Severity};
use std::collections::HashSet;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;

use crate::blob::BlobStore;

/// One orphaned blob file found during a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Orphan {
    /// Path relative to `blobs/`.
    pub relative_path: String,
    /// Seconds since the Unix epoch this file was last modified.
    pub mtime_unix: u64,
}

/// One row pointer whose referenced blob file could not be found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Missing {
    /// Path the row's `FilePointer` expected to resolve to.
    pub relative_path: String,
}

/// The result of a full `blobs/` scan against the set of paths currently
/// referenced by rows in the registry.
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    /// Files present on disk with no referencing row.
    pub orphans: Vec<Orphan>,
    /// Rows referencing a file that is not present on disk.
    pub missing: Vec<Missing>,
}

/// Scan `blobs/` against `referenced` (every `relative_path` a live row
/// currently points at) and classify every discrepancy.
pub fn scan(store: &BlobStore, referenced: &HashSet<String>) -> Result<ScanReport> {
    let on_disk = store.list_relative_paths()?;
    let on_disk_set: HashSet<&String> = on_disk.iter().collect();

    let mut orphans = Vec::new();
    for path in &on_disk {
        if !referenced.contains(path) {
            let mtime_unix = store.mtime_unix(path)?;
            orphans.push(Orphan {
                relative_path: path.clone(),
                mtime_unix,
            });
        }
    }

    let mut missing = Vec::new();
    for path in referenced {
        if !on_disk_set.contains(path) {
            missing.push(Missing {
                relative_path: path.clone(),
            });
        }
    }

    Ok(ScanReport { orphans, missing })
}

/// Delete orphans older than `retention_secs`, re-validating each against a
/// fresh `referenced` snapshot immediately before deleting it so a row
/// committed mid-sweep is never mistaken for an orphan.
///
/// Returns the relative paths actually deleted (or that would have been
/// deleted, if `dry_run`).
pub fn clean(
    store: &BlobStore,
    report: &ScanReport,
    retention_secs: u64,
    now_unix: u64,
    dry_run: bool,
    still_referenced: impl Fn(&str) -> bool,
) -> Result<Vec<String>> {
    let mut deleted = Vec::new();
    for orphan in &report.orphans {
        let age = now_unix.saturating_sub(orphan.mtime_unix);
        if age < retention_secs {
            continue;
        }
        if still_referenced(&orphan.relative_path) {
            return Err(Error::corruption(
                Severity::Info,
                orphan.relative_path.clone(),
                "registry changed during orphan cleanup; aborting sweep",
            ));
        }
        if !dry_run {
            store.remove_by_relative_path(&orphan.relative_path)?;
        }
        deleted.push(orphan.relative_path.clone());
    }
    info!(deleted = deleted.len(), dry_run, "orphan cleanup swept");
    Ok(deleted)
}

/// The current Unix timestamp, for callers driving [`clean`].
pub fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn scan_classifies_orphans_and_missing() {
        let dir = tempdir().unwrap();
        let store = BlobStore::for_database(&dir.path().join("db.scdb"));
        let pointer = store.put(b"row data").unwrap();

        let mut referenced = HashSet::new();
        referenced.insert("never/written.bin".to_string());

        let report = scan(&store, &referenced).unwrap();
        assert_eq!(report.orphans.len(), 1);
        assert_eq!(report.orphans[0].relative_path, pointer.relative_path);
        assert_eq!(report.missing.len(), 1);
        assert_eq!(report.missing[0].relative_path, "never/written.bin");
    }

    #[test]
    fn clean_respects_retention_window() {
        let dir = tempdir().unwrap();
        let store = BlobStore::for_database(&dir.path().join("db.scdb"));
        let pointer = store.put(b"row data").unwrap();
        let report = ScanReport {
            orphans: vec![Orphan {
                relative_path: pointer.relative_path.clone(),
                mtime_unix: 1_000,
            }],
            missing: vec![],
        };

        let deleted = clean(&store, &report, 3_600, 1_500, false, |_| false).unwrap();
        assert!(deleted.is_empty(), "orphan is younger than the retention window");

        let deleted = clean(&store, &report, 3_600, 10_000, false, |_| false).unwrap();
        assert_eq!(deleted, vec![pointer.relative_path]);
    }

    #[test]
    fn clean_aborts_if_blob_became_referenced_again() {
        let dir = tempdir().unwrap();
        let store = BlobStore::for_database(&dir.path().join("db.scdb"));
        let pointer = store.put(b"row data").unwrap();
        let report = ScanReport {
            orphans: vec![Orphan {
                relative_path: pointer.relative_path.clone(),
                mtime_unix: 0,
            }],
            missing: vec![],
        };

        let err = clean(&store, &report, 0, 10_000, false, |_| true).unwrap_err();
        assert!(matches!(err, Error::Corruption { .. }));
    }
}
