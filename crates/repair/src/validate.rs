//! Integrity validation (`spec.md` §4.12): the four validation modes, each
//! a strict superset of the checks below it.

use std::fs::OpenOptions;
use std::io::Read as _;
use std::path::Path;
use std::sync::Arc;

use sharpcore_concurrency::{CancellationToken, ChunkPacer};
use sharpcore_config::{KdfParams, ValidationMode};
use sharpcore_core::{BlockName, Checksum, Error, Result, Severity};
use sharpcore_crypto::{derive_key, AesGcmCryptor, Cryptor};
use sharpcore_durability::{build_replay_plan, redo_writes};
use sharpcore_storage::{BlockRegistry, BlockStore, FileHeader, HEADER_SIZE};
use tracing::{debug, warn};

use crate::report::{Finding, ValidationReport};

/// Run a validation pass at `mode` against the database file at `path`.
///
/// Unlike `sharpcore_engine::Database::open`, this never fails outright on
/// a corrupt header/registry/block — it records a `Finding` and returns
/// the partial report, since the whole point is to describe what's wrong
/// rather than refuse to look.
pub fn validate(
    path: impl AsRef<Path>,
    password: &str,
    mode: ValidationMode,
    token: Option<&CancellationToken>,
) -> Result<ValidationReport> {
    let path = path.as_ref();
    debug!(path = %path.display(), ?mode, "starting validation");
    let report = validate_inner(path, password, mode, token)?;
    if report.is_healthy() {
        debug!(blocks_checked = report.blocks_checked, "validation found no issues");
    } else {
        warn!(
            findings = report.findings.len(),
            worst = ?report.worst_severity(),
            "validation found issues"
        );
    }
    Ok(report)
}

fn validate_inner(
    path: &Path,
    password: &str,
    mode: ValidationMode,
    token: Option<&CancellationToken>,
) -> Result<ValidationReport> {
    let mut report = ValidationReport::new(mode);

    let file = OpenOptions::new().read(true).open(path)?;
    let mut header_buf = [0u8; HEADER_SIZE];
    {
        let mut f = file.try_clone()?;
        f.read_exact(&mut header_buf)?;
    }

    let header = match FileHeader::from_bytes(&header_buf) {
        Ok(h) => h,
        Err(e) => {
            report.findings.push(Finding::new(
                Severity::Fatal,
                "header",
                format!("{e}; {}", e.recovery_suggestion()),
            ));
            return Ok(report);
        }
    };

    if mode == ValidationMode::Quick {
        return Ok(report);
    }

    let kdf_params = KdfParams {
        memory_kib: header.kdf_memory_kib,
        iterations: header.kdf_iterations,
        parallelism: header.kdf_parallelism,
    };
    let key = match derive_key(password, &header.kdf_salt, &kdf_params) {
        Ok(k) => k,
        Err(e) => {
            report
                .findings
                .push(Finding::new(Severity::Fatal, "header", format!("{e}; wrong password or corrupted KDF params")));
            return Ok(report);
        }
    };
    let cryptor: Arc<dyn Cryptor> = Arc::new(AesGcmCryptor::new(&key));
    let store = BlockStore::new(file, cryptor);

    let registry = match store.read_block(header.registry_block_offset) {
        Ok(read) => match BlockRegistry::from_bytes(&read.data) {
            Ok(r) => r,
            Err(e) => {
                report.findings.push(Finding::new(
                    Severity::Fatal,
                    format!("registry@{}", header.registry_block_offset),
                    format!("registry bytes did not deserialize ({e}); run repair(Conservative)"),
                ));
                return Ok(report);
            }
        },
        Err(e) => {
            report.findings.push(Finding::new(
                Severity::Fatal,
                format!("registry@{}", header.registry_block_offset),
                format!("registry block failed to verify ({e}); run repair(Conservative)"),
            ));
            return Ok(report);
        }
    };

    let file_len = store.len()?;
    let mut pacer = ChunkPacer::new();
    let mut extents: Vec<(u64, u64, String)> = Vec::new();

    for (name, entry) in registry.snapshot() {
        poll_cancellation(&mut pacer, token, "validate")?;

        extents.push((entry.offset, entry.offset + entry.extent_size, name.to_string()));
        if entry.offset + entry.extent_size > file_len {
            report.findings.push(Finding::new(
                Severity::Severe,
                name.to_string(),
                "registered extent extends past the end of the file",
            ));
        }

        // `wal:<n>` entries always carry `Checksum::ZERO` in the registry
        // (WAL replay's own per-record CRC32 authenticates segment
        // contents, not the registry entry), so only data blocks get a
        // checksum comparison here.
        let is_wal_segment = name.as_str().starts_with("wal:");

        match store.read_block(entry.offset) {
            Ok(read) => {
                report.blocks_checked += 1;
                if !is_wal_segment && Checksum::of(&read.data) != entry.checksum {
                    report.findings.push(Finding::new(
                        Severity::Severe,
                        name.to_string(),
                        "decrypted block does not match its registry checksum; run repair(Conservative)",
                    ));
                }
            }
            Err(e) => {
                report.findings.push(Finding::new(
                    Severity::Severe,
                    name.to_string(),
                    format!("block unreadable ({e}); run repair(Conservative)"),
                ));
            }
        }
    }

    // Registry/FSM consistency substitute: the FSM itself is never
    // persisted (`sharpcore_engine` rebuilds it in memory at `open`, empty
    // at `file_end`, growing only through WAL-replayed frees), so there is
    // no on-disk FSM snapshot to check the registry against. What *is*
    // checkable without one is `spec.md` invariant #2's pairwise-disjoint
    // half: no two registered extents may overlap.
    extents.sort_by(|a, b| a.0.cmp(&b.0));
    for pair in extents.windows(2) {
        let (_, end0, name0) = &pair[0];
        let (start1, _, name1) = &pair[1];
        if end0 > start1 {
            report.findings.push(Finding::new(
                Severity::Severe,
                format!("{name0} / {name1}"),
                "registered extents overlap; registry partition invariant violated",
            ));
        }
    }

    if mode == ValidationMode::Standard {
        return Ok(report);
    }

    // Deep: WAL replay dry run, without actually rewriting any data block.
    let mut segment_id = 0u64;
    let mut combined = Vec::new();
    loop {
        let name = BlockName::wal_segment(segment_id);
        let Some(entry) = registry.get(&name) else { break };
        match store.read_block(entry.offset) {
            Ok(read) => combined.extend_from_slice(&read.data),
            Err(e) => {
                report.findings.push(Finding::new(
                    Severity::Warn,
                    name.to_string(),
                    format!("WAL segment unreadable, replay stops here ({e})"),
                ));
                report.wal_truncated_at = Some(entry.offset);
                break;
            }
        }
        segment_id += 1;
    }
    if !combined.is_empty() {
        match build_replay_plan(&combined) {
            Ok(plan) => {
                for write in redo_writes(&plan) {
                    if Checksum::of(&write.payload) != write.checksum {
                        report.findings.push(Finding::new(
                            Severity::Severe,
                            write.name.to_string(),
                            "WAL redo payload does not match its recorded checksum",
                        ));
                    }
                }
            }
            Err(e) => {
                report
                    .findings
                    .push(Finding::new(Severity::Severe, "wal", format!("replay plan failed to build ({e})")));
            }
        }
    }

    if mode == ValidationMode::Deep {
        return Ok(report);
    }

    // Paranoid: re-decode and re-verify every block under AEAD a second
    // time. AEAD verification is already the strongest check there is —
    // there is no lighter-weight check beneath it to fall back to — so
    // this mode's only added value is catching a non-deterministic
    // storage fault (a flaky read) rather than a logical one.
    for (name, entry) in registry.snapshot() {
        poll_cancellation(&mut pacer, token, "validate")?;
        if let Err(e) = store.read_block(entry.offset) {
            report.findings.push(Finding::new(
                Severity::Severe,
                name.to_string(),
                format!("re-verification under AEAD failed ({e})"),
            ));
        }
    }

    Ok(report)
}

fn poll_cancellation(pacer: &mut ChunkPacer, token: Option<&CancellationToken>, op: &str) -> Result<()> {
    if pacer.chunk_elapsed() {
        if let Some(token) = token {
            if token.is_cancelled() {
                return Err(Error::Cancelled(op.to_string()));
            }
        }
        pacer.reset();
    }
    Ok(())
}
