//! Validation findings and the report `validate` returns (`spec.md` §4.12).

use serde::{Deserialize, Serialize};
use sharpcore_config::ValidationMode;
use sharpcore_core::Severity;

/// One integrity finding surfaced by `validate`.
///
/// Mirrors the `{severity, location, recommended-action}` shape `spec.md`
/// §4.12 requires of every finding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    /// How serious this finding is.
    pub severity: Severity,
    /// Block name, byte offset, or other locator for where it was found.
    pub location: String,
    /// What the caller should do about it.
    pub recommended_action: String,
}

impl Finding {
    /// Build a finding.
    pub fn new(severity: Severity, location: impl Into<String>, recommended_action: impl Into<String>) -> Self {
        Finding {
            severity,
            location: location.into(),
            recommended_action: recommended_action.into(),
        }
    }
}

/// The outcome of a `validate` pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    /// The mode this report was produced at.
    pub mode: ValidationMode,
    /// Every finding surfaced, in the order checks ran.
    pub findings: Vec<Finding>,
    /// Number of distinct data blocks whose checksum (and, at `Paranoid`,
    /// AEAD tag) was independently re-verified.
    pub blocks_checked: usize,
    /// Byte offset WAL replay's dry run stopped at (`Deep`/`Paranoid`
    /// only), if it stopped before the WAL's logical end. `None` below
    /// `Deep`, and `None` at `Deep`/`Paranoid` when the whole combined WAL
    /// region decoded cleanly to its end.
    pub wal_truncated_at: Option<u64>,
}

impl ValidationReport {
    /// An empty report for `mode`, before any checks have run.
    pub fn new(mode: ValidationMode) -> Self {
        ValidationReport {
            mode,
            findings: Vec::new(),
            blocks_checked: 0,
            wal_truncated_at: None,
        }
    }

    /// Whether any finding at or above `Severe` was recorded.
    pub fn is_healthy(&self) -> bool {
        !self.findings.iter().any(|f| f.severity >= Severity::Severe)
    }

    /// The single worst severity across every finding, or `Info` if there
    /// were none.
    pub fn worst_severity(&self) -> Severity {
        self.findings
            .iter()
            .map(|f| f.severity)
            .max()
            .unwrap_or(Severity::Info)
    }
}
