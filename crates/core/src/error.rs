//! Error taxonomy for SharpCoreDB
//!
//! This module defines the single error type returned by every public
//! operation in the engine. We use `thiserror` for `Display`/`Error` impls,
//! the way the rest of the workspace does.
//!
//! ## Error Categories
//!
//! - **Format / Auth**: the file cannot be opened at all
//! - **Not Found / Conflict**: expected, often-retryable, operational outcomes
//! - **Corruption**: an on-disk invariant was violated
//! - **IoError / CapacityExceeded**: resource failures
//!
//! ### Usage
//!
//! ```ignore
//! match db.read_block("k1") {
//!     Err(Error::Corruption { severity, .. }) if severity.is_fatal() => {
//!         // surface to caller, suggest repair
//!     }
//!     Err(e) if e.is_retryable() => { /* retry */ }
//!     Err(e) => return Err(e),
//!     Ok(bytes) => { /* ... */ }
//! }
//! ```

use std::io;
use thiserror::Error;

/// Result type alias for SharpCoreDB operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Severity of a detected corruption finding, increasing in how much data
/// has been confirmed unsafe to trust.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// Informational; nothing is actually wrong.
    Info,
    /// Worth surfacing, but the database remains fully usable.
    Warn,
    /// A specific region of data is unreadable or inconsistent.
    Severe,
    /// The database cannot be opened or used until repaired.
    Fatal,
}

impl Severity {
    /// Whether this severity should block normal operation.
    pub fn is_fatal(self) -> bool {
        self == Severity::Fatal
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Severity::Info => "info",
            Severity::Warn => "warn",
            Severity::Severe => "severe",
            Severity::Fatal => "fatal",
        };
        f.write_str(s)
    }
}

/// The unified error type for SharpCoreDB.
///
/// Every public operation returns `Ok(T)` or one of these variants; the
/// engine never panics on a caller-reachable path outside `debug_assert!`.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from the underlying file or directory.
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    /// File header magic/version mismatch, or an incompatible format.
    #[error("format error: {0}")]
    FormatError(String),

    /// Wrong password, or a header/registry integrity check failed.
    #[error("authentication error: {0}")]
    AuthError(String),

    /// Named block or row not present.
    #[error("not found: {0}")]
    NotFound(String),

    /// Concurrent write on the same block within overlapping transactions.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Operation exceeded its deadline.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Cooperative cancellation signal observed.
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// A checksum, AEAD tag, or structural invariant was violated.
    #[error("corruption ({severity}) at {location}: {detail}")]
    Corruption {
        /// How serious the corruption is.
        severity: Severity,
        /// Block name / byte offset / file path identifying where it was found.
        location: String,
        /// Human-readable detail.
        detail: String,
    },

    /// Cache, WAL, or another configured limit was reached.
    #[error("capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// Serialization/deserialization error for non-fixed-layout structures.
    #[error("serialization error: {0}")]
    SerializationError(String),
}

impl Error {
    /// Build a `Corruption` error.
    pub fn corruption(
        severity: Severity,
        location: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Error::Corruption {
            severity,
            location: location.into(),
            detail: detail.into(),
        }
    }

    /// A human-readable recovery suggestion, attached to every error the
    /// engine surfaces to a caller per the error-handling design.
    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            Error::AuthError(_) => "verify the password; if correct, restore from backup",
            Error::FormatError(_) => {
                "the file was created by an incompatible format version; cannot be opened here"
            }
            Error::Corruption { severity, .. } if severity.is_fatal() => {
                "run validate(Deep) then repair(Conservative); restore from backup if repair fails"
            }
            Error::Corruption { .. } => "run validate(Standard) to confirm scope before repairing",
            Error::Conflict(_) => "retry the transaction; it raced with a concurrent committer",
            Error::Timeout(_) => "retry with a longer deadline or smaller batch",
            Error::CapacityExceeded(_) => "increase cache_pages/wal_segment_size or checkpoint sooner",
            Error::NotFound(_) => "the name was never written, or was deleted",
            Error::Cancelled(_) => "the operation was cancelled cooperatively; safe to retry",
            Error::IoError(_) => "check the underlying filesystem/device",
            Error::SerializationError(_) => "the structure's encoding changed unexpectedly",
        }
    }

    /// Whether an automatic, bounded retry is appropriate (never for
    /// user-level transactions — only for idempotent internal operations).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Conflict(_) | Error::Timeout(_))
    }

    /// Whether this is specifically a transaction conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict(_))
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::SerializationError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_io() {
        let err = Error::IoError(io::Error::new(io::ErrorKind::NotFound, "missing"));
        assert!(err.to_string().contains("I/O error"));
    }

    #[test]
    fn display_corruption() {
        let err = Error::corruption(Severity::Severe, "table:orders:data", "checksum mismatch");
        let msg = err.to_string();
        assert!(msg.contains("severe"));
        assert!(msg.contains("table:orders:data"));
        assert!(msg.contains("checksum mismatch"));
    }

    #[test]
    fn fatal_corruption_is_not_retryable() {
        let err = Error::corruption(Severity::Fatal, "x", "y");
        assert!(!err.is_retryable());
        assert!(err.recovery_suggestion().contains("repair"));
    }

    #[test]
    fn conflict_is_retryable() {
        let err = Error::Conflict("block k1 written by another committer".into());
        assert!(err.is_retryable());
        assert!(err.is_conflict());
    }

    #[test]
    fn severity_ordering() {
        assert!(Severity::Info < Severity::Warn);
        assert!(Severity::Warn < Severity::Severe);
        assert!(Severity::Severe < Severity::Fatal);
        assert!(Severity::Fatal.is_fatal());
        assert!(!Severity::Severe.is_fatal());
    }
}
